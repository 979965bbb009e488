use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::database::credentials::CredentialStore;
use crate::database::ledger::TransactionLedger;
use crate::database::offers::OfferLookup;
use crate::errors::Result;
use crate::models::callback::CallbackOutcome;
use crate::models::credentials::{MpesaCredentials, NewMpesaCredentials};
use crate::models::mpesa_transactions::{LedgerKey, PendingTransaction, TransactionRecord};
use crate::models::offer::Offer;

/// A ledger held in process memory.
///
/// The write lock is held across the read and the write of a reconcile, which
/// gives the same per-key atomicity as the Postgres ledger (coarser, since it
/// serializes all keys). Used by tests and local runs without a database.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    rows: Arc<RwLock<HashMap<LedgerKey, TransactionRecord>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row as-is, replacing any row with the same key.
    pub async fn insert(&self, record: TransactionRecord) {
        let mut rows = self.rows.write().await;
        rows.insert(record.key(), record);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn latest_for_merchant<'a>(
    rows: &'a HashMap<LedgerKey, TransactionRecord>,
    merchant_request_id: &str,
) -> Option<&'a TransactionRecord> {
    rows.values()
        .filter(|r| r.merchant_request_id == merchant_request_id)
        .max_by_key(|r| r.updated_at)
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn find_by_key(
        &self,
        merchant_request_id: &str,
        checkout_request_id: Option<&str>,
    ) -> Result<Option<TransactionRecord>> {
        let rows = self.rows.read().await;
        let found = match checkout_request_id {
            Some(checkout_request_id) => {
                rows.get(&LedgerKey::new(merchant_request_id, checkout_request_id))
            }
            None => latest_for_merchant(&rows, merchant_request_id),
        };
        Ok(found.cloned())
    }

    async fn reconcile_callback(&self, outcome: &CallbackOutcome) -> Result<TransactionRecord> {
        let mut rows = self.rows.write().await;

        let existing = rows.get(&outcome.key).cloned();
        let sibling = match existing {
            Some(_) => None,
            None => latest_for_merchant(&rows, &outcome.key.merchant_request_id).cloned(),
        };

        let merged = TransactionRecord::apply_callback(
            outcome,
            existing.as_ref(),
            sibling.as_ref(),
            Utc::now(),
        );
        rows.insert(outcome.key.clone(), merged.clone());

        Ok(merged)
    }

    async fn record_pending(&self, pending: &PendingTransaction) -> Result<bool> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&pending.key) {
            return Ok(false);
        }
        rows.insert(pending.key.clone(), TransactionRecord::pending(pending, Utc::now()));
        Ok(true)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<TransactionRecord>> {
        let rows = self.rows.read().await;
        let mut records: Vec<TransactionRecord> = rows.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryCredentialStore {
    bundles: Arc<RwLock<Vec<MpesaCredentials>>>,
    callback_url: String,
}

impl InMemoryCredentialStore {
    pub fn new(callback_url: impl Into<String>) -> Self {
        InMemoryCredentialStore {
            bundles: Arc::new(RwLock::new(Vec::new())),
            callback_url: callback_url.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn latest_credentials(&self) -> Result<Option<MpesaCredentials>> {
        Ok(self.bundles.read().await.last().cloned())
    }

    async fn add_credentials(&self, credentials: &NewMpesaCredentials) -> Result<MpesaCredentials> {
        let mut bundles = self.bundles.write().await;
        let stored = MpesaCredentials {
            id: bundles.len() as i64 + 1,
            consumer_key: credentials.consumer_key.clone(),
            consumer_secret: credentials.consumer_secret.clone(),
            short_code: credentials.short_code.clone(),
            pass_key: credentials.pass_key.clone(),
            created_at: Utc::now(),
        };
        bundles.push(stored.clone());
        Ok(stored)
    }

    fn callback_url(&self) -> String {
        self.callback_url.clone()
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOfferCatalog {
    offers: Arc<RwLock<HashMap<i64, Offer>>>,
}

impl InMemoryOfferCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, offer: Offer) {
        self.offers.write().await.insert(offer.id, offer);
    }
}

#[async_trait]
impl OfferLookup for InMemoryOfferCatalog {
    async fn offer_by_id(&self, id: i64) -> Result<Option<Offer>> {
        Ok(self.offers.read().await.get(&id).cloned())
    }
}
