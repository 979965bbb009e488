use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::callback::CallbackOutcome;

/// Result code the gateway uses for a settled payment.
pub const SUCCESS_RESULT_CODE: &str = "0";

/// The pair the gateway issues at initiation and echoes in every callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
}

impl LedgerKey {
    pub fn new(merchant_request_id: impl Into<String>, checkout_request_id: impl Into<String>) -> Self {
        LedgerKey {
            merchant_request_id: merchant_request_id.into(),
            checkout_request_id: checkout_request_id.into(),
        }
    }

    /// Stable string used to scope the per-key database lock.
    pub fn lock_token(&self) -> String {
        format!("{}:{}", self.merchant_request_id, self.checkout_request_id)
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.merchant_request_id, self.checkout_request_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn from_result_code(result_code: &str) -> Self {
        if result_code == SUCCESS_RESULT_CODE {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// One row of the ledger. `phone_number` is `None` when neither the callback
/// nor an earlier row told us who paid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
    pub amount: Option<f64>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub account_reference: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(&self.merchant_request_id, &self.checkout_request_id)
    }

    /// Row written at initiation time, before the gateway has called back.
    pub fn pending(pending: &PendingTransaction, now: DateTime<Utc>) -> Self {
        TransactionRecord {
            merchant_request_id: pending.key.merchant_request_id.clone(),
            checkout_request_id: pending.key.checkout_request_id.clone(),
            result_code: None,
            result_desc: None,
            amount: Some(pending.amount),
            receipt_number: None,
            transaction_date: None,
            phone_number: Some(pending.phone_number.clone()),
            account_reference: Some(pending.account_reference.clone()),
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Computes the row that a callback leaves behind.
    ///
    /// `existing` is the stored row for the same key, `sibling` a row that only
    /// shares the merchant request id. Result code, description, status and
    /// `updated_at` always come from the callback. Every other field takes the
    /// callback's value when it carries one and otherwise keeps what was known.
    /// Receipt and settlement date belong to one checkout, so they are only ever
    /// carried over from `existing`.
    pub fn apply_callback(
        outcome: &CallbackOutcome,
        existing: Option<&TransactionRecord>,
        sibling: Option<&TransactionRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let prior = existing.or(sibling);
        let details = outcome.settlement.details();

        TransactionRecord {
            merchant_request_id: outcome.key.merchant_request_id.clone(),
            checkout_request_id: outcome.key.checkout_request_id.clone(),
            result_code: Some(outcome.result_code.clone()),
            result_desc: Some(outcome.result_desc.clone()),
            amount: details
                .and_then(|d| d.amount)
                .or_else(|| prior.and_then(|p| p.amount)),
            receipt_number: details
                .and_then(|d| d.receipt_number.clone())
                .or_else(|| existing.and_then(|p| p.receipt_number.clone())),
            transaction_date: details
                .and_then(|d| d.transaction_date)
                .map(|d| d.with_timezone(&Utc))
                .or_else(|| existing.and_then(|p| p.transaction_date)),
            phone_number: details
                .and_then(|d| d.phone_number.clone())
                .or_else(|| prior.and_then(|p| p.phone_number.clone())),
            account_reference: details
                .and_then(|d| d.account_reference.clone())
                .or_else(|| prior.and_then(|p| p.account_reference.clone())),
            status: outcome.status(),
            created_at: existing.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// What the initiator knows once the gateway has accepted a push request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub key: LedgerKey,
    pub amount: f64,
    pub phone_number: String,
    pub account_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusQuery {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub limit: Option<i64>,
}
