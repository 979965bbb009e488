// services/reconciler.rs
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::database::ledger::TransactionLedger;
use crate::errors::AppError;
use crate::models::callback::{CallbackAck, CallbackOutcome};
use crate::models::mpesa_transactions::{LedgerKey, TransactionRecord};

/// What happened to one callback delivery.
///
/// Both variants are acknowledged to the gateway with `ResultCode "0"`: it has
/// no way to fix a failure on our side and would otherwise redeliver forever.
#[derive(Debug)]
pub enum ReconcileReport {
    /// The payment outcome (success or failure) is in the ledger.
    Recorded(TransactionRecord),
    /// We could not record it. Already logged, nothing was written.
    InternalFailure {
        key: Option<LedgerKey>,
        error: AppError,
    },
}

impl ReconcileReport {
    pub fn ack(&self) -> CallbackAck {
        match self {
            ReconcileReport::Recorded(_) => CallbackAck::accepted("Callback received successfully"),
            ReconcileReport::InternalFailure { .. } => CallbackAck::accepted("Callback received"),
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, ReconcileReport::Recorded(_))
    }
}

pub struct CallbackReconciler {
    ledger: Arc<dyn TransactionLedger>,
}

impl CallbackReconciler {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        CallbackReconciler { ledger }
    }

    /// Normalizes a raw callback body and upserts it into the ledger. Never fails.
    pub async fn reconcile(&self, body: &[u8]) -> ReconcileReport {
        let outcome = match CallbackOutcome::from_bytes(body) {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    "❌ Unusable M-Pesa callback: {} (body: {})",
                    error,
                    String::from_utf8_lossy(body)
                );
                return ReconcileReport::InternalFailure { key: None, error };
            }
        };

        self.apply(&outcome).await
    }

    pub async fn apply(&self, outcome: &CallbackOutcome) -> ReconcileReport {
        info!(
            "📥 M-Pesa callback for {}: {} - {}",
            outcome.key, outcome.result_code, outcome.result_desc
        );

        match self.ledger.reconcile_callback(outcome).await {
            Ok(record) => {
                if outcome.is_success() {
                    info!(
                        "✅ Payment {} completed, receipt {}",
                        outcome.key,
                        record.receipt_number.as_deref().unwrap_or("-")
                    );
                } else {
                    warn!(
                        "Payment {} failed with code {}: {}",
                        outcome.key, outcome.result_code, outcome.result_desc
                    );
                }
                ReconcileReport::Recorded(record)
            }
            Err(error) => {
                error!("❌ Failed to reconcile callback {}: {}", outcome.key, error);
                ReconcileReport::InternalFailure {
                    key: Some(outcome.key.clone()),
                    error,
                }
            }
        }
    }
}
