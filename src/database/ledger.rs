use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};
use tracing::{debug, warn};

use crate::errors::{AppError, Result};
use crate::models::callback::CallbackOutcome;
use crate::models::mpesa_transactions::{
    LedgerKey, PendingTransaction, TransactionRecord, TransactionStatus,
};

/// Durable record of payment attempts.
///
/// `reconcile_callback` is the only write path for callbacks. Implementations
/// must run the lookup of the prior row, the merge, and the upsert as one
/// atomic unit per key, so that concurrent deliveries of the same callback
/// collapse into a single row without losing an update.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Exact pair when `checkout_request_id` is given, otherwise the most
    /// recently updated row for the merchant request.
    async fn find_by_key(
        &self,
        merchant_request_id: &str,
        checkout_request_id: Option<&str>,
    ) -> Result<Option<TransactionRecord>>;

    async fn reconcile_callback(&self, outcome: &CallbackOutcome) -> Result<TransactionRecord>;

    /// Inserts a pending row unless the key already exists. Returns whether a row was written.
    async fn record_pending(&self, pending: &PendingTransaction) -> Result<bool>;

    async fn recent(&self, limit: i64) -> Result<Vec<TransactionRecord>>;

    async fn ping(&self) -> Result<()>;
}

const RECORD_COLUMNS: &str = "merchant_request_id, checkout_request_id, result_code, result_desc, \
     amount, receipt_number, transaction_date, phone_number, account_reference, status, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        PgLedger { pool }
    }

    async fn reconcile_in_tx(
        conn: &mut PgConnection,
        outcome: &CallbackOutcome,
    ) -> Result<TransactionRecord> {
        // Serializes every delivery for this pair, including the very first
        // one when there is no row yet for FOR UPDATE to lock.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(outcome.key.lock_token())
            .execute(&mut *conn)
            .await?;

        let existing = fetch_exact(&mut *conn, &outcome.key, true).await?;
        let sibling = match existing {
            Some(_) => None,
            None => fetch_latest_for_merchant(&mut *conn, &outcome.key.merchant_request_id).await?,
        };

        let merged = TransactionRecord::apply_callback(
            outcome,
            existing.as_ref(),
            sibling.as_ref(),
            Utc::now(),
        );

        upsert_callback_row(&mut *conn, &merged).await
    }
}

#[async_trait]
impl TransactionLedger for PgLedger {
    async fn find_by_key(
        &self,
        merchant_request_id: &str,
        checkout_request_id: Option<&str>,
    ) -> Result<Option<TransactionRecord>> {
        let mut conn = self.pool.acquire().await?;
        match checkout_request_id {
            Some(checkout_request_id) => {
                let key = LedgerKey::new(merchant_request_id, checkout_request_id);
                fetch_exact(&mut conn, &key, false).await
            }
            None => fetch_latest_for_merchant(&mut conn, merchant_request_id).await,
        }
    }

    async fn reconcile_callback(&self, outcome: &CallbackOutcome) -> Result<TransactionRecord> {
        let mut tx = self.pool.begin().await?;

        match Self::reconcile_in_tx(&mut tx, outcome).await {
            Ok(record) => {
                tx.commit().await?;
                debug!("Ledger row {} is now {}", outcome.key, record.status.as_str());
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback for {} failed: {}", outcome.key, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn record_pending(&self, pending: &PendingTransaction) -> Result<bool> {
        let row = TransactionRecord::pending(pending, Utc::now());

        let result = sqlx::query(
            "INSERT INTO transactions (merchant_request_id, checkout_request_id, amount, \
             phone_number, account_reference, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (merchant_request_id, checkout_request_id) DO NOTHING",
        )
        .bind(&row.merchant_request_id)
        .bind(&row.checkout_request_id)
        .bind(row.amount)
        .bind(&row.phone_number)
        .bind(&row.account_reference)
        .bind(row.status.as_str())
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY created_at DESC, id DESC LIMIT $1",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn fetch_exact(
    conn: &mut PgConnection,
    key: &LedgerKey,
    for_update: bool,
) -> Result<Option<TransactionRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM transactions \
         WHERE merchant_request_id = $1 AND checkout_request_id = $2{}",
        RECORD_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    ))
    .bind(&key.merchant_request_id)
    .bind(&key.checkout_request_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

async fn fetch_latest_for_merchant(
    conn: &mut PgConnection,
    merchant_request_id: &str,
) -> Result<Option<TransactionRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM transactions WHERE merchant_request_id = $1 \
         ORDER BY updated_at DESC LIMIT 1",
        RECORD_COLUMNS
    ))
    .bind(merchant_request_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

async fn upsert_callback_row(
    conn: &mut PgConnection,
    record: &TransactionRecord,
) -> Result<TransactionRecord> {
    let row = sqlx::query(&format!(
        "INSERT INTO transactions ({cols}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (merchant_request_id, checkout_request_id) DO UPDATE SET \
             result_code = EXCLUDED.result_code, \
             result_desc = EXCLUDED.result_desc, \
             status = EXCLUDED.status, \
             updated_at = EXCLUDED.updated_at, \
             amount = COALESCE(EXCLUDED.amount, transactions.amount), \
             receipt_number = COALESCE(EXCLUDED.receipt_number, transactions.receipt_number), \
             transaction_date = COALESCE(EXCLUDED.transaction_date, transactions.transaction_date), \
             phone_number = COALESCE(EXCLUDED.phone_number, transactions.phone_number), \
             account_reference = COALESCE(EXCLUDED.account_reference, transactions.account_reference) \
         RETURNING {cols}",
        cols = RECORD_COLUMNS
    ))
    .bind(&record.merchant_request_id)
    .bind(&record.checkout_request_id)
    .bind(&record.result_code)
    .bind(&record.result_desc)
    .bind(record.amount)
    .bind(&record.receipt_number)
    .bind(record.transaction_date)
    .bind(&record.phone_number)
    .bind(&record.account_reference)
    .bind(record.status.as_str())
    .bind(record.created_at)
    .bind(record.updated_at)
    .fetch_one(&mut *conn)
    .await?;

    record_from_row(&row)
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<TransactionStatus>()
        .map_err(|e| AppError::Database(sqlx::Error::Decode(e.into())))?;

    Ok(TransactionRecord {
        merchant_request_id: row.try_get("merchant_request_id")?,
        checkout_request_id: row.try_get("checkout_request_id")?,
        result_code: row.try_get("result_code")?,
        result_desc: row.try_get("result_desc")?,
        amount: row.try_get("amount")?,
        receipt_number: row.try_get("receipt_number")?,
        transaction_date: row.try_get("transaction_date")?,
        phone_number: row.try_get("phone_number")?,
        account_reference: row.try_get("account_reference")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::callback::Settlement;

    // Needs a scratch Postgres: DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn concurrent_callbacks_collapse_into_one_row() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for ledger test");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let ledger = PgLedger::new(pool.clone());

        let key = LedgerKey::new(
            format!("it-{}", Utc::now().timestamp_nanos_opt().unwrap()),
            "ws_CO_it",
        );
        let outcome = CallbackOutcome {
            key: key.clone(),
            result_code: "0".into(),
            result_desc: "ok".into(),
            settlement: Settlement::NotReported,
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let outcome = outcome.clone();
            handles.push(tokio::spawn(async move { ledger.reconcile_callback(&outcome).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE merchant_request_id = $1",
        )
        .bind(&key.merchant_request_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let stored = ledger
            .find_by_key(&key.merchant_request_id, Some(&key.checkout_request_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
    }
}
