use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::errors::Result;
use crate::models::credentials::{MpesaCredentials, NewMpesaCredentials};

/// Source of the gateway secret bundle. The most recently added bundle wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn latest_credentials(&self) -> Result<Option<MpesaCredentials>>;

    async fn add_credentials(&self, credentials: &NewMpesaCredentials) -> Result<MpesaCredentials>;

    fn callback_url(&self) -> String;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    callback_url: String,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, callback_url: impl Into<String>) -> Self {
        PgCredentialStore {
            pool,
            callback_url: callback_url.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn latest_credentials(&self) -> Result<Option<MpesaCredentials>> {
        let row = sqlx::query(
            "SELECT id, consumer_key, consumer_secret, short_code, pass_key, created_at \
             FROM mpesa_credentials ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(credentials_from_row).transpose()
    }

    async fn add_credentials(&self, credentials: &NewMpesaCredentials) -> Result<MpesaCredentials> {
        let row = sqlx::query(
            "INSERT INTO mpesa_credentials (consumer_key, consumer_secret, short_code, pass_key) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, consumer_key, consumer_secret, short_code, pass_key, created_at",
        )
        .bind(&credentials.consumer_key)
        .bind(&credentials.consumer_secret)
        .bind(&credentials.short_code)
        .bind(&credentials.pass_key)
        .fetch_one(&self.pool)
        .await?;

        credentials_from_row(&row)
    }

    fn callback_url(&self) -> String {
        self.callback_url.clone()
    }
}

fn credentials_from_row(row: &PgRow) -> Result<MpesaCredentials> {
    Ok(MpesaCredentials {
        id: row.try_get("id")?,
        consumer_key: row.try_get("consumer_key")?,
        consumer_secret: row.try_get("consumer_secret")?,
        short_code: row.try_get("short_code")?,
        pass_key: row.try_get("pass_key")?,
        created_at: row.try_get("created_at")?,
    })
}
