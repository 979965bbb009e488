use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::errors::Result;
use crate::models::offer::Offer;

#[async_trait]
pub trait OfferLookup: Send + Sync {
    async fn offer_by_id(&self, id: i64) -> Result<Option<Offer>>;
}

#[derive(Clone)]
pub struct PgOfferLookup {
    pool: PgPool,
}

impl PgOfferLookup {
    pub fn new(pool: PgPool) -> Self {
        PgOfferLookup { pool }
    }
}

#[async_trait]
impl OfferLookup for PgOfferLookup {
    async fn offer_by_id(&self, id: i64) -> Result<Option<Offer>> {
        let row = sqlx::query("SELECT id, name, price::float8 AS price FROM offers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Offer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
        }))
    }
}
