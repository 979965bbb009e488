use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::Result;

pub async fn get_db_pool(config: &AppConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("❌ Failed to connect to Postgres: {}", e);
            e
        })?;

    info!("✅ Connected to Postgres (max {} connections)", config.db_max_connections);
    Ok(pool)
}
