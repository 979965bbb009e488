// migrate.rs
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::errors::Result;

const SCHEMA: &str = include_str!("../migrations/001_payments.sql");

/// Creates the payment tables if they are missing. Safe to run on every boot.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Applying payment schema...");
    pool.execute(SCHEMA).await?;
    info!("Payment schema ready");
    Ok(())
}
