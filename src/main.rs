use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use bundle_pay_api::config::AppConfig;
use bundle_pay_api::database::connection::get_db_pool;
use bundle_pay_api::database::credentials::PgCredentialStore;
use bundle_pay_api::database::ledger::PgLedger;
use bundle_pay_api::database::offers::PgOfferLookup;
use bundle_pay_api::migrate::run_migrations;
use bundle_pay_api::routes::build_router;
use bundle_pay_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("✅ App config loaded successfully");
    tracing::info!("🌐 Environment: {}", config.gateway.environment.as_str());
    tracing::info!("📞 Callback URL: {}", config.gateway.callback_url);

    let pool = get_db_pool(&config)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply the payment schema")?;

    let credentials = Arc::new(PgCredentialStore::new(
        pool.clone(),
        config.gateway.callback_url.clone(),
    ));
    let offers = Arc::new(PgOfferLookup::new(pool.clone()));
    let ledger = Arc::new(PgLedger::new(pool));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST and PORT do not form a socket address")?;

    let app_state = AppState::new(config, credentials, offers, ledger)
        .context("Failed to initialize services")?;
    tracing::info!("✅ M-Pesa service initialized and ready");

    let app = build_router(app_state);

    tracing::info!("🚀 Server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
