use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{credentials, mpesa_handlers};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

/// Public payment routes plus the token-guarded status lookup.
pub fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // C2B
        .route("/push", post(mpesa_handlers::initiate_stk_push))
        .route("/stk-push", post(mpesa_handlers::initiate_stk_push))
        // Gateway webhook, always answered with 200, whatever the body size
        .route(
            "/callback",
            post(mpesa_handlers::mpesa_callback).layer(DefaultBodyLimit::disable()),
        )
        .merge(status_routes(state))
}

// Status rows carry phone numbers and receipts.
fn status_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/status", get(mpesa_handlers::check_transaction_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

pub fn credential_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/credentials/latest", get(credentials::get_latest_credentials))
        .route("/credentials", post(credentials::add_credentials))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
