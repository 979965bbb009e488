use axum::{middleware, routing::get, Router};

use crate::handlers::transactions::get_transactions;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn transaction_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/transactions", get(get_transactions))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
