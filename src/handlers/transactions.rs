use axum::{
    extract::{Query, State},
    response::Json,
};
use serde_json::{json, Value};

use crate::errors::Result;
use crate::models::mpesa_transactions::TransactionListQuery;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

// Newest first
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let transactions = state.ledger.recent(limit).await?;

    Ok(Json(json!({
        "success": true,
        "count": transactions.len(),
        "data": transactions,
    })))
}
