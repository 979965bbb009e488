// handlers/mpesa_handlers.rs
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::dtos::payment_dtos::{PushPaymentRequest, PushPaymentResponse};
use crate::errors::{AppError, Result};
use crate::models::callback::CallbackAck;
use crate::models::mpesa_transactions::{TransactionRecord, TransactionStatusQuery};
use crate::state::AppState;

// C2B Handlers
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PushPaymentRequest>, JsonRejection>,
) -> Result<Json<PushPaymentResponse>> {
    let Json(request) = payload?;
    let (phone, item_id) = request.into_parts()?;

    let outcome = state.mpesa_service.initiate_stk_push(&phone, item_id).await?;

    Ok(Json(PushPaymentResponse {
        success: true,
        data: outcome.gateway_response,
        package: outcome.package,
    }))
}

/// Gateway webhook. Takes the raw body so that nothing, not even invalid
/// JSON, gets rejected before we can acknowledge it.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    info!("Received M-Pesa callback ({} bytes)", body.len());

    let report = state.reconciler.reconcile(&body).await;
    Json(report.ack())
}

pub async fn check_transaction_status(
    State(state): State<AppState>,
    Query(query): Query<TransactionStatusQuery>,
) -> Result<Json<Value>> {
    let merchant_request_id = query
        .merchant_request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::invalid_data("merchant_request_id is required"))?;

    let record: TransactionRecord = state
        .ledger
        .find_by_key(&merchant_request_id, query.checkout_request_id.as_deref())
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("no transaction for {}", merchant_request_id))
        })?;

    Ok(Json(json!({
        "success": true,
        "status": record.status,
        "data": record,
    })))
}
