use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::credentials::NewMpesaCredentials;
use crate::state::AppState;

pub async fn get_latest_credentials(State(state): State<AppState>) -> Result<Json<Value>> {
    let credentials = state
        .credentials
        .latest_credentials()
        .await?
        .ok_or_else(|| AppError::NotFound("No M-Pesa credentials found".to_string()))?;

    // Only non-secret fields leave the server.
    let summary = credentials.summary(&state.credentials.callback_url());

    Ok(Json(json!({
        "success": true,
        "data": summary,
    })))
}

pub async fn add_credentials(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewMpesaCredentials>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Json(payload) = payload?;
    let credentials = payload.trimmed();

    credentials.validate().map_err(|_| {
        AppError::invalid_data(
            "All fields are required: consumer_key, consumer_secret, short_code, pass_key",
        )
    })?;

    let stored = state.credentials.add_credentials(&credentials).await?;
    info!("🔐 New M-Pesa credentials saved for short code {}", stored.short_code);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "M-Pesa credentials saved successfully",
        })),
    ))
}
