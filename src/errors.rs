// src/errors.rs
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("M-Pesa credentials not found")]
    CredentialsMissing,

    #[error("Package not found: {0}")]
    ItemNotFound(i64),

    #[error("Invalid phone number format: {0}")]
    InvalidPhoneFormat(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Failed to get access token: {0}")]
    GatewayAuthError(String),

    #[error("{0}")]
    GatewayRequestError(String),

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authorization token required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ItemNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CredentialsMissing
            | AppError::InvalidPhoneFormat(_)
            | AppError::InvalidAmount(_)
            | AppError::GatewayAuthError(_)
            | AppError::GatewayRequestError(_)
            | AppError::MalformedCallback(_)
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::ConfigurationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_label(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database error",
            AppError::CredentialsMissing => "Credentials missing",
            AppError::ItemNotFound(_) => "Package not found",
            AppError::InvalidPhoneFormat(_) => "Invalid phone number",
            AppError::InvalidAmount(_) => "Invalid amount",
            AppError::GatewayAuthError(_) => "M-Pesa authentication failed",
            AppError::GatewayRequestError(_) => "M-Pesa request failed",
            AppError::MalformedCallback(_) => "Malformed callback",
            AppError::ValidationError(_) => "Validation failed",
            AppError::NotFound(_) => "Not found",
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::ConfigurationError(_) => "Configuration error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak SQL details to callers.
        let message = match &self {
            AppError::Database(_) => "Internal database error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.error_label(),
            "message": message,
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::GatewayRequestError("M-Pesa request timed out".to_string())
        } else {
            AppError::GatewayRequestError(format!("M-Pesa request failed: {}", err))
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn gateway_auth(msg: impl Into<String>) -> Self {
        AppError::GatewayAuthError(msg.into())
    }

    pub fn gateway_request(msg: impl Into<String>) -> Self {
        AppError::GatewayRequestError(msg.into())
    }

    pub fn malformed_callback(msg: impl Into<String>) -> Self {
        AppError::MalformedCallback(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
