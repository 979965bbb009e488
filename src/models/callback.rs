// models/callback.rs
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{AppError, Result};
use crate::models::mpesa_transactions::{LedgerKey, TransactionStatus, SUCCESS_RESULT_CODE};
use crate::services::normalize::{normalize_callback_phone, parse_gateway_timestamp};

/// Stored when the gateway leaves `ResultCode` out. Anything but "0" is a failure.
pub const MISSING_RESULT_CODE: &str = "-1";

// Wire format of the STK callback
#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    // Ids and code are read as raw values: numbers and strings both occur.
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<Value>,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<Value>,

    #[serde(rename = "ResultCode")]
    pub result_code: Option<Value>,

    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,

    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

/// Items stay untyped here so one odd entry cannot reject the whole callback.
#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

/// Settlement details the gateway reported in `CallbackMetadata`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementDetails {
    pub amount: Option<f64>,
    pub receipt_number: Option<String>,
    pub phone_number: Option<String>,
    pub account_reference: Option<String>,
    pub transaction_date: Option<DateTime<FixedOffset>>,
}

impl SettlementDetails {
    fn from_items(items: &[Value]) -> Self {
        let mut details = SettlementDetails::default();

        for raw in items {
            let Ok(item) = CallbackItem::deserialize(raw) else {
                warn!("Skipping unreadable callback metadata item: {}", raw);
                continue;
            };
            let Some(value) = item.value.as_ref() else {
                continue;
            };

            match item.name.as_str() {
                "Amount" => details.amount = value_as_f64(value),
                "MpesaReceiptNumber" => details.receipt_number = value_as_string(value),
                "PhoneNumber" => {
                    details.phone_number =
                        value_as_string(value).and_then(|p| normalize_callback_phone(&p))
                }
                "AccountReference" => details.account_reference = value_as_string(value),
                "TransactionDate" => {
                    details.transaction_date =
                        value_as_string(value).and_then(|d| parse_gateway_timestamp(&d))
                }
                _ => {}
            }
        }

        details
    }
}

/// Metadata is only attached to successful callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Reported(SettlementDetails),
    NotReported,
}

impl Settlement {
    pub fn details(&self) -> Option<&SettlementDetails> {
        match self {
            Settlement::Reported(details) => Some(details),
            Settlement::NotReported => None,
        }
    }
}

/// A callback reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOutcome {
    pub key: LedgerKey,
    pub result_code: String,
    pub result_desc: String,
    pub settlement: Settlement,
}

impl CallbackOutcome {
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let envelope: StkCallbackEnvelope = serde_json::from_slice(body)
            .map_err(|e| AppError::malformed_callback(e.to_string()))?;
        Self::from_callback(envelope.body.stk_callback)
    }

    pub fn from_callback(callback: StkCallback) -> Result<Self> {
        let merchant_request_id = callback
            .merchant_request_id
            .as_ref()
            .and_then(value_as_string)
            .ok_or_else(|| AppError::malformed_callback("missing MerchantRequestID"))?;
        let checkout_request_id = callback
            .checkout_request_id
            .as_ref()
            .and_then(value_as_string)
            .ok_or_else(|| AppError::malformed_callback("missing CheckoutRequestID"))?;

        let result_code = callback
            .result_code
            .as_ref()
            .and_then(value_as_string)
            .unwrap_or_else(|| MISSING_RESULT_CODE.to_string());

        let settlement = match callback.callback_metadata {
            Some(metadata) => Settlement::Reported(SettlementDetails::from_items(&metadata.items)),
            None => Settlement::NotReported,
        };

        Ok(CallbackOutcome {
            key: LedgerKey::new(merchant_request_id, checkout_request_id),
            result_code,
            result_desc: callback.result_desc.unwrap_or_default(),
            settlement,
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == SUCCESS_RESULT_CODE
    }

    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_result_code(&self.result_code)
    }
}

/// The only body the gateway ever gets back from the callback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: String,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted(result_desc: impl Into<String>) -> Self {
        CallbackAck {
            result_code: SUCCESS_RESULT_CODE.to_string(),
            result_desc: result_desc.into(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
