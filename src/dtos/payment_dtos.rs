use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::offer::PackageSummary;
use crate::services::mpesa_service::StkPushResponse;

/// Body of `POST /payments/push`. Both fields are optional at the type level
/// so a missing one gets a readable 400 instead of a JSON rejection.
#[serde_as]
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PushPaymentRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: Option<String>,

    #[serde(default, alias = "packageId")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[validate(range(min = 1, message = "Package ID must be a positive number"))]
    pub item_id: Option<i64>,
}

impl PushPaymentRequest {
    pub fn into_parts(self) -> Result<(String, i64)> {
        self.validate()?;

        let phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::invalid_data("Phone number is required"))?;
        let item_id = self
            .item_id
            .ok_or_else(|| AppError::invalid_data("Package ID is required"))?;

        Ok((phone, item_id))
    }
}

#[derive(Debug, Serialize)]
pub struct PushPaymentResponse {
    pub success: bool,
    pub data: StkPushResponse,
    pub package: PackageSummary,
}

// Clients send phone numbers both quoted and bare.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "phone must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> PushPaymentRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn accepts_item_id_as_number_or_string() {
        let (phone, item_id) = parse(json!({ "phone": "0712345678", "itemId": 1 }))
            .into_parts()
            .unwrap();
        assert_eq!((phone.as_str(), item_id), ("0712345678", 1));

        let (_, item_id) = parse(json!({ "phone": "0712345678", "itemId": "7" }))
            .into_parts()
            .unwrap();
        assert_eq!(item_id, 7);
    }

    #[test]
    fn accepts_legacy_package_id_and_bare_phone() {
        let (phone, item_id) = parse(json!({ "phone": 254712345678u64, "packageId": 3 }))
            .into_parts()
            .unwrap();
        assert_eq!(phone, "254712345678");
        assert_eq!(item_id, 3);
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let err = parse(json!({ "itemId": 1 })).into_parts().unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("Phone")));

        let err = parse(json!({ "phone": "0712345678" })).into_parts().unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("Package ID")));

        let err = parse(json!({ "phone": "0712345678", "itemId": 0 })).into_parts().unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
