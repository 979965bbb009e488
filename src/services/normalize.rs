// services/normalize.rs
//! Helpers shared by the initiator and the callback reconciler: phone number
//! normalization, the gateway's clock, and redaction of secrets in logs.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::errors::{AppError, Result};

pub const COUNTRY_CODE: &str = "254";

/// Offset of the gateway's timestamps (East Africa Time).
pub const GATEWAY_UTC_OFFSET_SECS: i32 = 3 * 3600;

const GATEWAY_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Normalizes a caller-supplied phone number to `2547XXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let formatted = if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else if digits.starts_with('7') && digits.len() == 9 {
        format!("{}{}", COUNTRY_CODE, digits)
    } else if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        return Err(AppError::InvalidPhoneFormat(raw.to_string()));
    };

    if formatted.len() != 12 {
        return Err(AppError::InvalidPhoneFormat(raw.to_string()));
    }

    Ok(formatted)
}

/// Callback phone numbers are trusted as-is apart from the local `0` prefix.
pub fn normalize_callback_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    match digits.strip_prefix('0') {
        Some(rest) => Some(format!("{}{}", COUNTRY_CODE, rest)),
        None => Some(digits),
    }
}

pub fn gateway_offset() -> FixedOffset {
    FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS).expect("UTC+3 is within FixedOffset range")
}

pub fn gateway_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&gateway_offset())
}

/// `YYYYMMDDHHmmss` on the gateway's clock.
pub fn gateway_timestamp(at: DateTime<FixedOffset>) -> String {
    at.with_timezone(&gateway_offset())
        .format(GATEWAY_TIMESTAMP_FORMAT)
        .to_string()
}

/// Parses a gateway `YYYYMMDDHHmmss` value as an instant at UTC+3.
pub fn parse_gateway_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), GATEWAY_TIMESTAMP_FORMAT).ok()?;
    gateway_offset().from_local_datetime(&naive).single()
}

/// First five characters followed by an ellipsis.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    format!("{}...", prefix)
}
