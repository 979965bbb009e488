use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// The active integration secret bundle. Never serialized back to callers.
#[derive(Clone)]
pub struct MpesaCredentials {
    pub id: i64,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub pass_key: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for MpesaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaCredentials")
            .field("id", &self.id)
            .field("short_code", &self.short_code)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl MpesaCredentials {
    pub fn summary(&self, callback_url: &str) -> CredentialSummary {
        CredentialSummary {
            id: self.id,
            short_code: self.short_code.clone(),
            created_at: self.created_at,
            callback_url: callback_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: i64,
    pub short_code: String,
    pub created_at: DateTime<Utc>,
    pub callback_url: String,
}

/// All four secrets travel together; a partial bundle is rejected.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMpesaCredentials {
    #[validate(length(min = 1, message = "consumer_key is required"))]
    #[serde(default)]
    pub consumer_key: String,

    #[validate(length(min = 1, message = "consumer_secret is required"))]
    #[serde(default)]
    pub consumer_secret: String,

    #[validate(length(min = 1, message = "short_code is required"))]
    #[serde(default)]
    pub short_code: String,

    #[validate(length(min = 1, message = "pass_key is required"))]
    #[serde(default)]
    pub pass_key: String,
}

impl NewMpesaCredentials {
    pub fn trimmed(self) -> Self {
        NewMpesaCredentials {
            consumer_key: self.consumer_key.trim().to_string(),
            consumer_secret: self.consumer_secret.trim().to_string(),
            short_code: self.short_code.trim().to_string(),
            pass_key: self.pass_key.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_bundle_fails_validation() {
        let partial: NewMpesaCredentials = serde_json::from_value(serde_json::json!({
            "consumer_key": "key",
            "consumer_secret": "secret",
            "short_code": "174379"
        }))
        .unwrap();

        let errors = partial.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("pass_key"));
    }

    #[test]
    fn whitespace_only_fields_fail_after_trimming() {
        let bundle = NewMpesaCredentials {
            consumer_key: "key".into(),
            consumer_secret: "   ".into(),
            short_code: "174379".into(),
            pass_key: "pass".into(),
        }
        .trimmed();

        assert!(bundle.validate().is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = MpesaCredentials {
            id: 1,
            consumer_key: "super-key".into(),
            consumer_secret: "super-secret".into(),
            short_code: "174379".into(),
            pass_key: "pass-key".into(),
            created_at: Utc::now(),
        };

        let printed = format!("{:?}", creds);
        assert!(printed.contains("174379"));
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("pass-key"));
    }
}
