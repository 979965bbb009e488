// config.rs
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const DEFAULT_CALLBACK_URL: &str = "https://www.bingwasokonii.com/api/mpesa/callback";

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" | "live" => Ok(MpesaEnvironment::Production),
            other => Err(AppError::configuration(format!(
                "MPESA_ENVIRONMENT must be sandbox or production, got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

/// Gateway settings the M-Pesa service needs. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: MpesaEnvironment,
    pub base_url: String,
    pub callback_url: String,
    pub auth_timeout: Duration,
    pub stk_timeout: Duration,
    pub record_pending: bool,
}

impl GatewayConfig {
    pub fn new(environment: MpesaEnvironment) -> Self {
        GatewayConfig {
            environment,
            base_url: environment.base_url().to_string(),
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            auth_timeout: Duration::from_secs(10),
            stk_timeout: Duration::from_secs(30),
            record_pending: true,
        }
    }

    pub fn get_mpesa_urls(&self) -> (String, String) {
        let base_url = self.base_url.trim_end_matches('/');

        let auth_url = format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url);
        let stk_url = format!("{}/mpesa/stkpush/v1/processrequest", base_url);

        (auth_url, stk_url)
    }

    pub fn is_production(&self) -> bool {
        self.environment == MpesaEnvironment::Production
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub jwt_secret: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't have to touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };

        let environment =
            MpesaEnvironment::parse(&lookup("MPESA_ENVIRONMENT").unwrap_or_default())?;

        let mut gateway = GatewayConfig::new(environment);
        if let Some(base_url) = lookup("MPESA_BASE_URL").filter(|v| !v.trim().is_empty()) {
            gateway.base_url = base_url;
        }
        if let Some(callback_url) = lookup("MPESA_CALLBACK_URL").filter(|v| !v.trim().is_empty()) {
            gateway.callback_url = callback_url;
        }
        if let Some(secs) = lookup("MPESA_AUTH_TIMEOUT_SECS") {
            gateway.auth_timeout = Duration::from_secs(parse_number(&secs, "MPESA_AUTH_TIMEOUT_SECS")?);
        }
        if let Some(secs) = lookup("MPESA_STK_TIMEOUT_SECS") {
            gateway.stk_timeout = Duration::from_secs(parse_number(&secs, "MPESA_STK_TIMEOUT_SECS")?);
        }
        if let Some(flag) = lookup("MPESA_RECORD_PENDING") {
            gateway.record_pending = parse_flag(&flag, "MPESA_RECORD_PENDING")?;
        }

        let port = match lookup("PORT") {
            Some(port) => parse_number(&port, "PORT")?,
            None => 10000,
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(max) => parse_number(&max, "DB_MAX_CONNECTIONS")?,
            None => 20,
        };

        Ok(AppConfig {
            gateway,
            jwt_secret: required("JWT_SECRET")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections,
            port,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        })
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.gateway.environment.as_str(),
            "is_production": self.gateway.is_production(),
            "callback_url": self.gateway.callback_url,
            "auth_timeout_secs": self.gateway.auth_timeout.as_secs(),
            "stk_timeout_secs": self.gateway.stk_timeout.as_secs(),
            "record_pending": self.gateway.record_pending,
            "port": self.port,
            "host": self.host,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::configuration(format!("{} must be a number", key)))
}

fn parse_flag(raw: &str, key: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::configuration(format!("{} must be true or false", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_sandbox_with_standard_timeouts() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/bundles"),
        ]))
        .unwrap();

        assert_eq!(config.gateway.environment, MpesaEnvironment::Sandbox);
        assert_eq!(config.gateway.auth_timeout, Duration::from_secs(10));
        assert_eq!(config.gateway.stk_timeout, Duration::from_secs(30));
        assert_eq!(config.gateway.callback_url, DEFAULT_CALLBACK_URL);
        assert!(config.gateway.record_pending);
        assert_eq!(config.port, 10000);

        let (auth_url, stk_url) = config.gateway.get_mpesa_urls();
        assert_eq!(
            auth_url,
            "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
        assert_eq!(stk_url, "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest");
    }

    #[test]
    fn live_environment_switches_base_url() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/bundles"),
            ("MPESA_ENVIRONMENT", "live"),
        ]))
        .unwrap();

        assert!(config.gateway.is_production());
        let (_, stk_url) = config.gateway.get_mpesa_urls();
        assert!(stk_url.starts_with("https://api.safaricom.co.ke/"));
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/bundles"),
            ("MPESA_BASE_URL", "http://127.0.0.1:9999/"),
            ("MPESA_RECORD_PENDING", "false"),
        ]))
        .unwrap();

        let (auth_url, _) = config.gateway.get_mpesa_urls();
        assert_eq!(
            auth_url,
            "http://127.0.0.1:9999/oauth/v1/generate?grant_type=client_credentials"
        );
        assert!(!config.gateway.record_pending);
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(msg) if msg.contains("JWT_SECRET")));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(MpesaEnvironment::parse("staging").is_err());
    }
}
