// services/mpesa_service.rs
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, FixedOffset};
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::database::credentials::CredentialStore;
use crate::database::ledger::TransactionLedger;
use crate::database::offers::OfferLookup;
use crate::errors::{AppError, Result};
use crate::models::credentials::MpesaCredentials;
use crate::models::mpesa_transactions::{LedgerKey, PendingTransaction};
use crate::models::offer::{Offer, PackageSummary};
use crate::services::normalize::{gateway_now, gateway_timestamp, normalize_phone, redact};

pub const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

const GENERIC_STK_ERROR: &str = "Failed to initiate STK push";

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: Option<String>,
    // "3599" from the gateway, 3599 from some proxies
    pub expires_in: Option<Value>,
}

impl AuthResponse {
    pub fn expires_in_secs(&self) -> Option<String> {
        match self.expires_in.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// The gateway's synchronous answer. It only says the request was queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushResponse {
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(&self.merchant_request_id, &self.checkout_request_id)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StkPushOutcome {
    pub gateway_response: StkPushResponse,
    pub package: PackageSummary,
}

pub fn generate_password(short_code: &str, pass_key: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", short_code, pass_key, timestamp))
}

/// Builds the push request body. `phone` must already be normalized.
pub fn build_stk_request(
    credentials: &MpesaCredentials,
    offer: &Offer,
    phone: &str,
    callback_url: &str,
    at: DateTime<FixedOffset>,
) -> Result<StkPushRequest> {
    let amount = offer.charge_amount();
    if amount < 1 {
        return Err(AppError::InvalidAmount(format!(
            "package {} is priced at {}, which rounds below 1",
            offer.id, offer.price
        )));
    }

    let timestamp = gateway_timestamp(at);
    let password = generate_password(&credentials.short_code, &credentials.pass_key, &timestamp);

    Ok(StkPushRequest {
        business_short_code: credentials.short_code.clone(),
        password,
        timestamp,
        transaction_type: TRANSACTION_TYPE.to_string(),
        amount,
        party_a: phone.to_string(),
        party_b: credentials.short_code.clone(),
        phone_number: phone.to_string(),
        callback_url: callback_url.to_string(),
        account_reference: offer.account_reference(),
        transaction_desc: offer.transaction_desc(),
    })
}

#[derive(Clone)]
pub struct MpesaService {
    config: GatewayConfig,
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    offers: Arc<dyn OfferLookup>,
    ledger: Arc<dyn TransactionLedger>,
}

impl MpesaService {
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialStore>,
        offers: Arc<dyn OfferLookup>,
        ledger: Arc<dyn TransactionLedger>,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaService {
            config,
            client,
            credentials,
            offers,
            ledger,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn load_credentials(&self) -> Result<MpesaCredentials> {
        let credentials = self
            .credentials
            .latest_credentials()
            .await?
            .ok_or(AppError::CredentialsMissing)?;

        info!(
            "🔑 M-Pesa credentials loaded: consumer key {}, short code {}",
            redact(&credentials.consumer_key),
            credentials.short_code
        );
        Ok(credentials)
    }

    /// Fresh token from the gateway. Nothing is cached between calls.
    pub async fn get_access_token(&self) -> Result<String> {
        let credentials = self.load_credentials().await?;
        self.access_token_for(&credentials).await
    }

    async fn access_token_for(&self, credentials: &MpesaCredentials) -> Result<String> {
        let encoded_auth = base64.encode(format!(
            "{}:{}",
            credentials.consumer_key, credentials.consumer_secret
        ));
        let (auth_url, _) = self.config.get_mpesa_urls();

        info!(
            "🔑 Requesting access token from {} environment",
            self.config.environment.as_str()
        );

        let response = self
            .client
            .get(&auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(self.config.auth_timeout)
            .send()
            .await
            .map_err(|e| {
                error!("❌ Access token request to {} failed (Authorization: Basic [REDACTED]): {}", auth_url, e);
                if e.is_timeout() {
                    AppError::gateway_auth("request timed out")
                } else {
                    AppError::gateway_auth(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Access token request rejected: {} - {}", status, body);
            return Err(AppError::gateway_auth(format!("M-Pesa auth failed: {}", status)));
        }

        let auth_response: AuthResponse = response.json().await.map_err(|e| {
            error!("❌ Invalid access token response: {}", e);
            AppError::gateway_auth("Invalid access token response from M-Pesa")
        })?;

        let token = auth_response
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                error!("❌ Access token response had no access_token");
                AppError::gateway_auth("Invalid access token response from M-Pesa")
            })?;

        info!(
            "✅ Access token obtained (expires in {}s)",
            auth_response.expires_in_secs().unwrap_or_else(|| "?".to_string())
        );
        Ok(token)
    }

    pub async fn initiate_stk_push(&self, phone: &str, item_id: i64) -> Result<StkPushOutcome> {
        info!("🔵 STK push initiated for package {}", item_id);

        let offer = self.offers.offer_by_id(item_id).await?.ok_or_else(|| {
            error!("❌ Package not found with ID: {}", item_id);
            AppError::ItemNotFound(item_id)
        })?;

        let credentials = self.load_credentials().await?;
        let access_token = self.access_token_for(&credentials).await?;
        let formatted_phone = normalize_phone(phone)?;

        let callback_url = self.credentials.callback_url();
        let stk_request = build_stk_request(
            &credentials,
            &offer,
            &formatted_phone,
            &callback_url,
            gateway_now(),
        )?;

        info!(
            "🔵 Sending STK push: amount {}, phone {}, short code {}, callback {}",
            stk_request.amount, formatted_phone, stk_request.business_short_code, callback_url
        );

        let (_, stk_url) = self.config.get_mpesa_urls();
        let response = self
            .client
            .post(&stk_url)
            .bearer_auth(&access_token)
            .header(header::CACHE_CONTROL, "no-cache")
            .json(&stk_request)
            .timeout(self.config.stk_timeout)
            .send()
            .await
            .map_err(|e| {
                error!("❌ STK push request to {} failed: {}", stk_url, e);
                AppError::from(e)
            })?;

        let gateway_response = read_stk_response(response).await?;
        info!(
            "✅ STK push accepted: {} / {}",
            gateway_response.merchant_request_id, gateway_response.checkout_request_id
        );

        if self.config.record_pending {
            self.record_pending(&gateway_response, &offer, &stk_request).await;
        }

        Ok(StkPushOutcome {
            gateway_response,
            package: PackageSummary::from(&offer),
        })
    }

    // The gateway has already accepted the request, so a ledger hiccup here
    // must not turn into an error for the caller.
    async fn record_pending(&self, ack: &StkPushResponse, offer: &Offer, request: &StkPushRequest) {
        let pending = PendingTransaction {
            key: ack.ledger_key(),
            amount: request.amount as f64,
            phone_number: request.phone_number.clone(),
            account_reference: offer.account_reference(),
        };

        match self.ledger.record_pending(&pending).await {
            Ok(true) => info!("📝 Pending ledger row recorded for {}", pending.key),
            Ok(false) => info!("Ledger row for {} already exists, leaving it", pending.key),
            Err(e) => warn!("Failed to record pending row for {}: {}", pending.key, e),
        }
    }
}

async fn read_stk_response(response: Response) -> Result<StkPushResponse> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        error!("❌ Failed to read STK push response: {}", e);
        AppError::from(e)
    })?;

    if !status.is_success() {
        error!("❌ STK push rejected: {} - {}", status, body);
        let message = serde_json::from_str::<GatewayErrorBody>(&body)
            .ok()
            .and_then(|b| b.error_message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| GENERIC_STK_ERROR.to_string());
        return Err(AppError::gateway_request(message));
    }

    let ack: StkPushResponse = serde_json::from_str(&body).map_err(|e| {
        error!("❌ Unreadable STK push acknowledgment: {} - {}", e, body);
        AppError::gateway_request(GENERIC_STK_ERROR)
    })?;

    if !ack.response_code.is_empty() && ack.response_code != "0" {
        error!("❌ STK push not accepted: {} - {}", ack.response_code, ack.response_description);
        let message = if ack.response_description.is_empty() {
            GENERIC_STK_ERROR.to_string()
        } else {
            ack.response_description.clone()
        };
        return Err(AppError::gateway_request(message));
    }

    if ack.merchant_request_id.is_empty() || ack.checkout_request_id.is_empty() {
        error!("❌ STK push acknowledgment without request identifiers: {}", body);
        return Err(AppError::gateway_request(
            "M-Pesa acknowledgment is missing request identifiers",
        ));
    }

    Ok(ack)
}
