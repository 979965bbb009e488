#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

use bundle_pay_api::config::AppConfig;
use bundle_pay_api::database::credentials::CredentialStore;
use bundle_pay_api::database::memory::{
    InMemoryCredentialStore, InMemoryLedger, InMemoryOfferCatalog,
};
use bundle_pay_api::middleware::auth::Claims;
use bundle_pay_api::models::credentials::NewMpesaCredentials;
use bundle_pay_api::models::offer::Offer;
use bundle_pay_api::routes::build_router;
use bundle_pay_api::state::AppState;

pub const JWT_SECRET: &str = "integration-secret";
pub const CALLBACK_URL: &str = "https://bundles.test/api/mpesa/callback";

/// How the fake gateway answers.
#[derive(Clone, Debug)]
pub enum GatewayMode {
    Accept,
    RejectAuth,
    SlowAuth(Duration),
    NumericExpiry,
    SlowStk(Duration),
    StkError(StatusCode, Value),
}

#[derive(Clone)]
struct GatewayState {
    mode: GatewayMode,
    stk_requests: Arc<Mutex<Vec<Value>>>,
}

pub struct FakeGateway {
    pub base_url: String,
    pub stk_requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeGateway {
    pub async fn start(mode: GatewayMode) -> Self {
        let stk_requests = Arc::new(Mutex::new(Vec::new()));
        let state = GatewayState {
            mode,
            stk_requests: stk_requests.clone(),
        };

        let app = Router::new()
            .route("/oauth/v1/generate", get(fake_token))
            .route("/mpesa/stkpush/v1/processrequest", post(fake_stk_push))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeGateway {
            base_url: format!("http://{}", addr),
            stk_requests,
        }
    }

    pub async fn stk_requests(&self) -> Vec<Value> {
        self.stk_requests.lock().await.clone()
    }
}

async fn fake_token(State(state): State<GatewayState>) -> Response {
    match state.mode {
        GatewayMode::RejectAuth => {
            (StatusCode::BAD_REQUEST, "invalid client credentials").into_response()
        }
        GatewayMode::SlowAuth(delay) => {
            tokio::time::sleep(delay).await;
            Json(json!({ "access_token": "late", "expires_in": "3599" })).into_response()
        }
        GatewayMode::NumericExpiry => {
            Json(json!({ "access_token": "test-token", "expires_in": 3599 })).into_response()
        }
        _ => Json(json!({ "access_token": "test-token", "expires_in": "3599" })).into_response(),
    }
}

async fn fake_stk_push(
    State(state): State<GatewayState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        == Some("Bearer test-token");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "errorMessage": "Invalid Access Token" })))
            .into_response();
    }

    state.stk_requests.lock().await.push(body);

    if let GatewayMode::SlowStk(delay) = state.mode {
        tokio::time::sleep(delay).await;
    }

    match state.mode {
        GatewayMode::StkError(status, body) => (status, Json(body)).into_response(),
        _ => Json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }))
        .into_response(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<InMemoryLedger>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub offers: Arc<InMemoryOfferCatalog>,
    pub gateway: FakeGateway,
}

pub fn test_config(base_url: &str, extra: &[(&str, &str)]) -> AppConfig {
    let mut pairs: Vec<(String, String)> = vec![
        ("JWT_SECRET".into(), JWT_SECRET.into()),
        ("DATABASE_URL".into(), "postgres://unused/bundles".into()),
        ("MPESA_BASE_URL".into(), base_url.into()),
        ("MPESA_CALLBACK_URL".into(), CALLBACK_URL.into()),
    ];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    AppConfig::from_lookup(move |key| {
        pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub async fn spawn_app(mode: GatewayMode) -> TestApp {
    spawn_app_with(mode, &[]).await
}

/// App wired to in-memory stores, one seeded package (id 1, price 100) and
/// one credential bundle.
pub async fn spawn_app_with(mode: GatewayMode, extra_env: &[(&str, &str)]) -> TestApp {
    build_app(mode, extra_env, true).await
}

pub async fn spawn_app_without_credentials() -> TestApp {
    build_app(GatewayMode::Accept, &[], false).await
}

async fn build_app(mode: GatewayMode, extra_env: &[(&str, &str)], seed_credentials: bool) -> TestApp {
    let gateway = FakeGateway::start(mode).await;
    let config = test_config(&gateway.base_url, extra_env);

    let ledger = Arc::new(InMemoryLedger::new());
    let credentials = Arc::new(InMemoryCredentialStore::new(CALLBACK_URL));
    let offers = Arc::new(InMemoryOfferCatalog::new());

    offers
        .insert(Offer {
            id: 1,
            name: "1GB 24hrs".into(),
            price: 100.0,
        })
        .await;
    if seed_credentials {
        credentials
            .add_credentials(&NewMpesaCredentials {
                consumer_key: "consumer-key".into(),
                consumer_secret: "consumer-secret".into(),
                short_code: "174379".into(),
                pass_key: "passkey".into(),
            })
            .await
            .unwrap();
    }

    let state = AppState::new(config, credentials.clone(), offers.clone(), ledger.clone()).unwrap();

    TestApp {
        router: build_router(state),
        ledger,
        credentials,
        offers,
        gateway,
    }
}

pub fn access_token() -> String {
    token_of_type("access")
}

pub fn token_of_type(token_type: &str) -> String {
    let claims = Claims {
        sub: "admin".into(),
        token_type: Some(token_type.into()),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn post_bytes(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}
