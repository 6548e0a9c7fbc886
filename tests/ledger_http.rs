//! HTTP ledger client against a fake ledger served by axum.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use sweep_recon::catalog;
use sweep_recon::config::{LedgerConfig, TimeoutConfig};
use sweep_recon::error::EngineError;
use sweep_recon::ledger::{HttpLedgerClient, LedgerService};

const TOKEN: &str = "s3cret";
const OFFLINE_PROVIDER: i64 = 9;

#[derive(Clone, Default)]
struct FakeLedger {
    transfers: Arc<Mutex<Vec<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

async fn catalog_handler(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "data": [
            { "id": 0, "name": "Main Wallet", "credit": "1,000.00" },
            {
                "id": 100,
                "label": "Slots",
                "sub_entries": [
                    { "id": 3, "name": "gamma", "credit": 1.5, "has_failed_transfer": true },
                    { "id": 1, "label": "alpha", "credit": "0" }
                ]
            },
            { "id": 2, "name": "beta", "credit": null }
        ]
    }))
    .into_response()
}

async fn transfer_handler(
    State(state): State<FakeLedger>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let target = body["target_id"].as_i64().unwrap_or_default();
    state.transfers.lock().unwrap().push(body);

    if target == OFFLINE_PROVIDER {
        return (StatusCode::INTERNAL_SERVER_ERROR, "provider offline").into_response();
    }
    if target == 404 {
        return Json(json!({ "status_code": 404, "message": "no such provider" })).into_response();
    }
    Json(json!({ "status_code": 200, "message": "ok" })).into_response()
}

async fn balance_handler(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({ "balance": "998.00" })).into_response()
}

async fn user_handler(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "user_id": 42 })).into_response()
}

async fn spawn_fake_ledger() -> (String, FakeLedger) {
    let state = FakeLedger::default();
    let app = Router::new()
        .route("/api/transfers", get(catalog_handler).post(transfer_handler))
        .route("/api/balance", get(balance_handler))
        .route("/api/user", get(user_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api/", addr), state)
}

/// Ledger that answers 200 with bodies that do not match the wire format
async fn spawn_garbled_ledger() -> String {
    let app = Router::new()
        .route(
            "/api/transfers",
            get(|| async { "<html>maintenance</html>" })
                .post(|| async { Json(json!({ "message": "ok" })) }),
        )
        .route("/api/balance", get(|| async { Json(json!({ "nope": true })) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/", addr)
}

fn assert_unparseable(err: EngineError) {
    match err {
        EngineError::Service { status, message } => {
            assert_eq!(status, None);
            assert!(message.starts_with("unparseable response"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn client(base_url: &str, token: Option<&str>) -> HttpLedgerClient {
    HttpLedgerClient::new(&LedgerConfig {
        base_url: base_url.to_string(),
        token: token.map(String::from),
        timeouts: TimeoutConfig::default(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_catalog_is_flattened_and_sorted() {
    let (url, _) = spawn_fake_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    let providers = catalog::fetch_providers(&ledger).await.unwrap();
    let ids: Vec<_> = providers.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    assert_eq!(providers[0].credit, Decimal::from(1000));
    assert_eq!(providers[1].name, "alpha");
    assert_eq!(providers[2].credit, Decimal::ZERO);
    assert_eq!(providers[3].credit, Decimal::new(15, 1));
    assert!(providers[3].has_failed_transfer);

    assert_eq!(catalog::sub_accounts(&providers).len(), 3);
}

#[tokio::test]
async fn test_transfer_sends_amount_as_string() {
    let (url, state) = spawn_fake_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    let reply = ledger.transfer(0, 1, Decimal::new(200, 2)).await.unwrap();
    assert!(reply.is_success());

    let sent = state.transfers.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["source_id"], 0);
    assert_eq!(sent[0]["target_id"], 1);
    assert_eq!(sent[0]["amount"], "2.00");
}

#[tokio::test]
async fn test_rejected_reply_is_not_an_error() {
    let (url, _) = spawn_fake_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    let reply = ledger.transfer(0, 404, Decimal::ONE).await.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.status_code, 404);
}

#[tokio::test]
async fn test_http_500_is_service_error_with_body() {
    let (url, _) = spawn_fake_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    let err = ledger.transfer(0, OFFLINE_PROVIDER, Decimal::ONE).await.unwrap_err();
    match err {
        EngineError::Service { status, message } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "provider offline");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_token_is_auth_error() {
    let (url, _) = spawn_fake_ledger().await;
    let ledger = client(&url, None);

    assert!(matches!(ledger.fetch_catalog().await, Err(EngineError::Auth(_))));
    assert!(matches!(ledger.main_balance().await, Err(EngineError::Auth(_))));
    let err = ledger.current_user().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.http_status(), Some(401));
}

#[tokio::test]
async fn test_balance_and_user() {
    let (url, _) = spawn_fake_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    assert_eq!(ledger.main_balance().await.unwrap(), Decimal::from(998));
    assert_eq!(ledger.current_user().await.unwrap(), 42);
    let wallet = catalog::main_wallet(&ledger).await.unwrap();
    assert_eq!(wallet.credit, Decimal::from(998));
}

#[tokio::test]
async fn test_garbled_body_is_unparseable_service_error() {
    let url = spawn_garbled_ledger().await;
    let ledger = client(&url, Some(TOKEN));

    assert_unparseable(ledger.fetch_catalog().await.unwrap_err());
    assert_unparseable(ledger.main_balance().await.unwrap_err());

    let err = ledger.transfer(0, 1, Decimal::ONE).await.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(err.code(), "SERVICE_ERROR");
    assert_unparseable(err);
}
