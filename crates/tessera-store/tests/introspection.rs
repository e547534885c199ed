//! Introspection against an in-process fake authorization server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessera_core::{
    attrs, Clock, ManualClock, RequestContext, TesseraError, TokenId, TokenStore,
};
use tessera_store::IntrospectionTokenStore;

const CLIENT_ID: &str = "my client";
const CLIENT_SECRET: &str = "s3cr3t:!";

#[derive(Clone)]
struct AuthServer {
    /// Token value to introspection response
    tokens: Arc<HashMap<String, Value>>,
    calls: Arc<AtomicUsize>,
    revoked: Arc<Mutex<Vec<String>>>,
}

fn expected_authorization() -> String {
    format!("Basic {}", STANDARD.encode("my+client:s3cr3t%3A%21"))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected_authorization())
}

async fn introspect(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    server.calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"})));
    }
    assert_eq!(form.get("token_type_hint").map(String::as_str), Some("access_token"));
    let token = form.get("token").cloned().unwrap_or_default();
    if token == "slow" {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    let body = server
        .tokens
        .get(&token)
        .cloned()
        .unwrap_or_else(|| json!({"active": false}));
    (StatusCode::OK, Json(body))
}

async fn revoke(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let token = form.get("token").cloned().unwrap_or_default();
    server.revoked.lock().unwrap().push(token);
    StatusCode::OK
}

async fn start(tokens: HashMap<String, Value>) -> (SocketAddr, AuthServer) {
    let server = AuthServer {
        tokens: Arc::new(tokens),
        calls: Arc::new(AtomicUsize::new(0)),
        revoked: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/introspect", post(introspect))
        .route("/revoke", post(revoke))
        .with_state(server.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn store(addr: SocketAddr, secret: &str, clock: Arc<ManualClock>) -> IntrospectionTokenStore {
    IntrospectionTokenStore::new(
        &format!("http://{addr}/introspect"),
        CLIENT_ID,
        secret,
        Duration::from_millis(500),
        clock,
    )
    .unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new("GET", "/spaces")
}

fn fixtures(clock: &ManualClock) -> HashMap<String, Value> {
    let exp = (clock.now() + ChronoDuration::minutes(5)).timestamp();
    let past = (clock.now() - ChronoDuration::minutes(5)).timestamp();
    HashMap::from([
        (
            "good".to_string(),
            json!({"active": true, "sub": "alice", "exp": exp,
                   "scope": "read write", "client_id": "web"}),
        ),
        (
            "expired".to_string(),
            json!({"active": true, "sub": "alice", "exp": past, "scope": "read"}),
        ),
        (
            "no-scope".to_string(),
            json!({"active": true, "sub": "alice", "exp": exp}),
        ),
        (
            "inactive".to_string(),
            json!({"active": false, "sub": "alice", "exp": exp, "scope": "read"}),
        ),
    ])
}

#[tokio::test]
async fn active_token_maps_to_token() {
    let clock = ManualClock::starting_now();
    let (addr, server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock);

    let token = store.read(&ctx(), &TokenId::new("good")).await.unwrap().unwrap();
    assert_eq!(token.subject(), Some("alice"));
    assert_eq!(token.attribute(attrs::SCOPE), Some("read write"));
    assert_eq!(token.attribute(attrs::CLIENT_ID), Some("web"));
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn inactive_expired_and_incomplete_are_none() {
    let clock = ManualClock::starting_now();
    let (addr, _server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock);

    for id in ["inactive", "expired", "no-scope", "unknown"] {
        let read = store.read(&ctx(), &TokenId::new(id)).await.unwrap();
        assert!(read.is_none(), "{id}");
    }
}

#[tokio::test]
async fn rejected_client_credentials_read_as_none() {
    let clock = ManualClock::starting_now();
    let (addr, server) = start(fixtures(&clock)).await;
    let store = store(addr, "wrong", clock);

    assert!(store.read(&ctx(), &TokenId::new("good")).await.unwrap().is_none());
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_ids_never_reach_the_server() {
    let clock = ManualClock::starting_now();
    let (addr, server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock);

    for id in [String::new(), "line\nbreak".to_string(), "a".repeat(1025)] {
        assert!(store.read(&ctx(), &TokenId::new(id)).await.unwrap().is_none());
    }
    assert_eq!(server.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn timeout_is_a_network_error() {
    let clock = ManualClock::starting_now();
    let (addr, _server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock);

    let err = store.read(&ctx(), &TokenId::new("slow")).await.unwrap_err();
    assert!(matches!(err, TesseraError::Network { .. }), "{err}");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = store(addr, CLIENT_SECRET, ManualClock::starting_now());
    let err = store.read(&ctx(), &TokenId::new("good")).await.unwrap_err();
    assert!(matches!(err, TesseraError::Network { .. }), "{err}");
}

#[tokio::test]
async fn create_and_revoke_are_unsupported() {
    let clock = ManualClock::starting_now();
    let (addr, _server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock.clone());

    let token = tessera_core::Token::new(clock.now(), "alice");
    assert!(store.create(&ctx(), token).await.unwrap_err().is_unsupported());
    assert!(store
        .revoke(&ctx(), &TokenId::new("good"))
        .await
        .unwrap_err()
        .is_unsupported());
    assert!(store
        .revoke_remote(&TokenId::new("good"))
        .await
        .unwrap_err()
        .is_unsupported());
}

#[tokio::test]
async fn revoke_remote_posts_to_revocation_endpoint() {
    let clock = ManualClock::starting_now();
    let (addr, server) = start(fixtures(&clock)).await;
    let store = store(addr, CLIENT_SECRET, clock)
        .with_revocation_endpoint(&format!("http://{addr}/revoke"))
        .unwrap();

    store.revoke_remote(&TokenId::new("good")).await.unwrap();
    assert_eq!(*server.revoked.lock().unwrap(), vec!["good".to_string()]);

    let err = store
        .revoke_remote(&TokenId::new("tab\there"))
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::Invalid { .. }));
}
