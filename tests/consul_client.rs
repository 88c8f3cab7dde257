//! Consul client against a fake agent served by Axum.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use microapp::discovery::{ConsulClient, Discovery, DiscoveryError, ServiceRegistration};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Agent {
    registered: Arc<Mutex<Vec<serde_json::Value>>>,
    deregistered: Arc<Mutex<Vec<String>>>,
    tokens: Arc<Mutex<Vec<String>>>,
    kv: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Agent {
    fn record_token(&self, headers: &HeaderMap) {
        if let Some(token) = headers.get("x-consul-token").and_then(|v| v.to_str().ok()) {
            self.tokens.lock().unwrap().push(token.to_string());
        }
    }
}

async fn register(State(agent): State<Agent>, headers: HeaderMap, body: Bytes) -> StatusCode {
    agent.record_token(&headers);
    match serde_json::from_slice(&body) {
        Ok(value) => {
            agent.registered.lock().unwrap().push(value);
            StatusCode::OK
        }
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn deregister(State(agent): State<Agent>, Path(id): Path<String>) -> StatusCode {
    agent.deregistered.lock().unwrap().push(id);
    StatusCode::OK
}

async fn kv(
    State(agent): State<Agent>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
) -> axum::response::Response {
    if query.as_deref() != Some("raw") {
        return (StatusCode::BAD_REQUEST, "raw expected").into_response();
    }
    let key = key.trim_start_matches('/').to_string();
    if key == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "kv store unavailable").into_response();
    }
    match agent.kv.lock().unwrap().get(&key) {
        Some(value) => (StatusCode::OK, value.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_agent(agent: Agent) -> SocketAddr {
    let app = Router::new()
        .route("/v1/agent/service/register", put(register))
        .route("/v1/agent/service/deregister/{id}", put(deregister))
        .route("/v1/kv/{*key}", get(kv))
        .with_state(agent);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn registration() -> ServiceRegistration {
    ServiceRegistration::new(
        "microapp",
        "10.0.0.7",
        8080,
        Duration::from_secs(3),
        Duration::from_secs(3),
    )
}

#[tokio::test]
async fn register_sends_agent_payload() {
    let agent = Agent::default();
    let addr = start_agent(agent.clone()).await;
    let client = ConsulClient::new(&addr.to_string())
        .unwrap()
        .with_token(Some("secret".into()));

    client.register(&registration()).await.unwrap();

    let registered = agent.registered.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0]["ID"], "microapp_10.0.0.7:8080");
    assert_eq!(registered[0]["Check"]["HTTP"], "http://10.0.0.7:8080/healthz");
    assert_eq!(registered[0]["Check"]["Interval"], "3s");
    assert_eq!(agent.tokens.lock().unwrap().clone(), vec!["secret"]);
}

#[tokio::test]
async fn deregister_uses_instance_id() {
    let agent = Agent::default();
    let addr = start_agent(agent.clone()).await;
    let client = ConsulClient::new(&addr.to_string()).unwrap();

    client.deregister("microapp_10.0.0.7:8080").await.unwrap();

    assert_eq!(
        agent.deregistered.lock().unwrap().clone(),
        vec!["microapp_10.0.0.7:8080"]
    );
}

#[tokio::test]
async fn kv_get_returns_raw_value() {
    let agent = Agent::default();
    agent
        .kv
        .lock()
        .unwrap()
        .insert("config/microapp".into(), b"{\"a\":1}".to_vec());
    let addr = start_agent(agent.clone()).await;
    let client = ConsulClient::new(&format!("http://{}", addr)).unwrap();

    let value = client.kv_get("config/microapp").await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"{\"a\":1}"[..]));

    assert_eq!(client.kv_get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn agent_errors_surface() {
    let agent = Agent::default();
    let addr = start_agent(agent).await;
    let client = ConsulClient::new(&addr.to_string()).unwrap();

    match client.kv_get("broken").await {
        Err(DiscoveryError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "kv store unavailable");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_agent_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ConsulClient::new(&addr.to_string()).unwrap();
    let err = client.register(&registration()).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Transport(_)));
}
