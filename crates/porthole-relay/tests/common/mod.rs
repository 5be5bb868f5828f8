//! In-process fake relay for integration tests
//!
//! Serves the relay wire protocol over plain HTTP. Tunnel endpoints echo:
//! every chunk PUT inbound is queued and handed back to the next GET.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const TOKEN: &str = "test-token";

#[derive(Default)]
pub struct FakeRelay {
    pub version: String,
    pub services: HashMap<String, serde_json::Value>,
    /// Number of /services requests to fail with a 500 before succeeding.
    pub service_failures: AtomicU32,
    pub service_requests: AtomicU32,
    next_tunnel_id: AtomicU64,
    tunnels: Mutex<HashMap<u64, Arc<EchoTunnel>>>,
}

#[derive(Default)]
struct EchoTunnel {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    closed: Mutex<bool>,
    notify: Notify,
}

impl FakeRelay {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, name: &str, info: serde_json::Value) -> Self {
        self.services.insert(name.to_string(), info);
        self
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("Auth-Token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN)
        .unwrap_or(false)
}

async fn info(
    State(state): State<Arc<FakeRelay>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::Value::Null));
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({ "version": state.version })),
    )
}

async fn service_info(
    State(state): State<Arc<FakeRelay>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::Value::Null));
    }

    state.service_requests.fetch_add(1, Ordering::SeqCst);

    let failures = state.service_failures.load(Ordering::SeqCst);
    if failures > 0 {
        state.service_failures.fetch_sub(1, Ordering::SeqCst);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::Value::Null),
        );
    }

    match state.services.get(&name) {
        Some(info) => (StatusCode::OK, Json(info.clone())),
        None => (StatusCode::NOT_FOUND, Json(serde_json::Value::Null)),
    }
}

async fn create_tunnel(
    State(state): State<Arc<FakeRelay>>,
    headers: HeaderMap,
    Json(_request): Json<serde_json::Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::Value::Null));
    }

    let id = state.next_tunnel_id.fetch_add(1, Ordering::SeqCst);
    state
        .tunnels
        .lock()
        .unwrap()
        .insert(id, Arc::new(EchoTunnel::default()));

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "path": format!("/tunnels/{}", id),
            "path_in": format!("/tunnels/{}/in", id),
            "path_out": format!("/tunnels/{}/out", id),
        })),
    )
}

fn tunnel(state: &FakeRelay, id: u64) -> Option<Arc<EchoTunnel>> {
    state.tunnels.lock().unwrap().get(&id).cloned()
}

async fn put_chunk(
    State(state): State<Arc<FakeRelay>>,
    Path((id, _seq)): Path<(u64, u64)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }

    match tunnel(&state, id) {
        Some(t) => {
            t.chunks.lock().unwrap().push_back(body.to_vec());
            t.notify.notify_one();
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn get_chunk(
    State(state): State<Arc<FakeRelay>>,
    Path((id, _seq)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Vec::new());
    }

    let Some(t) = tunnel(&state, id) else {
        return (StatusCode::NOT_FOUND, Vec::new());
    };

    loop {
        {
            if let Some(chunk) = t.chunks.lock().unwrap().pop_front() {
                return (StatusCode::OK, chunk);
            }
            if *t.closed.lock().unwrap() {
                return (StatusCode::NOT_FOUND, Vec::new());
            }
        }
        t.notify.notified().await;
    }
}

async fn delete_tunnel(
    State(state): State<Arc<FakeRelay>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }

    match tunnel(&state, id) {
        Some(t) => {
            *t.closed.lock().unwrap() = true;
            t.notify.notify_one();
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Start the fake relay on an ephemeral port; returns `host:port`.
pub async fn spawn(state: Arc<FakeRelay>) -> String {
    let app = Router::new()
        .route("/info", get(info))
        .route("/services/{name}", get(service_info))
        .route("/tunnels", post(create_tunnel))
        .route("/tunnels/{id}/in/{seq}", put(put_chunk))
        .route("/tunnels/{id}/out/{seq}", get(get_chunk))
        .route("/tunnels/{id}", delete(delete_tunnel))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("127.0.0.1:{}", addr.port())
}
