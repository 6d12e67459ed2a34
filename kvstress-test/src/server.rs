//! An in-process key-value server for use in integration tests.
//!
//! ```no_run
//! use kvstress_test::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = TestServer::new().await;
//!     let url = server.url("/get/key1");
//!     // drive the harness against it...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::json;

/// An in-process server implementing the key-value HTTP contract over an
/// in-memory map.
///
/// The server listens on a random localhost port; the serving task is
/// aborted when the server is dropped. Faults (a 503 for each of the next N
/// requests) and a fixed response delay can be injected to exercise retry
/// and timeout paths.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: AppState,
}

impl TestServer {
    /// Starts a server on a random available port.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = AppState::default();
        let app = router(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The server's base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Total requests served so far, including injected failures.
    pub fn requests_served(&self) -> u64 {
        self.state.inner.requests.load(Ordering::Relaxed)
    }

    /// Makes each of the next `n` requests fail with a 503.
    pub fn fail_next(&self, n: u32) {
        self.state.inner.faults.store(n, Ordering::Relaxed);
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.inner.delay.lock().unwrap() = delay;
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.state.inner.store.lock().unwrap().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a stored value.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.state.inner.store.lock().unwrap().get(key).cloned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Default)]
struct AppState {
    inner: Arc<AppInner>,
}

#[derive(Debug, Default)]
struct AppInner {
    store: Mutex<HashMap<String, String>>,
    requests: AtomicU64,
    faults: AtomicU32,
    delay: Mutex<Duration>,
}

impl AppState {
    // Counts the request, applies the configured delay, and reports whether
    // an injected fault consumes it.
    async fn begin(&self) -> bool {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);

        let delay = *self.inner.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.inner
            .faults
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/set", routing::post(set))
        .route("/get/{key}", routing::get(get))
        .route("/delete/{key}", routing::delete(delete))
        .route("/compact", routing::post(compact))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SetRequest {
    key: String,
    value: String,
}

async fn set(State(state): State<AppState>, Json(request): Json<SetRequest>) -> Response {
    if state.begin().await {
        return unavailable();
    }

    let mut store = state.inner.store.lock().unwrap();
    store.insert(request.key, request.value);
    Json(json!({ "status": "ok" })).into_response()
}

async fn get(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if state.begin().await {
        return unavailable();
    }

    let store = state.inner.store.lock().unwrap();
    match store.get(&key) {
        Some(value) => Json(json!({ "key": key, "value": value })).into_response(),
        None => not_found(),
    }
}

async fn delete(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if state.begin().await {
        return unavailable();
    }

    let mut store = state.inner.store.lock().unwrap();
    match store.remove(&key) {
        Some(_) => Json(json!({ "status": "deleted" })).into_response(),
        None => not_found(),
    }
}

async fn compact(State(state): State<AppState>) -> Response {
    if state.begin().await {
        return unavailable();
    }

    Json(json!({ "status": "compacted" })).into_response()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "unavailable" })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "key not found" })),
    )
        .into_response()
}
