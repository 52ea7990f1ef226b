//! Read-only HTTP dashboard over the telemetry store (C10).
//!
//! The voice pipeline runs on plain OS threads, so this server cannot
//! simply be `.await`ed by the caller the way the teacher's `LlmServer`
//! is. Instead it owns a dedicated background thread with its own
//! single-threaded tokio runtime, started and torn down synchronously —
//! the same `addr()`/`shutdown()`/`Drop`-aborts lifecycle as the
//! teacher's server, adapted to a blocking caller.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::telemetry::store::TelemetryStore;

#[derive(Clone)]
struct AppState {
    store: Arc<TelemetryStore>,
}

/// Background dashboard server. Dropping it aborts the listener thread.
pub struct TelemetryWeb {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TelemetryWeb {
    /// Bind `bind_addr` and start serving in a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server
    /// thread cannot be spawned.
    pub fn start(store: Arc<TelemetryStore>, bind_addr: &str) -> Result<Self> {
        let std_listener = StdTcpListener::bind(bind_addr)
            .map_err(|e| Error::Telemetry(format!("telemetry web bind failed: {e}")))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| Error::Telemetry(format!("telemetry web listener setup failed: {e}")))?;
        let addr = std_listener
            .local_addr()
            .map_err(|e| Error::Telemetry(format!("telemetry web addr lookup failed: {e}")))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("telemetry-web".into())
            .spawn(move || run_server(std_listener, store, shutdown_rx))
            .map_err(|e| Error::Telemetry(format!("failed to spawn telemetry web thread: {e}")))?;

        info!("telemetry dashboard listening on http://{addr}");
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Address the dashboard is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the server to stop and wait for its thread to exit.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("telemetry web thread panicked");
            }
        }
    }
}

impl Drop for TelemetryWeb {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(std_listener: StdTcpListener, store: Arc<TelemetryStore>, shutdown_rx: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("telemetry web runtime failed to start: {e}");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(std_listener) {
            Ok(l) => l,
            Err(e) => {
                error!("telemetry web listener conversion failed: {e}");
                return;
            }
        };

        let app = router(AppState { store });
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        if let Err(e) = server.await {
            error!("telemetry web server error: {e}");
        }
    });
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/stats", get(handle_stats))
        .route("/api/sessions", get(handle_list_sessions))
        .route("/api/sessions/{id}", get(handle_session_detail))
        .fallback(handle_not_found)
        .with_state(state)
}

async fn handle_index() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>hearthvox telemetry</title></head>\
         <body><h1>hearthvox telemetry</h1>\
         <p>See <a href=\"/api/stats\">/api/stats</a> and \
         <a href=\"/api/sessions\">/api/sessions</a>.</p></body></html>",
    )
}

async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("telemetry stats query failed: {e}");
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListSessionsQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    50
}

async fn handle_list_sessions(State(state): State<AppState>, Query(query): Query<ListSessionsQuery>) -> impl IntoResponse {
    match state.store.list_sessions(query.limit, query.offset) {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => {
            error!("telemetry session list query failed: {e}");
            internal_error()
        }
    }
}

async fn handle_session_detail(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.session_detail(&id) {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "session not found"}))).into_response(),
        Err(e) => {
            error!("telemetry session detail query failed: {e}");
            internal_error()
        }
    }
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

fn internal_error() -> axum::response::Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"}))).into_response()
}
