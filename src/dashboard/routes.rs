//! Control API and live stream handlers.
//!
//! Control endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::scanner::ScannerHandle;
use crate::types::{ConfigError, ConfigUpdate, ScanSettings};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub scanner: ScannerHandle,
}

impl DashboardState {
    pub fn new(scanner: ScannerHandle) -> Self {
        Self { scanner }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub ok: bool,
    pub running: bool,
    pub symbols_count: usize,
    pub settings: ScanSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub ok: bool,
    pub symbols_count: usize,
    pub settings: ScanSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub ok: bool,
    pub running: bool,
}

/// Rejected request, rendered as `400 {"ok": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError(String);

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.0,
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(e.body_text())
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/state
pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let snapshot = state.scanner.snapshot();
    Json(StateResponse {
        ok: true,
        running: snapshot.running,
        symbols_count: snapshot.symbols_count,
        settings: snapshot.settings,
    })
}

/// POST /api/config
pub async fn post_config(
    State(state): State<AppState>,
    body: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let Json(update) = body?;
    let snapshot = state.scanner.apply_config(update)?;
    Ok(Json(ConfigResponse {
        ok: true,
        symbols_count: snapshot.symbols_count,
        settings: snapshot.settings,
    }))
}

/// POST /api/start
pub async fn start(State(state): State<AppState>) -> Json<RunResponse> {
    state.scanner.start();
    Json(RunResponse {
        ok: true,
        running: true,
    })
}

/// POST /api/stop
pub async fn stop(State(state): State<AppState>) -> Json<RunResponse> {
    state.scanner.stop();
    Json(RunResponse {
        ok: true,
        running: false,
    })
}

/// GET /api/stream
///
/// One JSON event per SSE frame, starting with `hello`. The subscription
/// lives inside the stream, so a disconnecting viewer unsubscribes when
/// axum drops the response body.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.scanner.subscribe();
    debug!(subscriber = %subscription.id(), "Stream opened");

    let events = stream::unfold(subscription, |mut sub| async move {
        let event = sub.recv().await?;
        let frame = Event::default().json_data(&*event).unwrap_or_else(|e| {
            warn!(kind = event.kind(), error = %e, "Failed to encode event");
            Event::default().comment("encode error")
        });
        Some((Ok(frame), sub))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
