//! Prometheus metrics for EchoPlay.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "echoplay_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "echoplay_http_request_duration_seconds";

/// Files written by the upload pipeline (counter). Labels: role, outcome.
pub const UPLOADED_FILES_TOTAL: &str = "echoplay_uploaded_files_total";

/// Bytes written by the upload pipeline (counter). Labels: role.
pub const UPLOADED_BYTES_TOTAL: &str = "echoplay_uploaded_bytes_total";

/// Account events (counter). Labels: event (register, login), outcome.
pub const AUTH_EVENTS_TOTAL: &str = "echoplay_auth_events_total";

/// Playlist membership changes (counter). Labels: operation (add, remove).
pub const PLAYLIST_CHANGES_TOTAL: &str = "echoplay_playlist_changes_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Returns the existing
/// handle if already installed.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADED_FILES_TOTAL, "Files written by the upload pipeline");
    describe_counter!(UPLOADED_BYTES_TOTAL, "Bytes written by the upload pipeline");
    describe_counter!(AUTH_EVENTS_TOTAL, "Registrations and logins by outcome");
    describe_counter!(PLAYLIST_CHANGES_TOTAL, "Playlist membership changes");
}

// -- Domain helpers -------------------------------------------------------------

pub fn record_auth_event(event: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(AUTH_EVENTS_TOTAL, "event" => event, "outcome" => outcome).increment(1);
}

pub fn record_uploaded_file(role: &'static str, bytes: usize, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(UPLOADED_FILES_TOTAL, "role" => role, "outcome" => outcome).increment(1);
    if success {
        counter!(UPLOADED_BYTES_TOTAL, "role" => role).increment(bytes as u64);
    }
}

pub fn record_playlist_change(operation: &'static str) {
    counter!(PLAYLIST_CHANGES_TOTAL, "operation" => operation).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// Ids in the path collapse to placeholders so labels stay low-cardinality.
///
/// Examples:
/// - `/api/tracks/my-tracks` -> `/api/tracks/my-tracks`
/// - `/api/tracks/6f1c...` -> `/api/tracks/{id}`
/// - `/api/playlists/6f1c.../tracks/9a2b...` -> `/api/playlists/{id}/tracks/{trackId}`
/// - `/uploads/music/a.mp3` -> `/{static}`
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        [""] => "/".to_string(),
        ["health"] | ["metrics"] | ["openapi.json"] => path.to_string(),
        ["api", "auth", "register" | "login"] => path.to_string(),
        ["api", "tracks"] | ["api", "tracks", "my-tracks"] => path.to_string(),
        ["api", "playlists"] | ["api", "playlists", "me"] => path.to_string(),
        ["api", "tracks", _] => "/api/tracks/{id}".to_string(),
        ["api", "playlists", _] => "/api/playlists/{id}".to_string(),
        ["api", "playlists", _, "tracks"] => "/api/playlists/{id}/tracks".to_string(),
        ["api", "playlists", _, "tracks", _] => {
            "/api/playlists/{id}/tracks/{trackId}".to_string()
        }
        ["api", ..] => "/api/{unknown}".to_string(),
        _ => "/{static}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
