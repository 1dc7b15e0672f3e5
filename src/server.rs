//! Axum router construction.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Routes that need a caller identity
//! carry the [`require_identity`] gate as a route layer on just the methods
//! that need it; reads stay public.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::{require_identity, TOKEN_HEADER};
use crate::errors::generate_request_id;
use crate::handlers::{auth, playlist, track};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the EchoPlay API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "EchoPlay API",
        version = "0.1.0",
        description = "Accounts, track uploads and playlists"
    ),
    paths(
        health_check,
        auth::register,
        auth::login,
        track::upload_track,
        track::list_tracks,
        track::my_tracks,
        track::get_track,
        playlist::create_playlist,
        playlist::my_playlists,
        playlist::get_playlist,
        playlist::add_track,
        playlist::remove_track,
    ),
    components(schemas(
        crate::errors::ErrorBody,
        crate::metadata::store::TrackRecord,
        crate::metadata::store::PlaylistRecord,
        crate::library::playlists::PlaylistDetail,
        crate::library::playlists::OwnerSummary,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::TokenResponse,
        track::TrackUploadForm,
        playlist::CreatePlaylistRequest,
        playlist::AddTrackRequest,
    )),
    modifiers(&TokenSecurity),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Auth", description = "Registration and login"),
        (name = "Tracks", description = "Track upload and lookup"),
        (name = "Playlists", description = "Playlists and their tracks"),
    )
)]
pub struct ApiDoc;

/// Declares the `x-auth-token` header scheme referenced as `token`.
struct TokenSecurity;

impl Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(TOKEN_HEADER))),
        );
    }
}

/// Build the axum [`Router`] with every EchoPlay route.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let config = &state.config;
    let gate = middleware::from_fn_with_state(state.clone(), require_identity);

    let mut router = Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        // Accounts
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        // Tracks
        .route(
            "/api/tracks",
            get(track::list_tracks).merge(post(track::upload_track).route_layer(gate.clone())),
        )
        .route(
            "/api/tracks/my-tracks",
            get(track::my_tracks).route_layer(gate.clone()),
        )
        .route("/api/tracks/:id", get(track::get_track))
        // Playlists
        .route(
            "/api/playlists",
            post(playlist::create_playlist).route_layer(gate.clone()),
        )
        .route(
            "/api/playlists/me",
            get(playlist::my_playlists).route_layer(gate.clone()),
        )
        .route("/api/playlists/:id", get(playlist::get_playlist))
        .route(
            "/api/playlists/:id/tracks",
            post(playlist::add_track).route_layer(gate.clone()),
        )
        .route(
            "/api/playlists/:id/tracks/:trackId",
            delete(playlist::remove_track).route_layer(gate),
        );

    if config.observability.health_check {
        router = router.route("/health", get(health_check));
    }

    // Local uploads are served straight from disk under the public prefix.
    if config.storage.backend == "local" {
        let local = &config.storage.local;
        router = router.nest_service(&local.public_prefix, ServeDir::new(&local.root_dir));
    }

    let mut router = router
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_size))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %generate_request_id(),
                    user_id = tracing::field::Empty,
                )
            }),
        );

    // metrics_middleware is outermost so it captures the full request lifecycle.
    if state.config.observability.metrics {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }
    router
}

/// `GET /` -- plain-text greeting.
async fn index() -> &'static str {
    "Hello from the EchoPlay-V2 Backend!"
}

/// `GET /openapi.json`
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}
