//! EchoPlay library: the backend of a music-sharing service.
//!
//! Accounts register and log in with a password and receive a signed
//! identity token.  Authenticated callers upload tracks (an audio file plus
//! cover art, stored on local disk or in an S3 bucket) and curate
//! playlists that only they may change.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod library;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod upload;

use crate::auth::TokenService;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::library::playlists::PlaylistService;
use crate::library::tracks::TrackService;
use crate::metadata::store::MetadataStore;
use crate::storage::backend::StorageBackend;
use crate::upload::UploadPipeline;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Record store for users, tracks, and playlists.
    pub metadata: Arc<dyn MetadataStore>,
    /// Where uploaded files live.
    pub storage: Arc<dyn StorageBackend>,
    pub tokens: TokenService,
    pub credentials: CredentialStore,
    pub uploads: Arc<UploadPipeline>,
    pub tracks: TrackService,
    pub playlists: PlaylistService,
}

impl AppState {
    /// Wire every service from the loaded configuration and the chosen
    /// backends.
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_seconds);
        let uploads = Arc::new(UploadPipeline::new(storage.clone()));
        Self {
            tokens,
            credentials: CredentialStore::new(metadata.clone()),
            tracks: TrackService::new(metadata.clone(), uploads.clone()),
            playlists: PlaylistService::new(metadata.clone()),
            uploads,
            config,
            metadata,
            storage,
        }
    }
}
