//! Abstract metadata store trait.
//!
//! Any persistence backend must implement [`MetadataStore`].  The trait
//! uses manually desugared async methods (pinned, boxed futures) so it can
//! be used as a trait object behind `Arc<dyn MetadataStore>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("{entity} with this {field} already exists")]
    Conflict {
        entity: &'static str,
        field: &'static str,
    },

    /// The record to update does not exist.
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: Uuid },

    /// Anything else: I/O, SQL, serialization, poisoned locks.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ── Record types ───────────────────────────────────────────────────

/// A registered account.  Never serialized: it carries the password hash.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    /// Trimmed username, unique.
    pub username: String,
    /// Lowercased email, unique.
    pub email: String,
    /// PHC-formatted salted hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Length in seconds.
    pub duration: f64,
    /// Public reference to the audio file.
    pub file_path: String,
    /// Public reference to the cover image.
    pub cover_art_path: String,
    /// Owner of the track.
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-owned ordered collection of tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    pub id: Uuid,
    pub name: String,
    /// Owner of the playlist.  Immutable after creation.
    pub user: Uuid,
    /// Ordered, duplicate-free track ids.
    pub tracks: Vec<Uuid>,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
///
/// Listing methods return records newest first.
pub trait MetadataStore: Send + Sync + 'static {
    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new user.  Fails with [`StoreError::Conflict`] when the
    /// email or username is taken.
    fn create_user(&self, record: UserRecord) -> StoreFuture<'_, ()>;

    /// Get a user by id.
    fn get_user(&self, id: Uuid) -> StoreFuture<'_, Option<UserRecord>>;

    /// Get a user by (already normalized) email.
    fn get_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<UserRecord>>;

    /// Get a user by (already trimmed) username.
    fn get_user_by_username(&self, username: &str) -> StoreFuture<'_, Option<UserRecord>>;

    // ── Tracks ──────────────────────────────────────────────────────

    /// Insert a new track.
    fn create_track(&self, record: TrackRecord) -> StoreFuture<'_, ()>;

    /// Get a track by id.
    fn get_track(&self, id: Uuid) -> StoreFuture<'_, Option<TrackRecord>>;

    /// List every track.
    fn list_tracks(&self) -> StoreFuture<'_, Vec<TrackRecord>>;

    /// List tracks uploaded by `user_id`.
    fn list_tracks_by_uploader(&self, user_id: Uuid) -> StoreFuture<'_, Vec<TrackRecord>>;

    // ── Playlists ───────────────────────────────────────────────────

    /// Insert a new playlist.
    fn create_playlist(&self, record: PlaylistRecord) -> StoreFuture<'_, ()>;

    /// Get a playlist by id.
    fn get_playlist(&self, id: Uuid) -> StoreFuture<'_, Option<PlaylistRecord>>;

    /// List playlists owned by `user_id`.
    fn list_playlists_by_owner(&self, user_id: Uuid) -> StoreFuture<'_, Vec<PlaylistRecord>>;

    /// Replace the track list of a playlist (last write wins).
    fn update_playlist_tracks(
        &self,
        id: Uuid,
        tracks: Vec<Uuid>,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;
}
