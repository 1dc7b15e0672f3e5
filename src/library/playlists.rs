//! Playlists and their membership rules.
//!
//! Only the owner may change a playlist's tracks.  The track list is
//! ordered and holds each id at most once.  Concurrent changes to the same
//! playlist are last-write-wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::errors::ApiError;
use crate::metadata::store::{MetadataStore, PlaylistRecord, TrackRecord};
use crate::metrics;

/// Owner summary embedded in a detailed playlist.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub username: String,
}

/// A playlist with its owner and tracks resolved.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDetail {
    pub id: Uuid,
    pub name: String,
    /// `null` when the owner account no longer exists.
    pub user: Option<OwnerSummary>,
    /// Full track records in playlist order; ids of deleted tracks are skipped.
    pub tracks: Vec<TrackRecord>,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PlaylistService {
    metadata: Arc<dyn MetadataStore>,
}

impl PlaylistService {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn create(&self, identity: Identity, name: &str) -> Result<PlaylistRecord, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("name is required"));
        }
        let now = Utc::now();
        let record = PlaylistRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            user: identity.id,
            tracks: Vec::new(),
            cover_image: None,
            created_at: now,
            updated_at: now,
        };
        self.metadata.create_playlist(record.clone()).await?;
        tracing::info!(playlist_id = %record.id, user_id = %identity.id, "Playlist created");
        Ok(record)
    }

    /// The caller's playlists, newest first.
    pub async fn list_for_owner(&self, identity: Identity) -> Result<Vec<PlaylistRecord>, ApiError> {
        Ok(self.metadata.list_playlists_by_owner(identity.id).await?)
    }

    pub async fn get_detailed(&self, id: Uuid) -> Result<PlaylistDetail, ApiError> {
        let playlist = self.load(id).await?;

        let user = self
            .metadata
            .get_user(playlist.user)
            .await?
            .map(|u| OwnerSummary {
                id: u.id,
                username: u.username,
            });

        let mut tracks = Vec::with_capacity(playlist.tracks.len());
        for track_id in &playlist.tracks {
            if let Some(track) = self.metadata.get_track(*track_id).await? {
                tracks.push(track);
            }
        }

        Ok(PlaylistDetail {
            id: playlist.id,
            name: playlist.name,
            user,
            tracks,
            cover_image: playlist.cover_image,
            created_at: playlist.created_at,
            updated_at: playlist.updated_at,
        })
    }

    /// Append `track_id` and return the updated list.
    pub async fn add_track(
        &self,
        identity: Identity,
        playlist_id: Uuid,
        track_id: Uuid,
    ) -> Result<Vec<Uuid>, ApiError> {
        let mut playlist = self.load(playlist_id).await?;
        ensure_owner(&playlist, identity)?;

        if self.metadata.get_track(track_id).await?.is_none() {
            return Err(ApiError::NotFound { resource: "Track" });
        }
        if playlist.tracks.contains(&track_id) {
            return Err(ApiError::AlreadyMember);
        }

        playlist.tracks.push(track_id);
        self.metadata
            .update_playlist_tracks(playlist_id, playlist.tracks.clone(), Utc::now())
            .await?;
        metrics::record_playlist_change("add");
        Ok(playlist.tracks)
    }

    /// Remove `track_id` and return the updated list.
    pub async fn remove_track(
        &self,
        identity: Identity,
        playlist_id: Uuid,
        track_id: Uuid,
    ) -> Result<Vec<Uuid>, ApiError> {
        let mut playlist = self.load(playlist_id).await?;
        ensure_owner(&playlist, identity)?;

        let position = playlist
            .tracks
            .iter()
            .position(|id| *id == track_id)
            .ok_or(ApiError::NotInPlaylist)?;
        playlist.tracks.remove(position);

        self.metadata
            .update_playlist_tracks(playlist_id, playlist.tracks.clone(), Utc::now())
            .await?;
        metrics::record_playlist_change("remove");
        Ok(playlist.tracks)
    }

    async fn load(&self, id: Uuid) -> Result<PlaylistRecord, ApiError> {
        self.metadata
            .get_playlist(id)
            .await?
            .ok_or(ApiError::NotFound {
                resource: "Playlist",
            })
    }
}

fn ensure_owner(playlist: &PlaylistRecord, identity: Identity) -> Result<(), ApiError> {
    if playlist.user != identity.id {
        return Err(ApiError::NotAuthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::UserRecord;

    struct Fixture {
        metadata: Arc<MemoryMetadataStore>,
        playlists: PlaylistService,
        owner: Identity,
    }

    async fn fixture() -> Fixture {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let now = Utc::now();
        let owner = UserRecord {
            id: Uuid::new_v4(),
            username: "owner".to_string(),
            email: "owner@example.com".to_string(),
            password_hash: "x".to_string(),
            created_at: now,
            updated_at: now,
        };
        let identity = Identity { id: owner.id };
        metadata.create_user(owner).await.unwrap();
        Fixture {
            playlists: PlaylistService::new(metadata.clone()),
            metadata,
            owner: identity,
        }
    }

    async fn add_track_record(metadata: &MemoryMetadataStore, title: &str) -> Uuid {
        let now = Utc::now();
        let track = TrackRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artist: "artist".to_string(),
            album: None,
            duration: 60.0,
            file_path: "/uploads/music/x.mp3".to_string(),
            cover_art_path: "/uploads/images/x.png".to_string(),
            uploaded_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        let id = track.id;
        metadata.create_track(track).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_create_trims_and_rejects_blank() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "  Focus  ").await.unwrap();
        assert_eq!(playlist.name, "Focus");
        assert_eq!(playlist.user, fx.owner.id);
        assert!(playlist.tracks.is_empty());
        assert!(playlist.cover_image.is_none());

        assert!(matches!(
            fx.playlists.create(fx.owner, "   ").await,
            Err(ApiError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_duplicate_leaves_list_unchanged() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "Mix").await.unwrap();
        let track = add_track_record(&fx.metadata, "one").await;

        let list = fx
            .playlists
            .add_track(fx.owner, playlist.id, track)
            .await
            .unwrap();
        assert_eq!(list, vec![track]);

        let err = fx
            .playlists
            .add_track(fx.owner, playlist.id, track)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadyMember));

        let stored = fx.metadata.get_playlist(playlist.id).await.unwrap().unwrap();
        assert_eq!(stored.tracks, vec![track]);
    }

    #[tokio::test]
    async fn test_add_unknown_track_or_playlist() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "Mix").await.unwrap();

        assert!(matches!(
            fx.playlists
                .add_track(fx.owner, playlist.id, Uuid::new_v4())
                .await,
            Err(ApiError::NotFound { resource: "Track" })
        ));
        let track = add_track_record(&fx.metadata, "one").await;
        assert!(matches!(
            fx.playlists.add_track(fx.owner, Uuid::new_v4(), track).await,
            Err(ApiError::NotFound {
                resource: "Playlist"
            })
        ));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_mutate() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "Mine").await.unwrap();
        let track = add_track_record(&fx.metadata, "one").await;
        fx.playlists
            .add_track(fx.owner, playlist.id, track)
            .await
            .unwrap();

        let intruder = Identity { id: Uuid::new_v4() };
        let other = add_track_record(&fx.metadata, "two").await;
        assert!(matches!(
            fx.playlists.add_track(intruder, playlist.id, other).await,
            Err(ApiError::NotAuthorized)
        ));
        assert!(matches!(
            fx.playlists.remove_track(intruder, playlist.id, track).await,
            Err(ApiError::NotAuthorized)
        ));

        let stored = fx.metadata.get_playlist(playlist.id).await.unwrap().unwrap();
        assert_eq!(stored.tracks, vec![track]);
    }

    #[tokio::test]
    async fn test_remove_preserves_order() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "Ordered").await.unwrap();
        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            let id = add_track_record(&fx.metadata, title).await;
            fx.playlists
                .add_track(fx.owner, playlist.id, id)
                .await
                .unwrap();
            ids.push(id);
        }

        let list = fx
            .playlists
            .remove_track(fx.owner, playlist.id, ids[1])
            .await
            .unwrap();
        assert_eq!(list, vec![ids[0], ids[2]]);

        assert!(matches!(
            fx.playlists
                .remove_track(fx.owner, playlist.id, ids[1])
                .await,
            Err(ApiError::NotInPlaylist)
        ));
    }

    #[tokio::test]
    async fn test_get_detailed_resolves_owner_and_tracks() {
        let fx = fixture().await;
        let playlist = fx.playlists.create(fx.owner, "Detail").await.unwrap();
        let first = add_track_record(&fx.metadata, "first").await;
        let second = add_track_record(&fx.metadata, "second").await;
        for id in [second, first] {
            fx.playlists
                .add_track(fx.owner, playlist.id, id)
                .await
                .unwrap();
        }
        // A dangling id is skipped when resolving.
        let dangling = Uuid::new_v4();
        fx.metadata
            .update_playlist_tracks(playlist.id, vec![second, dangling, first], Utc::now())
            .await
            .unwrap();

        let detail = fx.playlists.get_detailed(playlist.id).await.unwrap();
        assert_eq!(detail.user.as_ref().unwrap().username, "owner");
        let titles: Vec<_> = detail.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);

        assert!(matches!(
            fx.playlists.get_detailed(Uuid::new_v4()).await,
            Err(ApiError::NotFound { .. })
        ));
    }
}
