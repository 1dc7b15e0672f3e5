//! In-memory metadata store.
//!
//! Stores all records in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock` for thread-safe access; no
//! guard is held across an `.await`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{
    MetadataStore, PlaylistRecord, StoreError, StoreFuture, StoreResult, TrackRecord, UserRecord,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    /// Insertion order is preserved so equal timestamps still list newest first.
    tracks: Vec<TrackRecord>,
    playlists: Vec<PlaylistRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Internal(anyhow::anyhow!("metadata lock poisoned")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Internal(anyhow::anyhow!("metadata lock poisoned")))
    }
}

/// Newest first; ties keep reverse insertion order.
fn newest_first<T: Clone>(
    items: &[T],
    keep: impl Fn(&T) -> bool,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut out: Vec<T> = items.iter().rev().filter(|x| keep(x)).cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

impl MetadataStore for MemoryMetadataStore {
    fn create_user(&self, record: UserRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.write()?;
            if inner.users.values().any(|u| u.email == record.email) {
                return Err(StoreError::Conflict {
                    entity: "user",
                    field: "email",
                });
            }
            if inner.users.values().any(|u| u.username == record.username) {
                return Err(StoreError::Conflict {
                    entity: "user",
                    field: "username",
                });
            }
            inner.users.insert(record.id, record);
            Ok(())
        })
    }

    fn get_user(&self, id: Uuid) -> StoreFuture<'_, Option<UserRecord>> {
        Box::pin(async move { Ok(self.read()?.users.get(&id).cloned()) })
    }

    fn get_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<UserRecord>> {
        let email = email.to_string();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner.users.values().find(|u| u.email == email).cloned())
        })
    }

    fn get_user_by_username(&self, username: &str) -> StoreFuture<'_, Option<UserRecord>> {
        let username = username.to_string();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner.users.values().find(|u| u.username == username).cloned())
        })
    }

    fn create_track(&self, record: TrackRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.write()?.tracks.push(record);
            Ok(())
        })
    }

    fn get_track(&self, id: Uuid) -> StoreFuture<'_, Option<TrackRecord>> {
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner.tracks.iter().find(|t| t.id == id).cloned())
        })
    }

    fn list_tracks(&self) -> StoreFuture<'_, Vec<TrackRecord>> {
        Box::pin(async move {
            let inner = self.read()?;
            Ok(newest_first(&inner.tracks, |_| true, |t| t.created_at))
        })
    }

    fn list_tracks_by_uploader(&self, user_id: Uuid) -> StoreFuture<'_, Vec<TrackRecord>> {
        Box::pin(async move {
            let inner = self.read()?;
            Ok(newest_first(
                &inner.tracks,
                |t| t.uploaded_by == user_id,
                |t| t.created_at,
            ))
        })
    }

    fn create_playlist(&self, record: PlaylistRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.write()?.playlists.push(record);
            Ok(())
        })
    }

    fn get_playlist(&self, id: Uuid) -> StoreFuture<'_, Option<PlaylistRecord>> {
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner.playlists.iter().find(|p| p.id == id).cloned())
        })
    }

    fn list_playlists_by_owner(&self, user_id: Uuid) -> StoreFuture<'_, Vec<PlaylistRecord>> {
        Box::pin(async move {
            let inner = self.read()?;
            Ok(newest_first(
                &inner.playlists,
                |p| p.user == user_id,
                |p| p.created_at,
            ))
        })
    }

    fn update_playlist_tracks(
        &self,
        id: Uuid,
        tracks: Vec<Uuid>,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.write()?;
            let playlist = inner
                .playlists
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(StoreError::Missing {
                    entity: "playlist",
                    id,
                })?;
            playlist.tracks = tracks;
            playlist.updated_at = updated_at;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_user(username: &str, email: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_track(owner: Uuid, title: &str, created_at: DateTime<Utc>) -> TrackRecord {
        TrackRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artist: "artist".to_string(),
            album: None,
            duration: 180.0,
            file_path: "/uploads/music/a.mp3".to_string(),
            cover_art_path: "/uploads/images/a.png".to_string(),
            uploaded_by: owner,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_user_email_conflict() {
        let store = MemoryMetadataStore::new();
        store.create_user(make_user("a", "a@x.com")).await.unwrap();
        let err = store
            .create_user(make_user("b", "a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "email", .. }));
    }

    #[tokio::test]
    async fn test_user_username_conflict() {
        let store = MemoryMetadataStore::new();
        store.create_user(make_user("a", "a@x.com")).await.unwrap();
        let err = store
            .create_user(make_user("a", "b@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "username", .. }));
    }

    #[tokio::test]
    async fn test_lookup_by_email_and_username() {
        let store = MemoryMetadataStore::new();
        let user = make_user("a", "a@x.com");
        let id = user.id;
        store.create_user(user).await.unwrap();
        assert_eq!(store.get_user_by_email("a@x.com").await.unwrap().unwrap().id, id);
        assert_eq!(store.get_user_by_username("a").await.unwrap().unwrap().id, id);
        assert!(store.get_user_by_email("nobody@x.com").await.unwrap().is_none());
        assert!(store.get_user(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tracks_newest_first_and_filtered() {
        let store = MemoryMetadataStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let base = Utc::now();
        store.create_track(make_track(owner, "old", base)).await.unwrap();
        store
            .create_track(make_track(other, "middle", base + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .create_track(make_track(owner, "new", base + Duration::seconds(2)))
            .await
            .unwrap();

        let titles: Vec<_> = store
            .list_tracks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["new", "middle", "old"]);

        let mine: Vec<_> = store
            .list_tracks_by_uploader(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(mine, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_update_missing_playlist() {
        let store = MemoryMetadataStore::new();
        let err = store
            .update_playlist_tracks(Uuid::new_v4(), vec![], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }
}
