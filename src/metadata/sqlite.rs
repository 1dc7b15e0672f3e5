//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.
//!
//! Ids are stored as hyphenated UUID text, timestamps as fixed-width
//! RFC 3339 strings (so they sort lexically), and a playlist's track
//! list as a JSON array.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use super::store::{
    MetadataStore, PlaylistRecord, StoreError, StoreFuture, StoreResult, TrackRecord, UserRecord,
};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";
const TRACK_COLUMNS: &str = "id, title, artist, album, duration, file_path, cover_art_path, \
                             uploaded_by, created_at, updated_at";
const PLAYLIST_COLUMNS: &str = "id, name, owner_id, tracks, cover_image, created_at, updated_at";

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Internal(anyhow::anyhow!("sqlite connection mutex poisoned")))
    }
}

/// Create the required tables and indexes if they do not already exist.
/// Idempotent; runs on every startup.
fn init_db(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracks (
            id             TEXT PRIMARY KEY,
            title          TEXT NOT NULL,
            artist         TEXT NOT NULL,
            album          TEXT,
            duration       REAL NOT NULL,
            file_path      TEXT NOT NULL,
            cover_art_path TEXT NOT NULL,
            uploaded_by    TEXT NOT NULL REFERENCES users(id),
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tracks_uploader
            ON tracks(uploaded_by, created_at);

        CREATE TABLE IF NOT EXISTS playlists (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            tracks      TEXT NOT NULL DEFAULT '[]',
            cover_image TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_playlists_owner
            ON playlists(owner_id, created_at);
        ",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![SCHEMA_VERSION, format_timestamp(&Utc::now())],
    )?;
    Ok(())
}

// ── Conversions ─────────────────────────────────────────────────────

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Internal(err.into())
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

fn map_track_row(row: &Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        duration: row.get(4)?,
        file_path: row.get(5)?,
        cover_art_path: row.get(6)?,
        uploaded_by: uuid_at(row, 7)?,
        created_at: timestamp_at(row, 8)?,
        updated_at: timestamp_at(row, 9)?,
    })
}

fn map_playlist_row(row: &Row<'_>) -> rusqlite::Result<PlaylistRecord> {
    let tracks: String = row.get(3)?;
    Ok(PlaylistRecord {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        user: uuid_at(row, 2)?,
        tracks: serde_json::from_str(&tracks).map_err(|e| conversion_error(3, e))?,
        cover_image: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

/// Translate a UNIQUE violation on `users` into a typed conflict.
fn user_insert_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            if message.contains("users.email") {
                return StoreError::Conflict {
                    entity: "user",
                    field: "email",
                };
            }
            if message.contains("users.username") {
                return StoreError::Conflict {
                    entity: "user",
                    field: "username",
                };
            }
        }
    }
    err.into()
}

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> StoreResult<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl MetadataStore for SqliteMetadataStore {
    // ── Users ───────────────────────────────────────────────────────

    fn create_user(&self, record: UserRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.username,
                    record.email,
                    record.password_hash,
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                ],
            )
            .map_err(user_insert_error)?;
            Ok(())
        })
    }

    fn get_user(&self, id: Uuid) -> StoreFuture<'_, Option<UserRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![id.to_string()],
                    map_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    fn get_user_by_email(&self, email: &str) -> StoreFuture<'_, Option<UserRecord>> {
        let email = email.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    params![email],
                    map_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    fn get_user_by_username(&self, username: &str) -> StoreFuture<'_, Option<UserRecord>> {
        let username = username.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                    params![username],
                    map_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    // ── Tracks ──────────────────────────────────────────────────────

    fn create_track(&self, record: TrackRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO tracks (id, title, artist, album, duration, file_path,
                                     cover_art_path, uploaded_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.to_string(),
                    record.title,
                    record.artist,
                    record.album,
                    record.duration,
                    record.file_path,
                    record.cover_art_path,
                    record.uploaded_by.to_string(),
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn get_track(&self, id: Uuid) -> StoreFuture<'_, Option<TrackRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let track = conn
                .query_row(
                    &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"),
                    params![id.to_string()],
                    map_track_row,
                )
                .optional()?;
            Ok(track)
        })
    }

    fn list_tracks(&self) -> StoreFuture<'_, Vec<TrackRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map([], map_track_row)?;
            collect(rows)
        })
    }

    fn list_tracks_by_uploader(&self, user_id: Uuid) -> StoreFuture<'_, Vec<TrackRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks WHERE uploaded_by = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![user_id.to_string()], map_track_row)?;
            collect(rows)
        })
    }

    // ── Playlists ───────────────────────────────────────────────────

    fn create_playlist(&self, record: PlaylistRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let tracks = serde_json::to_string(&record.tracks).map_err(anyhow::Error::from)?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO playlists (id, name, owner_id, tracks, cover_image,
                                        created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.name,
                    record.user.to_string(),
                    tracks,
                    record.cover_image,
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn get_playlist(&self, id: Uuid) -> StoreFuture<'_, Option<PlaylistRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let playlist = conn
                .query_row(
                    &format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = ?1"),
                    params![id.to_string()],
                    map_playlist_row,
                )
                .optional()?;
            Ok(playlist)
        })
    }

    fn list_playlists_by_owner(&self, user_id: Uuid) -> StoreFuture<'_, Vec<PlaylistRecord>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![user_id.to_string()], map_playlist_row)?;
            collect(rows)
        })
    }

    fn update_playlist_tracks(
        &self,
        id: Uuid,
        tracks: Vec<Uuid>,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let tracks = serde_json::to_string(&tracks).map_err(anyhow::Error::from)?;
            let conn = self.lock()?;
            let changed = conn.execute(
                "UPDATE playlists SET tracks = ?1, updated_at = ?2 WHERE id = ?3",
                params![tracks, format_timestamp(&updated_at), id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::Missing {
                    entity: "playlist",
                    id,
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_store() -> SqliteMetadataStore {
        SqliteMetadataStore::new(":memory:").expect("failed to create in-memory store")
    }

    fn make_user(username: &str, email: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$v=19$stub".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_track(owner: Uuid, title: &str, created_at: DateTime<Utc>) -> TrackRecord {
        TrackRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: Some("Album".to_string()),
            duration: 201.5,
            file_path: format!("/uploads/music/{title}.mp3"),
            cover_art_path: format!("/uploads/images/{title}.png"),
            uploaded_by: owner,
            created_at,
            updated_at: created_at,
        }
    }

    fn make_playlist(owner: Uuid, name: &str, created_at: DateTime<Utc>) -> PlaylistRecord {
        PlaylistRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            user: owner,
            tracks: Vec::new(),
            cover_image: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("echoplay.db");
        let path = path.to_str().unwrap();
        let user = make_user("alice", "alice@example.com");
        {
            let store = SqliteMetadataStore::new(path).unwrap();
            store.create_user(user.clone()).await.unwrap();
        }
        let store = SqliteMetadataStore::new(path).unwrap();
        let fetched = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = test_store();
        let user = make_user("alice", "alice@example.com");
        store.create_user(user.clone()).await.unwrap();

        let by_email = store
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.password_hash, user.password_hash);

        let by_name = store.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);

        assert!(store.get_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_and_username() {
        let store = test_store();
        store
            .create_user(make_user("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create_user(make_user("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "email", .. }));

        let err = store
            .create_user(make_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "username", .. }));
    }

    #[tokio::test]
    async fn test_track_round_trip_and_order() {
        let store = test_store();
        let alice = make_user("alice", "alice@example.com");
        let bob = make_user("bob", "bob@example.com");
        store.create_user(alice.clone()).await.unwrap();
        store.create_user(bob.clone()).await.unwrap();

        let base = Utc::now();
        let first = make_track(alice.id, "first", base);
        store.create_track(first.clone()).await.unwrap();
        store
            .create_track(make_track(bob.id, "second", base + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .create_track(make_track(alice.id, "third", base + Duration::seconds(2)))
            .await
            .unwrap();

        let fetched = store.get_track(first.id).await.unwrap().unwrap();
        assert_eq!(fetched.album.as_deref(), Some("Album"));
        assert_eq!(fetched.duration, 201.5);
        assert_eq!(fetched.uploaded_by, alice.id);

        let all: Vec<_> = store
            .list_tracks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(all, vec!["third", "second", "first"]);

        let mine: Vec<_> = store
            .list_tracks_by_uploader(alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(mine, vec!["third", "first"]);
    }

    #[tokio::test]
    async fn test_playlist_tracks_update() {
        let store = test_store();
        let alice = make_user("alice", "alice@example.com");
        store.create_user(alice.clone()).await.unwrap();

        let playlist = make_playlist(alice.id, "Road trip", Utc::now());
        store.create_playlist(playlist.clone()).await.unwrap();

        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let later = Utc::now() + Duration::seconds(5);
        store
            .update_playlist_tracks(playlist.id, ids.clone(), later)
            .await
            .unwrap();

        let fetched = store.get_playlist(playlist.id).await.unwrap().unwrap();
        assert_eq!(fetched.tracks, ids);
        assert_eq!(fetched.user, alice.id);
        assert!(fetched.updated_at > fetched.created_at);
    }

    #[tokio::test]
    async fn test_list_playlists_by_owner() {
        let store = test_store();
        let alice = make_user("alice", "alice@example.com");
        let bob = make_user("bob", "bob@example.com");
        store.create_user(alice.clone()).await.unwrap();
        store.create_user(bob.clone()).await.unwrap();

        let base = Utc::now();
        store
            .create_playlist(make_playlist(alice.id, "older", base))
            .await
            .unwrap();
        store
            .create_playlist(make_playlist(bob.id, "bobs", base))
            .await
            .unwrap();
        store
            .create_playlist(make_playlist(alice.id, "newer", base + Duration::seconds(1)))
            .await
            .unwrap();

        let names: Vec<_> = store
            .list_playlists_by_owner(alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_update_missing_playlist() {
        let store = test_store();
        let err = store
            .update_playlist_tracks(Uuid::new_v4(), vec![], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }
}
