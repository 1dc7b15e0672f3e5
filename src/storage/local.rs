//! Local filesystem storage backend.
//!
//! Files are stored under a configurable root directory which the HTTP
//! layer also serves statically under `public_prefix`.  The storage key
//! is used directly as a relative path (e.g., "music/trackFile-...mp3").
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.
//! File I/O goes through `tokio::fs`, so a large upload never holds a
//! runtime worker.

use bytes::Bytes;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::backend::StorageBackend;

/// Stores uploads on the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored files.
    root: PathBuf,
    /// URL prefix the root is served under, without a trailing slash.
    public_prefix: String,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a storage key to a file path below the root.
    ///
    /// Rejects absolute keys and any `..` component.
    fn resolve(&self, storage_key: &str) -> anyhow::Result<PathBuf> {
        for component in Path::new(storage_key).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => anyhow::bail!("invalid storage key: {storage_key}"),
            }
        }
        Ok(self.root.join(storage_key))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{id}"))
    }
}

impl StorageBackend for LocalBackend {
    fn provision<'a>(
        &'a self,
        folders: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for folder in folders {
                let dir = self.resolve(folder)?;
                fs::create_dir_all(&dir).await?;
                tracing::debug!(dir = %dir.display(), "Upload folder ready");
            }
            fs::create_dir_all(self.root.join(".tmp")).await?;
            Ok(())
        })
    }

    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&storage_key)?;
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            // Crash-only: temp-fsync-rename pattern.
            let tmp_path = self.temp_path();
            if let Some(parent) = tmp_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);

            if let Err(e) = fs::rename(&tmp_path, &final_path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.public_prefix, storage_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let backend = LocalBackend::new(dir.path(), "/uploads").expect("failed to create backend");
        (dir, backend)
    }

    #[tokio::test]
    async fn test_provision_creates_folders() {
        let (dir, backend) = test_backend();
        backend.provision(&["music", "images"]).await.unwrap();
        assert!(dir.path().join("music").is_dir());
        assert!(dir.path().join("images").is_dir());
        // Second call is a no-op.
        backend.provision(&["music", "images"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_writes_file() {
        let (dir, backend) = test_backend();
        let data = Bytes::from_static(b"ID3 audio bytes");
        backend
            .put("music/song.mp3", data.clone(), Some("audio/mpeg"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("music/song.mp3")).unwrap(), data);
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path().join(".tmp")).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_puts_on_one_worker() {
        let (dir, backend) = test_backend();
        let big = Bytes::from(vec![7u8; 4 * 1024 * 1024]);
        let small = Bytes::from_static(b"cover");

        let (a, b) = tokio::join!(
            backend.put("music/big.mp3", big.clone(), None),
            backend.put("images/small.png", small.clone(), None),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(std::fs::read(dir.path().join("music/big.mp3")).unwrap().len(), big.len());
        assert_eq!(std::fs::read(dir.path().join("images/small.png")).unwrap(), small);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (dir, backend) = test_backend();
        backend
            .put("images/cover.png", Bytes::from_static(b"png"), None)
            .await
            .unwrap();
        assert!(dir.path().join("images/cover.png").is_file());
        backend.delete("images/cover.png").await.unwrap();
        assert!(!dir.path().join("images/cover.png").exists());
        backend.delete("images/cover.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (_dir, backend) = test_backend();
        assert!(backend
            .put("../escape.txt", Bytes::from_static(b"x"), None)
            .await
            .is_err());
        assert!(backend.delete("/etc/passwd").await.is_err());
    }

    #[test]
    fn test_public_url() {
        let (_dir, backend) = test_backend();
        assert_eq!(
            backend.public_url("music/a.mp3"),
            "/uploads/music/a.mp3"
        );
        let dir = tempfile::tempdir().unwrap();
        let trailing = LocalBackend::new(dir.path(), "/media/").unwrap();
        assert_eq!(trailing.public_url("images/b.png"), "/media/images/b.png");
    }
}
