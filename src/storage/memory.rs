//! In-memory storage backend.
//!
//! Files are held in a `tokio::sync::RwLock<HashMap<...>>` and vanish
//! with the process.  Used by tests and throwaway deployments; public
//! references look like local ones (`{public_prefix}/{key}`) but nothing
//! serves them.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use super::backend::StorageBackend;

pub struct MemoryBackend {
    /// storage_key -> data.
    objects: tokio::sync::RwLock<HashMap<String, Bytes>>,
    /// Folders created by `provision`.
    folders: tokio::sync::RwLock<HashSet<String>>,
    public_prefix: String,
}

impl MemoryBackend {
    pub fn new(public_prefix: &str) -> Self {
        Self {
            objects: tokio::sync::RwLock::new(HashMap::new()),
            folders: tokio::sync::RwLock::new(HashSet::new()),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Number of stored files.
    pub async fn file_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Contents stored under `storage_key`, if any.
    pub async fn file(&self, storage_key: &str) -> Option<Bytes> {
        self.objects.read().await.get(storage_key).cloned()
    }

    /// Folders provisioned so far, sorted.
    pub async fn folders(&self) -> Vec<String> {
        let mut folders: Vec<_> = self.folders.read().await.iter().cloned().collect();
        folders.sort();
        folders
    }
}

impl StorageBackend for MemoryBackend {
    fn provision<'a>(
        &'a self,
        folders: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut known = self.folders.write().await;
            known.extend(folders.iter().map(|f| f.to_string()));
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
            self.objects.write().await.insert(storage_key, data);
            Ok(())
        })
    }

    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            self.objects.write().await.remove(&storage_key);
            Ok(())
        })
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.public_prefix, storage_key)
    }
}
