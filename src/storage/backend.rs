//! Abstract storage backend trait.
//!
//! Every upload destination must implement [`StorageBackend`].  Keys are
//! relative, slash-separated paths such as `music/trackFile-1700000000000-42.mp3`;
//! each backend decides where the bytes physically live and how the
//! resulting public reference is spelled.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// Async upload storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Make sure every folder in `folders` exists.  Idempotent.
    fn provision<'a>(
        &'a self,
        folders: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Write `data` to `storage_key`, replacing anything already there.
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Delete the object at `storage_key`.  Deleting a missing key succeeds.
    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// The reference clients use to fetch `storage_key`: a server-relative
    /// path for local storage, an absolute URL for an object store.
    fn public_url(&self, storage_key: &str) -> String;
}
