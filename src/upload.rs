//! Multipart file acceptance for track uploads.
//!
//! A track upload carries exactly two files: the audio under `trackFile`
//! and the cover image under `coverArt`.  [`FileFields`] collects them while
//! the multipart body is read; [`UploadPipeline::accept`] names each file,
//! writes both through the configured [`StorageBackend`], and hands back
//! the public references.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::storage::backend::StorageBackend;

/// Longest extension carried over from the client's filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Which slot of a track a file fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Audio,
    Cover,
}

impl FieldRole {
    pub const ALL: [FieldRole; 2] = [FieldRole::Audio, FieldRole::Cover];

    /// Multipart field name the file arrives under.
    pub fn field_name(self) -> &'static str {
        match self {
            FieldRole::Audio => "trackFile",
            FieldRole::Cover => "coverArt",
        }
    }

    /// Storage folder the file is written to.
    pub fn folder(self) -> &'static str {
        match self {
            FieldRole::Audio => "music",
            FieldRole::Cover => "images",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.field_name() == name)
    }

    fn label(self) -> &'static str {
        match self {
            FieldRole::Audio => "audio",
            FieldRole::Cover => "cover",
        }
    }
}

/// Folders every backend must have before the first upload.
pub fn upload_folders() -> [&'static str; 2] {
    FieldRole::ALL.map(FieldRole::folder)
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file uploaded under '{field}'")]
    MissingFile { field: &'static str },

    #[error("more than one file uploaded under '{field}'")]
    DuplicateFile { field: &'static str },

    #[error("unexpected file field '{field}'")]
    UnexpectedField { field: String },

    #[error("storage backend failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A file received from the client, not yet stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub role: FieldRole,
    pub original_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Files collected from one multipart body.
#[derive(Debug, Default)]
pub struct FileFields {
    audio: Option<IncomingFile>,
    cover: Option<IncomingFile>,
}

impl FileFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file part.  Rejects unknown field names and a second file
    /// for a field that already has one.
    pub fn push(
        &mut self,
        field_name: &str,
        original_name: Option<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<(), UploadError> {
        let role = FieldRole::from_field_name(field_name).ok_or_else(|| {
            UploadError::UnexpectedField {
                field: field_name.to_string(),
            }
        })?;
        let slot = match role {
            FieldRole::Audio => &mut self.audio,
            FieldRole::Cover => &mut self.cover,
        };
        if slot.is_some() {
            return Err(UploadError::DuplicateFile {
                field: role.field_name(),
            });
        }
        *slot = Some(IncomingFile {
            role,
            original_name,
            content_type,
            data,
        });
        Ok(())
    }

    /// Fail with `MissingFile` unless both files are present, audio checked
    /// first.
    pub fn ensure_complete(&self) -> Result<(), UploadError> {
        if self.audio.is_none() {
            return Err(UploadError::MissingFile {
                field: FieldRole::Audio.field_name(),
            });
        }
        if self.cover.is_none() {
            return Err(UploadError::MissingFile {
                field: FieldRole::Cover.field_name(),
            });
        }
        Ok(())
    }

    /// Both files, audio checked first.
    fn into_pair(self) -> Result<(IncomingFile, IncomingFile), UploadError> {
        let audio = self.audio.ok_or(UploadError::MissingFile {
            field: FieldRole::Audio.field_name(),
        })?;
        let cover = self.cover.ok_or(UploadError::MissingFile {
            field: FieldRole::Cover.field_name(),
        })?;
        Ok((audio, cover))
    }
}

/// A file durably written to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub role: FieldRole,
    /// Backend-relative key, e.g. `music/trackFile-1700000000000-123456789.mp3`.
    pub storage_key: String,
    /// Public reference clients fetch the file with.
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct TrackUpload {
    pub audio: StoredFile,
    pub cover: StoredFile,
}

/// `<fieldName>-<unix millis>-<nonce><.ext>`.  The extension is kept only
/// when it is short ASCII alphanumeric text.
pub fn generate_filename(
    role: FieldRole,
    original_name: Option<&str>,
    now_ms: i64,
    nonce: u32,
) -> String {
    let ext = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        });
    match ext {
        Some(ext) => format!("{}-{now_ms}-{nonce}.{ext}", role.field_name()),
        None => format!("{}-{now_ms}-{nonce}", role.field_name()),
    }
}

pub struct UploadPipeline {
    storage: Arc<dyn StorageBackend>,
    provisioned: OnceCell<()>,
}

impl UploadPipeline {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            provisioned: OnceCell::new(),
        }
    }

    /// Create the backend folders.  Runs at most once per pipeline; later
    /// calls return immediately.  A failed attempt is retried by the next call.
    pub async fn provision(&self) -> Result<(), UploadError> {
        self.provisioned
            .get_or_try_init(|| async {
                let folders = upload_folders();
                self.storage.provision(&folders).await?;
                info!(?folders, "Upload folders provisioned");
                Ok::<(), UploadError>(())
            })
            .await?;
        Ok(())
    }

    /// Store the audio and cover files of one track.
    ///
    /// Both writes run concurrently.  When only one succeeds, the written
    /// file is deleted (best effort) and the failure is returned.
    pub async fn accept(&self, fields: FileFields) -> Result<TrackUpload, UploadError> {
        let (audio, cover) = fields.into_pair()?;
        self.provision().await?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let (audio_nonce, cover_nonce) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..1_000_000_000u32),
                rng.gen_range(0..1_000_000_000u32),
            )
        };

        let (audio_result, cover_result) = tokio::join!(
            self.store(audio, now_ms, audio_nonce),
            self.store(cover, now_ms, cover_nonce),
        );

        match (audio_result, cover_result) {
            (Ok(audio), Ok(cover)) => Ok(TrackUpload { audio, cover }),
            (Ok(written), Err(e)) | (Err(e), Ok(written)) => {
                self.discard(&written).await;
                Err(e)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn store(
        &self,
        file: IncomingFile,
        now_ms: i64,
        nonce: u32,
    ) -> Result<StoredFile, UploadError> {
        let filename = generate_filename(file.role, file.original_name.as_deref(), now_ms, nonce);
        let storage_key = format!("{}/{}", file.role.folder(), filename);
        let size = file.data.len();

        let result = self
            .storage
            .put(&storage_key, file.data, file.content_type.as_deref())
            .await;
        metrics::record_uploaded_file(file.role.label(), size, result.is_ok());
        if let Err(e) = result {
            warn!(key = %storage_key, error = %e, "Upload write failed");
            return Err(UploadError::Storage(e));
        }

        debug!(key = %storage_key, size, "Upload stored");
        Ok(StoredFile {
            role: file.role,
            url: self.storage.public_url(&storage_key),
            storage_key,
        })
    }

    /// Best-effort removal of both files of an upload whose record could
    /// not be saved.
    pub async fn discard_upload(&self, upload: &TrackUpload) {
        tokio::join!(self.discard(&upload.audio), self.discard(&upload.cover));
    }

    async fn discard(&self, file: &StoredFile) {
        if let Err(e) = self.storage.delete(&file.storage_key).await {
            warn!(key = %file.storage_key, error = %e, "Failed to remove orphaned upload");
        }
    }
}
