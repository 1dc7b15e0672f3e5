//! Track uploads and lookups.

use std::sync::Arc;

use chrono::Utc;
use garde::Validate;
use uuid::Uuid;

use crate::auth::Identity;
use crate::errors::ApiError;
use crate::metadata::store::{MetadataStore, TrackRecord};
use crate::upload::{FileFields, UploadPipeline};

/// Text fields of an upload form as received.
#[derive(Debug, Clone, Default)]
pub struct TrackForm {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<String>,
}

/// Validated track details.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct NewTrack {
    #[garde(length(min = 1, max = 256))]
    pub title: String,
    #[garde(length(min = 1, max = 256))]
    pub artist: String,
    #[garde(length(max = 256))]
    pub album: Option<String>,
    #[garde(range(min = 0.0))]
    pub duration: f64,
}

impl NewTrack {
    /// Trim, parse, and validate the form fields.
    pub fn from_form(form: TrackForm) -> Result<Self, ApiError> {
        let required = |value: Option<String>, name: &str| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::validation(format!("{name} is required")))
        };

        let title = required(form.title, "title")?;
        let artist = required(form.artist, "artist")?;
        let duration_text = required(form.duration, "duration")?;
        let duration = duration_text
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .ok_or_else(|| ApiError::validation("duration must be a number of seconds"))?;
        let album = form
            .album
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let track = NewTrack {
            title,
            artist,
            album,
            duration,
        };
        track.validate()?;
        Ok(track)
    }
}

pub struct TrackService {
    metadata: Arc<dyn MetadataStore>,
    uploads: Arc<UploadPipeline>,
}

impl TrackService {
    pub fn new(metadata: Arc<dyn MetadataStore>, uploads: Arc<UploadPipeline>) -> Self {
        Self { metadata, uploads }
    }

    /// Store the files and create the track.  Nothing is written unless
    /// both files are present and the details are valid.
    pub async fn upload(
        &self,
        identity: Identity,
        form: TrackForm,
        files: FileFields,
    ) -> Result<TrackRecord, ApiError> {
        files.ensure_complete()?;
        let details = NewTrack::from_form(form)?;
        let stored = self.uploads.accept(files).await?;

        let now = Utc::now();
        let record = TrackRecord {
            id: Uuid::new_v4(),
            title: details.title,
            artist: details.artist,
            album: details.album,
            duration: details.duration,
            file_path: stored.audio.url.clone(),
            cover_art_path: stored.cover.url.clone(),
            uploaded_by: identity.id,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.metadata.create_track(record.clone()).await {
            self.uploads.discard_upload(&stored).await;
            return Err(e.into());
        }
        tracing::info!(track_id = %record.id, user_id = %identity.id, "Track uploaded");
        Ok(record)
    }

    /// Every track, newest first.
    pub async fn list(&self) -> Result<Vec<TrackRecord>, ApiError> {
        Ok(self.metadata.list_tracks().await?)
    }

    /// Tracks uploaded by the caller, newest first.
    pub async fn list_for_uploader(&self, identity: Identity) -> Result<Vec<TrackRecord>, ApiError> {
        Ok(self.metadata.list_tracks_by_uploader(identity.id).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<TrackRecord, ApiError> {
        self.metadata
            .get_track(id)
            .await?
            .ok_or(ApiError::NotFound { resource: "Track" })
    }
}
