//! Track upload, listing, and lookup.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::errors::{ApiError, ErrorBody};
use crate::library::parse_id;
use crate::library::tracks::TrackForm;
use crate::metadata::store::TrackRecord;
use crate::upload::FileFields;
use crate::AppState;

/// Shape of the multipart upload form, for the API document only.
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackUploadForm {
    /// Audio file.
    #[schema(value_type = String, format = Binary)]
    track_file: Vec<u8>,
    /// Cover image.
    #[schema(value_type = String, format = Binary)]
    cover_art: Vec<u8>,
    title: String,
    artist: String,
    album: Option<String>,
    /// Length in seconds.
    duration: f64,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::validation(err.body_text())
}

/// Split a multipart body into the text form and the file parts.
async fn read_upload(mut multipart: Multipart) -> Result<(TrackForm, FileFields), ApiError> {
    let mut form = TrackForm::default();
    let mut files = FileFields::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(multipart_error)?;
            files.push(&name, Some(file_name), content_type, data)?;
            continue;
        }

        let slot = match name.as_str() {
            "title" => &mut form.title,
            "artist" => &mut form.artist,
            "album" => &mut form.album,
            "duration" => &mut form.duration,
            // File roles sent without a filename are still files.
            "trackFile" | "coverArt" => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push(&name, None, content_type, data)?;
                continue;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
                continue;
            }
        };
        *slot = Some(field.text().await.map_err(multipart_error)?);
    }
    Ok((form, files))
}

/// `POST /api/tracks`
#[utoipa::path(
    post,
    path = "/api/tracks",
    tag = "Tracks",
    operation_id = "UploadTrack",
    request_body(content = TrackUploadForm, content_type = "multipart/form-data"),
    security(("token" = [])),
    responses(
        (status = 201, description = "Track created", body = TrackRecord),
        (status = 400, description = "Missing file or invalid fields", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn upload_track(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<TrackRecord>), ApiError> {
    let multipart = multipart.map_err(|e| ApiError::validation(e.body_text()))?;
    let (form, files) = read_upload(multipart).await?;
    let track = state.tracks.upload(identity, form, files).await?;
    Ok((StatusCode::CREATED, Json(track)))
}

/// `GET /api/tracks`
#[utoipa::path(
    get,
    path = "/api/tracks",
    tag = "Tracks",
    operation_id = "ListTracks",
    responses(
        (status = 200, description = "All tracks, newest first", body = [TrackRecord]),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn list_tracks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TrackRecord>>, ApiError> {
    Ok(Json(state.tracks.list().await?))
}

/// `GET /api/tracks/my-tracks`
#[utoipa::path(
    get,
    path = "/api/tracks/my-tracks",
    tag = "Tracks",
    operation_id = "ListMyTracks",
    security(("token" = [])),
    responses(
        (status = 200, description = "Caller's tracks, newest first", body = [TrackRecord]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn my_tracks(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<TrackRecord>>, ApiError> {
    Ok(Json(state.tracks.list_for_uploader(identity).await?))
}

/// `GET /api/tracks/{id}`
#[utoipa::path(
    get,
    path = "/api/tracks/{id}",
    tag = "Tracks",
    operation_id = "GetTrack",
    params(("id" = String, Path, description = "Track id")),
    responses(
        (status = 200, description = "Track", body = TrackRecord),
        (status = 404, description = "Track not found", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn get_track(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrackRecord>, ApiError> {
    let id = parse_id(&id, "Track")?;
    Ok(Json(state.tracks.get(id).await?))
}
