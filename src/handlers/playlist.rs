//! Playlist handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ValidJson;
use crate::auth::Identity;
use crate::errors::{ApiError, ErrorBody};
use crate::library::parse_id;
use crate::library::playlists::PlaylistDetail;
use crate::metadata::store::PlaylistRecord;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePlaylistRequest {
    #[garde(length(min = 1, max = 128))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddTrackRequest {
    #[serde(rename = "trackId")]
    #[garde(length(min = 1))]
    pub track_id: String,
}

/// Track ids that do not parse cannot be members or exist, so they map to
/// an id that matches nothing and the service reports the usual error.
fn track_id_or_nil(raw: &str) -> Uuid {
    Uuid::parse_str(raw.trim()).unwrap_or(Uuid::nil())
}

/// `POST /api/playlists`
#[utoipa::path(
    post,
    path = "/api/playlists",
    tag = "Playlists",
    operation_id = "CreatePlaylist",
    request_body = CreatePlaylistRequest,
    security(("token" = [])),
    responses(
        (status = 201, description = "Playlist created", body = PlaylistRecord),
        (status = 400, description = "Invalid name", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn create_playlist(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    ValidJson(body): ValidJson<CreatePlaylistRequest>,
) -> Result<(StatusCode, Json<PlaylistRecord>), ApiError> {
    let playlist = state.playlists.create(identity, &body.name).await?;
    Ok((StatusCode::CREATED, Json(playlist)))
}

/// `GET /api/playlists/me`
#[utoipa::path(
    get,
    path = "/api/playlists/me",
    tag = "Playlists",
    operation_id = "ListMyPlaylists",
    security(("token" = [])),
    responses(
        (status = 200, description = "Caller's playlists, newest first", body = [PlaylistRecord]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn my_playlists(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PlaylistRecord>>, ApiError> {
    Ok(Json(state.playlists.list_for_owner(identity).await?))
}

/// `GET /api/playlists/{id}`
#[utoipa::path(
    get,
    path = "/api/playlists/{id}",
    tag = "Playlists",
    operation_id = "GetPlaylist",
    params(("id" = String, Path, description = "Playlist id")),
    responses(
        (status = 200, description = "Playlist with owner and tracks", body = PlaylistDetail),
        (status = 404, description = "Playlist not found", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlaylistDetail>, ApiError> {
    let id = parse_id(&id, "Playlist")?;
    Ok(Json(state.playlists.get_detailed(id).await?))
}

/// `POST /api/playlists/{id}/tracks`
#[utoipa::path(
    post,
    path = "/api/playlists/{id}/tracks",
    tag = "Playlists",
    operation_id = "AddPlaylistTrack",
    params(("id" = String, Path, description = "Playlist id")),
    request_body = AddTrackRequest,
    security(("token" = [])),
    responses(
        (status = 200, description = "Track appended", body = [String]),
        (status = 400, description = "Track already in playlist", body = ErrorBody),
        (status = 401, description = "Missing token or not the owner", body = ErrorBody),
        (status = 404, description = "Playlist or track not found", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn add_track(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<AddTrackRequest>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    let playlist_id = parse_id(&id, "Playlist")?;
    let tracks = state
        .playlists
        .add_track(identity, playlist_id, track_id_or_nil(&body.track_id))
        .await?;
    Ok(Json(tracks))
}

/// `DELETE /api/playlists/{id}/tracks/{trackId}`
#[utoipa::path(
    delete,
    path = "/api/playlists/{id}/tracks/{trackId}",
    tag = "Playlists",
    operation_id = "RemovePlaylistTrack",
    params(
        ("id" = String, Path, description = "Playlist id"),
        ("trackId" = String, Path, description = "Track id")
    ),
    security(("token" = [])),
    responses(
        (status = 200, description = "Track removed", body = [String]),
        (status = 401, description = "Missing token or not the owner", body = ErrorBody),
        (status = 404, description = "Playlist not found or track not in it", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn remove_track(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path((id, track_id)): Path<(String, String)>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    let playlist_id = parse_id(&id, "Playlist")?;
    let tracks = state
        .playlists
        .remove_track(identity, playlist_id, track_id_or_nil(&track_id))
        .await?;
    Ok(Json(tracks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_or_nil() {
        let id = Uuid::new_v4();
        assert_eq!(track_id_or_nil(&id.to_string()), id);
        assert_eq!(track_id_or_nil(" not-an-id "), Uuid::nil());
    }
}
