//! API error types.
//!
//! Every failure a handler can report is an [`ApiError`] variant with a
//! stable code and HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::NotFound { .. })`.  Layer errors convert via `From`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::credentials::CredentialError;
use crate::metadata::store::StoreError;
use crate::upload::UploadError;

/// Message sent for every 5xx response.
pub const SERVER_ERROR_MESSAGE: &str = "Server Error";

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    format!("{:016X}", rand::random::<u64>())
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request input.
    #[error("{message}")]
    Validation { message: String },

    /// A required upload file is absent.
    #[error("{}", missing_file_message(.field))]
    MissingFile { field: &'static str },

    #[error("User already exists")]
    DuplicateIdentity,

    /// Unknown email or wrong password; the two are indistinguishable.
    #[error("Invalid Credentials")]
    InvalidCredentials,

    #[error("No token, authorization denied")]
    MissingToken,

    #[error("Token is not valid")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    /// The caller is not the owner of the resource.
    #[error("User not authorized")]
    NotAuthorized,

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("Track not found in playlist")]
    NotInPlaylist,

    #[error("Track already in playlist")]
    AlreadyMember,

    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(anyhow::Error),

    #[error("metadata store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

fn missing_file_message(field: &str) -> &'static str {
    match field {
        "coverArt" => "No cover art uploaded",
        _ => "No track file uploaded",
    }
}

/// JSON error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub msg: String,
    /// Stable machine-readable code.
    pub code: &'static str,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    /// Return the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "ValidationError",
            ApiError::MissingFile { .. } => "MissingFile",
            ApiError::DuplicateIdentity => "DuplicateIdentity",
            ApiError::InvalidCredentials => "InvalidCredentials",
            ApiError::MissingToken => "MissingToken",
            ApiError::InvalidToken => "InvalidToken",
            ApiError::TokenExpired => "TokenExpired",
            ApiError::NotAuthorized => "NotAuthorized",
            ApiError::NotFound { .. } | ApiError::NotInPlaylist => "NotFound",
            ApiError::AlreadyMember => "AlreadyMember",
            ApiError::StorageUnavailable(_) => "StorageUnavailable",
            ApiError::StoreUnavailable(_) => "StoreUnavailable",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. }
            | ApiError::MissingFile { .. }
            | ApiError::DuplicateIdentity
            | ApiError::InvalidCredentials
            | ApiError::AlreadyMember => StatusCode::BAD_REQUEST,
            ApiError::MissingToken
            | ApiError::InvalidToken
            | ApiError::TokenExpired
            | ApiError::NotAuthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound { .. } | ApiError::NotInPlaylist => StatusCode::NOT_FOUND,
            ApiError::StorageUnavailable(_)
            | ApiError::StoreUnavailable(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        let msg = if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                code = self.code(),
                error = %self,
                "Request failed"
            );
            SERVER_ERROR_MESSAGE.to_string()
        } else {
            tracing::debug!(request_id = %request_id, code = self.code(), error = %self, "Request rejected");
            self.to_string()
        };

        let body = ErrorBody {
            msg,
            code: self.code(),
        };
        (status, [("x-request-id", request_id)], Json(body)).into_response()
    }
}

// -- Conversions from layer errors -------------------------------------------

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => ApiError::MissingToken,
            AuthError::InvalidToken => ApiError::InvalidToken,
            AuthError::TokenExpired => ApiError::TokenExpired,
            AuthError::Signing(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateIdentity { .. } => ApiError::DuplicateIdentity,
            CredentialError::InvalidCredentials => ApiError::InvalidCredentials,
            CredentialError::StoreUnavailable(e) => ApiError::StoreUnavailable(e),
            CredentialError::HashFailure(message) => {
                ApiError::Internal(anyhow::anyhow!("password hashing failed: {message}"))
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingFile { field } => ApiError::MissingFile { field },
            UploadError::DuplicateFile { .. } | UploadError::UnexpectedField { .. } => {
                ApiError::validation(err.to_string())
            }
            UploadError::Storage(e) => ApiError::StorageUnavailable(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => ApiError::DuplicateIdentity,
            StoreError::Missing { entity, .. } => ApiError::NotFound {
                resource: resource_name(entity),
            },
            StoreError::Internal(e) => ApiError::StoreUnavailable(e),
        }
    }
}

fn resource_name(entity: &'static str) -> &'static str {
    match entity {
        "playlist" => "Playlist",
        "track" => "Track",
        "user" => "User",
        other => other,
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        let message = report
            .iter()
            .map(|(path, error)| {
                let path = path.to_string();
                if path.is_empty() {
                    error.message().to_string()
                } else {
                    format!("{path}: {}", error.message())
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::Validation { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_error_body() {
        let (status, body) = body_json(ApiError::NotFound {
            resource: "Playlist",
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["msg"], "Playlist not found");
        assert_eq!(body["code"], "NotFound");
    }

    #[tokio::test]
    async fn test_server_error_hides_cause() {
        let (status, body) =
            body_json(ApiError::StoreUnavailable(anyhow::anyhow!("disk I/O error"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["msg"], SERVER_ERROR_MESSAGE);
        assert_eq!(body["code"], "StoreUnavailable");
    }

    #[test]
    fn test_missing_file_messages() {
        assert_eq!(
            ApiError::MissingFile { field: "trackFile" }.to_string(),
            "No track file uploaded"
        );
        assert_eq!(
            ApiError::MissingFile { field: "coverArt" }.to_string(),
            "No cover art uploaded"
        );
    }

    #[test]
    fn test_auth_statuses() {
        for err in [
            ApiError::MissingToken,
            ApiError::InvalidToken,
            ApiError::TokenExpired,
            ApiError::NotAuthorized,
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(ApiError::AlreadyMember.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upload_error_mapping() {
        let err: ApiError = UploadError::DuplicateFile { field: "trackFile" }.into();
        assert!(matches!(err, ApiError::Validation { .. }));
        let err: ApiError = UploadError::Storage(anyhow::anyhow!("boom")).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
