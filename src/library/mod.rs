//! Track and playlist operations.
//!
//! Handlers stay thin: they parse the request and call into
//! [`tracks::TrackService`] or [`playlists::PlaylistService`], which
//! apply the ownership and membership rules on top of the metadata store.

pub mod playlists;
pub mod tracks;

use uuid::Uuid;

use crate::errors::ApiError;

/// Parse a path id; anything that is not a UUID cannot name an existing
/// record.
pub fn parse_id(raw: &str, resource: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound { resource })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "Track").unwrap(), id);
        assert!(matches!(
            parse_id("507f1f77bcf86cd799439011", "Track"),
            Err(ApiError::NotFound { resource: "Track" })
        ));
    }
}
