//! HTTP handlers, grouped by resource.
//!
//! - `auth` -- registration and login
//! - `track` -- upload, listing, and lookup of tracks
//! - `playlist` -- playlist creation, lookup, and membership changes

pub mod auth;
pub mod playlist;
pub mod track;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::errors::ApiError;

/// JSON body extractor that runs `garde` validation after deserializing.
/// Both failures become `ValidationError` responses.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + garde::Validate<Context = ()>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation(rejection.body_text())
}

/// `garde` rule: text must contain something other than whitespace.
pub(crate) fn not_blank(value: &str, _context: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}
