//! Identity tokens and the request auth gate.
//!
//! Tokens are HS256 JWTs whose payload keeps the shape existing clients
//! expect:
//!
//! ```json
//! { "user": { "id": "<uuid>" }, "iat": 1700000000, "exp": 1700086400 }
//! ```
//!
//! Clients present the token in the `x-auth-token` header.  The gate
//! ([`require_identity`]) verifies it and attaches an [`Identity`] to the
//! request; handlers read it back with the `Identity` extractor.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::AppState;

/// Header carrying the identity token.
pub const TOKEN_HEADER: &str = "x-auth-token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token presented")]
    MissingToken,

    #[error("token signature or payload is invalid")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

// ── Token payload ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenUser {
    id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Claims {
    user: TokenUser,
    iat: i64,
    exp: i64,
}

/// The authenticated caller, attached to a request by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
}

// ── Token service ───────────────────────────────────────────────────

/// Issues and verifies signed identity tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `verify_at`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_seconds,
        }
    }

    /// Token lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue a token for `user_id`, valid from now.
    pub fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.issue_at(user_id, Utc::now().timestamp())
    }

    /// Issue a token as if the clock read `now` (unix seconds).
    pub fn issue_at(&self, user_id: Uuid, now: i64) -> Result<String, AuthError> {
        let claims = Claims {
            user: TokenUser { id: user_id },
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify `token` as if the clock read `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if now >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }
        Ok(Identity {
            id: data.claims.user.id,
        })
    }
}

/// Read the token header and verify it.
pub fn authorize(headers: &HeaderMap, tokens: &TokenService) -> Result<Identity, AuthError> {
    let value = headers.get(TOKEN_HEADER).ok_or(AuthError::MissingToken)?;
    let token = value.to_str().map_err(|_| AuthError::InvalidToken)?.trim();
    tokens.verify(token)
}

// ── Gate and extractor ──────────────────────────────────────────────

/// Middleware for routes that need a caller identity.  Rejects the request
/// with 401 before the handler runs when the token is missing or invalid.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match authorize(req.headers(), &state.tokens) {
        Ok(identity) => {
            tracing::Span::current().record("user_id", tracing::field::display(identity.id));
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Auth gate rejected request");
            ApiError::from(e).into_response()
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .copied()
            .ok_or(ApiError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: i64 = 1_700_000_000;

    fn service() -> TokenService {
        TokenService::new("test-secret", 86_400)
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let tokens = service();
        let id = Uuid::new_v4();
        let token = tokens.issue_at(id, NOW).unwrap();
        assert_eq!(tokens.verify_at(&token, NOW + 10).unwrap(), Identity { id });
    }

    #[test]
    fn test_payload_shape() {
        let tokens = service();
        let id = Uuid::new_v4();
        let token = tokens.issue_at(id, NOW).unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims["user"]["id"], id.to_string());
        assert_eq!(data.claims["iat"], NOW);
        assert_eq!(data.claims["exp"], NOW + 86_400);
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = service();
        let token = tokens.issue_at(Uuid::new_v4(), NOW).unwrap();
        assert!(tokens.verify_at(&token, NOW + 86_399).is_ok());
        assert!(matches!(
            tokens.verify_at(&token, NOW + 86_400),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let tokens = TokenService::new("test-secret", i64::MAX);
        let id = Uuid::new_v4();
        let token = tokens.issue_at(id, NOW).unwrap();
        assert_eq!(tokens.verify_at(&token, NOW + 1).unwrap().id, id);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = service().issue_at(Uuid::new_v4(), NOW).unwrap();
        let other = TokenService::new("rotated-secret", 86_400);
        assert!(matches!(
            other.verify_at(&token, NOW),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_and_empty() {
        let tokens = service();
        assert!(matches!(
            tokens.verify_at("not-a-jwt", NOW),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            tokens.verify_at("", NOW),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_authorize_reads_header() {
        let tokens = service();
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            authorize(&headers, &tokens),
            Err(AuthError::MissingToken)
        ));

        let token = tokens.issue(id).unwrap();
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(authorize(&headers, &tokens).unwrap().id, id);
    }
}
