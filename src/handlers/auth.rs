//! Registration and login.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{not_blank, ValidJson};
use crate::credentials::NewAccount;
use crate::errors::{ApiError, ErrorBody};
use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[garde(length(min = 1, max = 64), custom(not_blank))]
    pub username: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 320))]
    pub email: String,
    #[garde(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// Identity token to send back in the `x-auth-token` header.
    pub token: String,
}

/// `POST /api/auth/register`
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    operation_id = "Register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "User already exists or invalid input", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let result = state
        .credentials
        .register(NewAccount {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await;
    metrics::record_auth_event("register", result.is_ok());

    let token = state.tokens.issue(result?)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// `POST /api/auth/login`
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    operation_id = "Login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 400, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let result = state
        .credentials
        .authenticate(&body.email, &body.password)
        .await;
    metrics::record_auth_event("login", result.is_ok());

    let token = state.tokens.issue(result?)?;
    Ok(Json(TokenResponse { token }))
}
