// handlers/users/session.rs - token acquisition and renewal

use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::Valid;
use crate::auth::{initials, TokenKind, TokenPair};
use crate::database::models::User;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[serde(rename = "Email")]
    #[validate(required, email)]
    pub email: Option<String>,
    #[serde(rename = "Password")]
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RefreshRequest {
    #[serde(rename = "RefreshToken")]
    #[validate(required, length(min = 1))]
    pub refresh_token: Option<String>,
    #[serde(rename = "UserID")]
    #[validate(required, range(min = 1))]
    pub user_id: Option<i64>,
}

/// `{user: {accessToken, refreshToken}}`
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: TokenPair,
}

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// POST /api/v1/users/login
pub async fn login_post(State(state): State<AppState>, Valid(req): Valid<LoginRequest>) -> ApiResult<Session> {
    let email = req.email.unwrap_or_default();
    let Some(user) = User::find_by_email(&state.pool, email.trim()).await? else {
        tracing::debug!("Login attempt for unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    if !user.is_active {
        return Err(ApiError::unauthorized("Account Inactive"));
    }
    if user.is_locked {
        return Err(ApiError::unauthorized("Account Locked"));
    }
    if !state.auth.verify(req.password.as_deref().unwrap_or_default(), &user.password_hash)? {
        tracing::debug!(user_id = user.id, "Login attempt with wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let pair = state.auth.issue_pair(user.id, &initials(&user.first_name, &user.last_name))?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(ApiResponse::created(Session { user: pair }))
}

/// POST /api/v1/users/refresh - a valid refresh token for the named user buys a new pair
pub async fn refresh_post(State(state): State<AppState>, Valid(req): Valid<RefreshRequest>) -> ApiResult<Session> {
    let token = req.refresh_token.unwrap_or_default();
    let claims = state
        .auth
        .decode(TokenKind::Refresh, &token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))?;
    let subject = claims
        .user_id()
        .map_err(|_| ApiError::unauthorized("Invalid token payload"))?;

    if Some(subject) != req.user_id {
        return Err(ApiError::unauthorized("Token user ID mismatch"));
    }

    let user = Repository::<User>::of(&state.pool).select_404(subject).await?;
    let pair = state.auth.issue_pair(user.id, &initials(&user.first_name, &user.last_name))?;
    Ok(ApiResponse::created(Session { user: pair }))
}
