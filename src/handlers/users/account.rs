// handlers/users/account.rs - registration, activation and password recovery

use axum::extract::{Path, State};
use chrono::{Duration, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::api::validation::clean_name;
use crate::api::{parse_id, Valid};
use crate::auth::tokens::{self, OneTimeToken};
use crate::database::models::{NewUser, User};
use crate::database::Repository;
use crate::error::ApiError;
use crate::handlers::deliver;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::notifier::templates;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterRequest {
    #[serde(rename = "FirstName")]
    #[validate(required, length(min = 3, max = 100))]
    pub first_name: Option<String>,
    #[serde(rename = "LastName")]
    #[validate(required, length(min = 3, max = 100))]
    pub last_name: Option<String>,
    #[serde(rename = "Email")]
    #[validate(required, email)]
    pub email: Option<String>,
    #[serde(rename = "MobileNumber")]
    #[validate(required, length(min = 1))]
    pub mobile_number: Option<String>,
    #[serde(rename = "Password")]
    #[validate(required, length(min = 8))]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    #[serde(rename = "Email")]
    #[validate(required, length(min = 1))]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ChangePasswordRequest {
    #[serde(rename = "Password")]
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
}

fn hash_password(state: &AppState, password: &str) -> Result<String, ApiError> {
    state.auth.hash(password).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::internal_server_error("Password hashing failed")
    })
}

/// POST /api/v1/users/register - inactive account plus activation email
pub async fn register_post(State(state): State<AppState>, Valid(req): Valid<RegisterRequest>) -> ApiResult<&'static str> {
    let first_name = clean_name(req.first_name.as_deref().unwrap_or_default());
    let last_name = clean_name(req.last_name.as_deref().unwrap_or_default());
    let email = req.email.unwrap_or_default();
    let password_hash = hash_password(&state, req.password.as_deref().unwrap_or_default())?;

    let activation = OneTimeToken::activation();
    let expires_at = Utc::now() + Duration::hours(state.config.security.activation_ttl_hours);

    let id = User::insert(
        &state.pool,
        NewUser {
            first_name: &first_name,
            last_name: &last_name,
            email: &email,
            mobile_number: req.mobile_number.as_deref().unwrap_or_default(),
            password_hash: &password_hash,
            is_active: false,
            activation_token: Some(&activation.digest),
            activation_expires_at: Some(expires_at),
        },
    )
    .await?;
    tracing::info!(user_id = id, "User registered");

    let url = format!("{}/activate-account/{}/{}", state.config.frontend_url(), activation.token, id);
    let name = format!("{} {}", first_name, last_name);
    let message = templates::activation(&email, &name, &url, &state.config.company);
    deliver(&state, &message, "Failed to send welcome email").await?;

    Ok(ApiResponse::done_created())
}

/// PUT /api/v1/users/activate-account/:token/:id
pub async fn activate_put(State(state): State<AppState>, Path((token, id)): Path<(String, String)>) -> ApiResult<&'static str> {
    let id = parse_id(&id)?;
    let user = Repository::<User>::of(&state.pool).select_404(id).await?;

    let candidate = tokens::activation_digest(&token);
    if !tokens::matches(Some(&candidate), user.activation_token.as_deref(), user.activation_expires_at) {
        return Err(ApiError::bad_request("Invalid or expired activation token"));
    }

    User::activate(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Account activated");
    Ok(ApiResponse::done_created())
}

/// POST /api/v1/users/forgot-password
pub async fn forgot_password_post(State(state): State<AppState>, Valid(req): Valid<ForgotPasswordRequest>) -> ApiResult<&'static str> {
    let security = &state.config.security;
    let email = req.email.unwrap_or_default();
    let user = User::find_by_email(&state.pool, email.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !user.is_active {
        return Err(ApiError::forbidden("Account Inactive"));
    }
    if user.is_locked {
        return Err(ApiError::forbidden("Account Locked"));
    }

    if user.reset_request_count >= security.max_reset_requests {
        User::lock(&state.pool, user.id).await?;
        tracing::warn!(user_id = user.id, "Account locked after repeated reset requests");
        return Err(ApiError::forbidden("Account has been locked due to too many password reset attempts"));
    }

    if let Some(last) = user.last_reset_request_at {
        let interval = Duration::minutes(security.reset_request_interval_minutes);
        let elapsed = Utc::now() - last;
        if elapsed < interval {
            return Err(ApiError::forbidden(format!(
                "Password reset request is limited to one request every {} minutes. Please wait for {} minutes.",
                security.reset_request_interval_minutes,
                (interval - elapsed).num_minutes()
            )));
        }
    }

    let reset = OneTimeToken::reset();
    let expires_at = Utc::now() + Duration::minutes(security.reset_ttl_minutes);
    User::record_reset_request(&state.pool, user.id, &reset.digest, expires_at).await?;

    let url = format!("{}/reset-password/{}/{}", state.config.frontend_url(), reset.token, user.id);
    let message = templates::password_reset(&user.email, &user.full_name(), &url);
    deliver(&state, &message, "Failed to send reset email").await?;

    Ok(ApiResponse::done())
}

/// PUT /api/v1/users/reset-password/:token/:id
pub async fn reset_password_put(
    State(state): State<AppState>,
    Path((token, id)): Path<(String, String)>,
    Valid(req): Valid<ChangePasswordRequest>,
) -> ApiResult<&'static str> {
    let id = parse_id(&id)?;
    let user = Repository::<User>::of(&state.pool).select_404(id).await?;

    let candidate = tokens::reset_digest(&token);
    if !tokens::matches(candidate.as_deref(), user.reset_token.as_deref(), user.reset_expires_at) {
        return Err(ApiError::bad_request("Invalid or expired reset token"));
    }

    let password_hash = hash_password(&state, req.password.as_deref().unwrap_or_default())?;
    User::reset_password(&state.pool, user.id, &password_hash).await?;
    tracing::info!(user_id = user.id, "Password reset");

    let message = templates::password_changed(&user.email, &user.full_name(), &state.config.company);
    deliver(&state, &message, "Failed to send reset confirmation email").await?;

    Ok(ApiResponse::done())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_reports_every_missing_field() {
        let req: RegisterRequest = serde_json::from_value(json!({ "Email": "not-an-email", "Password": "short" })).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(
            err.to_json(),
            json!({ "validation_errors": {
                "Email": ["'Email' must be a valid email address"],
                "FirstName": ["'FirstName' is required"],
                "LastName": ["'LastName' is required"],
                "MobileNumber": ["'MobileNumber' is required"],
                "Password": ["'Password' must have at least 8 characters"]
            }})
        );
    }

    #[test]
    fn complete_registration_passes() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "FirstName": "Jane",
            "LastName": "Wanjiru",
            "Email": "jane@example.com",
            "MobileNumber": "254712345678",
            "Password": "correct-horse"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }
}
