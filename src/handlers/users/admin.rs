// handlers/users/admin.rs - user listing, statistics and access management

use axum::extract::{Extension, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use validator::Validate;

use crate::api::{choices, Choice, Id, Valid};
use crate::database::models::{MonthlyCount, Role, User};
use crate::database::Repository;
use crate::filter::PageRequest;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, ItemBody, PageBody};
use crate::services::cache::permissions_key;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateUserRequest {
    #[serde(rename = "IsActive")]
    pub is_active: bool,
    #[serde(rename = "IsLocked")]
    pub is_locked: bool,
    #[serde(rename = "Roles")]
    #[validate(required)]
    pub roles: Option<Vec<i64>>,
}

/// A user without credentials, with the roles they hold.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile_number: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

impl UserView {
    fn new(user: User, roles: Vec<Role>) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            mobile_number: user.mobile_number,
            is_active: user.is_active,
            is_locked: user.is_locked,
            created_at: user.created_at,
            updated_at: user.updated_at,
            roles,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionList {
    pub permissions: Vec<String>,
}

async fn load_view(state: &AppState, id: i64) -> Result<UserView, crate::error::ApiError> {
    let user = Repository::<User>::of(&state.pool).select_404(id).await?;
    let roles = Role::for_user(&state.pool, id).await?;
    Ok(UserView::new(user, roles))
}

/// GET /api/v1/users/paginate
pub async fn users_get(State(state): State<AppState>, Extension(request): Extension<PageRequest>) -> ApiResult<PageBody<Choice>> {
    let page = Repository::<User>::of(&state.pool)
        .paginate(&request, [], state.config.filter.legacy_total_count)
        .await?;
    let items = choices(&page.items, |u| u.id, User::full_name);
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/users/by/:id
pub async fn user_get(State(state): State<AppState>, Id(id): Id) -> ApiResult<ItemBody<UserView>> {
    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// PATCH /api/v1/users/by/:id - flags and the complete role set
pub async fn user_patch(State(state): State<AppState>, Id(id): Id, Valid(req): Valid<UpdateUserRequest>) -> ApiResult<ItemBody<UserView>> {
    let roles = req.roles.unwrap_or_default();

    let mut tx = state.pool.begin().await.map_err(crate::database::DatabaseError::from)?;
    User::set_flags(&mut *tx, id, req.is_active, req.is_locked).await?;
    User::replace_roles(&mut tx, id, &roles).await?;
    tx.commit().await.map_err(crate::database::DatabaseError::from)?;

    tracing::info!(user_id = id, roles = roles.len(), "User updated");
    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// GET /api/v1/users/by/month
pub async fn monthly_get(State(state): State<AppState>) -> ApiResult<ItemBody<Vec<MonthlyCount>>> {
    Ok(ApiResponse::item(User::monthly_counts(&state.pool).await?))
}

/// GET /api/v1/users/by/count - active accounts
pub async fn count_get(State(state): State<AppState>) -> ApiResult<ItemBody<Value>> {
    let count = User::count_active(&state.pool).await?;
    Ok(ApiResponse::item(json!({ "count": count })))
}

/// GET /api/v1/users/permissions - the caller's permission names, cached per user
pub async fn permissions_get(State(state): State<AppState>, Extension(user): Extension<CurrentUser>) -> ApiResult<PermissionList> {
    let key = permissions_key(user.id);

    match state.cache.get(&key).await {
        Ok(Some(permissions)) => return Ok(ApiResponse::success(PermissionList { permissions })),
        Ok(None) => {}
        Err(e) => tracing::warn!("Permission cache read failed: {}", e),
    }

    let ttl = Duration::from_secs(state.config.cache.permissions_ttl_secs);
    if let Err(e) = state.cache.put(&key, &user.permissions, ttl).await {
        tracing::warn!("Permission cache write failed: {}", e);
    }

    Ok(ApiResponse::success(PermissionList { permissions: user.permissions }))
}
