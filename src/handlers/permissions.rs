// handlers/permissions.rs - /api/v1/permissions

use axum::extract::{Extension, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::validation::clean_name;
use crate::api::{choices, Choice, Id, Valid};
use crate::database::models::{Permission, PermissionUsage, Role};
use crate::database::{DatabaseError, Repository};
use crate::error::ApiError;
use crate::filter::PageRequest;
use crate::middleware::{ApiResponse, ApiResult, ItemBody, PageBody};
use crate::state::AppState;

/// Body of both create and update: the name and every role granting it.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PermissionRequest {
    #[serde(rename = "PermissionName")]
    #[validate(required, length(min = 3, max = 100))]
    pub permission_name: Option<String>,
    #[serde(rename = "Roles")]
    #[validate(required)]
    pub roles: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct PermissionView {
    pub id: i64,
    pub permission_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

fn permissions(state: &AppState) -> Repository<Permission> {
    Repository::of(&state.pool)
}

async fn load_view(state: &AppState, id: i64) -> Result<PermissionView, ApiError> {
    let permission = permissions(state).select_404(id).await?;
    let roles = Role::for_permission(&state.pool, id).await?;
    Ok(PermissionView {
        id: permission.id,
        permission_name: permission.permission_name,
        created_at: permission.created_at,
        updated_at: permission.updated_at,
        roles,
    })
}

/// POST /api/v1/permissions/create
pub async fn permission_post(State(state): State<AppState>, Valid(req): Valid<PermissionRequest>) -> ApiResult<&'static str> {
    let name = clean_name(req.permission_name.as_deref().unwrap_or_default());
    let roles = req.roles.unwrap_or_default();

    let mut tx = state.pool.begin().await.map_err(DatabaseError::from)?;
    let id = Permission::insert(&mut tx, &name).await?;
    Permission::replace_roles(&mut tx, id, &roles).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    tracing::info!(permission_id = id, "Permission created");
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/permissions/paginate
pub async fn permissions_get(State(state): State<AppState>, Extension(request): Extension<PageRequest>) -> ApiResult<PageBody<Choice>> {
    let page = permissions(&state)
        .paginate(&request, [], state.config.filter.legacy_total_count)
        .await?;
    let items = choices(&page.items, |p| p.id, |p| p.permission_name.clone());
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/permissions/by/:id
pub async fn permission_get(State(state): State<AppState>, Id(id): Id) -> ApiResult<ItemBody<PermissionView>> {
    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// PATCH /api/v1/permissions/by/:id
pub async fn permission_patch(
    State(state): State<AppState>,
    Id(id): Id,
    Valid(req): Valid<PermissionRequest>,
) -> ApiResult<ItemBody<PermissionView>> {
    let name = clean_name(req.permission_name.as_deref().unwrap_or_default());
    let roles = req.roles.unwrap_or_default();

    let mut tx = state.pool.begin().await.map_err(DatabaseError::from)?;
    Permission::rename(&mut tx, id, &name).await?;
    Permission::replace_roles(&mut tx, id, &roles).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// DELETE /api/v1/permissions/by/:id
pub async fn permission_delete(State(state): State<AppState>, Id(id): Id) -> ApiResult<&'static str> {
    permissions(&state).delete_404(id).await?;
    tracing::info!(permission_id = id, "Permission deleted");
    Ok(ApiResponse::done())
}

/// GET /api/v1/permissions/all
pub async fn all_get(State(state): State<AppState>) -> ApiResult<ItemBody<Vec<Choice>>> {
    let records = permissions(&state).select_any([]).await?;
    Ok(ApiResponse::item(choices(&records, |p| p.id, |p| p.permission_name.clone())))
}

/// GET /api/v1/permissions/by/roles - permission name with the number of granting roles
pub async fn usage_get(State(state): State<AppState>) -> ApiResult<ItemBody<Vec<PermissionUsage>>> {
    Ok(ApiResponse::item(Permission::usage(&state.pool).await?))
}

/// GET /api/v1/permissions/by/count
pub async fn count_get(State(state): State<AppState>) -> ApiResult<ItemBody<Value>> {
    let count = permissions(&state).count([]).await?;
    Ok(ApiResponse::item(json!({ "count": count })))
}
