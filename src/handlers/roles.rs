// handlers/roles.rs - /api/v1/roles

use axum::extract::{Extension, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::validation::clean_name;
use crate::api::{choices, Choice, Id, Valid};
use crate::database::models::{Permission, Role, RoleUsage};
use crate::database::{DatabaseError, Repository};
use crate::error::ApiError;
use crate::filter::PageRequest;
use crate::middleware::{ApiResponse, ApiResult, ItemBody, PageBody};
use crate::state::AppState;

/// Body of both create and update: the name and the complete permission set.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RoleRequest {
    #[serde(rename = "RoleName")]
    #[validate(required, length(min = 3, max = 100))]
    pub role_name: Option<String>,
    #[serde(rename = "Permissions")]
    #[validate(required)]
    pub permissions: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct RoleView {
    pub id: i64,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
}

fn roles(state: &AppState) -> Repository<Role> {
    Repository::of(&state.pool)
}

async fn load_view(state: &AppState, id: i64) -> Result<RoleView, ApiError> {
    let role = roles(state).select_404(id).await?;
    let permissions = Permission::for_role(&state.pool, id).await?;
    Ok(RoleView {
        id: role.id,
        role_name: role.role_name,
        created_at: role.created_at,
        updated_at: role.updated_at,
        permissions,
    })
}

/// POST /api/v1/roles/create
pub async fn role_post(State(state): State<AppState>, Valid(req): Valid<RoleRequest>) -> ApiResult<&'static str> {
    let name = clean_name(req.role_name.as_deref().unwrap_or_default());
    let permissions = req.permissions.unwrap_or_default();

    let mut tx = state.pool.begin().await.map_err(DatabaseError::from)?;
    let id = Role::insert(&mut tx, &name).await?;
    Role::replace_permissions(&mut tx, id, &permissions).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    tracing::info!(role_id = id, "Role created");
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/roles/paginate
pub async fn roles_get(State(state): State<AppState>, Extension(request): Extension<PageRequest>) -> ApiResult<PageBody<Choice>> {
    let page = roles(&state).paginate(&request, [], state.config.filter.legacy_total_count).await?;
    let items = choices(&page.items, |r| r.id, |r| r.role_name.clone());
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/roles/by/:id
pub async fn role_get(State(state): State<AppState>, Id(id): Id) -> ApiResult<ItemBody<RoleView>> {
    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// PATCH /api/v1/roles/by/:id
pub async fn role_patch(State(state): State<AppState>, Id(id): Id, Valid(req): Valid<RoleRequest>) -> ApiResult<ItemBody<RoleView>> {
    let name = clean_name(req.role_name.as_deref().unwrap_or_default());
    let permissions = req.permissions.unwrap_or_default();

    let mut tx = state.pool.begin().await.map_err(DatabaseError::from)?;
    Role::rename(&mut tx, id, &name).await?;
    Role::replace_permissions(&mut tx, id, &permissions).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    Ok(ApiResponse::item(load_view(&state, id).await?))
}

/// DELETE /api/v1/roles/by/:id
pub async fn role_delete(State(state): State<AppState>, Id(id): Id) -> ApiResult<&'static str> {
    roles(&state).delete_404(id).await?;
    tracing::info!(role_id = id, "Role deleted");
    Ok(ApiResponse::done())
}

/// GET /api/v1/roles/all
pub async fn all_get(State(state): State<AppState>) -> ApiResult<ItemBody<Vec<Choice>>> {
    let records = roles(&state).select_any([]).await?;
    Ok(ApiResponse::item(choices(&records, |r| r.id, |r| r.role_name.clone())))
}

/// GET /api/v1/roles/by/users - role name with the number of holders
pub async fn usage_get(State(state): State<AppState>) -> ApiResult<ItemBody<Vec<RoleUsage>>> {
    Ok(ApiResponse::item(Role::usage(&state.pool).await?))
}

/// GET /api/v1/roles/by/count
pub async fn count_get(State(state): State<AppState>) -> ApiResult<ItemBody<Value>> {
    let count = roles(&state).count([]).await?;
    Ok(ApiResponse::item(json!({ "count": count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_list_is_required() {
        let req: RoleRequest = serde_json::from_value(json!({ "RoleName": "Auditor" })).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_json(), json!({ "validation_errors": { "Permissions": ["'Permissions' is required"] } }));
    }

    #[test]
    fn empty_permission_list_is_allowed() {
        let req: RoleRequest = serde_json::from_value(json!({ "RoleName": "Auditor", "Permissions": [] })).unwrap();
        assert!(req.validate().is_ok());
    }
}
