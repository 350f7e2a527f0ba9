// handlers/geo.rs - CRUD for every level of the geography tree
//
// Each level router carries its `GeoLevel` as an extension, so one set of
// handlers serves countries through units.

use axum::extract::{Extension, State};
use serde_json::{json, Map, Value};

use crate::api::validation::{clean_name, Checks};
use crate::api::{choices, Body, Choice, Id};
use crate::database::models::{GeoLevel, GeoNode};
use crate::database::Repository;
use crate::filter::{PageRequest, Scope};
use crate::middleware::{ApiResponse, ApiResult, ItemBody, PageBody};
use crate::state::AppState;

type Level = Extension<&'static GeoLevel>;

fn nodes(state: &AppState, level: &GeoLevel) -> Repository<GeoNode> {
    Repository::new(&state.pool, level.spec(), level.noun)
}

fn titles(records: &[GeoNode]) -> Vec<Choice> {
    choices(records, |n| n.id, |n| n.name.clone())
}

/// Level-specific shape: the name and parent keys use the table's column names.
fn node_json(level: &GeoLevel, node: &GeoNode) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), json!(node.id));
    object.insert(level.name_column.to_string(), json!(node.name));
    if let Some(parent) = level.parent {
        object.insert(parent.column.to_string(), json!(node.parent_id));
    }
    object.insert("created_at".to_string(), json!(node.created_at));
    object.insert("updated_at".to_string(), json!(node.updated_at));
    Value::Object(object)
}

/// Reads `{<Level>Name, <Parent>ID}` from a body whose keys depend on the level.
fn read_body(level: &GeoLevel, body: &Map<String, Value>) -> Result<(String, Option<i64>), crate::error::ApiError> {
    let name = body.get(level.name_field).and_then(Value::as_str);
    let parent_id = level.parent.and_then(|p| body.get(p.field)).and_then(Value::as_i64);

    let mut checks = Checks::new();
    checks.text(level.name_field, name, 3, 100);
    if let Some(parent) = level.parent {
        checks.id(parent.field, parent_id);
    }
    checks.finish()?;

    Ok((clean_name(name.unwrap_or_default()), parent_id))
}

/// POST /api/v1/<level>/create
pub async fn node_post(State(state): State<AppState>, Extension(level): Level, Body(body): Body<Map<String, Value>>) -> ApiResult<&'static str> {
    let (name, parent_id) = read_body(level, &body)?;
    let id = level.insert(&state.pool, &name, parent_id).await?;
    tracing::info!(id, level = level.noun, "Geography node created");
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/<level>/paginate
pub async fn nodes_get(
    State(state): State<AppState>,
    Extension(level): Level,
    Extension(request): Extension<PageRequest>,
) -> ApiResult<PageBody<Choice>> {
    let page = nodes(&state, level)
        .paginate(&request, [], state.config.filter.legacy_total_count)
        .await?;
    let items = titles(&page.items);
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/<level>/by/:id
pub async fn node_get(State(state): State<AppState>, Extension(level): Level, Id(id): Id) -> ApiResult<ItemBody<Value>> {
    let node = nodes(&state, level).select_404(id).await?;
    Ok(ApiResponse::item(node_json(level, &node)))
}

/// PATCH /api/v1/<level>/by/:id
pub async fn node_patch(
    State(state): State<AppState>,
    Extension(level): Level,
    Id(id): Id,
    Body(body): Body<Map<String, Value>>,
) -> ApiResult<ItemBody<Value>> {
    let (name, parent_id) = read_body(level, &body)?;
    level.update(&state.pool, id, &name, parent_id).await?;
    let node = nodes(&state, level).select_404(id).await?;
    Ok(ApiResponse::item(node_json(level, &node)))
}

/// DELETE /api/v1/<level>/by/:id - children go with it
pub async fn node_delete(State(state): State<AppState>, Extension(level): Level, Id(id): Id) -> ApiResult<&'static str> {
    nodes(&state, level).delete_404(id).await?;
    tracing::info!(id, level = level.noun, "Geography node deleted");
    Ok(ApiResponse::done())
}

/// GET /api/v1/<level>/all and /all/no-auth
pub async fn all_get(State(state): State<AppState>, Extension(level): Level) -> ApiResult<ItemBody<Vec<Choice>>> {
    let records = nodes(&state, level).select_any([]).await?;
    Ok(ApiResponse::item(titles(&records)))
}

/// GET /api/v1/<level>/by/<children>/:id
pub async fn children_get(State(state): State<AppState>, Extension(level): Level, Id(id): Id) -> ApiResult<ItemBody<Vec<Choice>>> {
    nodes(&state, level).select_404(id).await?;

    let Some((child, parent)) = level.child().and_then(|c| c.parent.map(|p| (c, p))) else {
        return Ok(ApiResponse::item(vec![]));
    };
    let records = nodes(&state, child).select_any([Scope::eq(parent.column, id)]).await?;
    Ok(ApiResponse::item(titles(&records)))
}
