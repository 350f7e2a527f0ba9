// handlers/groups.rs - /api/v1/groups

use axum::extract::{Extension, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use validator::Validate;

use crate::api::validation::clean_name;
use crate::api::{choices, project, Choice, Field, Id, Valid};
use crate::database::models::profile;
use crate::database::models::{Group, GroupMember, Placement, ProfileKind};
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::{PageRequest, Scope};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, ItemBody, PageBody};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GroupRequest {
    #[serde(rename = "GroupName")]
    #[validate(required, length(min = 3, max = 100))]
    pub group_name: Option<String>,
    #[serde(rename = "AgentID")]
    #[validate(required, range(min = 1))]
    pub agent_id: Option<i64>,
    #[serde(rename = "CountryID")]
    #[validate(required, range(min = 1))]
    pub country_id: Option<i64>,
    #[serde(rename = "RegionID")]
    #[validate(required, range(min = 1))]
    pub region_id: Option<i64>,
    #[serde(rename = "CityID")]
    #[validate(required, range(min = 1))]
    pub city_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateGroupRequest {
    #[serde(rename = "IsActive")]
    pub is_active: bool,
    #[serde(rename = "AgentID")]
    #[validate(required, range(min = 1))]
    pub agent_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: i64,
    #[serde(rename = "GroupName")]
    pub group_name: String,
    #[serde(rename = "AgentID")]
    pub agent_id: i64,
    #[serde(rename = "IsActive")]
    pub is_active: bool,
}

impl From<Group> for GroupView {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            group_name: group.group_name,
            agent_id: group.agent_id,
            is_active: group.is_active,
        }
    }
}

struct Owned {
    group: Group,
    members: Vec<Value>,
}

const OWNED_FIELDS: [Field<Owned>; 7] = [
    Field::new("id", |r: &Owned| json!(r.group.id)),
    Field::new("group_name", |r: &Owned| json!(r.group.group_name)),
    Field::new("created", |r: &Owned| json!(r.group.created_at)),
    Field::new("updated", |r: &Owned| json!(r.group.updated_at)),
    Field::new("agent_first_name", |r: &Owned| json!(r.group.agent_first_name)),
    Field::new("agent_last_name", |r: &Owned| json!(r.group.agent_last_name)),
    Field::new("members", |r: &Owned| Value::Array(r.members.clone())),
];

fn attach_members(groups: Vec<Group>, links: Vec<GroupMember>) -> Vec<Owned> {
    let mut by_group: HashMap<i64, Vec<Value>> = HashMap::new();
    for link in links {
        by_group.entry(link.group_id).or_default().push(json!({
            "id": link.id,
            "member_first_name": link.member_first_name,
            "member_last_name": link.member_last_name,
        }));
    }
    groups
        .into_iter()
        .map(|group| {
            let members = by_group.remove(&group.id).unwrap_or_default();
            Owned { group, members }
        })
        .collect()
}

fn groups(state: &AppState) -> Repository<Group> {
    Repository::of(&state.pool)
}

/// POST /api/v1/groups/create
pub async fn group_post(State(state): State<AppState>, Valid(req): Valid<GroupRequest>) -> ApiResult<&'static str> {
    let agent_id = req.agent_id.unwrap_or_default();
    if profile::repository(&state.pool, ProfileKind::Agent).find(agent_id).await?.is_none() {
        return Err(ApiError::not_found("Agent not found"));
    }

    let placement = Placement {
        country_id: req.country_id.unwrap_or_default(),
        region_id: req.region_id.unwrap_or_default(),
        city_id: req.city_id.unwrap_or_default(),
    };
    let name = clean_name(req.group_name.as_deref().unwrap_or_default());
    let id = Group::insert(&state.pool, &name, agent_id, placement).await?;

    tracing::info!(group_id = id, agent_id, "Group created");
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/groups/paginate
pub async fn groups_get(State(state): State<AppState>, Extension(request): Extension<PageRequest>) -> ApiResult<PageBody<Choice>> {
    let page = groups(&state).paginate(&request, [], state.config.filter.legacy_total_count).await?;
    let items = choices(&page.items, |g| g.id, |g| g.group_name.clone());
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/groups/paginate/my - the calling agent's groups with their members
pub async fn my_groups_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(request): Extension<PageRequest>,
) -> ApiResult<PageBody<Value>> {
    // Callers without an agent profile own nothing; agent id 0 matches no row.
    let agent_id = ProfileKind::Agent
        .for_user(&state.pool, user.id)
        .await?
        .map(|agent| agent.id)
        .unwrap_or_default();

    let mut page = groups(&state)
        .paginate(&request, [Scope::eq("agent_id", agent_id)], state.config.filter.legacy_total_count)
        .await?;

    let ids: Vec<i64> = page.items.iter().map(|g| g.id).collect();
    let links = Group::members_of(&state.pool, &ids).await?;
    let owned = attach_members(std::mem::take(&mut page.items), links);
    Ok(ApiResponse::page(page.with_items(project(&owned, &OWNED_FIELDS))))
}

/// GET /api/v1/groups/by/count - active groups
pub async fn count_get(State(state): State<AppState>) -> ApiResult<ItemBody<Value>> {
    let count = groups(&state).count([Scope::eq("is_active", true)]).await?;
    Ok(ApiResponse::item(json!({ "count": count })))
}

/// GET /api/v1/groups/by/:id
pub async fn group_get(State(state): State<AppState>, Id(id): Id) -> ApiResult<ItemBody<GroupView>> {
    Ok(ApiResponse::item(groups(&state).select_404(id).await?.into()))
}

/// PATCH /api/v1/groups/by/:id - active flag and owning agent
pub async fn group_patch(State(state): State<AppState>, Id(id): Id, Valid(req): Valid<UpdateGroupRequest>) -> ApiResult<ItemBody<GroupView>> {
    let agent_id = req.agent_id.unwrap_or_default();
    if profile::repository(&state.pool, ProfileKind::Agent).find(agent_id).await?.is_none() {
        return Err(ApiError::not_found("Agent not found"));
    }

    Group::update(&state.pool, id, req.is_active, agent_id).await?;
    tracing::info!(group_id = id, agent_id, is_active = req.is_active, "Group updated");
    Ok(ApiResponse::item(groups(&state).select_404(id).await?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn group(id: i64, name: &str) -> Group {
        let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        Group {
            id,
            group_name: name.into(),
            is_active: true,
            agent_id: 2,
            country_id: 1,
            region_id: 1,
            city_id: 1,
            created_at: stamp,
            updated_at: stamp,
            agent_first_name: Some("Otieno".into()),
            agent_last_name: Some("Kamau".into()),
        }
    }

    #[test]
    fn owned_groups_list_members_under_each_group() {
        let links = vec![GroupMember {
            group_id: 9,
            id: 4,
            member_first_name: "Grace".into(),
            member_last_name: "Wanjiru".into(),
        }];
        let owned = attach_members(vec![group(9, "Umoja"), group(10, "Tumaini")], links);
        let items = project(&owned, &OWNED_FIELDS);

        let keys: Vec<_> = items[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "group_name", "created", "updated", "agent_first_name", "agent_last_name", "members"]);
        assert_eq!(items[0]["members"], json!([{ "id": 4, "member_first_name": "Grace", "member_last_name": "Wanjiru" }]));
        assert_eq!(items[1]["members"], json!([]));
    }

    #[test]
    fn update_requires_an_agent() {
        let req: UpdateGroupRequest = serde_json::from_value(json!({ "IsActive": false })).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_json(), json!({ "validation_errors": { "AgentID": ["'AgentID' is required"] } }));
    }

    #[test]
    fn view_matches_group_response_shape() {
        let view: GroupView = group(3, "Umoja").into();
        assert_eq!(
            serde_json::to_value(view).unwrap(),
            json!({ "id": 3, "GroupName": "Umoja", "AgentID": 2, "IsActive": true })
        );
    }
}
