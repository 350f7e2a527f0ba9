// handlers/members.rs - /api/v1/members

use axum::extract::{Extension, State};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use validator::Validate;

use crate::api::{project, Field, Id, Valid};
use crate::database::models::profile::{self, MEMBER_GROUPS};
use crate::database::models::{Group, Member, MemberGroup, ProfileKind};
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::{PageRequest, Scope};
use crate::handlers::profiles::{enroll, Membership, ProfileRequest};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, PageBody};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct MemberRequest {
    #[serde(flatten)]
    #[validate]
    pub person: ProfileRequest,
    #[serde(rename = "Groups")]
    #[validate(required)]
    pub groups: Option<Vec<i64>>,
}

/// A member row with the groups it belongs to.
struct Listed {
    member: Member,
    groups: Vec<Value>,
}

const LISTED_FIELDS: [Field<Listed>; 7] = [
    Field::new("id", |r: &Listed| json!(r.member.profile.id)),
    Field::new("member_first_name", |r: &Listed| json!(r.member.profile.first_name)),
    Field::new("member_last_name", |r: &Listed| json!(r.member.profile.last_name)),
    Field::new("member_status", |r: &Listed| json!(r.member.profile.is_active)),
    Field::new("agent_first_name", |r: &Listed| json!(r.member.agent_first_name)),
    Field::new("agent_last_name", |r: &Listed| json!(r.member.agent_last_name)),
    Field::new("groups", |r: &Listed| Value::Array(r.groups.clone())),
];

fn attach_groups(members: Vec<Member>, links: Vec<MemberGroup>) -> Vec<Listed> {
    let mut by_member: HashMap<i64, Vec<Value>> = HashMap::new();
    for link in links {
        by_member
            .entry(link.member_id)
            .or_default()
            .push(json!({ "id": link.id, "group_name": link.group_name }));
    }
    members
        .into_iter()
        .map(|member| {
            let groups = by_member.remove(&member.profile.id).unwrap_or_default();
            Listed { member, groups }
        })
        .collect()
}

/// The caller's agent profile id, 0 when the caller is not an agent.
async fn caller_agent(state: &AppState, user: &CurrentUser) -> Result<i64, ApiError> {
    Ok(ProfileKind::Agent
        .for_user(&state.pool, user.id)
        .await?
        .map(|agent| agent.id)
        .unwrap_or_default())
}

/// POST /api/v1/members/create - enrols a member under the calling agent
pub async fn member_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Valid(req): Valid<MemberRequest>,
) -> ApiResult<&'static str> {
    let agent_id = caller_agent(&state, &user).await?;
    if agent_id == 0 {
        return Err(ApiError::not_found("Agent not found"));
    }

    let groups: Vec<i64> = req.groups.unwrap_or_default().into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    let found = Repository::<Group>::of(&state.pool).select_ids(&groups).await?;
    if found.len() != groups.len() {
        return Err(ApiError::bad_request("Some groups do not exist"));
    }

    let membership = Membership { agent_id, groups: &groups };
    enroll(&state, ProfileKind::Member, &req.person, Some(membership)).await?;
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/members/paginate/:id - members of a group owned by the calling agent
pub async fn members_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(request): Extension<PageRequest>,
    Id(group_id): Id,
) -> ApiResult<PageBody<Value>> {
    Repository::<Group>::of(&state.pool).select_404(group_id).await?;
    let agent_id = caller_agent(&state, &user).await?;

    let scopes = std::iter::once(Scope::via(MEMBER_GROUPS, "gm.group_id", group_id))
        .chain(Scope::positive("agent_id", agent_id));
    let mut page = profile::members(&state.pool)
        .paginate(&request, scopes, state.config.filter.legacy_total_count)
        .await?;

    let ids: Vec<i64> = page.items.iter().map(|m| m.profile.id).collect();
    let links = Member::groups_of(&state.pool, &ids).await?;
    let listed = attach_groups(std::mem::take(&mut page.items), links);
    Ok(ApiResponse::page(page.with_items(project(&listed, &LISTED_FIELDS))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Profile;
    use chrono::Utc;

    fn member(id: i64, first: &str) -> Member {
        Member {
            profile: Profile {
                id,
                user_id: id + 100,
                is_active: true,
                last_login: None,
                country_id: 1,
                region_id: 1,
                city_id: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                first_name: first.into(),
                last_name: "Wanjiru".into(),
                email: format!("{}@example.com", first),
                mobile_number: "254700000002".into(),
            },
            agent_id: 3,
            agent_first_name: Some("Otieno".into()),
            agent_last_name: None,
        }
    }

    #[test]
    fn listing_carries_groups_per_member() {
        let links = vec![
            MemberGroup { member_id: 1, id: 5, group_name: "Umoja".into() },
            MemberGroup { member_id: 1, id: 6, group_name: "Tumaini".into() },
        ];
        let listed = attach_groups(vec![member(1, "Grace"), member(2, "Faith")], links);
        let items = project(&listed, &LISTED_FIELDS);

        assert_eq!(
            items[0],
            json!({
                "id": 1,
                "member_first_name": "Grace",
                "member_last_name": "Wanjiru",
                "member_status": true,
                "agent_first_name": "Otieno",
                "agent_last_name": null,
                "groups": [{ "id": 5, "group_name": "Umoja" }, { "id": 6, "group_name": "Tumaini" }]
            })
        );
        assert_eq!(items[1]["groups"], json!([]));
    }

    #[test]
    fn groups_are_required_alongside_profile_fields() {
        let req: MemberRequest = serde_json::from_value(json!({
            "FirstName": "Grace",
            "LastName": "Wanjiru",
            "Email": "grace@example.com",
            "MobileNumber": "254700000002",
            "CountryID": 1,
            "RegionID": 1,
            "CityID": 1
        }))
        .unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_json(), json!({ "validation_errors": { "Groups": ["'Groups' is required"] } }));
    }

    #[test]
    fn nested_profile_errors_surface_by_field_name() {
        let req: MemberRequest = serde_json::from_value(json!({ "FirstName": "Al", "Groups": [1] })).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        let fields = err.to_json()["validation_errors"].as_object().unwrap().clone();
        assert_eq!(fields["FirstName"], json!(["'FirstName' must have at least 3 characters"]));
        assert!(fields.contains_key("CityID"));
        assert!(!fields.contains_key("person"));
    }
}
