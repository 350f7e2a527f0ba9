// handlers/profiles.rs - /api/v1/agents and /api/v1/officers
//
// Both routers carry their `ProfileKind` as an extension. Enrolment is shared
// with members: a user account, the matching role and the profile row are
// written in one transaction, then a welcome email goes out.

use axum::extract::{Extension, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::validation::clean_name;
use crate::api::{choices, Choice, Id, Valid};
use crate::database::models::profile::{self, Placement};
use crate::database::models::{Member, NewUser, Profile, ProfileKind, User};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::filter::{PageRequest, Scope};
use crate::handlers::deliver;
use crate::middleware::{ApiResponse, ApiResult, ItemBody, PageBody};
use crate::services::notifier::templates::{self, Welcome};
use crate::state::AppState;

type Kind = Extension<ProfileKind>;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ProfileRequest {
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

impl ProfileRequest {
    pub fn placement(&self) -> Placement {
        Placement {
            country_id: self.country_id.unwrap_or_default(),
            region_id: self.region_id.unwrap_or_default(),
            city_id: self.city_id.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateProfileRequest {
    #[serde(rename = "IsActive")]
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub id: i64,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "MobileNumber")]
    pub mobile_number: String,
    #[serde(rename = "IsActive")]
    pub is_active: bool,
}

impl From<Profile> for ProfileView {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            mobile_number: profile.mobile_number,
            is_active: profile.is_active,
        }
    }
}

/// Member-only parts of an enrolment.
pub struct Membership<'a> {
    pub agent_id: i64,
    pub groups: &'a [i64],
}

fn welcome_kind(kind: ProfileKind) -> Welcome {
    match kind {
        ProfileKind::Agent => Welcome::Agent,
        ProfileKind::Officer => Welcome::Officer,
        ProfileKind::Member => Welcome::Member,
    }
}

/// Creates an active user whose first password is their mobile number, grants
/// the role named after the profile kind and writes the profile.
pub async fn enroll(state: &AppState, kind: ProfileKind, req: &ProfileRequest, membership: Option<Membership<'_>>) -> Result<i64, ApiError> {
    let first_name = clean_name(req.first_name.as_deref().unwrap_or_default());
    let last_name = clean_name(req.last_name.as_deref().unwrap_or_default());
    let email = req.email.as_deref().unwrap_or_default();
    let mobile_number = req.mobile_number.as_deref().unwrap_or_default();

    let password_hash = state.auth.hash(mobile_number).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::internal_server_error("Password hashing failed")
    })?;

    let mut tx = state.pool.begin().await.map_err(DatabaseError::from)?;
    let user_id = User::insert(
        &mut *tx,
        NewUser {
            first_name: &first_name,
            last_name: &last_name,
            email,
            mobile_number,
            password_hash: &password_hash,
            is_active: true,
            activation_token: None,
            activation_expires_at: None,
        },
    )
    .await?;
    User::assign_role_named(&mut *tx, user_id, kind.noun()).await?;

    let profile_id = kind
        .insert(&mut *tx, user_id, req.placement(), membership.as_ref().map(|m| m.agent_id))
        .await?;
    if let Some(membership) = &membership {
        Member::replace_groups(&mut tx, profile_id, membership.groups).await?;
    }
    tx.commit().await.map_err(DatabaseError::from)?;
    tracing::info!(user_id, profile_id, kind = kind.noun(), "Profile enrolled");

    let login_url = format!("{}/login", state.config.frontend_url());
    let name = format!("{} {}", first_name, last_name);
    let message = templates::welcome(welcome_kind(kind), email, &name, &login_url, &state.config.company);
    deliver(state, &message, "Failed to send welcome email").await?;

    Ok(profile_id)
}

/// POST /api/v1/<agents|officers>/create
pub async fn profile_post(State(state): State<AppState>, Extension(kind): Kind, Valid(req): Valid<ProfileRequest>) -> ApiResult<&'static str> {
    enroll(&state, kind, &req, None).await?;
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/<agents|officers>/paginate
pub async fn profiles_get(
    State(state): State<AppState>,
    Extension(kind): Kind,
    Extension(request): Extension<PageRequest>,
) -> ApiResult<PageBody<Choice>> {
    let page = profile::repository(&state.pool, kind)
        .paginate(&request, [], state.config.filter.legacy_total_count)
        .await?;
    let items = choices(&page.items, |p| p.id, Profile::full_name);
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/<agents|officers>/by/:id
pub async fn profile_get(State(state): State<AppState>, Extension(kind): Kind, Id(id): Id) -> ApiResult<ItemBody<ProfileView>> {
    let profile = profile::repository(&state.pool, kind).select_404(id).await?;
    Ok(ApiResponse::item(profile.into()))
}

/// PATCH /api/v1/<agents|officers>/by/:id
pub async fn profile_patch(
    State(state): State<AppState>,
    Extension(kind): Kind,
    Id(id): Id,
    Valid(req): Valid<UpdateProfileRequest>,
) -> ApiResult<ItemBody<ProfileView>> {
    kind.set_active(&state.pool, id, req.is_active).await?;
    let profile = profile::repository(&state.pool, kind).select_404(id).await?;
    Ok(ApiResponse::item(profile.into()))
}

/// GET /api/v1/<agents|officers>/all
pub async fn all_get(State(state): State<AppState>, Extension(kind): Kind) -> ApiResult<ItemBody<Vec<Choice>>> {
    let records = profile::repository(&state.pool, kind).select_any([]).await?;
    Ok(ApiResponse::item(choices(&records, |p| p.id, Profile::full_name)))
}

/// GET /api/v1/<agents|officers>/by/count - active profiles
pub async fn count_get(State(state): State<AppState>, Extension(kind): Kind) -> ApiResult<ItemBody<Value>> {
    let count = profile::repository(&state.pool, kind)
        .count([Scope::eq("is_active", true)])
        .await?;
    Ok(ApiResponse::item(json!({ "count": count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_ids_are_required() {
        let req: ProfileRequest = serde_json::from_value(json!({
            "FirstName": "Achieng",
            "LastName": "Otieno",
            "Email": "achieng@example.com",
            "MobileNumber": "254700000001",
            "CountryID": 1,
            "RegionID": 0
        }))
        .unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(
            err.to_json(),
            json!({ "validation_errors": {
                "CityID": ["'CityID' is required"],
                "RegionID": ["'RegionID' must be at least 1"]
            }})
        );
    }

    #[test]
    fn view_uses_pascal_case_keys() {
        let view = ProfileView {
            id: 4,
            first_name: "Achieng".into(),
            last_name: "Otieno".into(),
            email: "achieng@example.com".into(),
            mobile_number: "254700000001".into(),
            is_active: true,
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "id": 4, "FirstName": "Achieng", "LastName": "Otieno",
                "Email": "achieng@example.com", "MobileNumber": "254700000001", "IsActive": true
            })
        );
    }
}
