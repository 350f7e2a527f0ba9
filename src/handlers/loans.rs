// handlers/loans.rs - /api/v1/loans
//
// Agents file loans for members of their groups; officers approve (which pays
// the principal out through the gateway) or reject pending ones.

use axum::extract::{Extension, Path, State};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::validation::clean_text;
use crate::api::{choices, parse_id, project, Choice, Field, Id, Valid};
use crate::database::models::profile;
use crate::database::models::{
    Disbursement, Group, ImageList, Loan, LoanStatus, NewDisbursement, NewLoan, Profile, ProfileKind,
};
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::{PageRequest, Scope};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, ItemBody, PageBody};
use crate::services::gateway::Payout;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoanRequest {
    #[serde(rename = "Amount")]
    #[validate(required)]
    pub amount: Option<Decimal>,
    #[serde(rename = "Term")]
    #[validate(required, range(min = 1))]
    pub term: Option<i32>,
    #[serde(rename = "DefaultImage")]
    pub default_image: ImageList,
    #[serde(rename = "Images")]
    pub images: ImageList,
    #[serde(rename = "LoanPurpose")]
    #[validate(required, length(min = 10))]
    pub loan_purpose: Option<String>,
    #[serde(rename = "GroupID")]
    #[validate(required, range(min = 1))]
    pub group_id: Option<i64>,
    #[serde(rename = "MemberID")]
    #[validate(required, range(min = 1))]
    pub member_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoanView {
    #[serde(rename = "ID")]
    pub id: i64,
    pub amount: Decimal,
    pub interest: f64,
    pub term: i32,
    pub default_image: ImageList,
    pub images: ImageList,
    pub loan_purpose: String,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    pub remaining_balance: Decimal,
    pub agent_first_name: String,
    pub agent_last_name: String,
    pub group_name: String,
    pub member_first_name: String,
    pub member_last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Loan> for LoanView {
    fn from(loan: Loan) -> Self {
        Self {
            id: loan.id,
            amount: loan.amount,
            interest: loan.interest,
            term: loan.term,
            default_image: loan.default_image.0,
            images: loan.images.0,
            loan_purpose: loan.loan_purpose,
            status: loan.status,
            due_date: loan.due_date,
            last_payment_date: loan.last_payment_date,
            remaining_balance: loan.remaining_balance,
            agent_first_name: loan.agent_first_name.unwrap_or_default(),
            agent_last_name: loan.agent_last_name.unwrap_or_default(),
            group_name: loan.group_name.unwrap_or_default(),
            member_first_name: loan.member_first_name.unwrap_or_default(),
            member_last_name: loan.member_last_name.unwrap_or_default(),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
        }
    }
}

/// Gateway acknowledgement of an approved loan's payout.
#[derive(Debug, Serialize)]
pub struct Approval {
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
}

#[derive(Debug, Serialize)]
pub struct Rejection {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Amount")]
    pub amount: Decimal,
}

const PENDING_FIELDS: [Field<Loan>; 9] = [
    Field::new("id", |l: &Loan| json!(l.id)),
    Field::new("amount", |l: &Loan| json!(l.amount)),
    Field::new("term", |l: &Loan| json!(l.term)),
    Field::new("created", |l: &Loan| json!(l.created_at)),
    Field::new("updated", |l: &Loan| json!(l.updated_at)),
    Field::new("agent_first_name", |l: &Loan| json!(l.agent_first_name)),
    Field::new("agent_last_name", |l: &Loan| json!(l.agent_last_name)),
    Field::new("member_first_name", |l: &Loan| json!(l.member_first_name)),
    Field::new("member_last_name", |l: &Loan| json!(l.member_last_name)),
];

fn loans(state: &AppState) -> Repository<Loan> {
    Repository::of(&state.pool)
}

/// 409 for a loan that already left `pending`.
fn ensure_pending(loan: &Loan) -> Result<(), ApiError> {
    match loan.decided() {
        Some(LoanStatus::Approved) => Err(ApiError::conflict("Loan has already been approved")),
        Some(_) => Err(ApiError::conflict("Loan has already been rejected")),
        None => Ok(()),
    }
}

/// M-Pesa takes the MSISDN as a bare number.
fn phone_number(raw: Option<&str>) -> Result<u64, ApiError> {
    raw.unwrap_or_default()
        .trim()
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("Invalid phone number format"))
}

async fn caller_profile(state: &AppState, kind: ProfileKind, user: &CurrentUser) -> Result<Option<Profile>, ApiError> {
    Ok(kind.for_user(&state.pool, user.id).await?)
}

async fn calling_officer(state: &AppState, user: &CurrentUser) -> Result<Profile, ApiError> {
    caller_profile(state, ProfileKind::Officer, user)
        .await?
        .ok_or_else(|| ApiError::not_found("Officer not found"))
}

/// POST /api/v1/loans/create - filed by the calling agent
pub async fn loan_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Valid(req): Valid<LoanRequest>,
) -> ApiResult<&'static str> {
    let amount = req.amount.unwrap_or_default();
    if amount <= Decimal::ZERO {
        return Err(ApiError::field("Amount", "'Amount' must be greater than 0"));
    }

    let agent = caller_profile(&state, ProfileKind::Agent, &user)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    let group = Repository::<Group>::of(&state.pool)
        .select_404(req.group_id.unwrap_or_default())
        .await?;
    let member = profile::members(&state.pool)
        .select_404(req.member_id.unwrap_or_default())
        .await?;

    let purpose = clean_text(req.loan_purpose.as_deref().unwrap_or_default());
    let id = Loan::insert(
        &state.pool,
        NewLoan {
            amount,
            term: req.term.unwrap_or_default(),
            default_image: &req.default_image,
            images: &req.images,
            member_id: member.profile.id,
            group_id: group.id,
            agent_id: agent.id,
            loan_purpose: &purpose,
        },
    )
    .await?;

    tracing::info!(loan_id = id, agent_id = agent.id, member_id = member.profile.id, "Loan filed");
    Ok(ApiResponse::done_created())
}

/// GET /api/v1/loans/paginate - pending loans
pub async fn pending_get(State(state): State<AppState>, Extension(request): Extension<PageRequest>) -> ApiResult<PageBody<Value>> {
    let mut page = loans(&state)
        .paginate(
            &request,
            [Scope::any_of("status", [LoanStatus::Pending.as_str()])],
            state.config.filter.legacy_total_count,
        )
        .await?;
    let items = project(&std::mem::take(&mut page.items), &PENDING_FIELDS);
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/loans/paginate/:groupId/:memberId - the calling agent's loans for one member of one group
pub async fn member_loans_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(request): Extension<PageRequest>,
    Path((group_id, member_id)): Path<(String, String)>,
) -> ApiResult<PageBody<Choice>> {
    let group_id = parse_id(&group_id)?;
    let group = Repository::<Group>::of(&state.pool).select_404(group_id).await?;
    let member_id = parse_id(&member_id)?;
    let member = profile::members(&state.pool).select_404(member_id).await?;

    let agent_id = caller_profile(&state, ProfileKind::Agent, &user)
        .await?
        .map(|agent| agent.id)
        .unwrap_or_default();

    let scopes = [
        Scope::positive("agent_id", agent_id),
        Scope::positive("group_id", group.id),
        Scope::positive("member_id", member.profile.id),
    ];
    let page = loans(&state)
        .paginate(&request, scopes.into_iter().flatten(), state.config.filter.legacy_total_count)
        .await?;
    let items = choices(&page.items, |l| l.id, |l| l.loan_purpose.clone());
    Ok(ApiResponse::page(page.with_items(items)))
}

/// GET /api/v1/loans/by/:id
pub async fn loan_get(State(state): State<AppState>, Id(id): Id) -> ApiResult<ItemBody<LoanView>> {
    Ok(ApiResponse::item(loans(&state).select_404(id).await?.into()))
}

/// PATCH /api/v1/loans/by/approve/:id - pays the principal out, then marks the loan approved
pub async fn approve_patch(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Id(id): Id,
) -> ApiResult<ItemBody<Approval>> {
    let loan = loans(&state).select_404(id).await?;
    let officer = calling_officer(&state, &user).await?;
    let phone = phone_number(loan.member_mobile_number.as_deref())?;
    ensure_pending(&loan)?;

    let payout = Payout {
        amount: loan.amount,
        phone_number: phone,
        remarks: "Loan disbursement".to_string(),
        occasion: "Loan".to_string(),
    };
    let receipt = state.gateway.disburse(&payout).await?;

    Disbursement::insert(
        &state.pool,
        NewDisbursement {
            loan_id: loan.id,
            officer_id: officer.id,
            originator_conversation_id: &receipt.originator_conversation_id,
            conversation_id: &receipt.conversation_id,
            response_code: &receipt.response_code,
            response_description: &receipt.response_description,
        },
    )
    .await?;
    Loan::approve(&state.pool, loan.id, officer.id).await?;

    tracing::info!(
        loan_id = loan.id,
        officer_id = officer.id,
        conversation_id = %receipt.conversation_id,
        "Loan approved and payout requested"
    );
    Ok(ApiResponse::item(Approval {
        conversation_id: receipt.conversation_id,
        response_code: receipt.response_code,
        response_description: receipt.response_description,
    }))
}

/// PATCH /api/v1/loans/by/reject/:id
pub async fn reject_patch(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Id(id): Id,
) -> ApiResult<ItemBody<Rejection>> {
    let loan = loans(&state).select_404(id).await?;
    let officer = calling_officer(&state, &user).await?;
    ensure_pending(&loan)?;

    Loan::reject(&state.pool, loan.id, officer.id).await?;
    tracing::info!(loan_id = loan.id, officer_id = officer.id, "Loan rejected");
    Ok(ApiResponse::item(Rejection { id: loan.id, amount: loan.amount }))
}
