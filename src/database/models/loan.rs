use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::database::models::image::ImageList;
use crate::database::repository::Entity;
use crate::filter::{EntitySpec, Join};

/// Flat interest rate applied to every new loan.
pub const FLAT_INTEREST: f64 = 10.0;

pub const LOAN_AGENT: Join = Join::left("agents", "a", "a.id", "agent_id");
pub const LOAN_AGENT_USER: Join = Join::left("users", "au", "au.id", "a.user_id");
pub const LOAN_MEMBER: Join = Join::left("members", "m", "m.id", "member_id");
pub const LOAN_MEMBER_USER: Join = Join::left("users", "mu", "mu.id", "m.user_id");
pub const LOAN_GROUP: Join = Join::left("groups", "g", "g.id", "group_id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Loan {
    pub id: i64,
    pub amount: Decimal,
    pub interest: f64,
    pub term: i32,
    pub default_image: Json<ImageList>,
    pub images: Json<ImageList>,
    pub status: String,
    pub officer_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub remaining_balance: Decimal,
    pub is_fully_paid: bool,
    pub due_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    pub member_id: i64,
    pub group_id: i64,
    pub agent_id: i64,
    pub loan_purpose: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_first_name: Option<String>,
    pub agent_last_name: Option<String>,
    pub member_first_name: Option<String>,
    pub member_last_name: Option<String>,
    pub member_mobile_number: Option<String>,
    pub group_name: Option<String>,
}

impl Entity for Loan {
    const NOUN: &'static str = "Loan";

    fn spec() -> EntitySpec {
        EntitySpec::new("loans")
            .select([
                r#""loans".*"#,
                r#""au"."first_name" AS agent_first_name"#,
                r#""au"."last_name" AS agent_last_name"#,
                r#""mu"."first_name" AS member_first_name"#,
                r#""mu"."last_name" AS member_last_name"#,
                r#""mu"."mobile_number" AS member_mobile_number"#,
                r#""g"."group_name" AS group_name"#,
            ])
            .join(LOAN_AGENT)
            .join(LOAN_AGENT_USER)
            .join(LOAN_MEMBER)
            .join(LOAN_MEMBER_USER)
            .join(LOAN_GROUP)
            .search(["loan_purpose"])
            .filters(["id", "status", "agent_id", "group_id", "member_id", "officer_id", "is_fully_paid"])
    }
}

pub struct NewLoan<'a> {
    pub amount: Decimal,
    pub term: i32,
    pub default_image: &'a ImageList,
    pub images: &'a ImageList,
    pub member_id: i64,
    pub group_id: i64,
    pub agent_id: i64,
    pub loan_purpose: &'a str,
}

impl Loan {
    /// Status, when it is one of the decided states.
    pub fn decided(&self) -> Option<LoanStatus> {
        match self.status.as_str() {
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            _ => None,
        }
    }

    /// Inserts a pending loan whose remaining balance starts at the principal.
    pub async fn insert(pool: &PgPool, loan: NewLoan<'_>) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO loans
                   (amount, interest, term, default_image, images, status, remaining_balance,
                    is_fully_paid, member_id, group_id, agent_id, loan_purpose)
               VALUES ($1, $2, $3, $4, $5, 'pending', $1, FALSE, $6, $7, $8, $9)
               RETURNING id"#,
        )
        .bind(loan.amount)
        .bind(FLAT_INTEREST)
        .bind(loan.term)
        .bind(Json(loan.default_image))
        .bind(Json(loan.images))
        .bind(loan.member_id)
        .bind(loan.group_id)
        .bind(loan.agent_id)
        .bind(loan.loan_purpose)
        .fetch_one(pool)
        .await
        .map_err(|e| DatabaseError::on_write(e, "Loan already exists"))
    }

    pub async fn approve(pool: &PgPool, id: i64, officer_id: i64) -> Result<(), DatabaseError> {
        Self::decide(pool, id, officer_id, LoanStatus::Approved).await
    }

    pub async fn reject(pool: &PgPool, id: i64, officer_id: i64) -> Result<(), DatabaseError> {
        Self::decide(pool, id, officer_id, LoanStatus::Rejected).await
    }

    /// Moves a pending loan to a decided state, stamping the matching timestamp.
    async fn decide(pool: &PgPool, id: i64, officer_id: i64, status: LoanStatus) -> Result<(), DatabaseError> {
        let stamp = match status {
            LoanStatus::Approved => "approved_at",
            _ => "rejected_at",
        };
        let query = format!(
            "UPDATE loans SET status = $2, officer_id = $3, {} = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
            stamp
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(officer_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::Conflict("Loan is no longer pending".to_string()));
        }
        Ok(())
    }

    pub async fn mark_disbursed(pool: &PgPool, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE loans SET disbursed_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, Scope};

    #[test]
    fn agent_loans_scope_skips_unset_ids() {
        let mut filter = Filter::new(Loan::spec()).unwrap();
        filter
            .scopes(Scope::positive("agent_id", 4))
            .scopes(Scope::positive("group_id", 0))
            .scopes(Scope::positive("member_id", 9));
        let sql = filter.to_sql().unwrap();
        assert!(sql.query.contains(r#"WHERE "loans"."agent_id" = $1 AND "loans"."member_id" = $2"#));
        assert!(!sql.query.contains(r#""loans"."group_id" ="#));
        assert!(sql.query.contains(r#"LEFT JOIN "groups" AS "g" ON "g"."id" = "loans"."group_id""#));
    }

    #[test]
    fn pending_scope_uses_in_list() {
        let mut filter = Filter::new(Loan::spec()).unwrap();
        filter.scope(Scope::any_of("status", [LoanStatus::Pending.as_str()]));
        let count = filter.to_scoped_count_sql().unwrap();
        assert!(count.query.starts_with(r#"SELECT COUNT(DISTINCT "loans"."id") AS count FROM "loans""#));
        assert!(count.query.contains(r#""loans"."status" IN ($1)"#));
        assert_eq!(count.params, vec![serde_json::json!("pending")]);
    }
}
