use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::database::manager::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisbursementStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DisbursementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisbursementStatus::Pending => "pending",
            DisbursementStatus::Processing => "processing",
            DisbursementStatus::Completed => "completed",
            DisbursementStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Disbursement {
    pub id: i64,
    pub originator_conversation_id: String,
    pub conversation_id: Option<String>,
    pub transaction_id: Option<String>,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub status: String,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub officer_id: Option<i64>,
    pub loan_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewDisbursement<'a> {
    pub loan_id: i64,
    pub officer_id: i64,
    pub originator_conversation_id: &'a str,
    pub conversation_id: &'a str,
    pub response_code: &'a str,
    pub response_description: &'a str,
}

/// Outcome reported by the gateway for one disbursement.
pub struct DisbursementResult<'a> {
    pub originator_conversation_id: &'a str,
    pub transaction_id: Option<&'a str>,
    pub result_code: &'a str,
    pub result_description: &'a str,
    pub status: DisbursementStatus,
}

impl Disbursement {
    pub async fn insert(pool: &PgPool, new: NewDisbursement<'_>) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO disbursements
                   (originator_conversation_id, conversation_id, response_code, response_description,
                    status, officer_id, loan_id)
               VALUES ($1, $2, $3, $4, 'pending', $5, $6)
               RETURNING id"#,
        )
        .bind(new.originator_conversation_id)
        .bind(new.conversation_id)
        .bind(new.response_code)
        .bind(new.response_description)
        .bind(new.officer_id)
        .bind(new.loan_id)
        .fetch_one(pool)
        .await
        .map_err(|e| DatabaseError::on_write(e, "Disbursement already exists"))
    }

    /// Records a gateway outcome; completed results also stamp `disbursed_at`.
    pub async fn record_result(pool: &PgPool, result: DisbursementResult<'_>) -> Result<Disbursement, DatabaseError> {
        sqlx::query_as::<_, Disbursement>(
            r#"UPDATE disbursements
               SET status = $2,
                   transaction_id = COALESCE($3, transaction_id),
                   response_code = $4,
                   response_description = $5,
                   disbursed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE disbursed_at END,
                   updated_at = NOW()
               WHERE originator_conversation_id = $1
               RETURNING *"#,
        )
        .bind(result.originator_conversation_id)
        .bind(result.status.as_str())
        .bind(result.transaction_id)
        .bind(result.result_code)
        .bind(result.result_description)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Disbursement not found".to_string()))
    }
}
