use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::database::manager::DatabaseError;

/// STK-push collection attempt against a loan.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub loan_id: i64,
    pub amount: Decimal,
    pub phone_number: String,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub status: String,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub transaction_description: Option<String>,
    pub payment_mode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewPayment<'a> {
    pub loan_id: i64,
    pub amount: Decimal,
    pub phone_number: &'a str,
    pub checkout_request_id: &'a str,
    pub merchant_request_id: Option<&'a str>,
    pub response_code: &'a str,
    pub response_description: &'a str,
    pub transaction_description: &'a str,
}

impl Payment {
    pub async fn insert(pool: &PgPool, new: NewPayment<'_>) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO payments
                   (loan_id, amount, phone_number, checkout_request_id, merchant_request_id, status,
                    response_code, response_description, transaction_description, payment_mode)
               VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, 'mpesa')
               RETURNING id"#,
        )
        .bind(new.loan_id)
        .bind(new.amount)
        .bind(new.phone_number)
        .bind(new.checkout_request_id)
        .bind(new.merchant_request_id)
        .bind(new.response_code)
        .bind(new.response_description)
        .bind(new.transaction_description)
        .fetch_one(pool)
        .await
        .map_err(|e| DatabaseError::on_write(e, "Payment already exists"))
    }

    /// Applies an STK callback: result code 0 completes the payment, anything else fails it.
    pub async fn record_callback(
        pool: &PgPool,
        checkout_request_id: &str,
        result_code: i64,
        result_description: &str,
    ) -> Result<Payment, DatabaseError> {
        let status = if result_code == 0 { "completed" } else { "failed" };
        sqlx::query_as::<_, Payment>(
            r#"UPDATE payments
               SET status = $2, response_code = $3, response_description = $4, updated_at = NOW()
               WHERE checkout_request_id = $1
               RETURNING *"#,
        )
        .bind(checkout_request_id)
        .bind(status)
        .bind(result_code.to_string())
        .bind(result_description)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Payment not found".to_string()))
    }
}
