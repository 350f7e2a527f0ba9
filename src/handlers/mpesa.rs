// handlers/mpesa.rs - /api/v1/mpesa
//
// B2C result/timeout webhooks settle disbursements created by loan approval.
// STK push asks a borrower's phone for a repayment; its callback settles the
// matching payment row. Balances are not touched by either.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::{Body, Valid};
use crate::database::models::{Disbursement, DisbursementResult, DisbursementStatus, Loan, NewPayment, Payment};
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ItemBody};
use crate::services::gateway::Collection;
use crate::state::AppState;

/// `{"Result": {...}}` posted by the gateway for B2C payouts.
#[derive(Debug, Deserialize)]
pub struct B2cCallback {
    #[serde(rename = "Result")]
    pub result: B2cResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct B2cResult {
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID", default)]
    pub conversation_id: String,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: Option<String>,
}

/// `{"Body": {"stkCallback": {...}}}` posted for STK pushes.
#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkResult {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct StkPushRequest {
    #[serde(rename = "LoanID")]
    #[validate(required, range(min = 1))]
    pub loan_id: Option<i64>,
    #[serde(rename = "Amount")]
    #[validate(required)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisbursementAck {
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "TransactionID")]
    pub transaction_id: Option<String>,
    pub result_code: i64,
    pub result_desc: String,
    pub status: DisbursementStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushAck {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentAck {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub status: String,
}

fn outcome(result_code: i64) -> DisbursementStatus {
    if result_code == 0 {
        DisbursementStatus::Completed
    } else {
        DisbursementStatus::Failed
    }
}

async fn settle(state: &AppState, result: B2cResult, status: DisbursementStatus) -> Result<DisbursementAck, ApiError> {
    let code = result.result_code.to_string();
    let disbursement = Disbursement::record_result(
        &state.pool,
        DisbursementResult {
            originator_conversation_id: &result.originator_conversation_id,
            transaction_id: result.transaction_id.as_deref(),
            result_code: &code,
            result_description: &result.result_desc,
            status,
        },
    )
    .await?;

    if status == DisbursementStatus::Completed {
        Loan::mark_disbursed(&state.pool, disbursement.loan_id).await?;
    }
    tracing::info!(
        disbursement_id = disbursement.id,
        loan_id = disbursement.loan_id,
        status = status.as_str(),
        result_code = result.result_code,
        "B2C result recorded"
    );

    Ok(DisbursementAck {
        originator_conversation_id: result.originator_conversation_id,
        conversation_id: result.conversation_id,
        transaction_id: result.transaction_id,
        result_code: result.result_code,
        result_desc: result.result_desc,
        status,
    })
}

/// POST /api/v1/mpesa/b2c-result
pub async fn b2c_result_post(State(state): State<AppState>, Body(callback): Body<B2cCallback>) -> ApiResult<ItemBody<DisbursementAck>> {
    let status = outcome(callback.result.result_code);
    Ok(ApiResponse::item(settle(&state, callback.result, status).await?))
}

/// POST /api/v1/mpesa/b2c-timeout - the payout never completed
pub async fn b2c_timeout_post(State(state): State<AppState>, Body(callback): Body<B2cCallback>) -> ApiResult<ItemBody<DisbursementAck>> {
    tracing::warn!(
        originator_conversation_id = %callback.result.originator_conversation_id,
        "B2C request timed out in the gateway queue"
    );
    Ok(ApiResponse::item(settle(&state, callback.result, DisbursementStatus::Failed).await?))
}

/// POST /api/v1/mpesa/stk-push - requests a repayment from the borrower's phone
pub async fn stk_push_post(State(state): State<AppState>, Valid(req): Valid<StkPushRequest>) -> ApiResult<ItemBody<StkPushAck>> {
    let amount = req.amount.unwrap_or_default();
    if amount <= Decimal::ZERO {
        return Err(ApiError::field("Amount", "'Amount' must be greater than 0"));
    }

    let loan = Repository::<Loan>::of(&state.pool)
        .select_404(req.loan_id.unwrap_or_default())
        .await?;
    let phone = loan.member_mobile_number.clone().unwrap_or_default();
    let phone_number = phone
        .trim()
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("Invalid phone number format"))?;

    let description = format!("Loan {} repayment", loan.id);
    let receipt = state
        .gateway
        .collect(&Collection {
            amount,
            phone_number,
            account_reference: format!("LOAN{}", loan.id),
            description: description.clone(),
        })
        .await?;

    let payment_id = Payment::insert(
        &state.pool,
        NewPayment {
            loan_id: loan.id,
            amount,
            phone_number: &phone,
            checkout_request_id: &receipt.checkout_request_id,
            merchant_request_id: Some(&receipt.merchant_request_id),
            response_code: &receipt.response_code,
            response_description: &receipt.response_description,
            transaction_description: &description,
        },
    )
    .await?;

    tracing::info!(payment_id, loan_id = loan.id, checkout_request_id = %receipt.checkout_request_id, "STK push initiated");
    Ok(ApiResponse::item(StkPushAck {
        checkout_request_id: receipt.checkout_request_id,
        response_code: receipt.response_code,
        response_description: receipt.response_description,
    }))
}

/// POST /api/v1/mpesa/stk-callback
pub async fn stk_callback_post(State(state): State<AppState>, Body(callback): Body<StkCallback>) -> ApiResult<ItemBody<PaymentAck>> {
    let result = callback.body.stk_callback;
    let payment = Payment::record_callback(&state.pool, &result.checkout_request_id, result.result_code, &result.result_desc).await?;

    tracing::info!(payment_id = payment.id, status = %payment.status, result_code = result.result_code, "STK callback recorded");
    Ok(ApiResponse::item(PaymentAck {
        merchant_request_id: result.merchant_request_id,
        checkout_request_id: result.checkout_request_id,
        result_code: result.result_code,
        result_desc: result.result_desc,
        status: payment.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn b2c_result_parses_gateway_shape() {
        let callback: B2cCallback = serde_json::from_value(json!({
            "Result": {
                "ResultType": 0,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": "10571-7910404-1",
                "ConversationID": "AG_20191219_00004e48cf7e3533f581",
                "TransactionID": "NLJ41HAY6Q"
            }
        }))
        .unwrap();
        assert_eq!(callback.result.originator_conversation_id, "10571-7910404-1");
        assert_eq!(callback.result.transaction_id.as_deref(), Some("NLJ41HAY6Q"));
        assert_eq!(outcome(callback.result.result_code), DisbursementStatus::Completed);
    }

    #[test]
    fn non_zero_result_code_fails_the_payout() {
        assert_eq!(outcome(2001), DisbursementStatus::Failed);
    }

    #[test]
    fn stk_callback_parses_nested_body() {
        let callback: StkCallback = serde_json::from_value(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        }))
        .unwrap();
        assert_eq!(callback.body.stk_callback.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(callback.body.stk_callback.result_code, 1032);
    }
}
