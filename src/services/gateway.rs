use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::MpesaConfig;

/// Response code the gateway uses for an accepted request.
pub const ACCEPTED: &str = "0";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport failed: {0}")]
    Transport(String),

    #[error("gateway authentication failed: {0}")]
    Auth(String),

    #[error("gateway rejected request: {code} {description}")]
    Rejected { code: String, description: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// Money sent out to a borrower's phone.
#[derive(Debug, Clone)]
pub struct Payout {
    pub amount: Decimal,
    pub phone_number: u64,
    pub remarks: String,
    pub occasion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayoutReceipt {
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    pub response_code: String,
    pub response_description: String,
}

/// Payment requested from a customer's phone (STK push).
#[derive(Debug, Clone)]
pub struct Collection {
    pub amount: Decimal,
    pub phone_number: u64,
    pub account_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CollectionReceipt {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn disburse(&self, payout: &Payout) -> Result<PayoutReceipt, GatewayError>;

    async fn collect(&self, collection: &Collection) -> Result<CollectionReceipt, GatewayError>;
}

/// Safaricom Daraja client: OAuth client-credentials, B2C payouts and STK push.
pub struct MpesaGateway {
    client: reqwest::Client,
    config: MpesaConfig,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct B2cRequest<'a> {
    initiator_name: &'a str,
    security_credential: &'a str,
    #[serde(rename = "CommandID")]
    command_id: &'a str,
    amount: u64,
    party_a: u64,
    party_b: u64,
    remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    result_url: &'a str,
    occasion: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: u64,
    password: String,
    timestamp: String,
    transaction_type: &'a str,
    amount: u64,
    party_a: u64,
    party_b: u64,
    phone_number: u64,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(format!("{}/oauth/v1/generate", self.config.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Auth(format!("status {}", response.status())));
        }
        Ok(response.json::<AccessToken>().await?.access_token)
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de> + Send>(&self, path: &str, body: &B) -> Result<R, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.config.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        // Error bodies carry errorCode/errorMessage instead of a response code.
        if !response.status().is_success() {
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                code: body["errorCode"].as_str().unwrap_or(status.as_str()).to_string(),
                description: body["errorMessage"].as_str().unwrap_or("request failed").to_string(),
            });
        }
        Ok(response.json::<R>().await?)
    }
}

/// Whole currency units; the gateway does not accept fractions.
fn whole_units(amount: Decimal) -> Result<u64, GatewayError> {
    amount
        .round()
        .to_u64()
        .filter(|units| *units > 0)
        .ok_or(GatewayError::InvalidAmount(amount))
}

/// STK password: base64 of short code, passkey and timestamp.
pub fn stk_password(short_code: u64, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

fn accepted(code: &str, description: &str) -> Result<(), GatewayError> {
    if code == ACCEPTED {
        Ok(())
    } else {
        Err(GatewayError::Rejected { code: code.to_string(), description: description.to_string() })
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn disburse(&self, payout: &Payout) -> Result<PayoutReceipt, GatewayError> {
        let request = B2cRequest {
            initiator_name: &self.config.initiator_name,
            security_credential: &self.config.security_credential,
            command_id: "BusinessPayment",
            amount: whole_units(payout.amount)?,
            party_a: self.config.short_code,
            party_b: payout.phone_number,
            remarks: &payout.remarks,
            queue_timeout_url: &self.config.timeout_url,
            result_url: &self.config.result_url,
            occasion: &payout.occasion,
        };
        let receipt: PayoutReceipt = self.post("/mpesa/b2c/v1/paymentrequest", &request).await?;
        accepted(&receipt.response_code, &receipt.response_description)?;
        tracing::info!(conversation_id = %receipt.conversation_id, "B2C payout accepted");
        Ok(receipt)
    }

    async fn collect(&self, collection: &Collection) -> Result<CollectionReceipt, GatewayError> {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let request = StkPushRequest {
            business_short_code: self.config.short_code,
            password: stk_password(self.config.short_code, &self.config.passkey, &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: whole_units(collection.amount)?,
            party_a: collection.phone_number,
            party_b: self.config.short_code,
            phone_number: collection.phone_number,
            callback_url: &self.config.stk_callback_url,
            account_reference: &collection.account_reference,
            transaction_desc: &collection.description,
        };
        let receipt: CollectionReceipt = self.post("/mpesa/stkpush/v1/processrequest", &request).await?;
        accepted(&receipt.response_code, &receipt.response_description)?;
        tracing::info!(checkout_request_id = %receipt.checkout_request_id, "STK push accepted");
        Ok(receipt)
    }
}

/// Scripted gateway for tests: answers with a fixed response code and records calls.
pub struct StubGateway {
    response_code: String,
    payouts: Mutex<Vec<Payout>>,
}

impl StubGateway {
    pub fn accepting() -> Self {
        Self::with_code(ACCEPTED)
    }

    pub fn with_code(code: &str) -> Self {
        Self { response_code: code.to_string(), payouts: Mutex::new(vec![]) }
    }

    pub fn payouts(&self) -> Vec<Payout> {
        self.payouts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn disburse(&self, payout: &Payout) -> Result<PayoutReceipt, GatewayError> {
        let sequence = {
            let mut payouts = self.payouts.lock().map_err(|e| GatewayError::Transport(e.to_string()))?;
            payouts.push(payout.clone());
            payouts.len()
        };
        accepted(&self.response_code, "stubbed rejection")?;
        Ok(PayoutReceipt {
            conversation_id: format!("AG_STUB_{}", sequence),
            originator_conversation_id: uuid::Uuid::new_v4().to_string(),
            response_code: self.response_code.clone(),
            response_description: "Accept the service request successfully.".to_string(),
        })
    }

    async fn collect(&self, _collection: &Collection) -> Result<CollectionReceipt, GatewayError> {
        accepted(&self.response_code, "stubbed rejection")?;
        Ok(CollectionReceipt {
            merchant_request_id: uuid::Uuid::new_v4().to_string(),
            checkout_request_id: format!("ws_CO_{}", uuid::Uuid::new_v4().simple()),
            response_code: self.response_code.clone(),
            response_description: "Success. Request accepted for processing".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn amounts_round_to_whole_units() {
        assert_eq!(whole_units(dec("1500.40")).unwrap(), 1500);
        assert_eq!(whole_units(dec("99.5")).unwrap(), 100);
        assert!(matches!(whole_units(dec("0.2")), Err(GatewayError::InvalidAmount(_))));
        assert!(whole_units(dec("-5")).is_err());
    }

    #[test]
    fn stk_password_encodes_concatenation() {
        let password = stk_password(174379, "key", "20240101120000");
        assert_eq!(STANDARD.decode(password).unwrap(), b"174379key20240101120000");
    }

    #[test]
    fn receipt_uses_gateway_field_names() {
        let receipt: PayoutReceipt = serde_json::from_value(serde_json::json!({
            "ConversationID": "AG_1",
            "OriginatorConversationID": "abc",
            "ResponseCode": "0",
            "ResponseDescription": "Accepted"
        }))
        .unwrap();
        assert_eq!(receipt.conversation_id, "AG_1");
        assert_eq!(receipt.originator_conversation_id, "abc");
    }

    #[tokio::test]
    async fn stub_rejection_is_reported() {
        let gateway = StubGateway::with_code("2001");
        let payout = Payout { amount: Decimal::new(100, 0), phone_number: 254700000000, remarks: "r".into(), occasion: "o".into() };
        let err = gateway.disburse(&payout).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { ref code, .. } if code == "2001"));
        assert_eq!(gateway.payouts().len(), 1);
    }
}
