//! Payment gateway client.
//!
//! Two calls against the external processor: open a charge for an amount,
//! then execute it with the card details. The trait is the seam the REST
//! layer depends on, so tests can run against a stub instead of the wire.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;

/// Failure talking to the external processor. The REST layer maps this to a
/// 502 rather than letting it surface as an opaque server fault.
#[derive(Debug)]
pub struct GatewayError {
    pub message: String,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment gateway error: {}", self.message)
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a charge; returns the gateway's bill id.
    async fn create_payment(&self, amount: u64, currency: &str) -> Result<String, GatewayError>;

    /// Execute a previously opened charge with the card details; returns the
    /// gateway's status string.
    async fn make_payment(
        &self,
        bill_id: &str,
        card_number: &str,
        card_exp_month: &str,
        card_exp_year: &str,
        card_cvc: &str,
    ) -> Result<String, GatewayError>;
}

/// HTTP implementation against the configured gateway base URL.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Deserialize)]
struct ConfirmResponse {
    status: String,
}

impl HttpGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment(&self, amount: u64, currency: &str) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/payments", self.base_url))
            .json(&json!({ "amount": amount, "currency": currency }))
            .send()
            .await
            .map_err(|e| GatewayError::new(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::new(format!(
                "create_payment returned {}",
                resp.status()
            )));
        }

        let body: CreateResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::new(e.to_string()))?;
        Ok(body.id)
    }

    async fn make_payment(
        &self,
        bill_id: &str,
        card_number: &str,
        card_exp_month: &str,
        card_exp_year: &str,
        card_cvc: &str,
    ) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/payments/{}/confirm", self.base_url, bill_id))
            .json(&json!({
                "card_number": card_number,
                "card_exp_month": card_exp_month,
                "card_exp_year": card_exp_year,
                "card_cvc": card_cvc,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::new(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::new(format!(
                "make_payment returned {}",
                resp.status()
            )));
        }

        let body: ConfirmResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::new(e.to_string()))?;
        Ok(body.status)
    }
}
