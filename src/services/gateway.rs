//! Payment processor seam: hosted checkout sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Processor returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid gateway configuration: {0}")]
    Config(String),

    #[error("Payment processor is not configured")]
    NotConfigured,

    #[error("Processor response is missing the checkout URL")]
    MissingCheckoutUrl,
}

/// One purchasable line on the hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub description: String,
    /// Unit price in minor currency units
    pub unit_amount: i64,
    pub quantity: i64,
    pub currency: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<CheckoutLineItem>,
    pub customer_email: Option<String>,
    pub allowed_countries: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Our payment id, echoed back by the processor
    pub client_reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
}

impl CheckoutSession {
    /// True once the processor has captured the funds
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status.as_str(), "paid" | "no_payment_required")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// `Ok(None)` when the processor does not know the session.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, GatewayError>;

    fn name(&self) -> &'static str;
}

/// Stand-in used when no processor credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_checkout_session(
        &self,
        _request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn retrieve_checkout_session(
        &self,
        _session_id: &str,
    ) -> Result<Option<CheckoutSession>, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
