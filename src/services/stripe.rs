use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};
use url::Url;

use super::gateway::{CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway};

/// Stripe Checkout over the REST API.
#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    secret_key: String,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|e| GatewayError::Config(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Config(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }

        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(concat!("storefront-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            secret_key: secret_key.into(),
            base_url,
        })
    }

    fn sessions_url(&self, session_id: Option<&str>) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GatewayError::Config("invalid base URL".into()))?;
            segments.pop_if_empty().extend(["v1", "checkout", "sessions"]);
            if let Some(id) = session_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Flattens a checkout request into Stripe's bracketed form encoding.
    pub fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("billing_address_collection".into(), "auto".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            (
                "client_reference_id".into(),
                request.client_reference_id.clone(),
            ),
            (
                "metadata[payment_id]".into(),
                request.client_reference_id.clone(),
            ),
        ];

        if let Some(email) = &request.customer_email {
            params.push(("customer_email".into(), email.clone()));
        }

        for (i, country) in request.allowed_countries.iter().enumerate() {
            params.push((
                format!("shipping_address_collection[allowed_countries][{}]", i),
                country.clone(),
            ));
        }

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            params.push((
                format!("{}[price_data][currency]", prefix),
                item.currency.clone(),
            ));
            params.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.name.clone(),
            ));
            params.push((
                format!("{}[price_data][product_data][description]", prefix),
                item.description.clone(),
            ));
            params.push((
                format!("{}[price_data][product_data][images][0]", prefix),
                item.image.clone(),
            ));
            params.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount.to_string(),
            ));
            params.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        params
    }

    async fn api_error(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => format!(
                "{} ({})",
                body.error.message.unwrap_or_else(|| "unknown error".into()),
                body.error.kind.unwrap_or_else(|| "api_error".into())
            ),
            Err(_) => "unreadable error body".to_string(),
        };
        GatewayError::Api { status, message }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(payment_id = %request.client_reference_id, lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = self.sessions_url(None)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .form(&Self::form_params(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Stripe request failed");
                GatewayError::Http(e)
            })?;

        if !response.status().is_success() {
            let err = Self::api_error(response).await;
            error!(error = %err, "Stripe rejected checkout session");
            return Err(err);
        }

        let session: CheckoutSession = response.json().await?;
        if session.url.is_none() {
            return Err(GatewayError::MissingCheckoutUrl);
        }
        info!(session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, GatewayError> {
        let url = self.sessions_url(Some(session_id))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(Self::api_error(response).await),
        }
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::CheckoutLineItem;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            line_items: vec![CheckoutLineItem {
                name: "Linen Shirt".into(),
                description: "Size: M, Color: Red".into(),
                unit_amount: 50_000,
                quantity: 2,
                currency: "inr".into(),
                image: "https://img.test/shirt.png".into(),
            }],
            customer_email: Some("asha@example.com".into()),
            allowed_countries: vec!["IN".into()],
            success_url: "http://localhost:3000/success?session_id={CHECKOUT_SESSION_ID}&paymentId=p1"
                .into(),
            cancel_url: "http://localhost:3000/cancel".into(),
            client_reference_id: "p1".into(),
        }
    }

    #[test]
    fn form_params_follow_stripe_bracket_encoding() {
        let params = StripeGateway::form_params(&request());
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("50000"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(
            get("line_items[0][price_data][product_data][images][0]"),
            Some("https://img.test/shirt.png")
        );
        assert_eq!(
            get("shipping_address_collection[allowed_countries][0]"),
            Some("IN")
        );
        assert_eq!(get("customer_email"), Some("asha@example.com"));
        assert!(get("success_url").unwrap().contains("{CHECKOUT_SESSION_ID}"));
    }

    #[tokio::test]
    async fn creates_session_against_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("line_items%5B0%5D%5Bquantity%5D=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1",
                "payment_status": "unpaid",
                "status": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway =
            StripeGateway::new("sk_test_123", &server.uri(), Duration::from_secs(5)).unwrap();
        let session = gateway.create_checkout_session(&request()).await.unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert!(!session.is_paid());
    }

    #[tokio::test]
    async fn surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Invalid API Key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("bad", &server.uri(), Duration::from_secs(5)).unwrap();
        let err = gateway
            .create_checkout_session(&request())
            .await
            .unwrap_err();

        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Invalid API Key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "message": "No such checkout.session", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new("sk", &server.uri(), Duration::from_secs(5)).unwrap();
        assert!(gateway
            .retrieve_checkout_session("cs_missing")
            .await
            .unwrap()
            .is_none());
    }
}
