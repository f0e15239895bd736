#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::{
    auth::{AuthConfig, AuthService, InMemoryHandoffStore},
    config::AppConfig,
    db,
    entities::user,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        addresses::{AddressInput, AddressView},
        catalog::{CreateProductRequest, ProductView, VariantInput},
        stripe::StripeGateway,
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const CLIENT_URL: &str = "http://shop.test";
pub const PLACEHOLDER_IMAGE: &str = "https://cdn.shop.test/placeholder.png";

/// Application harness backed by an in-memory SQLite database and a
/// wiremock server standing in for the Stripe API.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub auth: Arc<AuthService>,
    pub stripe: MockServer,
    pub shopper: user::Model,
    pub admin: user::Model,
    pub shopper_token: String,
    pub admin_token: String,
    _event_task: tokio::task::JoinHandle<u64>,
}

impl TestApp {
    pub async fn new() -> Self {
        let stripe = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "test_access_secret_for_integration_tests_01".to_string(),
            "test_refresh_secret_for_integration_tests_02".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps the in-memory database alive for the whole test
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.client_url = CLIENT_URL.to_string();
        cfg.stripe_secret_key = Some("sk_test_123".to_string());
        cfg.stripe_api_base = stripe.uri();
        cfg.delivery_lead_days = 7;
        cfg.default_product_image = PLACEHOLDER_IMAGE.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(
            StripeGateway::new("sk_test_123", &stripe.uri(), Duration::from_secs(5))
                .expect("stripe gateway for tests"),
        );

        let auth = Arc::new(AuthService::new(
            AuthConfig::from(&cfg),
            Arc::new(InMemoryHandoffStore::new()),
        ));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway,
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth: auth.clone(),
        };

        let shopper = state
            .services
            .users
            .find_or_create("Test Shopper", "shopper@example.com", &["user"])
            .await
            .expect("seed shopper");
        let admin = state
            .services
            .users
            .find_or_create("Test Admin", "admin@example.com", &["admin", "user"])
            .await
            .expect("seed admin");

        let shopper_token = auth.issue_access_token(&shopper).expect("shopper token");
        let admin_token = auth.issue_access_token(&admin).expect("admin token");

        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            auth,
            stripe,
            shopper,
            admin,
            shopper_token,
            admin_token,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_shopper(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.shopper_token))
            .await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token))
            .await
    }

    /// A t-shirt with (M, Black) at 499.00 x `stock` and (L, White) at 549.00 x 5.
    pub async fn seed_product(&self, stock: i32) -> ProductView {
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: "Classic Tee".to_string(),
                description: "Organic cotton t-shirt for integration tests".to_string(),
                category: "Apparel".to_string(),
                price: dec!(499.00),
                discount: Decimal::ZERO,
                images: vec![],
                rating: dec!(4.5),
                brand: Some("Northline".to_string()),
                tags: vec!["basics".to_string()],
                variants: vec![
                    VariantInput {
                        size: "M".to_string(),
                        color: "Black".to_string(),
                        stock,
                        price: dec!(499.00),
                    },
                    VariantInput {
                        size: "L".to_string(),
                        color: "White".to_string(),
                        stock: 5,
                        price: dec!(549.00),
                    },
                ],
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn seed_address(&self, user: &user::Model) -> AddressView {
        self.state
            .services
            .addresses
            .add_address(
                user.id,
                AddressInput {
                    full_name: user.name.clone(),
                    phone: "9876543210".to_string(),
                    pincode: "560001".to_string(),
                    state: "Karnataka".to_string(),
                    city: "Bengaluru".to_string(),
                    house_no: "12B".to_string(),
                    road: None,
                    area: None,
                },
            )
            .await
            .expect("seed address for tests")
    }

    /// Places a shopper order for `quantity` x (M, Black) and returns its id.
    pub async fn place_order(&self, product: &ProductView, quantity: i32) -> String {
        let address = self.seed_address(&self.shopper).await;
        let total = dec!(499.00) * Decimal::from(quantity);
        let response = self
            .as_shopper(
                Method::POST,
                "/createOrder",
                Some(order_body(
                    &self.shopper,
                    product,
                    quantity,
                    "499.00",
                    &total.to_string(),
                    &address.id.to_string(),
                )),
            )
            .await;
        assert_eq!(response.status(), 201, "order creation failed");
        let body = read_json(response).await;
        body["orderId"].as_str().expect("order id").to_string()
    }

    /// Creates a pending Credit Card payment for `order_id` and returns its id.
    pub async fn create_payment(&self, order_id: &str) -> String {
        let response = self
            .as_shopper(
                Method::POST,
                "/payments",
                Some(json!({ "orderId": order_id, "paymentMethod": "Credit Card" })),
            )
            .await;
        assert_eq!(response.status(), 200, "payment creation failed");
        let body = read_json(response).await;
        body["paymentId"].as_str().expect("payment id").to_string()
    }

    /// Stripe answers checkout session creation with `session_id`.
    pub async fn mock_session_created(&self, session_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "url": format!("https://checkout.stripe.test/pay/{}", session_id),
                "payment_status": "unpaid",
                "status": "open",
            })))
            .mount(&self.stripe)
            .await;
    }

    /// Stripe reports `session_id` with the given payment status.
    pub async fn mock_session_status(&self, session_id: &str, payment_status: &str) {
        self.mock_session_for(session_id, payment_status, None).await;
    }

    /// Like `mock_session_status`, with the client reference Stripe echoes back.
    pub async fn mock_session_for(
        &self,
        session_id: &str,
        payment_status: &str,
        client_reference_id: Option<&str>,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/checkout/sessions/{}", session_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "url": null,
                "payment_status": payment_status,
                "status": if payment_status == "paid" { "complete" } else { "open" },
                "client_reference_id": client_reference_id,
            })))
            .mount(&self.stripe)
            .await;
    }

    /// Order, payment and checkout session, ready to be settled.
    pub async fn checkout(&self, product: &ProductView, quantity: i32, session_id: &str) -> (String, String) {
        let order_id = self.place_order(product, quantity).await;
        let payment_id = self.create_payment(&order_id).await;
        self.mock_session_created(session_id).await;
        let response = self
            .as_shopper(Method::GET, &format!("/payments/{}", payment_id), None)
            .await;
        assert_eq!(response.status(), 200, "checkout start failed");
        (order_id, payment_id)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_body(
    user: &user::Model,
    product: &ProductView,
    quantity: i32,
    price: &str,
    total: &str,
    address_id: &str,
) -> Value {
    json!({
        "userId": user.id,
        "products": [{
            "productId": product.id,
            "name": product.name,
            "quantity": quantity,
            "price": price,
            "variant": { "size": "M", "color": "Black" }
        }],
        "totalAmount": total,
        "shippingAddressId": address_id,
    })
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is json")
}
