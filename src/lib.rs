//! Storefront API library
//!
//! Catalog, addresses, order placement, Stripe checkout and payment
//! settlement for the storefront and admin panel.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{auth_middleware, AuthService};
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Every storefront route. Routes after the auth layer need a bearer token.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let require_auth = middleware::from_fn_with_state(state.auth.clone(), auth_middleware);

    let protected = Router::new()
        .route("/users/me", get(handlers::auth::current_user))
        .route("/addproduct", post(handlers::products::create_product))
        .route("/addAddress", post(handlers::addresses::add_address))
        .route("/getAddress", get(handlers::addresses::list_addresses))
        .route(
            "/api/addresses/:address_id",
            put(handlers::addresses::edit_address),
        )
        .route("/createOrder", post(handlers::orders::create_order))
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route(
            "/orders/:order_id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/orders/user/:user_id",
            get(handlers::orders::list_user_orders),
        )
        .route("/payments", post(handlers::payments::create_payment))
        .route(
            "/payments/:payment_id",
            get(handlers::payments::start_checkout),
        )
        .route(
            "/payments/:payment_id/details",
            get(handlers::payments::get_payment),
        )
        .route_layer(require_auth.clone());

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/auth/session/:session_id",
            get(handlers::auth::redeem_session),
        )
        .route("/refresh-token", post(handlers::auth::refresh_token))
        .route("/logout", get(handlers::auth::logout))
        .route("/getProduct", get(handlers::products::list_products))
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .merge(delete(handlers::products::delete_product).route_layer(require_auth)),
        )
        .route(
            "/orders/delivery-estimate",
            get(handlers::orders::delivery_estimate),
        )
        .route("/success", get(handlers::payments::handle_success))
        .merge(protected)
}

/// The full application: API routes, metrics, docs, request ids and tracing.
pub fn app_router(state: AppState) -> Router {
    api_routes(&state)
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .merge(openapi::swagger_ui())
        .layer(middleware::from_fn(metrics::http_metrics_middleware))
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
