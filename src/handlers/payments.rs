use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, OrderPaymentStatus, OrderStatus},
    errors::ServiceError,
    handlers::common::{parse_id, success_response},
    services::payments::{CreatePaymentRequest, PaymentView},
    services::settlement::{SettlementOutcome, StockShortfall},
    AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub success: bool,
    pub payment_id: Uuid,
    pub redirect_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub success: bool,
    /// Hosted checkout page
    pub url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SettlementQuery {
    /// Checkout session id substituted by the processor
    pub session_id: Option<String>,
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettledOrder {
    pub id: Uuid,
    pub order_status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub total_amount: Decimal,
}

impl From<order::Model> for SettledOrder {
    fn from(o: order::Model) -> Self {
        Self {
            id: o.id,
            order_status: o.order_status,
            payment_status: o.payment_status,
            total_amount: o.total_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SettledOrder>,
    /// Lines whose stock could not be deducted
    pub stock_shortfalls: Vec<StockShortfall>,
}

impl From<SettlementOutcome> for SettlementResponse {
    fn from(outcome: SettlementOutcome) -> Self {
        let message = outcome.message().to_string();
        let stock_shortfalls = outcome.shortfalls().to_vec();
        let (payment, order) = match outcome {
            SettlementOutcome::Settled { payment, order, .. } => {
                (Some(payment.into()), Some(order.into()))
            }
            SettlementOutcome::PaymentAlreadyProcessed(payment) => (Some(payment.into()), None),
            SettlementOutcome::OrderAlreadyProcessed(order) => (None, Some(order.into())),
        };
        Self {
            success: true,
            message,
            payment,
            order,
            stock_shortfalls,
        }
    }
}

/// Record a payment attempt for an order
#[utoipa::path(
    post,
    path = "/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Payment created", body = CreatePaymentResponse),
        (status = 400, description = "Unknown payment method", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already paid", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Response, ServiceError> {
    let created = state.services.payments.create_payment(&user, request).await?;
    Ok(success_response(CreatePaymentResponse {
        success: true,
        payment_id: created.payment.id,
        redirect_url: created.redirect_url,
    }))
}

/// Open a hosted checkout session for a pending payment
#[utoipa::path(
    get,
    path = "/payments/{payment_id}",
    params(("payment_id" = String, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Checkout URL", body = CheckoutResponse),
        (status = 404, description = "Payment or order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment is not pending", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment processing failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<String>,
) -> Result<Response, ServiceError> {
    let payment_id = parse_id(&payment_id, "payment id")?;
    let checkout = state
        .services
        .payments
        .initiate_checkout(&user, payment_id)
        .await?;
    Ok(success_response(CheckoutResponse {
        success: true,
        url: checkout.url,
    }))
}

#[utoipa::path(
    get,
    path = "/payments/{payment_id}/details",
    params(("payment_id" = String, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment", body = PaymentView),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<String>,
) -> Result<Response, ServiceError> {
    let payment_id = parse_id(&payment_id, "payment id")?;
    let payment = state.services.payments.get_payment(&user, payment_id).await?;
    Ok(success_response(payment))
}

/// Settle a payment after the processor redirects back
#[utoipa::path(
    get,
    path = "/success",
    params(SettlementQuery),
    responses(
        (status = 200, description = "Settled, or already processed", body = SettlementResponse),
        (status = 400, description = "Malformed identifiers or foreign session", body = crate::errors::ErrorResponse),
        (status = 404, description = "Session, payment or order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Session not paid or processor error", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn handle_success(
    State(state): State<AppState>,
    Query(query): Query<SettlementQuery>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .settlement
        .handle_settlement(
            query.session_id.as_deref().unwrap_or_default(),
            query.payment_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(success_response(SettlementResponse::from(outcome)))
}
