use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, parse_id, success_response},
    services::orders::{CreateOrderRequest, DeliveryEstimate, OrderView, UpdateOrderStatusRequest},
    AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub message: String,
    pub order_id: Uuid,
    /// Storefront payment page for the new order
    pub redirect_url: String,
}

/// Validate a cart against the catalog and place the order
#[utoipa::path(
    post,
    path = "/createOrder",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Validation, variant, price or total mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Ordering for another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or address not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let created = state.services.orders.create_order(&user, request).await?;
    Ok(created_response(CreateOrderResponse {
        success: true,
        message: "Order created successfully".to_string(),
        order_id: created.order.id,
        redirect_url: created.redirect_url,
    }))
}

#[utoipa::path(
    get,
    path = "/orders/{order_id}",
    params(("order_id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with user, lines and address", body = OrderView),
        (status = 403, description = "Not the caller's order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Response, ServiceError> {
    let order_id = parse_id(&order_id, "order id")?;
    let order = state.services.orders.get_order(&user, order_id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/orders/user/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Orders, newest first", body = Vec<OrderView>),
        (status = 403, description = "Not the caller's orders", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_user_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Response, ServiceError> {
    let user_id = parse_id(&user_id, "user id")?;
    let orders = state.services.orders.list_user_orders(&user, user_id).await?;
    Ok(success_response(orders))
}

/// Move an order through fulfilment (admin)
#[utoipa::path(
    put,
    path = "/orders/{order_id}/status",
    params(("order_id" = String, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated order", body = OrderView),
        (status = 400, description = "Completed can only be set by settlement", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already completed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    let order_id = parse_id(&order_id, "order id")?;
    let order = state
        .services
        .orders
        .update_order_status(&user, order_id, request.order_status)
        .await?;
    Ok(success_response(order))
}

/// Delivery date for an order placed now
#[utoipa::path(
    get,
    path = "/orders/delivery-estimate",
    responses((status = 200, description = "Estimated delivery", body = DeliveryEstimate)),
    tag = "orders"
)]
pub async fn delivery_estimate(State(state): State<AppState>) -> Json<DeliveryEstimate> {
    Json(state.services.orders.delivery_estimate())
}
