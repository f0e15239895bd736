use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
Backend for the storefront and admin panel: catalog, shipping addresses,
orders, Stripe checkout and payment settlement.

Protected endpoints expect `Authorization: Bearer <access token>`. Access
tokens are obtained by redeeming a sign-in handoff at
`GET /auth/session/{session_id}` and renewed with `POST /refresh-token`
using the `refreshToken` cookie.

Errors share one body:

```json
{
  "error": "Bad Request",
  "message": "Price mismatch: product Linen Shirt (Size: M, Color: Red): expected 500, got 450",
  "requestId": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
"#
    ),
    tags(
        (name = "products", description = "Catalog"),
        (name = "addresses", description = "Shipping addresses"),
        (name = "orders", description = "Order placement and tracking"),
        (name = "payments", description = "Checkout and settlement"),
        (name = "auth", description = "Session handoff and tokens"),
        (name = "health", description = "Health checks")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::auth::redeem_session,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::current_user,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::delete_product,
        crate::handlers::addresses::add_address,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::edit_address,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_user_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::delivery_estimate,
        crate::handlers::payments::create_payment,
        crate::handlers::payments::start_checkout,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::handle_success,
    ),
    components(
        schemas(
            crate::services::catalog::ProductView,
            crate::services::catalog::VariantView,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::VariantInput,
            crate::services::addresses::AddressInput,
            crate::services::addresses::AddressUpdate,
            crate::services::addresses::AddressView,
            crate::entities::address::DeliveryStatus,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::orders::VariantSelection,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::orders::OrderUser,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::DeliveryEstimate,
            crate::entities::order::OrderStatus,
            crate::entities::order::OrderPaymentStatus,
            crate::services::payments::CreatePaymentRequest,
            crate::services::payments::PaymentView,
            crate::entities::payment::PaymentMethod,
            crate::entities::payment::PaymentStatus,
            crate::services::settlement::StockShortfall,
            crate::services::users::UserProfile,
            crate::handlers::orders::CreateOrderResponse,
            crate::handlers::payments::CreatePaymentResponse,
            crate::handlers::payments::CheckoutResponse,
            crate::handlers::payments::SettlementResponse,
            crate::handlers::payments::SettledOrder,
            crate::handlers::auth::AccessTokenResponse,
            crate::handlers::auth::LogoutResponse,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
