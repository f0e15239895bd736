use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, parse_id, success_response},
    services::catalog::{CreateProductRequest, ProductView},
    ApiResponse, AppState,
};

/// List the catalog
#[utoipa::path(
    get,
    path = "/getProduct",
    responses(
        (status = 200, description = "All products with variants", body = ApiResponse<Vec<ProductView>>),
        (status = 404, description = "Catalog is empty", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let products = state.services.catalog.list_products().await?;
    Ok(success_response(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductView>),
        (status = 400, description = "Malformed id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let product_id = parse_id(&id, "product id")?;
    let product = state.services.catalog.get_product(product_id).await?;
    Ok(success_response(ApiResponse::success(product)))
}

/// Create a product with its variants (admin)
#[utoipa::path(
    post,
    path = "/addproduct",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductView>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    user.ensure_admin()?;
    let product = state.services.catalog.create_product(request).await?;
    Ok(created_response(ApiResponse::success_with_message(
        product,
        "Product created successfully",
    )))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    user.ensure_admin()?;
    let product_id = parse_id(&id, "product id")?;
    state.services.catalog.delete_product(product_id).await?;
    Ok(success_response(ApiResponse::<()>::message(
        "Product deleted successfully",
    )))
}
