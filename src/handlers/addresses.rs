use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, parse_id, success_response},
    services::addresses::{AddressInput, AddressUpdate, AddressView},
    ApiResponse, AppState,
};

/// Add a shipping address for the caller
#[utoipa::path(
    post,
    path = "/addAddress",
    request_body = AddressInput,
    responses(
        (status = 201, description = "Address added", body = ApiResponse<AddressView>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn add_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<AddressInput>,
) -> Result<Response, ServiceError> {
    let address = state
        .services
        .addresses
        .add_address(user.user_id, input)
        .await?;
    Ok(created_response(ApiResponse::success_with_message(
        address,
        "Address added successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/getAddress",
    responses(
        (status = 200, description = "The caller's addresses, newest first", body = ApiResponse<Vec<AddressView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let addresses = state.services.addresses.list_addresses(user.user_id).await?;
    Ok(success_response(ApiResponse::success(addresses)))
}

#[utoipa::path(
    put,
    path = "/api/addresses/{address_id}",
    params(("address_id" = String, Path, description = "Address id")),
    request_body = AddressUpdate,
    responses(
        (status = 200, description = "Address updated", body = ApiResponse<AddressView>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such address for this user", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "addresses"
)]
pub async fn edit_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(address_id): Path<String>,
    Json(update): Json<AddressUpdate>,
) -> Result<Response, ServiceError> {
    let address_id = parse_id(&address_id, "address id")?;
    let address = state
        .services
        .addresses
        .edit_address(address_id, user.user_id, update)
        .await?;
    Ok(success_response(ApiResponse::success_with_message(
        address,
        "Address updated successfully",
    )))
}
