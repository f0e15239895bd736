use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    auth::{cookie_value, AuthUser, REFRESH_COOKIE},
    errors::ServiceError,
    handlers::common::success_response,
    services::users::UserProfile,
    AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

fn refresh_cookie(value: &str, max_age: Duration, secure: bool) -> Result<HeaderValue, ServiceError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        REFRESH_COOKIE,
        value,
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ServiceError::InternalError(format!("invalid cookie header: {}", e)))
}

/// Redeem a one-time sign-in handoff
///
/// Returns the parked access token and sets a fresh refresh cookie.
#[utoipa::path(
    get,
    path = "/auth/session/{session_id}",
    params(("session_id" = String, Path, description = "One-time handoff id")),
    responses(
        (status = 200, description = "Access token", body = AccessTokenResponse),
        (status = 404, description = "Unknown or expired handoff", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn redeem_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    let access_token = state
        .auth
        .redeem_handoff(&session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Session not found or expired".to_string()))?;

    let claims = state.auth.validate_token(&access_token)?;
    let user = AuthUser::try_from(claims)?;
    let account = state.services.users.get_user(user.user_id).await?;
    let refresh_token = state.auth.issue_refresh_token(&account)?;

    info!(user_id = %account.id, "handoff redeemed");
    let cookie = refresh_cookie(
        &refresh_token,
        state.auth.refresh_token_ttl(),
        state.config.is_production(),
    )?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AccessTokenResponse { access_token }),
    )
        .into_response())
}

/// Exchange the refresh cookie for a new access token
#[utoipa::path(
    post,
    path = "/refresh-token",
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Missing or invalid refresh token", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("No refresh token".to_string()))?;

    let claims = state.auth.validate_refresh_token(token)?;
    let caller = AuthUser::try_from(claims)?;
    let account = state
        .services
        .users
        .get_user(caller.user_id)
        .await
        .map_err(|e| {
            warn!(user_id = %caller.user_id, error = %e, "refresh for unknown user");
            ServiceError::Unauthorized("Invalid refresh token".to_string())
        })?;

    let access_token = state.auth.issue_access_token(&account)?;
    Ok(success_response(AccessTokenResponse { access_token }))
}

#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 200, description = "Refresh cookie cleared", body = LogoutResponse)),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let cookie = refresh_cookie("", Duration::ZERO, state.config.is_production())?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LogoutResponse {
            success: true,
            message: "Logged out successfully".to_string(),
        }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "The caller's profile", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let profile = state.services.users.get_profile(user.user_id).await?;
    Ok(success_response(profile))
}
