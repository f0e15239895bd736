/*!
 * Authentication for the storefront API.
 *
 * Access tokens are HS256 JWTs carried as `Authorization: Bearer <token>`.
 * Refresh tokens are signed with a separate secret and travel in the
 * `refreshToken` cookie. After sign-in the access token is parked in a
 * [`SessionHandoffStore`] under a one-time session id that the storefront
 * redeems through `GET /auth/session/:session_id`.
 */

pub mod handoff;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{config::AppConfig, entities::user, errors::ServiceError};
pub use handoff::{HandoffStoreError, InMemoryHandoffStore, RedisHandoffStore, SessionHandoffStore};

pub const ADMIN_ROLE: &str = "admin";
pub const REFRESH_COOKIE: &str = "refreshToken";
const TOKEN_ISSUER: &str = "storefront-api";

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (user ID)
    pub name: Option<String>,  // User's name
    pub email: Option<String>, // User's email
    pub roles: Vec<String>,
    pub jti: String, // JWT ID (unique identifier for this token)
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub iss: String, // Issuer
    pub typ: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    /// Allows the owner of a resource, or an admin.
    pub fn ensure_can_access(&self, owner_id: Uuid) -> Result<(), ServiceError> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "You do not have access to this resource".to_string(),
            ))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin role required".to_string()))
        }
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
            token_id: claims.jti,
        })
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Handoff store error: {0}")]
    Store(#[from] HandoffStoreError),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => {
                ServiceError::Unauthorized("No authentication token provided".to_string())
            }
            AuthError::InvalidToken => {
                ServiceError::Unauthorized("Invalid authentication token".to_string())
            }
            AuthError::TokenExpired => ServiceError::Unauthorized("Token has expired".to_string()),
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            AuthError::Store(e) => ServiceError::InternalError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub refresh_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub handoff_ttl: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            refresh_secret: cfg.refresh_secret.clone(),
            access_token_ttl: Duration::from_secs(cfg.jwt_expiration),
            refresh_token_ttl: Duration::from_secs(cfg.refresh_token_expiration),
            handoff_ttl: Duration::from_secs(cfg.handoff_ttl_secs),
        }
    }
}

/// Result of a completed sign-in, ready to hand to the storefront.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub session_id: String,
    pub refresh_token: String,
}

pub struct AuthService {
    config: AuthConfig,
    handoff: Arc<dyn SessionHandoffStore>,
}

impl AuthService {
    pub fn new(config: AuthConfig, handoff: Arc<dyn SessionHandoffStore>) -> Self {
        Self { config, handoff }
    }

    pub fn handoff_backend(&self) -> &'static str {
        self.handoff.backend()
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.config.refresh_token_ttl
    }

    fn sign(&self, user: &user::Model, typ: TokenType) -> Result<String, AuthError> {
        let (secret, ttl) = match typ {
            TokenType::Access => (&self.config.jwt_secret, self.config.access_token_ttl),
            TokenType::Refresh => (&self.config.refresh_secret, self.config.refresh_token_ttl),
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            roles: user.role_list(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
            iss: TOKEN_ISSUER.to_string(),
            typ,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    fn verify(&self, token: &str, typ: TokenType) -> Result<Claims, AuthError> {
        let secret = match typ {
            TokenType::Access => &self.config.jwt_secret,
            TokenType::Refresh => &self.config.refresh_secret,
        };
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        if data.claims.typ != typ {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub fn issue_access_token(&self, user: &user::Model) -> Result<String, AuthError> {
        self.sign(user, TokenType::Access)
    }

    pub fn issue_refresh_token(&self, user: &user::Model) -> Result<String, AuthError> {
        self.sign(user, TokenType::Refresh)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenType::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenType::Refresh)
    }

    /// Issues a token pair and parks the access token under a new one-time session id.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn begin_handoff(&self, user: &user::Model) -> Result<Handoff, AuthError> {
        let access_token = self.issue_access_token(user)?;
        let refresh_token = self.issue_refresh_token(user)?;

        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let session_id = hex::encode(bytes);

        self.handoff
            .put(&session_id, &access_token, self.config.handoff_ttl)
            .await?;
        debug!(backend = self.handoff.backend(), "handoff created");

        Ok(Handoff {
            session_id,
            refresh_token,
        })
    }

    /// Redeems a handoff; a session id works once and only before it expires.
    #[instrument(skip(self))]
    pub async fn redeem_handoff(&self, session_id: &str) -> Result<Option<String>, AuthError> {
        if session_id.is_empty() || session_id.len() > 128 {
            return Ok(None);
        }
        Ok(self.handoff.take(session_id).await?)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Reads a cookie value from the `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Requires a valid access token and exposes the caller as `Extension<AuthUser>`.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = bearer_token(request.headers())
        .and_then(|token| auth.validate_token(token))
        .and_then(AuthUser::try_from)
        .map_err(|e| {
            warn!(error = %e, uri = %request.uri(), "rejected request");
            ServiceError::from(e)
        })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Handlers behind [`auth_middleware`] take the caller as an argument.
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
    }
}
