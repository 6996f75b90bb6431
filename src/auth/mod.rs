use crate::db::DbPool;
use crate::entities::user;
use crate::errors::ServiceError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
    routing::post,
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user extracted from a validated token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Extracts the AuthUser placed in request extensions by `auth_middleware`.
/// Using this extractor on a route that is not behind the middleware is a
/// wiring bug and surfaces as 401.
#[async_trait]
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
            .ok_or_else(|| ServiceError::AuthError("Authentication required".to_string()))
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_expiration: Duration,
}

/// Token issuance and validation plus credential verification at login.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    db: Arc<DbPool>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DbPool>) -> Self {
        Self { config, db }
    }

    /// Generate an access token for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<TokenResponse, ServiceError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| ServiceError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {e}")))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
        })
    }

    /// Validate a token and extract its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::AuthError("Token has expired".to_string())
            }
            _ => ServiceError::AuthError("Invalid authentication token".to_string()),
        })
    }

    /// Verify credentials and issue a token. Credential failures are
    /// deliberately indistinguishable (same 401) whether the account is
    /// missing, passwordless, or the password is wrong.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ServiceError> {
        let invalid = || ServiceError::AuthError("Invalid credentials".to_string());

        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email.to_ascii_lowercase()))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;

        let hash = account.password_hash.as_deref().ok_or_else(invalid)?;
        let parsed = PasswordHash::new(hash).map_err(|_| invalid())?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| {
                warn!("failed login attempt");
                invalid()
            })?;

        debug!(user_id = %account.id, "login succeeded");
        self.generate_token(&account)
    }
}

/// Hashes a password for storage. Used by account provisioning and tests.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::InternalError(format!("Password hashing failed: {e}")))
}

/// Centralized admin decision: role flag OR configured email allow-list.
/// Handlers never re-derive this; the router layer applies it once.
#[derive(Clone, Debug, Default)]
pub struct AdminPolicy {
    allow_list: Vec<String>,
}

impl AdminPolicy {
    pub fn new(allow_list: Vec<String>) -> Self {
        Self { allow_list }
    }

    pub fn permits(&self, user: &AuthUser) -> bool {
        user.has_role(user::ROLE_ADMIN)
            || self
                .allow_list
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&user.email))
    }
}

/// Validates the bearer token and attaches AuthUser to the request.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ServiceError::AuthError("Authentication required".to_string()))?;

    let claims = auth_service.validate_token(token)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::AuthError("Invalid authentication token".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// Rejects authenticated non-admin users with 403.
pub async fn admin_middleware(
    State(policy): State<Arc<AdminPolicy>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ServiceError::AuthError("Authentication required".to_string()))?;

    if !policy.permits(user) {
        return Err(ServiceError::Forbidden(
            "Administrator access required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to gate a subtree behind admin auth.
pub trait AdminRouterExt {
    fn with_admin(self, auth: Arc<AuthService>, policy: Arc<AdminPolicy>) -> Self;
}

impl<S> AdminRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_admin(self, auth: Arc<AuthService>, policy: Arc<AdminPolicy>) -> Self {
        // Layers run bottom-up: authentication first, then the policy check.
        self.layer(axum::middleware::from_fn_with_state(
            policy,
            admin_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
    }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authentication routes
pub fn auth_routes(auth_service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .with_state(auth_service)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(auth_service): State<Arc<AuthService>>,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let token = auth_service
        .login(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(token))
}
