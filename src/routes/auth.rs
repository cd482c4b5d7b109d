/// Authentication Routes
///
/// Register, login, refresh, logout and current-user endpoints. Handlers
/// only translate between wire DTOs and `AuthService`.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims, LoginInput, RegisterInput, SessionResult, TokenPair};
use crate::error::{AppError, ErrorContext};
use crate::store::UserProfile;

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh / logout request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token expiry
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user: Option<UserProfile>, expires_in: i64) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
            expires_at: tokens.expires_at,
            user,
        }
    }

    fn from_session(session: SessionResult, expires_in: i64) -> Self {
        Self::new(session.tokens, Some(session.user), expires_in)
    }
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email / name / weak password
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let form = form.into_inner();

    let session = auth
        .register(RegisterInput {
            email: form.email,
            password: form.password,
            name: form.name,
        })
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(request_id = %context.request_id, user_id = %session.user.id, "Registration completed");

    let expires_in = auth.access_tokens().expiry_seconds();
    Ok(HttpResponse::Created().json(AuthResponse::from_session(session, expires_in)))
}

/// POST /auth/login
///
/// # Errors
/// - 401: unknown email or wrong password (same response for both)
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let form = form.into_inner();

    let session = auth
        .login(LoginInput {
            email: form.email,
            password: form.password,
        })
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(request_id = %context.request_id, user_id = %session.user.id, "Login completed");

    let expires_in = auth.access_tokens().expiry_seconds();
    Ok(HttpResponse::Ok().json(AuthResponse::from_session(session, expires_in)))
}

/// POST /auth/refresh
///
/// Rotates the refresh token: the presented token is revoked and its
/// successor returned. Reusing a rotated token yields `TOKEN_REVOKED`.
///
/// # Errors
/// - 401 with `code` naming the failure
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let tokens = auth.refresh(&form.refresh_token).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    let expires_in = auth.access_tokens().expiry_seconds();
    Ok(HttpResponse::Ok().json(AuthResponse::new(tokens, None, expires_in)))
}

/// POST /auth/logout
///
/// Always answers 200 for well-formed requests, whether or not the token
/// was valid, so the endpoint cannot be used to probe tokens.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

/// POST /api/logout-all
///
/// Revokes every refresh token of the authenticated user.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let context = ErrorContext::new("logout_all").with_user_id(user_id);

    let revoked = auth.logout_all(user_id).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::info!(request_id = %context.request_id, user_id = %user_id, revoked = revoked, "Logged out everywhere");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "revoked": revoked })))
}

/// GET /auth/me
///
/// **Requires a valid access token**; claims are injected by the
/// bearer middleware.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let context = ErrorContext::new("get_current_user").with_user_id(user_id);

    let user = auth.current_user(user_id).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;
    Ok(HttpResponse::Ok().json(user))
}
