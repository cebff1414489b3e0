/// Authentication Routes
///
/// Login, token refresh, profile and logout.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, SessionManager, SessionTokens};
use crate::error::{AppError, AuthError};
use crate::principal::PrincipalView;
use crate::validators::{is_valid_device, is_valid_email, is_valid_password, is_valid_token};

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Optional client label stored with the refresh token
    pub device: Option<String>,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Access and refresh token pair
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn new(tokens: SessionTokens, expires_in: i64) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub principal: PrincipalView,
}

/// POST /auth/login
///
/// # Errors
/// - 400: Malformed body or email
/// - 422: Unknown email or wrong password (same response for both)
/// - 503: User or token storage unavailable
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let password = is_valid_password(&form.password)?;
    let device = is_valid_device(form.device.as_deref())?;

    let outcome = sessions.login(&email, password, device).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        tokens: TokenResponse::new(outcome.tokens, sessions.access_token_expiry()),
        principal: outcome.principal,
    }))
}

/// POST /auth/refresh
///
/// Rotates the refresh token: the presented token is spent, a new pair is
/// returned.
///
/// # Errors
/// - 400: Missing or empty `refresh_token`
/// - 401: Invalid, expired, foreign or already used refresh token
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = is_valid_token("refresh_token", &form.refresh_token)?;

    let tokens = sessions.refresh(&refresh_token).await?;

    Ok(HttpResponse::Ok().json(TokenResponse::new(
        tokens,
        sessions.access_token_expiry(),
    )))
}

/// GET /auth/profile
///
/// **Requires valid access token**; returns the principal as currently stored
/// rather than the token body.
pub async fn profile(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let principal = sessions
        .validate_access_payload(&claims)
        .await?
        .ok_or_else(|| AuthError::unauthorized("principal no longer exists"))?;

    Ok(HttpResponse::Ok().json(principal.sanitized()))
}

/// POST /auth/logout
///
/// **Requires valid access token**; revokes every refresh token of the
/// caller, on all devices.
pub async fn logout(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    sessions.logout(claims.payload.sub).await?;
    Ok(HttpResponse::NoContent().finish())
}
