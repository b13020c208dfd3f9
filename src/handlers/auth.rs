use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    middleware_layer::auth::{BearerToken, CurrentUser},
    models::session::DeviceContext,
    models::user::UserProfile,
    security::token,
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

/// The request payload for a token refresh.
#[derive(Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// The response payload for registration.
#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

/// The response payload for login.
#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub expires_at: i64,
    pub session_id: Uuid,
    pub user: UserProfile,
}

/// The response payload for a token refresh. The refresh token is not echoed
/// back because it does not change.
#[derive(Serialize)]
pub struct RefreshResponse {
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: i64,
    pub session_id: Uuid,
}

/// The response payload for logout.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The response payload for the profile endpoint.
#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
}

/// The response payload for token validation.
#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub message: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

/// Builds the device context from request metadata. Prefers the first
/// `x-forwarded-for` entry over the socket address, for deployments behind a
/// proxy.
fn device_context(
    headers: &HeaderMap,
    addr: SocketAddr,
    device_name: Option<String>,
) -> DeviceContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string());

    let user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    DeviceContext {
        device_name,
        ip_address: Some(ip_address),
        user_agent,
    }
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📝 Register attempt for: {}", payload.email);
    validate_cpf(&payload.cpf)?;
    validate_name(&payload.name)?;
    validate_email(&payload.email)?;

    let user = state
        .auth
        .register(&payload.cpf, &payload.name, &payload.email, &payload.password)
        .await?;

    tracing::info!("✅ User registered: {}", user.public_id);

    let response = RegisterResponse {
        message: "User registered successfully".to_string(),
        user,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for: {}", payload.email);
    validate_email(&payload.email)?;

    let device = device_context(&headers, addr, payload.device_name.clone());
    let outcome = state
        .auth
        .login(&payload.email, &payload.password, device)
        .await?;

    tracing::info!("✅ User logged in: {}", outcome.user.public_id);

    let response = LoginResponse {
        message: "Login successful".to_string(),
        access_token: outcome.access_token,
        token_type: "Bearer".to_string(),
        refresh_token: outcome.refresh_token,
        expires_in: outcome.expires_in,
        expires_at: outcome.expires_at,
        session_id: outcome.session_public_id,
        user: outcome.user,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout. Revocation is keyed by the hash of the presented
/// access token and is best-effort.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(BearerToken(token_str)): Extension<BearerToken>,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", user.public_id);

    state.sessions.logout(&token_str).await?;

    let response = MessageResponse {
        message: "Logout successful".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles access-token renewal from a refresh token.
#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Response> {
    let outcome = state.auth.refresh(&payload.refresh_token).await?;

    let response = RefreshResponse {
        message: "Token renewed successfully".to_string(),
        access_token: outcome.access_token,
        token_type: "Bearer".to_string(),
        expires_in: outcome.expires_in,
        expires_at: outcome.expires_at,
        session_id: outcome.session_public_id,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the authenticated user's profile.
#[axum::debug_handler]
pub async fn me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response> {
    let response = ProfileResponse {
        user: UserProfile::from(&user),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Confirms the bearer token is valid and reports how long it has left.
#[axum::debug_handler]
pub async fn validate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(BearerToken(token_str)): Extension<BearerToken>,
) -> Result<Response> {
    // The guard already validated; decode again only for the expiry claim.
    let remaining = state
        .codec
        .validate(&token_str)
        .map(|claims| token::remaining_seconds(claims.exp))
        .unwrap_or(0);

    let response = ValidateResponse {
        valid: true,
        message: "Token is valid".to_string(),
        expires_in: remaining,
        user: UserProfile::from(&user),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}
