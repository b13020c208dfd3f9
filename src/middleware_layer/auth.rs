use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    models::user::User,
    security::token,
    state::AppState,
};

/// The authenticated user, inserted as a request extension by the guards.
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// The raw bearer token of the request, kept for hash-keyed operations
/// (logout, session lookups).
#[derive(Clone)]
pub struct BearerToken(pub String);

/// Extracts the bearer token from the Authorization header, if any.
fn bearer_token(request: &Request) -> Option<String> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    token::extract_from_header(header_value).map(|t| t.to_string())
}

/// Validates the bearer token and loads its user.
///
/// Every token failure (missing, malformed, expired, tampered) is a 401 with
/// only generic wording; an inactive user is a 403.
///
/// Takes the already-extracted token rather than the request: the request
/// body is not `Sync`, so holding a `&Request` across the store await would
/// make the guard futures non-`Send`.
async fn authenticate(state: &AppState, token: Option<String>) -> Result<(User, String), AppError> {
    let token_str = token.ok_or_else(|| {
        AppError::Unauthorized("Authentication token not provided".to_string())
    })?;

    let claims = state
        .codec
        .validate(&token_str)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let user = state
        .users
        .find_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.active {
        return Err(AppError::Forbidden(
            "Account is inactive. Contact the administrator".to_string(),
        ));
    }

    Ok((user, token_str))
}

/// A middleware that requires a valid bearer token.
///
/// This guard is stateless with respect to the session registry: a revoked
/// session's token stays valid here until its own short expiry.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let (user, token_str) = authenticate(&state, bearer_token(&request)).await?;

    tracing::debug!("✅ User authenticated: {}", user.public_id);

    request.extensions_mut().insert(CurrentUser(user));
    request.extensions_mut().insert(BearerToken(token_str));

    Ok(next.run(request).await)
}

/// A middleware that attaches the user when a valid token is present but
/// never rejects the request.
///
/// For routes serving both anonymous and authenticated callers; handlers read
/// `Option<Extension<CurrentUser>>`.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Ok((user, token_str)) = authenticate(&state, bearer_token(&request)).await {
        tracing::debug!("✅ Optional auth resolved user: {}", user.public_id);
        request.extensions_mut().insert(CurrentUser(user));
        request.extensions_mut().insert(BearerToken(token_str));
    }

    next.run(request).await
}

/// A middleware that additionally requires a live session for the token.
///
/// Revocation propagates immediately on routes behind this guard: a token
/// whose session was revoked is rejected even though its signature is still
/// valid. Dead-session presentations are counted on the session row.
pub async fn require_auth_strict(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication (session-checked)...");

    let (user, token_str) = authenticate(&state, bearer_token(&request)).await?;

    let token_hash = token::hash_token(&token_str);
    let session = state
        .sessions
        .session_by_token_hash(&token_hash)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session not found".to_string()))?;

    if !session.is_live(chrono::Utc::now()) {
        let mut session = session;
        state.sessions.record_invalid_access(&mut session).await?;
        return Err(AppError::Unauthorized(
            "Session revoked or expired".to_string(),
        ));
    }

    // Bumps last_activity_at.
    state.sessions.validate_session(&token_hash).await?;

    tracing::debug!(
        "✅ User {} authenticated on session {}",
        user.public_id,
        session.public_id
    );

    request.extensions_mut().insert(CurrentUser(user));
    request.extensions_mut().insert(BearerToken(token_str));

    Ok(next.run(request).await)
}
