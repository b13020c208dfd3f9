use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::{BearerToken, CurrentUser},
    models::session::{SessionReport, SessionSummary},
    security::token,
    state::AppState,
};

/// The request payload for revoking every session except one.
#[derive(Deserialize, Debug)]
pub struct RevokeOthersRequest {
    pub keep_session_id: Uuid,
}

/// The request payload for a keep-alive ping.
#[derive(Deserialize, Debug)]
pub struct KeepAliveRequest {
    pub session_id: Uuid,
}

/// The response payload for listing active sessions.
#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// The response payload for bulk revocations.
#[derive(Serialize)]
pub struct RevokedResponse {
    pub message: String,
    pub revoked: u64,
}

/// The response payload for single-session operations.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The response payload describing how long the current access token lasts.
#[derive(Serialize, Deserialize)]
pub struct TimeRemainingResponse {
    pub remaining_seconds: i64,
    pub remaining_minutes: i64,
    /// Access-token expiry as epoch seconds.
    pub expires_at: i64,
}

/// Lists the caller's live sessions, most recently active first.
#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response> {
    let now = Utc::now();
    let sessions = state
        .sessions
        .list_active(user.id)
        .await?
        .iter()
        .map(|s| s.summary(now))
        .collect();
    Ok((StatusCode::OK, Json(SessionListResponse { sessions })).into_response())
}

/// Returns the caller's full session report, including revoked and expired
/// entries.
#[axum::debug_handler]
pub async fn report(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<SessionReport>> {
    let report = state.sessions.report(user.id).await?;
    Ok(Json(report))
}

/// Revokes one of the caller's sessions by its public identifier.
#[axum::debug_handler]
pub async fn revoke(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    tracing::info!("🔒 Revoking session {} for user {}", session_id, user.public_id);
    state.sessions.revoke_for_user(user.id, session_id).await?;

    let response = MessageResponse {
        message: "Session revoked successfully".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Revokes every session belonging to the caller, including the current one.
#[axum::debug_handler]
pub async fn revoke_all(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response> {
    let revoked = state.sessions.revoke_all_for_user(user.id).await?;
    tracing::info!("🧹 Revoked {} session(s) for user {}", revoked, user.public_id);

    let response = RevokedResponse {
        message: "All sessions revoked".to_string(),
        revoked,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Revokes every session belonging to the caller except the one named in the
/// request body.
#[axum::debug_handler]
pub async fn revoke_others(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<RevokeOthersRequest>,
) -> Result<Response> {
    let revoked = state
        .sessions
        .revoke_others(user.id, payload.keep_session_id)
        .await?;
    tracing::info!(
        "🧹 Revoked {} other session(s) for user {}",
        revoked,
        user.public_id
    );

    let response = RevokedResponse {
        message: "Other sessions revoked".to_string(),
        revoked,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Reports how many seconds and minutes the current access token has left,
/// and when it expires.
#[axum::debug_handler]
pub async fn time_remaining(
    State(state): State<AppState>,
    Extension(BearerToken(token_str)): Extension<BearerToken>,
) -> Result<Response> {
    let claims = state
        .codec
        .validate(&token_str)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let remaining = token::remaining_seconds(claims.exp);
    let response = TimeRemainingResponse {
        remaining_seconds: remaining,
        remaining_minutes: (remaining + 59) / 60,
        expires_at: claims.exp,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Marks one of the caller's sessions as recently active.
#[axum::debug_handler]
pub async fn keep_alive(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<KeepAliveRequest>,
) -> Result<Response> {
    if !state.sessions.keep_alive(user.id, payload.session_id).await? {
        return Err(AppError::NotFound);
    }

    let response = MessageResponse {
        message: "Session activity updated".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::middleware_layer::auth::require_auth_strict;
    use crate::models::session::DeviceContext;
    use crate::test_support::test_backend;

    #[tokio::test]
    async fn time_remaining_reports_the_access_token_expiry() {
        let backend = test_backend();
        backend
            .state
            .auth
            .register("12345678901", "Maria Silva", "maria@example.com", "Strong#1pass")
            .await
            .unwrap();
        let outcome = backend
            .state
            .auth
            .login("maria@example.com", "Strong#1pass", DeviceContext::default())
            .await
            .unwrap();

        let app = Router::new()
            .route("/api/sessions/time-remaining", get(time_remaining))
            .route_layer(from_fn_with_state(backend.state.clone(), require_auth_strict))
            .with_state(backend.state.clone());

        let request = Request::builder()
            .uri("/api/sessions/time-remaining")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", outcome.access_token),
            )
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: TimeRemainingResponse = sonic_rs::from_slice(&bytes).unwrap();
        assert!(parsed.remaining_seconds > 0 && parsed.remaining_seconds <= 3600);
        assert_eq!(
            parsed.remaining_minutes,
            (parsed.remaining_seconds + 59) / 60
        );
        assert_eq!(parsed.expires_at, outcome.expires_at);
    }
}
