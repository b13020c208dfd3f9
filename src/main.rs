use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use http::{header, Method};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod state;

mod security {
    pub mod password;
    pub mod permission;
    pub mod token;
}

mod models {
    pub mod session;
    pub mod user;
}

mod repositories {
    pub mod session;
    pub mod user;
}

mod services {
    pub mod auth;
    pub mod session;
}

mod handlers {
    pub mod auth;
    pub mod sessions;
}

mod middleware_layer {
    pub mod auth;
}

mod validation {
    pub mod auth;
}

#[cfg(test)]
mod test_support;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse()?,
            "http://127.0.0.1:3000".parse()?,
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let public_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/validate", get(handlers::auth::validate))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    // Session management routes check the live session registry on every
    // request, so revocations take effect immediately.
    let session_routes = Router::new()
        .route("/api/sessions", get(handlers::sessions::list))
        .route("/api/sessions/report", get(handlers::sessions::report))
        .route(
            "/api/sessions/time-remaining",
            get(handlers::sessions::time_remaining),
        )
        .route("/api/sessions/revoke-all", post(handlers::sessions::revoke_all))
        .route(
            "/api/sessions/revoke-others",
            post(handlers::sessions::revoke_others),
        )
        .route("/api/sessions/keep-alive", post(handlers::sessions::keep_alive))
        .route("/api/sessions/{session_id}", delete(handlers::sessions::revoke))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth_strict,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(session_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors);

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            tracing::info!("🧹 Running scheduled cleanup of expired sessions...");
            match cleanup_state.sessions.purge_expired().await {
                Ok(purged) => {
                    tracing::info!("✅ Cleanup job completed, {} session(s) removed", purged);
                }
                Err(e) => {
                    tracing::error!("❌ Cleanup job failed: {}", e);
                }
            }
        }
    });

    let addr = state.config.bind_addr.clone();
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Background cleanup job started (runs every hour)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
