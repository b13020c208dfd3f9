use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::repositories::session::{PgSessionStore, SessionStore};
use crate::repositories::user::{PgUserStore, UserStore};
use crate::security::permission::{AllowAll, PermissionChecker};
use crate::security::token::TokenCodec;
use crate::services::auth::AuthService;
use crate::services::session::SessionService;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Direct user lookups for the request guard.
    pub users: Arc<dyn UserStore>,
    /// Access-token codec, shared across all routes.
    pub codec: TokenCodec,
    /// Authentication orchestration (register/login/refresh).
    pub auth: AuthService,
    /// Session lifecycle orchestration.
    pub sessions: SessionService,
    /// Permission seam consumed by the non-auth endpoints.
    pub permissions: Arc<dyn PermissionChecker>,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");

        let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.clone()));
        let sessions_store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(db));

        Ok(Self::with_stores(config, users, sessions_store))
    }

    /// Wires the services over arbitrary store implementations. Production
    /// uses Postgres stores; tests plug in in-memory ones.
    pub fn with_stores(
        config: &Config,
        users: Arc<dyn UserStore>,
        sessions_store: Arc<dyn SessionStore>,
    ) -> Self {
        let codec = TokenCodec::new(&config.jwt_secret, config.access_token_ttl_minutes);
        let sessions = SessionService::new(sessions_store, config);
        let auth = AuthService::new(users.clone(), sessions.clone(), codec.clone(), config);

        AppState {
            config: config.clone(),
            users,
            codec,
            auth,
            sessions,
            permissions: Arc::new(AllowAll),
        }
    }
}
