use std::env;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Reads an optional integer setting from the environment.
fn env_i64(name: &str, default: i64) -> Result<i64> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// Reads an optional small-integer setting, rejecting out-of-range values
/// instead of truncating them.
fn env_i16(name: &str, default: i16) -> Result<i16> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: String,
    /// The HMAC secret used to sign and verify access tokens. Must be
    /// identical across all instances sharing a token/session namespace.
    pub jwt_secret: Zeroizing<String>,
    /// Access-token lifetime in minutes.
    pub access_token_ttl_minutes: i64,
    /// Refresh-token lifetime in days.
    pub refresh_token_ttl_days: i64,
    /// Minimum spacing between consecutive token renewals on one session.
    pub renewal_interval_minutes: i64,
    /// Failed login attempts tolerated before the account is locked.
    pub max_login_attempts: i16,
    /// How long a lockout lasts.
    pub lockout_minutes: i64,
    /// Concurrent live sessions allowed per user; the oldest is evicted.
    pub max_sessions_per_user: i64,
    /// Grace window before expired sessions are hard-deleted.
    pub session_retention_days: i64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            jwt_secret: Zeroizing::new(jwt_secret),
            access_token_ttl_minutes: env_i64("JWT_EXPIRATION_MINUTES", 60)?,
            refresh_token_ttl_days: env_i64("REFRESH_TOKEN_EXPIRATION_DAYS", 7)?,
            renewal_interval_minutes: env_i64("RENEWAL_INTERVAL_MINUTES", 5)?,
            max_login_attempts: env_i16("MAX_LOGIN_ATTEMPTS", 5)?,
            lockout_minutes: env_i64("LOCKOUT_MINUTES", 30)?,
            max_sessions_per_user: env_i64("MAX_SESSIONS_PER_USER", 5)?,
            session_retention_days: env_i64("SESSION_RETENTION_DAYS", 30)?,
        })
    }
}
