use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::session::DeviceContext,
    models::user::{NewUser, User, UserProfile},
    repositories::user::UserStore,
    security::{password, token, token::TokenCodec},
    services::session::SessionService,
};

/// The result of a successful login.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub session_public_id: Uuid,
    /// Access-token expiry as epoch seconds.
    pub expires_at: i64,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub user: UserProfile,
}

/// Orchestrates credential verification, the lockout policy and token
/// issuance. Owns every mutation of `failed_login_attempts`/`locked_until`.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
    codec: TokenCodec,
    max_login_attempts: i16,
    lockout_minutes: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionService,
        codec: TokenCodec,
        config: &Config,
    ) -> Self {
        Self {
            users,
            sessions,
            codec,
            max_login_attempts: config.max_login_attempts,
            lockout_minutes: config.lockout_minutes,
        }
    }

    /// Registers a new user.
    ///
    /// Rejects duplicate emails (case-insensitive) and duplicate CPFs, and
    /// enforces the password strength policy, reporting every violated rule
    /// in one combined message.
    pub async fn register(
        &self,
        cpf: &str,
        name: &str,
        email: &str,
        password_plain: &str,
    ) -> Result<UserProfile> {
        let email = email.trim().to_lowercase();
        tracing::debug!("📝 Registering user: {}", email);

        if self.users.email_exists(&email, None).await? {
            return Err(AppError::Validation(
                "Email is already registered".to_string(),
            ));
        }

        if self.users.cpf_exists(cpf, None).await? {
            return Err(AppError::Validation(
                "CPF is already registered".to_string(),
            ));
        }

        let (strong, problems) = password::assess_strength(password_plain);
        if !strong {
            return Err(AppError::Validation(format!(
                "Password does not meet the requirements: {}",
                problems.join("; ")
            )));
        }

        // Argon2 is CPU-bound; keep it off the async executor.
        let password_hash = {
            let password_plain = password_plain.to_owned();
            tokio::task::spawn_blocking(move || password::hash_password(&password_plain))
                .await
                .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??
        };

        let user = self
            .users
            .create(NewUser {
                public_id: Uuid::new_v4(),
                cpf: cpf.to_string(),
                name: name.trim().to_string(),
                email,
                password_hash,
                active: true,
            })
            .await?;

        tracing::info!("✅ User registered: {}", user.public_id);
        Ok(UserProfile::from(&user))
    }

    /// Authenticates a user and opens a session.
    ///
    /// Drives the lockout state machine: a locked account is rejected without
    /// consuming an attempt; an expired lock is lazily cleared; a wrong
    /// password increments the counter and locks the account when the maximum
    /// is reached.
    pub async fn login(
        &self,
        email: &str,
        password_plain: &str,
        device: DeviceContext,
    ) -> Result<LoginOutcome> {
        tracing::debug!("🔐 Login attempt for: {}", email);

        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Credentials("Invalid email or password".to_string()))?;

        if !user.active {
            return Err(AppError::Inactive);
        }

        let now = Utc::now();
        if let Some(locked_until) = user.locked_until {
            if locked_until > now {
                // Ceiling of the remaining minutes, so "0 minutes" is never shown.
                let minutes = ((locked_until - now).num_seconds() + 59) / 60;
                return Err(AppError::Locked { minutes });
            }

            // Lock expired: lazy unlock, then proceed to the password check.
            self.users.reset_failed_logins(user.id).await?;
            user.failed_login_attempts = 0;
            user.locked_until = None;
            tracing::debug!("🔓 Expired lockout cleared for user {}", user.public_id);
        }

        let verified = {
            let password_plain = password_plain.to_owned();
            let hash = user.password_hash.clone();
            tokio::task::spawn_blocking(move || password::verify_password(&password_plain, &hash))
                .await
                .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
        };

        if !verified {
            return Err(self.register_failed_attempt(&user).await?);
        }

        self.users.record_login_success(user.id, now).await?;
        tracing::info!("✅ User authenticated: {}", user.public_id);

        let (access_token, expires_at) =
            self.codec.issue(user.id, user.public_id, &user.email)?;
        let refresh_token = token::generate_refresh_token();

        let session = self
            .sessions
            .create_session(user.id, &access_token, &refresh_token, device)
            .await?;

        let mut user = user;
        user.last_login_at = Some(now);

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            session_public_id: session.public_id,
            expires_at,
            expires_in: token::remaining_seconds(expires_at),
            user: UserProfile::from(&user),
        })
    }

    /// Counts a wrong-password attempt and decides between "N attempts
    /// remaining" and a fresh lockout. Always returns the error to surface.
    async fn register_failed_attempt(&self, user: &User) -> Result<AppError> {
        let attempts = self.users.increment_failed_logins(user.id).await?;

        if attempts >= self.max_login_attempts {
            let until = Utc::now() + chrono::Duration::minutes(self.lockout_minutes);
            self.users.lock_until(user.id, until).await?;
            tracing::warn!(
                "🔒 User {} locked until {} after {} failed attempts",
                user.public_id,
                until,
                attempts
            );
            return Ok(AppError::Locked {
                minutes: self.lockout_minutes,
            });
        }

        let remaining = self.max_login_attempts - attempts;
        Ok(AppError::Credentials(format!(
            "Invalid email or password. {} attempt(s) remaining before temporary lockout",
            remaining
        )))
    }

    /// Renews an access token from a refresh token.
    ///
    /// Looks the session up by refresh-token hash, applies the renewal policy
    /// (liveness, refresh expiry, rate limit), and on success swaps in the
    /// new access-token hash. Refused attempts are recorded too, so abuse is
    /// visible in the session counters.
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginOutcome> {
        let refresh_hash = token::hash_token(refresh_token);

        let Some(mut session) = self.sessions.session_by_refresh_hash(&refresh_hash).await?
        else {
            return Err(AppError::SessionRefused("Refresh token invalid".to_string()));
        };

        if let Err(denied) = self.sessions.can_renew(&session) {
            self.sessions.record_renewal_attempt(&mut session).await?;
            return Err(AppError::SessionRefused(denied.to_string()));
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if !user.active {
            return Err(AppError::Inactive);
        }

        let (access_token, expires_at) =
            self.codec.issue(user.id, user.public_id, &user.email)?;
        self.sessions
            .complete_renewal(&mut session, &access_token)
            .await?;

        tracing::info!("🔄 Access token renewed for session {}", session.public_id);

        Ok(LoginOutcome {
            access_token,
            // Deliberately unrotated: the same refresh token stays valid
            // until its own expiry.
            refresh_token: refresh_token.to_string(),
            session_public_id: session.public_id,
            expires_at,
            expires_in: token::remaining_seconds(expires_at),
            user: UserProfile::from(&user),
        })
    }

    /// Validates a bearer token and returns the owning user's profile, or
    /// `None` when the token is invalid or the user is missing/inactive.
    pub async fn validate_token(&self, token_str: &str) -> Result<Option<UserProfile>> {
        let Some(claims) = self.codec.validate(token_str) else {
            return Ok(None);
        };

        let user = self.users.find_by_id(claims.user_id).await?;
        Ok(user
            .filter(|u| u.active)
            .map(|u| UserProfile::from(&u)))
    }

    /// Looks a user up by their public UUID.
    pub async fn user_by_public_id(&self, public_id: Uuid) -> Result<Option<UserProfile>> {
        let user = self.users.find_by_public_id(public_id).await?;
        Ok(user.map(|u| UserProfile::from(&u)))
    }
}
