//! In-memory store implementations and fixtures shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::Result;
use crate::models::session::{NewSession, Session};
use crate::models::user::{NewUser, User};
use crate::repositories::session::SessionStore;
use crate::repositories::user::UserStore;
use crate::state::AppState;

/// A configuration mirroring the production defaults, pointed at nothing.
pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/unused".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        jwt_secret: Zeroizing::new("test-secret-that-is-long-enough-for-hmac".to_string()),
        access_token_ttl_minutes: 60,
        refresh_token_ttl_days: 7,
        renewal_interval_minutes: 5,
        max_login_attempts: 5,
        lockout_minutes: 30,
        max_sessions_per_user: 5,
        session_retention_days: 30,
    }
}

/// Everything a service-level test needs: the wired state plus raw handles to
/// the underlying stores for direct inspection.
pub struct TestBackend {
    pub state: AppState,
    pub users: Arc<InMemoryUserStore>,
    pub sessions: Arc<InMemorySessionStore>,
}

/// Wires the full service stack over in-memory stores.
pub fn test_backend() -> TestBackend {
    let config = test_config();
    let users = Arc::new(InMemoryUserStore::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let state = AppState::with_stores(&config, users.clone(), sessions.clone());
    TestBackend {
        state,
        users,
        sessions,
    }
}

/// `UserStore` over a mutex-guarded vector.
#[derive(Default)]
pub struct InMemoryUserStore {
    rows: Mutex<Vec<User>>,
    next_id: Mutex<i64>,
}

impl InMemoryUserStore {
    async fn alloc_id(&self) -> i64 {
        let mut next = self.next_id.lock().await;
        *next += 1;
        *next
    }

    /// Snapshot of a user row for assertions.
    pub async fn snapshot(&self, user_id: i64) -> Option<User> {
        let rows = self.rows.lock().await;
        rows.iter().find(|u| u.id == user_id).cloned()
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User> {
        let id = self.alloc_id().await;
        let now = Utc::now();
        let user = User {
            id,
            public_id: new_user.public_id,
            cpf: new_user.cpf,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            active: new_user.active,
            last_login_at: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.rows.lock().await.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|u| u.id == user_id && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<User>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|u| u.public_id == public_id && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|u| same_email(&u.email, email) && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_cpf(&self, cpf: &str) -> Result<Option<User>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|u| u.cpf == cpf && u.deleted_at.is_none())
            .cloned())
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().any(|u| {
            same_email(&u.email, email)
                && u.deleted_at.is_none()
                && exclude_id.map_or(true, |id| u.id != id)
        }))
    }

    async fn cpf_exists(&self, cpf: &str, exclude_id: Option<i64>) -> Result<bool> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().any(|u| {
            u.cpf == cpf && u.deleted_at.is_none() && exclude_id.map_or(true, |id| u.id != id)
        }))
    }

    async fn increment_failed_logins(&self, user_id: i64) -> Result<i16> {
        let mut rows = self.rows.lock().await;
        let user = rows
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(crate::error::AppError::NotFound)?;
        user.failed_login_attempts += 1;
        user.updated_at = Utc::now();
        Ok(user.failed_login_attempts)
    }

    async fn reset_failed_logins(&self, user_id: i64) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(user) = rows.iter_mut().find(|u| u.id == user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn lock_until(&self, user_id: i64, until: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(user) = rows.iter_mut().find(|u| u.id == user_id) {
            user.locked_until = Some(until);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_login_success(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(user) = rows.iter_mut().find(|u| u.id == user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(at);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// `SessionStore` over a mutex-guarded vector.
#[derive(Default)]
pub struct InMemorySessionStore {
    rows: Mutex<Vec<Session>>,
    next_id: Mutex<i64>,
}

impl InMemorySessionStore {
    async fn alloc_id(&self) -> i64 {
        let mut next = self.next_id.lock().await;
        *next += 1;
        *next
    }

    /// Snapshot of a session row for assertions.
    pub async fn snapshot(&self, session_id: i64) -> Option<Session> {
        let rows = self.rows.lock().await;
        rows.iter().find(|s| s.id == session_id).cloned()
    }

    /// Overwrites a row directly, bypassing the service layer. Lets tests
    /// backdate timestamps.
    pub async fn put(&self, session: Session) {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows.iter_mut().find(|s| s.id == session.id) {
            *existing = session;
        } else {
            rows.push(session);
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, new_session: NewSession) -> Result<Session> {
        let id = self.alloc_id().await;
        let now = Utc::now();
        let session = Session {
            id,
            public_id: new_session.public_id,
            user_id: new_session.user_id,
            token_hash: new_session.token_hash,
            refresh_token_hash: new_session.refresh_token_hash,
            device_name: new_session.device_name,
            ip_address: new_session.ip_address,
            user_agent: new_session.user_agent,
            created_at: now,
            last_activity_at: now,
            expires_at: new_session.expires_at,
            active: true,
            revoked_at: None,
            revocation_reason: None,
            refresh_expires_at: new_session.refresh_expires_at,
            next_renewal_allowed_at: new_session.next_renewal_allowed_at,
            renewal_attempt_count: 0,
            invalid_access_attempt_count: 0,
        };
        self.rows.lock().await.push(session.clone());
        Ok(session)
    }

    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<Session>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|s| s.public_id == public_id).cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|s| s.token_hash == token_hash).cloned())
    }

    async fn find_by_refresh_token_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|s| s.refresh_token_hash.as_deref() == Some(refresh_token_hash))
            .cloned())
    }

    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let now = Utc::now();
        let rows = self.rows.lock().await;
        let mut live: Vec<Session> = rows
            .iter()
            .filter(|s| s.user_id == user_id && s.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(live)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let rows = self.rows.lock().await;
        let mut all: Vec<Session> = rows
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn count_active_for_user(&self, user_id: i64) -> Result<i64> {
        let now = Utc::now();
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|s| s.user_id == user_id && s.active && s.expires_at > now)
            .count() as i64)
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows.iter_mut().find(|s| s.id == session.id) {
            *existing = session.clone();
        }
        Ok(())
    }

    async fn revoke(&self, session_id: i64, reason: &str) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(session) = rows.iter_mut().find(|s| s.id == session_id) else {
            return Ok(false);
        };
        session.revoke(reason, Utc::now());
        Ok(true)
    }

    async fn revoke_all_for_user(&self, user_id: i64, reason: &str) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let mut count = 0;
        for session in rows
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.active && s.expires_at > now)
        {
            session.revoke(reason, now);
            count += 1;
        }
        Ok(count)
    }

    async fn revoke_others(
        &self,
        user_id: i64,
        keep_session_id: i64,
        reason: &str,
    ) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let mut count = 0;
        for session in rows.iter_mut().filter(|s| {
            s.user_id == user_id && s.id != keep_session_id && s.active && s.expires_at > now
        }) {
            session.revoke(reason, now);
            count += 1;
        }
        Ok(count)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| s.active || s.expires_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn purge_expired_for_user(&self, user_id: i64) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| s.user_id != user_id || s.expires_at >= now);
        Ok((before - rows.len()) as u64)
    }

    async fn delete(&self, session_id: i64) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| s.id != session_id);
        Ok(before != rows.len())
    }
}
