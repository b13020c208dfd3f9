use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::session::{DeviceContext, NewSession, Session, SessionReport},
    repositories::session::SessionStore,
    security::token,
};

/// Why a renewal was refused. Reasons are user-actionable and reported
/// verbatim; they are not security-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDenied {
    /// The session is revoked or its access token already expired.
    NotLive,
    /// The refresh token itself has expired.
    RefreshExpired,
    /// The renewal rate limit has not elapsed yet.
    RateLimited { seconds: i64 },
}

impl std::fmt::Display for RenewalDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenewalDenied::NotLive => write!(f, "Session inactive or expired"),
            RenewalDenied::RefreshExpired => write!(f, "Refresh token expired"),
            RenewalDenied::RateLimited { seconds } => {
                write!(f, "Wait {} second(s) before renewing the token", seconds)
            }
        }
    }
}

/// Orchestrates session creation, refresh-token rotation policy and
/// multi-device revocation rules on top of a `SessionStore`.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    access_ttl_minutes: i64,
    refresh_ttl_days: i64,
    renewal_interval_minutes: i64,
    max_concurrent: i64,
    retention_days: i64,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self {
            store,
            access_ttl_minutes: config.access_token_ttl_minutes,
            refresh_ttl_days: config.refresh_token_ttl_days,
            renewal_interval_minutes: config.renewal_interval_minutes,
            max_concurrent: config.max_sessions_per_user,
            retention_days: config.session_retention_days,
        }
    }

    /// Creates a session for a fresh login, storing only token digests.
    ///
    /// When the user already holds the maximum number of live sessions, the
    /// one with the oldest activity is revoked to make room.
    pub async fn create_session(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
        device: DeviceContext,
    ) -> Result<Session> {
        let active = self.store.count_active_for_user(user_id).await?;
        if active >= self.max_concurrent {
            let sessions = self.store.list_active_for_user(user_id).await?;
            // Ordered by most-recent activity; the last one is the stalest.
            if let Some(oldest) = sessions.last() {
                self.store.revoke(oldest.id, "Session limit reached").await?;
                tracing::info!(
                    "🧹 Session limit reached for user {}, evicted session {}",
                    user_id,
                    oldest.public_id
                );
            }
        }

        let now = Utc::now();
        let session = self
            .store
            .create(NewSession {
                public_id: Uuid::new_v4(),
                user_id,
                token_hash: token::hash_token(access_token),
                refresh_token_hash: Some(token::hash_token(refresh_token)),
                device_name: device.device_name,
                ip_address: device.ip_address,
                user_agent: device.user_agent,
                expires_at: now + Duration::minutes(self.access_ttl_minutes),
                refresh_expires_at: Some(now + Duration::days(self.refresh_ttl_days)),
                // Renewal is allowed right away; the rate-limit window starts
                // counting from the first renewal attempt.
                next_renewal_allowed_at: Some(now),
            })
            .await?;

        tracing::info!("✅ Session {} created for user {}", session.public_id, user_id);
        Ok(session)
    }

    /// Looks up a session by access-token hash and, when live, bumps its
    /// activity timestamp. Dead or unknown sessions yield `None`.
    pub async fn validate_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.store.find_by_token_hash(token_hash).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if !session.is_live(now) {
            return Ok(None);
        }

        session.touch(now);
        self.store.update(&session).await?;
        Ok(Some(session))
    }

    /// Raw lookup by access-token hash, dead sessions included.
    pub async fn session_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        self.store.find_by_token_hash(token_hash).await
    }

    /// Raw lookup by refresh-token hash, dead sessions included.
    pub async fn session_by_refresh_hash(&self, refresh_hash: &str) -> Result<Option<Session>> {
        self.store.find_by_refresh_token_hash(refresh_hash).await
    }

    /// Whether the session may renew its access token right now.
    pub fn can_renew(&self, session: &Session) -> std::result::Result<(), RenewalDenied> {
        let now = Utc::now();

        if !session.is_live(now) {
            return Err(RenewalDenied::NotLive);
        }

        if let Some(refresh_expires_at) = session.refresh_expires_at {
            if now > refresh_expires_at {
                return Err(RenewalDenied::RefreshExpired);
            }
        }

        if let Some(next_allowed) = session.next_renewal_allowed_at {
            if now < next_allowed {
                let seconds = (next_allowed - now).num_seconds().max(1);
                return Err(RenewalDenied::RateLimited { seconds });
            }
        }

        Ok(())
    }

    /// Records a renewal attempt: bumps the counter and restarts the
    /// rate-limit window. Called on allowed and refused attempts alike so
    /// refresh-spam is visible in the counters.
    pub async fn record_renewal_attempt(&self, session: &mut Session) -> Result<()> {
        session.renewal_attempt_count += 1;
        session.next_renewal_allowed_at =
            Some(Utc::now() + Duration::minutes(self.renewal_interval_minutes));
        self.store.update(session).await
    }

    /// Completes an allowed renewal: swaps in the new access-token hash,
    /// extends expiry, bumps activity, and records the attempt.
    ///
    /// The refresh token itself is not rotated; it stays valid until its own
    /// expiry.
    pub async fn complete_renewal(
        &self,
        session: &mut Session,
        new_access_token: &str,
    ) -> Result<()> {
        let now = Utc::now();
        session.renewal_attempt_count += 1;
        session.next_renewal_allowed_at =
            Some(now + Duration::minutes(self.renewal_interval_minutes));
        session.token_hash = token::hash_token(new_access_token);
        session.expires_at = now + Duration::minutes(self.access_ttl_minutes);
        session.touch(now);
        self.store.update(session).await
    }

    /// Records an access attempt with a token that did not match a live
    /// session.
    pub async fn record_invalid_access(&self, session: &mut Session) -> Result<()> {
        session.invalid_access_attempt_count += 1;
        self.store.update(session).await
    }

    /// Best-effort logout: revokes the session matching the presented access
    /// token, if any.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let token_hash = token::hash_token(access_token);
        if let Some(session) = self.store.find_by_token_hash(&token_hash).await? {
            self.store.revoke(session.id, "Logged out").await?;
            tracing::info!("👋 Session {} revoked on logout", session.public_id);
        }
        Ok(())
    }

    /// Revokes one of the caller's sessions. A session that does not exist or
    /// belongs to someone else is reported as not-found, never as forbidden.
    pub async fn revoke_for_user(&self, user_id: i64, session_public_id: Uuid) -> Result<()> {
        let session = self
            .store
            .find_by_public_id(session_public_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        self.store.revoke(session.id, "Revoked by user").await?;
        tracing::info!("✅ Session {} revoked by user {}", session_public_id, user_id);
        Ok(())
    }

    /// Revokes every live session of a user. Returns the count.
    pub async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64> {
        let count = self
            .store
            .revoke_all_for_user(user_id, "All sessions revoked by user")
            .await?;
        tracing::info!("✅ {} session(s) revoked for user {}", count, user_id);
        Ok(count)
    }

    /// Revokes every live session of a user except the one to keep ("sign
    /// out of all other devices"). The kept session must belong to the caller.
    pub async fn revoke_others(&self, user_id: i64, keep_public_id: Uuid) -> Result<u64> {
        let keep = self
            .store
            .find_by_public_id(keep_public_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        let count = self
            .store
            .revoke_others(user_id, keep.id, "Revoked from another device")
            .await?;
        tracing::info!(
            "✅ {} other session(s) revoked for user {}, kept {}",
            count,
            user_id,
            keep_public_id
        );
        Ok(count)
    }

    /// Bumps the activity of one of the caller's live sessions.
    pub async fn keep_alive(&self, user_id: i64, session_public_id: Uuid) -> Result<bool> {
        let Some(mut session) = self.store.find_by_public_id(session_public_id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        if session.user_id != user_id || !session.is_live(now) {
            return Ok(false);
        }

        session.touch(now);
        self.store.update(&session).await?;
        Ok(true)
    }

    /// All live sessions of a user, most recent activity first.
    pub async fn list_active(&self, user_id: i64) -> Result<Vec<Session>> {
        self.store.list_active_for_user(user_id).await
    }

    /// Aggregate view over every session of a user. No side effects.
    pub async fn report(&self, user_id: i64) -> Result<SessionReport> {
        let now = Utc::now();
        let all = self.store.list_for_user(user_id).await?;
        let active = all.iter().filter(|s| s.is_live(now)).count();

        Ok(SessionReport {
            total_sessions: all.len(),
            active_sessions: active,
            sessions: all.iter().map(|s| s.summary(now)).collect(),
        })
    }

    /// Retention sweep: hard-deletes inactive sessions expired beyond the
    /// grace window. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let deleted = self.store.purge_expired(cutoff).await?;
        if deleted > 0 {
            tracing::info!("🧹 Purged {} expired session(s)", deleted);
        }
        Ok(deleted)
    }

    /// Lightweight per-user cleanup of expired sessions.
    pub async fn purge_expired_for_user(&self, user_id: i64) -> Result<u64> {
        self.store.purge_expired_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_backend, TestBackend};

    async fn open_session(backend: &TestBackend, user_id: i64, n: u32) -> Session {
        backend
            .state
            .sessions
            .create_session(
                user_id,
                &format!("access-{}", n),
                &format!("refresh-{}", n),
                DeviceContext {
                    device_name: Some(format!("device-{}", n)),
                    ..DeviceContext::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn session_limit_evicts_the_stalest_session() {
        let backend = test_backend();

        let first = open_session(&backend, 1, 0).await;
        let mut rest = Vec::new();
        for n in 1..5 {
            // Backdate the first session's activity so it is the eviction
            // candidate regardless of timer resolution.
            let mut stale = backend.sessions.snapshot(first.id).await.unwrap();
            stale.last_activity_at = Utc::now() - Duration::minutes(10);
            backend.sessions.put(stale).await;
            rest.push(open_session(&backend, 1, n).await);
        }

        // Sixth login: the limit is 5, the stalest must go.
        let sixth = open_session(&backend, 1, 5).await;

        let live = backend.state.sessions.list_active(1).await.unwrap();
        assert_eq!(live.len(), 5);
        assert!(live.iter().all(|s| s.public_id != first.public_id));
        assert!(live.iter().any(|s| s.public_id == sixth.public_id));

        let evicted = backend.sessions.snapshot(first.id).await.unwrap();
        assert_eq!(evicted.revocation_reason.as_deref(), Some("Session limit reached"));
    }

    #[tokio::test]
    async fn validate_session_bumps_activity_and_rejects_dead_sessions() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;
        let hash = token::hash_token("access-0");

        let validated = backend
            .state
            .sessions
            .validate_session(&hash)
            .await
            .unwrap()
            .unwrap();
        assert!(validated.last_activity_at >= session.last_activity_at);

        backend.state.sessions.revoke_all_for_user(1).await.unwrap();
        let validated = backend.state.sessions.validate_session(&hash).await.unwrap();
        assert!(validated.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_never_listed_as_active() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        let mut expired = backend.sessions.snapshot(session.id).await.unwrap();
        expired.expires_at = Utc::now() - Duration::minutes(1);
        backend.sessions.put(expired).await;

        let live = backend.state.sessions.list_active(1).await.unwrap();
        assert!(live.is_empty());

        // The row itself still exists until the retention sweep.
        assert_eq!(backend.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn logout_revokes_by_access_token_and_tolerates_unknown_tokens() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        backend.state.sessions.logout("access-0").await.unwrap();
        let revoked = backend.sessions.snapshot(session.id).await.unwrap();
        assert!(!revoked.active);
        assert_eq!(revoked.revocation_reason.as_deref(), Some("Logged out"));

        // Logging out twice, or with a token that matches nothing, is fine.
        backend.state.sessions.logout("access-0").await.unwrap();
        backend.state.sessions.logout("never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn revoking_someone_elses_session_reads_as_not_found() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        let err = backend
            .state
            .sessions
            .revoke_for_user(2, session.public_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));

        // Untouched.
        assert!(backend.sessions.snapshot(session.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn revoke_others_keeps_exactly_the_named_session() {
        let backend = test_backend();
        let keep = open_session(&backend, 1, 0).await;
        for n in 1..4 {
            open_session(&backend, 1, n).await;
        }

        let revoked = backend
            .state
            .sessions
            .revoke_others(1, keep.public_id)
            .await
            .unwrap();
        assert_eq!(revoked, 3);

        let live = backend.state.sessions.list_active(1).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].public_id, keep.public_id);
    }

    #[tokio::test]
    async fn revoke_others_requires_the_kept_session_to_be_owned() {
        let backend = test_backend();
        let foreign = open_session(&backend, 2, 0).await;
        open_session(&backend, 1, 1).await;

        let err = backend
            .state
            .sessions
            .revoke_others(1, foreign.public_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn report_counts_dead_sessions_but_flags_only_live_ones() {
        let backend = test_backend();
        open_session(&backend, 1, 0).await;
        let second = open_session(&backend, 1, 1).await;
        open_session(&backend, 2, 2).await;

        backend
            .state
            .sessions
            .revoke_for_user(1, second.public_id)
            .await
            .unwrap();

        let report = backend.state.sessions.report(1).await.unwrap();
        assert_eq!(report.total_sessions, 2);
        assert_eq!(report.active_sessions, 1);
        assert_eq!(report.sessions.len(), 2);

        let dead = report
            .sessions
            .iter()
            .find(|s| s.session_id == second.public_id)
            .unwrap();
        assert!(!dead.active);
        assert_eq!(dead.revocation_reason.as_deref(), Some("Revoked by user"));
    }

    #[tokio::test]
    async fn retention_sweep_removes_only_long_dead_sessions() {
        let backend = test_backend();
        let fresh = open_session(&backend, 1, 0).await;
        let recent_dead = open_session(&backend, 1, 1).await;
        let old_dead = open_session(&backend, 1, 2).await;

        let now = Utc::now();
        let mut row = backend.sessions.snapshot(recent_dead.id).await.unwrap();
        row.active = false;
        row.expires_at = now - Duration::days(5);
        backend.sessions.put(row).await;

        let mut row = backend.sessions.snapshot(old_dead.id).await.unwrap();
        row.active = false;
        row.expires_at = now - Duration::days(45);
        backend.sessions.put(row).await;

        let purged = backend.state.sessions.purge_expired().await.unwrap();
        assert_eq!(purged, 1);

        assert!(backend.sessions.snapshot(fresh.id).await.is_some());
        assert!(backend.sessions.snapshot(recent_dead.id).await.is_some());
        assert!(backend.sessions.snapshot(old_dead.id).await.is_none());
    }

    #[tokio::test]
    async fn keep_alive_touches_owned_live_sessions_only() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        assert!(backend
            .state
            .sessions
            .keep_alive(1, session.public_id)
            .await
            .unwrap());
        assert!(!backend
            .state
            .sessions
            .keep_alive(2, session.public_id)
            .await
            .unwrap());

        backend.state.sessions.revoke_all_for_user(1).await.unwrap();
        assert!(!backend
            .state
            .sessions
            .keep_alive(1, session.public_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn renewal_rate_limit_reports_the_remaining_wait() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        // Fresh sessions may renew immediately.
        assert!(backend.state.sessions.can_renew(&session).is_ok());

        let mut session = session;
        backend
            .state
            .sessions
            .record_renewal_attempt(&mut session)
            .await
            .unwrap();

        let denied = backend.state.sessions.can_renew(&session).unwrap_err();
        let RenewalDenied::RateLimited { seconds } = denied else {
            panic!("expected a rate-limited denial");
        };
        assert!(seconds > 0 && seconds <= 300);
    }

    #[tokio::test]
    async fn expired_refresh_token_denies_renewal() {
        let backend = test_backend();
        let session = open_session(&backend, 1, 0).await;

        let mut stale = backend.sessions.snapshot(session.id).await.unwrap();
        stale.refresh_expires_at = Some(Utc::now() - Duration::minutes(1));
        assert_eq!(
            backend.state.sessions.can_renew(&stale).unwrap_err(),
            RenewalDenied::RefreshExpired
        );
    }
}
