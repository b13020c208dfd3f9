use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context describing the device a login came from.
#[derive(Clone, Debug, Default)]
pub struct DeviceContext {
    /// Human-readable device name, e.g. "iPhone 12" or "Firefox on Windows".
    pub device_name: Option<String>,
    /// IPv4 or IPv6 address of the client.
    pub ip_address: Option<String>,
    /// The User-Agent header of the browser/app.
    pub user_agent: Option<String>,
}

/// Represents one authenticated device/login.
///
/// Only SHA-256 digests of the access and refresh tokens are ever stored; the
/// raw tokens live exclusively on the client.
#[derive(Clone, Debug)]
pub struct Session {
    /// The internal numeric identifier.
    pub id: i64,
    /// The externally-exposed random identifier.
    pub public_id: Uuid,
    /// The user this session belongs to.
    pub user_id: i64,
    /// Hash of the current access token. Unique across live sessions.
    pub token_hash: String,
    /// Hash of the refresh token, when one was issued.
    pub refresh_token_hash: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every refresh and every authenticated request.
    pub last_activity_at: DateTime<Utc>,
    /// When the current access token expires.
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    /// When the refresh token itself expires. Always >= `expires_at` at creation.
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Rate-limit marker: renewals before this instant are refused.
    pub next_renewal_allowed_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing until the row is hard-deleted.
    pub renewal_attempt_count: i64,
    /// Monotonically non-decreasing until the row is hard-deleted.
    pub invalid_access_attempt_count: i64,
}

impl Session {
    /// Whether the session is live: active, not revoked, not expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }

        if let Some(revoked_at) = self.revoked_at {
            if now >= revoked_at {
                return false;
            }
        }

        now < self.expires_at
    }

    /// Updates the last-activity timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Revokes the session.
    pub fn revoke(&mut self, reason: &str, now: DateTime<Utc>) {
        self.active = false;
        self.revoked_at = Some(now);
        self.revocation_reason = Some(reason.to_string());
    }

    /// Seconds until the access token expires, zero when already dead.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_live(now) {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }

    /// The client-facing view of this session.
    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            session_id: self.public_id,
            device_name: self.device_name.clone(),
            ip_address: self.ip_address.clone(),
            active: self.is_live(now),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            expires_at: self.expires_at,
            remaining_seconds: self.remaining_seconds(now),
            revocation_reason: self.revocation_reason.clone(),
        }
    }
}

/// The fields required to persist a new session.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub public_id: Uuid,
    pub user_id: i64,
    pub token_hash: String,
    pub refresh_token_hash: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub next_renewal_allowed_at: Option<DateTime<Utc>>,
}

/// What a user sees when listing their sessions. Never carries token hashes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub revocation_reason: Option<String>,
}

/// Aggregate view over all of a user's sessions. Produced without side effects.
#[derive(Serialize, Clone, Debug)]
pub struct SessionReport {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn live_session(now: DateTime<Utc>) -> Session {
        Session {
            id: 1,
            public_id: Uuid::new_v4(),
            user_id: 7,
            token_hash: "aa".repeat(32),
            refresh_token_hash: Some("bb".repeat(32)),
            device_name: Some("Firefox on Linux".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
            created_at: now,
            last_activity_at: now,
            expires_at: now + Duration::minutes(60),
            active: true,
            revoked_at: None,
            revocation_reason: None,
            refresh_expires_at: Some(now + Duration::days(7)),
            next_renewal_allowed_at: Some(now),
            renewal_attempt_count: 0,
            invalid_access_attempt_count: 0,
        }
    }

    #[test]
    fn inactive_flag_kills_the_session_regardless_of_expiry() {
        let now = Utc::now();
        let mut session = live_session(now);
        assert!(session.is_live(now));

        session.active = false;
        assert!(!session.is_live(now));
    }

    #[test]
    fn past_expiry_kills_an_active_session() {
        let now = Utc::now();
        let mut session = live_session(now);
        session.expires_at = now - Duration::seconds(1);
        assert!(!session.is_live(now));
    }

    #[test]
    fn revoke_flips_state_and_records_the_reason() {
        let now = Utc::now();
        let mut session = live_session(now);
        session.revoke("Revoked by user", now);

        assert!(!session.active);
        assert_eq!(session.revoked_at, Some(now));
        assert_eq!(session.revocation_reason.as_deref(), Some("Revoked by user"));
        assert!(!session.is_live(now));
    }

    #[test]
    fn remaining_seconds_is_zero_for_dead_sessions() {
        let now = Utc::now();
        let mut session = live_session(now);
        assert!(session.remaining_seconds(now) > 3500);

        session.revoke("Revoked", now);
        assert_eq!(session.remaining_seconds(now), 0);
    }

    #[test]
    fn summary_never_exposes_token_hashes() {
        let now = Utc::now();
        let session = live_session(now);
        let json = sonic_rs::to_string(&session.summary(now)).unwrap();
        assert!(!json.contains(&session.token_hash));
        assert!(!json.contains(session.refresh_token_hash.as_deref().unwrap()));
    }
}
