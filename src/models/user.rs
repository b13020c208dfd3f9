use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a user in the system.
///
/// `failed_login_attempts` and `locked_until` are mutated exclusively by the
/// authentication service; `last_login_at` is stamped on successful login.
#[derive(Clone, Debug)]
pub struct User {
    /// The internal numeric identifier.
    pub id: i64,
    /// The externally-exposed random identifier.
    pub public_id: Uuid,
    /// The user's national id (11 digits).
    pub cpf: String,
    /// The user's full name.
    pub name: String,
    /// The user's email address, stored lowercased.
    pub email: String,
    /// The user's hashed password.
    pub password_hash: String,
    /// Whether the user is active.
    pub active: bool,
    /// The timestamp of the user's last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Consecutive failed login attempts since the last success.
    pub failed_login_attempts: i16,
    /// When set and in the future, logins are rejected without a password check.
    pub locked_until: Option<DateTime<Utc>>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the user was last updated.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted users are invisible to every lookup.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the account is currently locked out.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }
}

/// The fields required to persist a new user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub public_id: Uuid,
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
}

/// The public view of a user. Never carries the password hash.
#[derive(Serialize, Clone, Debug)]
pub struct UserProfile {
    pub id: i64,
    pub public_id: Uuid,
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            public_id: user.public_id,
            cpf: user.cpf.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            active: user.active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
