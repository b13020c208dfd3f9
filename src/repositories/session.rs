use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{NewSession, Session},
};

/// Persistence operations for the `Session` entity.
///
/// "Active" queries filter on both the boolean flag and a live expiry
/// comparison: a row with `active = true` but a past `expires_at` is never
/// returned as active.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, new_session: NewSession) -> Result<Session>;
    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<Session>>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>>;
    async fn find_by_refresh_token_hash(&self, refresh_token_hash: &str)
        -> Result<Option<Session>>;

    /// All live sessions of a user, most recent activity first.
    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<Session>>;

    /// Every session of a user regardless of state, newest first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>>;

    async fn count_active_for_user(&self, user_id: i64) -> Result<i64>;

    /// Full overwrite of the mutable session fields, keyed by id.
    async fn update(&self, session: &Session) -> Result<()>;

    /// Soft-revokes one session. Returns `false` when the id does not exist.
    async fn revoke(&self, session_id: i64, reason: &str) -> Result<bool>;

    /// Soft-revokes every live session of a user. Returns the count.
    async fn revoke_all_for_user(&self, user_id: i64, reason: &str) -> Result<u64>;

    /// Soft-revokes every live session of a user except one. Returns the count.
    async fn revoke_others(&self, user_id: i64, keep_session_id: i64, reason: &str)
        -> Result<u64>;

    /// Retention sweep: hard-deletes inactive sessions that expired before
    /// the cutoff. Returns the number of rows removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Hard-deletes every expired session of one user.
    async fn purge_expired_for_user(&self, user_id: i64) -> Result<u64>;

    /// Hard-deletes one session.
    async fn delete(&self, session_id: i64) -> Result<bool>;
}

/// Column list shared by every session query.
const SESSION_COLUMNS: &str = "id, public_id, user_id, token_hash, refresh_token_hash, \
     device_name, ip_address, user_agent, created_at, last_activity_at, expires_at, \
     active, revoked_at, revocation_reason, refresh_expires_at, next_renewal_allowed_at, \
     renewal_attempt_count, invalid_access_attempt_count";

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        public_id: row.try_get("public_id").map_err(|_| AppError::MissingData("public_id".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        token_hash: row.try_get("token_hash").map_err(|_| AppError::MissingData("token_hash".to_string()))?,
        refresh_token_hash: row.try_get("refresh_token_hash").map_err(|_| AppError::MissingData("refresh_token_hash".to_string()))?,
        device_name: row.try_get("device_name").map_err(|_| AppError::MissingData("device_name".to_string()))?,
        ip_address: row.try_get("ip_address").map_err(|_| AppError::MissingData("ip_address".to_string()))?,
        user_agent: row.try_get("user_agent").map_err(|_| AppError::MissingData("user_agent".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        last_activity_at: row.try_get("last_activity_at").map_err(|_| AppError::MissingData("last_activity_at".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
        active: row.try_get("active").map_err(|_| AppError::MissingData("active".to_string()))?,
        revoked_at: row.try_get("revoked_at").map_err(|_| AppError::MissingData("revoked_at".to_string()))?,
        revocation_reason: row.try_get("revocation_reason").map_err(|_| AppError::MissingData("revocation_reason".to_string()))?,
        refresh_expires_at: row.try_get("refresh_expires_at").map_err(|_| AppError::MissingData("refresh_expires_at".to_string()))?,
        next_renewal_allowed_at: row.try_get("next_renewal_allowed_at").map_err(|_| AppError::MissingData("next_renewal_allowed_at".to_string()))?,
        renewal_attempt_count: row.try_get("renewal_attempt_count").map_err(|_| AppError::MissingData("renewal_attempt_count".to_string()))?,
        invalid_access_attempt_count: row.try_get("invalid_access_attempt_count").map_err(|_| AppError::MissingData("invalid_access_attempt_count".to_string()))?,
    })
}

/// `SessionStore` backed by PostgreSQL.
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new_session: NewSession) -> Result<Session> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO sessions (
                        public_id, user_id, token_hash, refresh_token_hash,
                        device_name, ip_address, user_agent,
                        expires_at, refresh_expires_at, next_renewal_allowed_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    RETURNING {SESSION_COLUMNS}
                    "#
                ),
                &[
                    &new_session.public_id,
                    &new_session.user_id,
                    &new_session.token_hash,
                    &new_session.refresh_token_hash,
                    &new_session.device_name,
                    &new_session.ip_address,
                    &new_session.user_agent,
                    &new_session.expires_at,
                    &new_session.refresh_expires_at,
                    &new_session.next_renewal_allowed_at,
                ],
            )
            .await?;
        row_to_session(&row)
    }

    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions
                    WHERE public_id = $1
                    "#
                ),
                &[&public_id],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions
                    WHERE token_hash = $1
                    "#
                ),
                &[&token_hash],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn find_by_refresh_token_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions
                    WHERE refresh_token_hash = $1
                    "#
                ),
                &[&refresh_token_hash],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions
                    WHERE user_id = $1
                      AND active = true
                      AND expires_at > NOW()
                      AND (revoked_at IS NULL OR revoked_at > NOW())
                    ORDER BY last_activity_at DESC
                    "#
                ),
                &[&user_id],
            )
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions
                    WHERE user_id = $1
                    ORDER BY created_at DESC
                    "#
                ),
                &[&user_id],
            )
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn count_active_for_user(&self, user_id: i64) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS total
                FROM sessions
                WHERE user_id = $1
                  AND active = true
                  AND expires_at > NOW()
                "#,
                &[&user_id],
            )
            .await?;
        row.try_get("total").map_err(|_| AppError::MissingData("total".to_string()))
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE sessions
                SET token_hash = $2,
                    refresh_token_hash = $3,
                    last_activity_at = $4,
                    expires_at = $5,
                    active = $6,
                    revoked_at = $7,
                    revocation_reason = $8,
                    refresh_expires_at = $9,
                    next_renewal_allowed_at = $10,
                    renewal_attempt_count = $11,
                    invalid_access_attempt_count = $12
                WHERE id = $1
                "#,
                &[
                    &session.id,
                    &session.token_hash,
                    &session.refresh_token_hash,
                    &session.last_activity_at,
                    &session.expires_at,
                    &session.active,
                    &session.revoked_at,
                    &session.revocation_reason,
                    &session.refresh_expires_at,
                    &session.next_renewal_allowed_at,
                    &session.renewal_attempt_count,
                    &session.invalid_access_attempt_count,
                ],
            )
            .await?;
        Ok(())
    }

    async fn revoke(&self, session_id: i64, reason: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE sessions
                SET active = false,
                    revoked_at = NOW(),
                    revocation_reason = $2
                WHERE id = $1
                "#,
                &[&session_id, &reason],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn revoke_all_for_user(&self, user_id: i64, reason: &str) -> Result<u64> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE sessions
                SET active = false,
                    revoked_at = NOW(),
                    revocation_reason = $2
                WHERE user_id = $1
                  AND active = true
                  AND expires_at > NOW()
                "#,
                &[&user_id, &reason],
            )
            .await?;
        Ok(affected)
    }

    async fn revoke_others(
        &self,
        user_id: i64,
        keep_session_id: i64,
        reason: &str,
    ) -> Result<u64> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE sessions
                SET active = false,
                    revoked_at = NOW(),
                    revocation_reason = $3
                WHERE user_id = $1
                  AND id <> $2
                  AND active = true
                  AND expires_at > NOW()
                "#,
                &[&user_id, &keep_session_id, &reason],
            )
            .await?;
        Ok(affected)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM sessions
                WHERE active = false
                  AND expires_at < $1
                "#,
                &[&cutoff],
            )
            .await?;
        Ok(deleted)
    }

    async fn purge_expired_for_user(&self, user_id: i64) -> Result<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM sessions
                WHERE user_id = $1
                  AND expires_at < NOW()
                "#,
                &[&user_id],
            )
            .await?;
        Ok(deleted)
    }

    async fn delete(&self, session_id: i64) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM sessions
                WHERE id = $1
                "#,
                &[&session_id],
            )
            .await?;
        Ok(deleted > 0)
    }
}
