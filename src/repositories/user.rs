use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::{NewUser, User},
};

/// Persistence operations for the `User` entity.
///
/// Every lookup excludes soft-deleted rows. Email matching is
/// case-insensitive throughout.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User>;
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>>;
    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_cpf(&self, cpf: &str) -> Result<Option<User>>;
    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn cpf_exists(&self, cpf: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Atomically increments the failed-login counter and returns the new
    /// value. Single-statement UPDATE so two concurrent wrong-password
    /// attempts cannot lose an increment.
    async fn increment_failed_logins(&self, user_id: i64) -> Result<i16>;

    /// Clears the failed-login counter and any lockout.
    async fn reset_failed_logins(&self, user_id: i64) -> Result<()>;

    /// Locks the account until the given instant.
    async fn lock_until(&self, user_id: i64, until: DateTime<Utc>) -> Result<()>;

    /// Clears counter and lockout and stamps the last-login timestamp.
    async fn record_login_success(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Full overwrite of the mutable user fields.
    async fn update(&self, user: &User) -> Result<()>;
}

/// Column list shared by every user query.
const USER_COLUMNS: &str = "id, public_id, cpf, name, email, password_hash, active, \
     last_login_at, failed_login_attempts, locked_until, created_at, updated_at, deleted_at";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        public_id: row.try_get("public_id").map_err(|_| AppError::MissingData("public_id".to_string()))?,
        cpf: row.try_get("cpf").map_err(|_| AppError::MissingData("cpf".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        password_hash: row.try_get("password_hash").map_err(|_| AppError::MissingData("password_hash".to_string()))?,
        active: row.try_get("active").map_err(|_| AppError::MissingData("active".to_string()))?,
        last_login_at: row.try_get("last_login_at").map_err(|_| AppError::MissingData("last_login_at".to_string()))?,
        failed_login_attempts: row.try_get("failed_login_attempts").map_err(|_| AppError::MissingData("failed_login_attempts".to_string()))?,
        locked_until: row.try_get("locked_until").map_err(|_| AppError::MissingData("locked_until".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
        deleted_at: row.try_get("deleted_at").map_err(|_| AppError::MissingData("deleted_at".to_string()))?,
    })
}

/// `UserStore` backed by PostgreSQL.
pub struct PgUserStore {
    pool: Pool,
}

impl PgUserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO users (public_id, cpf, name, email, password_hash, active)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING {USER_COLUMNS}
                    "#
                ),
                &[
                    &new_user.public_id,
                    &new_user.cpf,
                    &new_user.name,
                    &new_user.email,
                    &new_user.password_hash,
                    &new_user.active,
                ],
            )
            .await?;
        row_to_user(&row)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {USER_COLUMNS}
                    FROM users
                    WHERE id = $1 AND deleted_at IS NULL
                    "#
                ),
                &[&user_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {USER_COLUMNS}
                    FROM users
                    WHERE public_id = $1 AND deleted_at IS NULL
                    "#
                ),
                &[&public_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {USER_COLUMNS}
                    FROM users
                    WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL
                    "#
                ),
                &[&email],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_cpf(&self, cpf: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {USER_COLUMNS}
                    FROM users
                    WHERE cpf = $1 AND deleted_at IS NULL
                    "#
                ),
                &[&cpf],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM users
                    WHERE LOWER(email) = LOWER($1)
                      AND deleted_at IS NULL
                      AND ($2::BIGINT IS NULL OR id <> $2)
                ) AS found
                "#,
                &[&email, &exclude_id],
            )
            .await?;
        row.try_get("found").map_err(|_| AppError::MissingData("found".to_string()))
    }

    async fn cpf_exists(&self, cpf: &str, exclude_id: Option<i64>) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM users
                    WHERE cpf = $1
                      AND deleted_at IS NULL
                      AND ($2::BIGINT IS NULL OR id <> $2)
                ) AS found
                "#,
                &[&cpf, &exclude_id],
            )
            .await?;
        row.try_get("found").map_err(|_| AppError::MissingData("found".to_string()))
    }

    async fn increment_failed_logins(&self, user_id: i64) -> Result<i16> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                UPDATE users
                SET failed_login_attempts = failed_login_attempts + 1,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING failed_login_attempts
                "#,
                &[&user_id],
            )
            .await?;
        row.try_get("failed_login_attempts")
            .map_err(|_| AppError::MissingData("failed_login_attempts".to_string()))
    }

    async fn reset_failed_logins(&self, user_id: i64) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET failed_login_attempts = 0,
                    locked_until = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                &[&user_id],
            )
            .await?;
        Ok(())
    }

    async fn lock_until(&self, user_id: i64, until: DateTime<Utc>) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET locked_until = $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                &[&user_id, &until],
            )
            .await?;
        Ok(())
    }

    async fn record_login_success(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET failed_login_attempts = 0,
                    locked_until = NULL,
                    last_login_at = $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                &[&user_id, &at],
            )
            .await?;
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET name = $2,
                    email = $3,
                    password_hash = $4,
                    active = $5,
                    last_login_at = $6,
                    failed_login_attempts = $7,
                    locked_until = $8,
                    deleted_at = $9,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.password_hash,
                    &user.active,
                    &user.last_login_at,
                    &user.failed_login_attempts,
                    &user.locked_until,
                    &user.deleted_at,
                ],
            )
            .await?;
        Ok(())
    }
}
