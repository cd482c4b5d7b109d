/// Postgres store adapters
///
/// Each refresh-token transition is one SQL statement guarded by
/// `revoked_at IS NULL`, so concurrent callers on the same identifier
/// resolve to exactly one winner and a timed-out request never leaves a
/// half-applied rotation behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Credential, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore, UserRecord, UserStore};
use crate::auth::HashVersion;
use crate::error::{AppError, AuthError, DatabaseError};

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    identifier: String,
    secret_hash: String,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    secret_mismatches: i32,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            identifier: row.identifier,
            secret_hash: row.secret_hash,
            user_id: row.user_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            secret_mismatches: row.secret_mismatches,
        }
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (identifier, secret_hash, user_id, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&token.identifier)
        .bind(&token.secret_hash)
        .bind(token.user_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, identifier: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT identifier, secret_hash, user_id, issued_at, expires_at, revoked_at, secret_mismatches
            FROM refresh_tokens
            WHERE identifier = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn revoke(&self, identifier: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE identifier = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(at)
        .bind(identifier)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        successor: NewRefreshToken,
    ) -> Result<bool, AppError> {
        // The successor row is only produced if the guarded UPDATE matched.
        let result = sqlx::query(
            r#"
            WITH revoked AS (
                UPDATE refresh_tokens
                SET revoked_at = $2
                WHERE identifier = $1 AND revoked_at IS NULL
                RETURNING identifier
            )
            INSERT INTO refresh_tokens (identifier, secret_hash, user_id, issued_at, expires_at)
            SELECT $3::text, $4::text, $5::uuid, $6::timestamptz, $7::timestamptz
            FROM revoked
            "#,
        )
        .bind(identifier)
        .bind(at)
        .bind(&successor.identifier)
        .bind(&successor.secret_hash)
        .bind(successor.user_id)
        .bind(successor.issued_at)
        .bind(successor.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_secret_mismatch(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        threshold: u32,
    ) -> Result<bool, AppError> {
        let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);

        let revoked = sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE refresh_tokens
            SET secret_mismatches = secret_mismatches + 1,
                revoked_at = CASE
                    WHEN secret_mismatches + 1 >= $3 THEN $2
                    ELSE revoked_at
                END
            WHERE identifier = $1 AND revoked_at IS NULL
            RETURNING revoked_at IS NOT NULL
            "#,
        )
        .bind(identifier)
        .bind(at)
        .bind(threshold)
        .fetch_optional(&self.pool)
        .await?;

        match revoked {
            Some(revoked) => Ok(revoked),
            // Nothing matched: the record is already terminal or gone.
            None => Ok(self.find(identifier).await?.map_or(false, |r| r.is_revoked())),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL AND expires_at > $1
            "#,
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn active_count_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM refresh_tokens
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    hash_version: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let hash_version = HashVersion::from_i16(row.hash_version).ok_or_else(|| {
            AppError::Database(DatabaseError::UnexpectedError(format!(
                "unknown hash version {} for user {}",
                row.hash_version, row.id
            )))
        })?;

        Ok(Self {
            id: row.id,
            email: row.email,
            name: row.name,
            credential: Credential {
                password_hash: row.password_hash,
                hash_version,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: UserRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, hash_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.credential.password_hash)
        .bind(user.credential.hash_version.as_i16())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                AppError::Auth(AuthError::UserExists)
            }
            other => other,
        })?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, hash_version, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, hash_version, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn update_credential(&self, id: Uuid, credential: Credential) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, hash_version = $2, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(&credential.password_hash)
        .bind(credential.hash_version.as_i16())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!("user {}", id))));
        }
        Ok(())
    }
}
