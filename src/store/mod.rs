/// Persistence contracts
///
/// The core only talks to storage through these traits. Every state
/// transition on a refresh token is a single conditional write in the
/// adapter, never a read followed by a separate update.

mod memory;
mod postgres;

pub use memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
pub use postgres::{PgRefreshTokenStore, PgUserStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::HashVersion;
use crate::error::AppError;

/// Stored password digest and the scheme that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub password_hash: String,
    pub hash_version: HashVersion,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
}

/// Client-visible view of a user
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        }
    }
}

/// One issued refresh token. `revoked_at` is terminal once set.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub identifier: String,
    pub secret_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub secret_mismatches: i32,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// Insert payload for a fresh, active refresh token
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub identifier: String,
    pub secret_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<NewRefreshToken> for RefreshTokenRecord {
    fn from(token: NewRefreshToken) -> Self {
        Self {
            identifier: token.identifier,
            secret_hash: token.secret_hash,
            user_id: token.user_id,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
            secret_mismatches: 0,
        }
    }
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), AppError>;

    async fn find(&self, identifier: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Set `revoked_at` if it is still null.
    /// Returns `true` only when this call performed the revocation.
    async fn revoke(&self, identifier: &str, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Revoke `identifier` and insert `successor` as one indivisible step.
    /// Returns `false` without inserting if the record was already revoked.
    async fn rotate(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        successor: NewRefreshToken,
    ) -> Result<bool, AppError>;

    /// Count a failed secret check and revoke once `threshold` is reached.
    /// Returns whether the record is revoked after the call.
    async fn record_secret_mismatch(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        threshold: u32,
    ) -> Result<bool, AppError>;

    /// Revoke every non-revoked, unexpired record owned by `user_id`.
    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, AppError>;

    async fn active_count_for_user(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `AuthError::UserExists` when the email is taken.
    async fn create(&self, user: UserRecord) -> Result<(), AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    async fn update_credential(&self, id: Uuid, credential: Credential) -> Result<(), AppError>;
}
