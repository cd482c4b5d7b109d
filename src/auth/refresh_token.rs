/// Refresh Token Management
///
/// Refresh tokens are opaque strings of the form `<identifier>.<secret>`:
/// - both halves are random alphanumeric strings from a CSPRNG, so the
///   `.` delimiter never occurs inside either half
/// - the identifier is stored in clear and used for lookup
/// - only the SHA-256 of the secret is stored
/// - every successful refresh revokes the presented token and issues its
///   successor in one atomic store operation (rotation)
///
/// Record lifecycle: `Active -> {Rotated, Revoked, Expired}`, all terminal.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::AccessTokenIssuer;
use crate::clock::Clock;
use crate::error::{AppError, AuthError};
use crate::store::{NewRefreshToken, RefreshTokenStore};
use crate::webhook::constant_time_eq;

pub const TOKEN_DELIMITER: char = '.';
const IDENTIFIER_LENGTH: usize = 32;
const SECRET_LENGTH: usize = 64;

/// Access token plus the rotated refresh token handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Refresh token expiry
    pub expires_at: DateTime<Utc>,
}

fn random_alphanumeric(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Hash a refresh token secret using SHA-256
///
/// Never store plaintext secrets in the database.
fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split a client-facing token into `(identifier, secret)`
///
/// # Errors
/// `MalformedToken` unless both halves have the expected length and
/// alphabet and are joined by exactly one delimiter
pub fn parse_refresh_token(token: &str) -> Result<(&str, &str), AuthError> {
    let (identifier, secret) = token
        .split_once(TOKEN_DELIMITER)
        .ok_or(AuthError::MalformedToken)?;

    let well_formed = |half: &str, len: usize| {
        half.len() == len && half.bytes().all(|b| b.is_ascii_alphanumeric())
    };

    if !well_formed(identifier, IDENTIFIER_LENGTH) || !well_formed(secret, SECRET_LENGTH) {
        return Err(AuthError::MalformedToken);
    }

    Ok((identifier, secret))
}

pub struct RefreshTokenManager {
    store: Arc<dyn RefreshTokenStore>,
    access_tokens: AccessTokenIssuer,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_secret_mismatches: u32,
}

impl RefreshTokenManager {
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        access_tokens: AccessTokenIssuer,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        max_secret_mismatches: u32,
    ) -> Self {
        Self {
            store,
            access_tokens,
            clock,
            ttl,
            max_secret_mismatches: max_secret_mismatches.max(1),
        }
    }

    pub fn access_tokens(&self) -> &AccessTokenIssuer {
        &self.access_tokens
    }

    /// Default lifetime of issued refresh tokens
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mint(&self, user_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> (NewRefreshToken, String) {
        let identifier = random_alphanumeric(IDENTIFIER_LENGTH);
        let secret = random_alphanumeric(SECRET_LENGTH);
        let client_token = format!("{}{}{}", identifier, TOKEN_DELIMITER, secret);

        let record = NewRefreshToken {
            identifier,
            secret_hash: hash_secret(&secret),
            user_id,
            issued_at: now,
            expires_at: now + ttl,
        };
        (record, client_token)
    }

    /// Issue a fresh token pair for `user_id`
    ///
    /// # Errors
    /// Returns error if the store insert or token signing fails
    pub async fn issue(&self, user_id: Uuid, ttl: Duration) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let (record, refresh_token) = self.mint(user_id, now, ttl);
        let expires_at = record.expires_at;
        let access_token = self.access_tokens.issue(user_id)?;

        self.store.insert(record).await?;

        tracing::debug!(user_id = %user_id, "Refresh token issued");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Exchange a presented refresh token for its successor
    ///
    /// # Errors
    /// - `MalformedToken`: not `<identifier>.<secret>`
    /// - `InvalidToken`: unknown identifier or wrong secret
    /// - `TokenExpired`: past `expires_at` (the record is revoked)
    /// - `TokenRevoked`: already revoked, rotated, or lost a concurrent race
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AppError> {
        let (identifier, secret) = parse_refresh_token(presented)?;

        let record = self
            .store
            .find(identifier)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let now = self.clock.now();

        if record.is_expired(now) {
            self.store.revoke(identifier, now).await?;
            tracing::info!(user_id = %record.user_id, "Refresh token expired");
            return Err(AuthError::TokenExpired.into());
        }

        if record.is_revoked() {
            tracing::warn!(user_id = %record.user_id, "Attempt to reuse revoked refresh token");
            return Err(AuthError::TokenRevoked.into());
        }

        if !constant_time_eq(hash_secret(secret).as_bytes(), record.secret_hash.as_bytes()) {
            let revoked = self
                .store
                .record_secret_mismatch(identifier, now, self.max_secret_mismatches)
                .await?;
            tracing::warn!(
                user_id = %record.user_id,
                revoked = revoked,
                "Refresh token secret mismatch"
            );
            return Err(AuthError::InvalidToken.into());
        }

        let (successor, refresh_token) = self.mint(record.user_id, now, self.ttl);
        let expires_at = successor.expires_at;
        // Sign before committing so a signing failure leaves the token usable.
        let access_token = self.access_tokens.issue(record.user_id)?;

        if !self.store.rotate(identifier, now, successor).await? {
            tracing::warn!(user_id = %record.user_id, "Concurrent rotation lost the race");
            return Err(AuthError::TokenRevoked.into());
        }

        tracing::info!(user_id = %record.user_id, "Refresh token rotated");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Revoke by identifier; revoking an already revoked token succeeds
    ///
    /// # Errors
    /// `InvalidToken` for an unknown identifier
    pub async fn revoke(&self, identifier: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        if self.store.revoke(identifier, now).await? {
            return Ok(());
        }
        match self.store.find(identifier).await? {
            Some(_) => Ok(()),
            None => Err(AuthError::InvalidToken.into()),
        }
    }

    /// Revoke the token a client presents, e.g. on logout
    ///
    /// The secret must match: knowing an identifier alone is not enough
    /// to end someone else's session.
    pub async fn revoke_presented(&self, presented: &str) -> Result<(), AppError> {
        let (identifier, secret) = parse_refresh_token(presented)?;
        let record = self
            .store
            .find(identifier)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !constant_time_eq(hash_secret(secret).as_bytes(), record.secret_hash.as_bytes()) {
            return Err(AuthError::InvalidToken.into());
        }

        self.revoke(identifier).await
    }

    /// Revoke every active refresh token of `user_id`
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all_for_user(user_id, self.clock.now()).await?;
        tracing::info!(user_id = %user_id, revoked = revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    pub async fn active_count(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.store.active_count_for_user(user_id, self.clock.now()).await
    }
}
