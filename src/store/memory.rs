/// Process-local store adapters
///
/// Each operation runs inside one mutex critical section, which gives the
/// same all-or-nothing behaviour the Postgres adapter gets from single
/// statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{Credential, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore, UserRecord, UserStore};
use crate::error::{AppError, AuthError, DatabaseError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Database(DatabaseError::UnexpectedError("store lock poisoned".into())))
}

#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<(), AppError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&token.identifier) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "refresh token identifier".to_string(),
            )));
        }
        records.insert(token.identifier.clone(), token.into());
        Ok(())
    }

    async fn find(&self, identifier: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(lock(&self.records)?.get(identifier).cloned())
    }

    async fn revoke(&self, identifier: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        match records.get_mut(identifier) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        successor: NewRefreshToken,
    ) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&successor.identifier) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "refresh token identifier".to_string(),
            )));
        }
        match records.get_mut(identifier) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
            }
            _ => return Ok(false),
        }
        records.insert(successor.identifier.clone(), successor.into());
        Ok(true)
    }

    async fn record_secret_mismatch(
        &self,
        identifier: &str,
        at: DateTime<Utc>,
        threshold: u32,
    ) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        let Some(record) = records.get_mut(identifier) else {
            return Ok(false);
        };
        if record.revoked_at.is_none() {
            record.secret_mismatches += 1;
            if record.secret_mismatches as i64 >= threshold as i64 {
                record.revoked_at = Some(at);
            }
        }
        Ok(record.revoked_at.is_some())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = lock(&self.records)?;
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.user_id == user_id && record.is_active(at) {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn active_count_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let records = lock(&self.records)?;
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id && r.is_active(at))
            .count() as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: UserRecord) -> Result<(), AppError> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AuthError::UserExists.into());
        }
        users.insert(user.id, user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn update_credential(&self, id: Uuid, credential: Credential) -> Result<(), AppError> {
        let mut users = lock(&self.users)?;
        let user = users.get_mut(&id).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!("user {}", id)))
        })?;
        user.credential = credential;
        Ok(())
    }
}
