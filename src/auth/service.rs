/// Authentication orchestration
///
/// Composes the password hasher, the user store and the refresh token
/// manager into the register / login / refresh / logout flows.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::AccessTokenIssuer;
use crate::auth::password::{validate_password_strength, PasswordHasher, Verification};
use crate::auth::refresh_token::{RefreshTokenManager, TokenPair};
use crate::auth::Claims;
use crate::clock::Clock;
use crate::configuration::Settings;
use crate::error::{AppError, AuthError};
use crate::store::{Credential, RefreshTokenStore, UserProfile, UserRecord, UserStore};
use crate::validators::{is_valid_email, is_valid_name};

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Token pair plus the authenticated user
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub tokens: TokenPair,
    pub user: UserProfile,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<PasswordHasher>,
    tokens: RefreshTokenManager,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: RefreshTokenManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher: Arc::new(hasher),
            tokens,
            clock,
        }
    }

    /// Wire up every collaborator from configuration
    pub fn from_settings(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(&settings.password)?;
        let access_tokens = AccessTokenIssuer::new(&settings.jwt, clock.clone());
        let manager = RefreshTokenManager::new(
            refresh_tokens,
            access_tokens,
            clock.clone(),
            Duration::seconds(settings.jwt.refresh_token_expiry),
            settings.refresh.max_secret_mismatches,
        );
        Ok(Self::new(users, hasher, manager, clock))
    }

    pub fn access_tokens(&self) -> &AccessTokenIssuer {
        self.tokens.access_tokens()
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.tokens
    }

    async fn hash(&self, password: &str) -> Result<Credential, AppError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let (password_hash, hash_version) =
            tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;
        Ok(Credential {
            password_hash,
            hash_version,
        })
    }

    async fn verify(&self, password: &str, credential: &Credential) -> Result<Verification, AppError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let credential = credential.clone();
        let verification = tokio::task::spawn_blocking(move || {
            hasher.verify(&password, &credential.password_hash, credential.hash_version)
        })
        .await?;
        Ok(verification)
    }

    /// Create an account and open its first session
    ///
    /// # Errors
    /// - `Validation` for a bad email, name or weak password
    /// - `UserExists` when the email is already registered
    pub async fn register(&self, input: RegisterInput) -> Result<SessionResult, AppError> {
        let email = is_valid_email(&input.email)?;
        let name = is_valid_name(&input.name)?;
        validate_password_strength(&input.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserExists.into());
        }

        let credential = self.hash(&input.password).await?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            email,
            name,
            credential,
            created_at: self.clock.now(),
        };
        // The store enforces uniqueness too, for racing registrations.
        self.users.create(user.clone()).await?;

        let tokens = self.tokens.issue(user.id, self.tokens.ttl()).await?;

        tracing::info!(user_id = %user.id, "User registered successfully");

        Ok(SessionResult {
            tokens,
            user: UserProfile::from(&user),
        })
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password both yield `InvalidCredentials`.
    /// A digest below current policy is upgraded in the background once
    /// the session is issued.
    pub async fn login(&self, input: LoginInput) -> Result<SessionResult, AppError> {
        let email = input.email.trim();

        let Some(user) = self.users.find_by_email(email).await? else {
            let hasher = self.hasher.clone();
            let password = input.password.clone();
            tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        let verification = self.verify(&input.password, &user.credential).await?;
        if !verification.matches {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.tokens.issue(user.id, self.tokens.ttl()).await?;

        if verification.needs_rehash {
            self.spawn_credential_upgrade(user.id, input.password);
        }

        tracing::info!(user_id = %user.id, "User logged in successfully");

        Ok(SessionResult {
            tokens,
            user: UserProfile::from(&user),
        })
    }

    fn spawn_credential_upgrade(&self, user_id: Uuid, password: String) {
        let users = self.users.clone();
        let hasher = self.hasher.clone();

        tokio::spawn(async move {
            let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password)).await;
            let credential = match hashed {
                Ok(Ok((password_hash, hash_version))) => Credential {
                    password_hash,
                    hash_version,
                },
                Ok(Err(e)) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Password rehash failed");
                    return;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Password rehash task failed");
                    return;
                }
            };

            match users.update_credential(user_id, credential).await {
                Ok(()) => tracing::info!(user_id = %user_id, "Password digest upgraded"),
                Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Password digest upgrade not saved"),
            }
        });
    }

    /// Rotate a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.tokens.rotate(refresh_token).await
    }

    /// End the session behind `refresh_token`
    ///
    /// Any token-level failure is swallowed so the response does not act
    /// as an oracle; persistence faults are still reported.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        match self.tokens.revoke_presented(refresh_token).await {
            Ok(()) => Ok(()),
            Err(AppError::Auth(e)) => {
                tracing::debug!(error = %e, "Logout with unusable refresh token");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke every session of `user_id`
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.tokens.revoke_all(user_id).await
    }

    /// Verify an access token
    pub fn validate(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.tokens.access_tokens().verify(access_token)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        Ok(UserProfile::from(&user))
    }
}
