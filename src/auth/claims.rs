/// JWT Claims structure
///
/// Payload of an access token: the subject plus standard timing claims
/// (RFC 7519).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create claims for `user_id` issued at `now`
    pub fn new(user_id: Uuid, now: DateTime<Utc>, expiry_seconds: i64, issuer: String) -> Self {
        let iat = now.timestamp();
        Self {
            sub: user_id.to_string(),
            exp: iat + expiry_seconds,
            iat,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// A subject that is not a UUID cannot have been minted by us
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}
