/// Access token issuance and verification
///
/// Access tokens are short-lived HS256 JWTs verified purely by signature;
/// they never touch the refresh-token store.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

#[derive(Clone)]
pub struct AccessTokenIssuer {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiry_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl AccessTokenIssuer {
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            header: Header::new(Algorithm::HS256),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            expiry_seconds: config.access_token_expiry,
            clock,
        }
    }

    /// Access token lifetime in seconds
    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_seconds
    }

    /// Mint a signed access token for `user_id`
    ///
    /// # Errors
    /// Returns error if token encoding fails
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = Claims::new(
            user_id,
            self.clock.now(),
            self.expiry_seconds,
            self.issuer.clone(),
        );

        encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Pair the HMAC key with an RSA header so every `issue` fails
    #[cfg(test)]
    pub(crate) fn with_mismatched_algorithm(mut self) -> Self {
        self.header = Header::new(Algorithm::RS256);
        self
    }

    /// Verify signature and issuer, then expiry against the injected clock
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is judged by our clock, not the system time.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AuthError::InvalidSignature
            })?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}
