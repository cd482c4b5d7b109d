/// Password Hashing and Verification
///
/// Digests are tagged with a `HashVersion` so stored credentials can be
/// migrated between schemes:
/// - V1: bcrypt (legacy digests imported from the old stack)
/// - V2: argon2id with policy-controlled parameters (current)
///
/// A successful verification against anything weaker than the current
/// policy reports `needs_rehash`, and the login flow upgrades the digest.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::configuration::PasswordSettings;
use crate::error::{AppError, ConfigError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Scheme that produced a stored digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashVersion {
    V1,
    V2,
}

impl HashVersion {
    pub const CURRENT: HashVersion = HashVersion::V2;

    pub fn as_i16(self) -> i16 {
        match self {
            HashVersion::V1 => 1,
            HashVersion::V2 => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(HashVersion::V1),
            2 => Some(HashVersion::V2),
            _ => None,
        }
    }
}

/// Outcome of a password check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub matches: bool,
    pub needs_rehash: bool,
}

impl Verification {
    const MISMATCH: Verification = Verification {
        matches: false,
        needs_rehash: false,
    };
}

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    bcrypt_cost: u32,
    dummy_digest: String,
}

impl PasswordHasher {
    /// Build a hasher for the given policy
    ///
    /// # Errors
    /// Returns a config error if the argon2 parameters are out of range
    pub fn new(settings: &PasswordSettings) -> Result<Self, AppError> {
        let params = Params::new(
            settings.argon2_memory_kib,
            settings.argon2_iterations,
            settings.argon2_parallelism,
            None,
        )
        .map_err(|e| AppError::Config(ConfigError::InvalidValue(format!("argon2 params: {}", e))))?;

        let mut hasher = Self {
            params,
            bcrypt_cost: settings.bcrypt_cost,
            dummy_digest: String::new(),
        };
        // Used to keep unknown-account logins as slow as real ones.
        let (dummy_digest, _) = hasher.hash("dummy-password-for-timing")?;
        hasher.dummy_digest = dummy_digest;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with the current preferred scheme and a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<(String, HashVersion), AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok((digest, HashVersion::CURRENT))
    }

    /// Hash with the legacy bcrypt scheme
    pub fn hash_legacy(&self, plaintext: &str) -> Result<(String, HashVersion), AppError> {
        let digest = bcrypt::hash(plaintext, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok((digest, HashVersion::V1))
    }

    /// Check `plaintext` against a stored digest
    ///
    /// Never fails: a malformed digest, or a digest that does not belong
    /// to `version`, simply does not match.
    pub fn verify(&self, plaintext: &str, digest: &str, version: HashVersion) -> Verification {
        match version {
            HashVersion::V1 => self.verify_bcrypt(plaintext, digest),
            HashVersion::V2 => self.verify_argon2(plaintext, digest),
        }
    }

    /// Burn the same work as a real check; the result is discarded.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify_argon2(plaintext, &self.dummy_digest);
    }

    fn verify_bcrypt(&self, plaintext: &str, digest: &str) -> Verification {
        if !digest.starts_with("$2") {
            return Verification::MISMATCH;
        }
        match bcrypt::verify(plaintext, digest) {
            // V1 is never current, so every match is upgraded.
            Ok(true) => Verification {
                matches: true,
                needs_rehash: true,
            },
            Ok(false) => Verification::MISMATCH,
            Err(e) => {
                tracing::debug!("Unparseable bcrypt digest: {}", e);
                Verification::MISMATCH
            }
        }
    }

    fn verify_argon2(&self, plaintext: &str, digest: &str) -> Verification {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Unparseable argon2 digest: {}", e);
                return Verification::MISMATCH;
            }
        };
        if parsed.algorithm.as_str().get(..6) != Some("argon2") {
            return Verification::MISMATCH;
        }

        if self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_err()
        {
            return Verification::MISMATCH;
        }

        Verification {
            matches: true,
            needs_rehash: self.below_policy(&parsed),
        }
    }

    fn below_policy(&self, parsed: &PasswordHash<'_>) -> bool {
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        match Params::try_from(parsed) {
            Ok(stored) => {
                stored.m_cost() < self.params.m_cost()
                    || stored.t_cost() < self.params.t_cost()
                    || stored.p_cost() < self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 128 characters
/// - At least one digit, one lowercase and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // Also bounds the work an attacker can force per hash.
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_settings() -> PasswordSettings {
        PasswordSettings {
            argon2_memory_kib: 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            bcrypt_cost: 4,
        }
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&cheap_settings()).expect("Failed to build hasher")
    }

    #[test]
    fn test_hash_uses_current_version_and_random_salt() {
        let hasher = hasher();
        let (first, version) = hasher.hash("ValidPassword123").expect("Failed to hash");
        let (second, _) = hasher.hash("ValidPassword123").expect("Failed to hash");

        assert_eq!(version, HashVersion::CURRENT);
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_current_version() {
        let hasher = hasher();
        let (digest, version) = hasher.hash("ValidPassword123").unwrap();

        let ok = hasher.verify("ValidPassword123", &digest, version);
        assert_eq!(ok, Verification { matches: true, needs_rehash: false });

        let wrong = hasher.verify("WrongPassword123", &digest, version);
        assert!(!wrong.matches);
        assert!(!wrong.needs_rehash);
    }

    #[test]
    fn test_legacy_digest_needs_rehash() {
        let hasher = hasher();
        let (digest, version) = hasher.hash_legacy("ValidPassword123").unwrap();
        assert_eq!(version, HashVersion::V1);

        let ok = hasher.verify("ValidPassword123", &digest, version);
        assert_eq!(ok, Verification { matches: true, needs_rehash: true });

        assert!(!hasher.verify("WrongPassword123", &digest, version).matches);
    }

    #[test]
    fn test_weaker_argon2_params_need_rehash() {
        let weak = PasswordHasher::new(&PasswordSettings {
            argon2_iterations: 1,
            ..cheap_settings()
        })
        .unwrap();
        let (digest, version) = weak.hash("ValidPassword123").unwrap();

        let ok = hasher().verify("ValidPassword123", &digest, version);
        assert!(ok.matches);
        assert!(ok.needs_rehash);
    }

    #[test]
    fn test_malformed_digest_never_matches() {
        let hasher = hasher();
        let (argon, _) = hasher.hash("ValidPassword123").unwrap();
        let (bcrypt, _) = hasher.hash_legacy("ValidPassword123").unwrap();

        assert!(!hasher.verify("ValidPassword123", "garbage", HashVersion::V2).matches);
        assert!(!hasher.verify("ValidPassword123", "", HashVersion::V1).matches);
        assert!(!hasher.verify("ValidPassword123", &argon, HashVersion::V1).matches);
        assert!(!hasher.verify("ValidPassword123", &bcrypt, HashVersion::V2).matches);
    }

    #[test]
    fn test_hash_version_round_trips_through_storage_code() {
        for version in [HashVersion::V1, HashVersion::V2] {
            assert_eq!(HashVersion::from_i16(version.as_i16()), Some(version));
        }
        assert_eq!(HashVersion::from_i16(0), None);
        assert_eq!(HashVersion::from_i16(3), None);
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Passw0rd!").is_ok());
        assert!(validate_password_strength("Short1").is_err());
        assert!(validate_password_strength(&("a".repeat(MAX_PASSWORD_LENGTH) + "A1")).is_err());
        assert!(validate_password_strength("NoDigitsPassword").is_err());
        assert!(validate_password_strength("NOLOWERCASE1").is_err());
        assert!(validate_password_strength("nouppercase1").is_err());
    }
}
