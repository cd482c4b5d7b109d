/// Authentication module
///
/// Password hashing with versioned migration, access token issuance,
/// refresh token rotation, and the orchestrating `AuthService`.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use jwt::AccessTokenIssuer;
pub use password::{validate_password_strength, HashVersion, PasswordHasher, Verification};
pub use refresh_token::{parse_refresh_token, RefreshTokenManager, TokenPair, TOKEN_DELIMITER};
pub use service::{AuthService, LoginInput, RegisterInput, SessionResult};
