/// Account input checks
///
/// Registration input is trimmed and checked for shape only: length,
/// email syntax and control characters. The trimmed value is what gets
/// stored.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_EMAIL_LENGTH: usize = 5;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MAX_NAME_CHARS: usize = 256;

lazy_static! {
    // local@label(.label)*, labels without leading or trailing hyphens
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$"
    ).unwrap();
}

fn reject_control_characters(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters(field.to_string()));
    }
    Ok(())
}

/// Validate and normalise an email address
///
/// # Errors
/// `EmptyField`, `TooShort` / `TooLong` (whole address or local part),
/// `ControlCharacters`, or `InvalidFormat`
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    reject_control_characters("email", trimmed)?;

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    let (local, _) = trimmed
        .split_once('@')
        .ok_or_else(|| ValidationError::InvalidFormat("email".to_string()))?;
    if local.len() > MAX_LOCAL_PART_LENGTH {
        return Err(ValidationError::TooLong(
            "email local part".to_string(),
            MAX_LOCAL_PART_LENGTH,
        ));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validate and normalise a display name
///
/// Any script is accepted as long as the name has at least one letter.
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }
    reject_control_characters("name", trimmed)?;

    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_CHARS));
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return Err(ValidationError::InvalidFormat("name".to_string()));
    }

    Ok(trimmed.to_string())
}
