/// Input validators for auth request bodies
///
/// Only shape is checked here; whether the credentials are right is the
/// session manager's business.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_TOKEN_LENGTH: usize = 4096;
const MAX_DEVICE_LENGTH: usize = 255;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Validates an email address and returns it trimmed
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Login passwords are not trimmed; only emptiness and length are checked
pub fn is_valid_password(password: &str) -> Result<&str, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH));
    }

    Ok(password)
}

pub fn is_valid_token(field: &str, token: &str) -> Result<String, ValidationError> {
    let trimmed = token.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.len() > MAX_TOKEN_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_TOKEN_LENGTH));
    }

    Ok(trimmed.to_string())
}

/// Optional device tag; blank means absent
pub fn is_valid_device(device: Option<&str>) -> Result<Option<String>, ValidationError> {
    match device.map(str::trim) {
        None | Some("") => Ok(None),
        Some(tag) if tag.len() > MAX_DEVICE_LENGTH => Err(ValidationError::TooLong(
            "device".to_string(),
            MAX_DEVICE_LENGTH,
        )),
        Some(tag) if tag.chars().any(|c| c.is_control()) => {
            Err(ValidationError::InvalidFormat("device".to_string()))
        }
        Some(tag) => Ok(Some(tag.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert_eq!(is_valid_email("  a@x.com ").unwrap(), "a@x.com");
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
        assert!(is_valid_email("").is_err());
    }

    #[test]
    fn test_email_length_limit() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());
    }

    #[test]
    fn test_password_checks() {
        assert!(is_valid_password("secret123").is_ok());
        assert!(is_valid_password("").is_err());
        assert!(is_valid_password(&"a".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_token_checks() {
        assert_eq!(is_valid_token("refresh_token", " abc ").unwrap(), "abc");
        assert!(is_valid_token("refresh_token", "   ").is_err());
    }

    #[test]
    fn test_device_checks() {
        assert_eq!(is_valid_device(None).unwrap(), None);
        assert_eq!(is_valid_device(Some("  ")).unwrap(), None);
        assert_eq!(is_valid_device(Some("laptop")).unwrap(), Some("laptop".to_string()));
        assert!(is_valid_device(Some("bad\ntag")).is_err());
    }
}
