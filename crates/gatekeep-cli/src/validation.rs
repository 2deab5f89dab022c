//! Inline form checks run before any request is sent.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Minimum length for a new password
const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// A rejected field, reported next to the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

pub fn email(value: &str) -> Result<(), FieldError> {
    if EMAIL_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(FieldError::new("email", "Please enter a valid email address"))
    }
}

pub fn required(field: &'static str, value: &str) -> Result<(), FieldError> {
    if value.is_empty() {
        Err(FieldError::new(field, format!("{} is required", capitalize(field))))
    } else {
        Ok(())
    }
}

/// Strength rules for a password being set
pub fn new_password(value: &str) -> Result<(), FieldError> {
    if value.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(FieldError::new(
            "new password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(FieldError::new(
            "new password",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(FieldError::new("new password", "Password must contain at least one number"));
    }
    Ok(())
}

pub fn confirmation(password: &str, confirm: &str) -> Result<(), FieldError> {
    if confirm.is_empty() {
        return Err(FieldError::new("confirm password", "Please confirm your password"));
    }
    if password != confirm {
        return Err(FieldError::new("confirm password", "Passwords don't match"));
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(email("ada@example.com").is_ok());
        assert!(email("a.b+c@mail.example.org").is_ok());
        assert!(email("").is_err());
        assert!(email("ada@example").is_err());
        assert!(email("ada example@x.com").is_err());
        assert!(email("@example.com").is_err());
    }

    #[test]
    fn test_new_password() {
        assert!(new_password("Secret123").is_ok());
        assert_eq!(
            new_password("Sec1").unwrap_err().message,
            "Password must be at least 8 characters"
        );
        assert_eq!(
            new_password("secret123").unwrap_err().message,
            "Password must contain at least one uppercase letter"
        );
        assert_eq!(
            new_password("SecretOnly").unwrap_err().message,
            "Password must contain at least one number"
        );
    }

    #[test]
    fn test_confirmation() {
        assert!(confirmation("Secret123", "Secret123").is_ok());
        assert_eq!(confirmation("Secret123", "").unwrap_err().message, "Please confirm your password");
        assert_eq!(confirmation("Secret123", "Secret124").unwrap_err().to_string(), "confirm password: Passwords don't match");
    }

    #[test]
    fn test_required() {
        assert_eq!(required("password", "").unwrap_err().to_string(), "password: Password is required");
        assert!(required("password", "x").is_ok());
    }
}
