use crate::api::ApiError;

/// Presentation decision for a failed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    /// The account exists but is unverified: send the user to the
    /// verification flow instead of showing an error
    VerifyEmail { email: String },
    /// Show this message next to the form
    Message(String),
}

impl LoginFailure {
    pub fn classify(err: &ApiError, email: &str) -> Self {
        match err {
            ApiError::EmailNotConfirmed(_) => LoginFailure::VerifyEmail {
                email: email.to_string(),
            },
            ApiError::InvalidCredentials | ApiError::Unauthorized(_) => {
                LoginFailure::Message("Invalid email or password".to_string())
            }
            ApiError::Validation { .. } | ApiError::Forbidden(_) => LoginFailure::Message(err.detail()),
            other => LoginFailure::Message(other.to_string()),
        }
    }
}
