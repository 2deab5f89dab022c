use serde::{Deserialize, Serialize};

/// Credentials submitted to `POST /auth/login`. The username is the email address.
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Access/refresh pair issued by login and refresh.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// Token values stay out of logs.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub confirm_url: String,
    #[serde(default)]
    pub email_task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetRequest {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetResponse {
    pub message: String,
    #[serde(default)]
    pub email_task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendConfirmationRequest {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfirmationResponse {
    pub confirm_url: String,
    #[serde(default)]
    pub email_task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Generic `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Raw account export as returned by `GET /user/export-data`.
#[derive(Debug, Clone)]
pub struct DataExport {
    pub bytes: Vec<u8>,
    pub filename: String,
}
