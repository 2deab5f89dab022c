use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Marker the API uses in 403 details for accounts pending verification
const UNCONFIRMED_MARKER: &str = "not confirmed";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{detail}")]
    Validation { status: u16, detail: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid credentials")]
    Unauthorized(String),

    #[error("{0}")]
    EmailNotConfirmed(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFound(String),

    #[error("Too many requests. Please wait before retrying.")]
    RateLimited,

    #[error("Server error. Please try again later.")]
    Server { status: u16, detail: String },

    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No refresh token available")]
    NoRefreshToken,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable `detail` out of an error body.
    /// Validation errors carry a list of `{"msg": ...}` objects instead of a string.
    fn extract_detail(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let detail = match parsed.detail? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };
        let detail = detail.trim();
        (!detail.is_empty()).then(|| Self::truncate_body(detail))
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = Self::extract_detail(body);
        match status.as_u16() {
            400 => ApiError::Validation {
                status: 400,
                detail: detail.unwrap_or_else(|| "Bad request".to_string()),
            },
            401 => ApiError::Unauthorized(detail.unwrap_or_else(|| "Invalid credentials".to_string())),
            403 => match detail {
                Some(d) if !d.to_lowercase().contains(UNCONFIRMED_MARKER) => ApiError::Forbidden(d),
                d => ApiError::EmailNotConfirmed(d.unwrap_or_else(|| "Email not confirmed".to_string())),
            },
            404 => ApiError::NotFound(detail.unwrap_or_else(|| "Not found".to_string())),
            422 => ApiError::Validation {
                status: 422,
                detail: detail.unwrap_or_else(|| "Validation error".to_string()),
            },
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server {
                status: status.as_u16(),
                detail: detail.unwrap_or_else(|| Self::truncate_body(body)),
            },
            _ => ApiError::InvalidResponse(
                detail.unwrap_or_else(|| "Something went wrong".to_string()),
            ),
        }
    }

    /// Consume a failed response into the matching variant.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, &body)
    }

    /// HTTP status behind the failure, when there was one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::InvalidCredentials | ApiError::Unauthorized(_) => Some(401),
            ApiError::EmailNotConfirmed(_) | ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) | ApiError::NoRefreshToken => None,
        }
    }

    /// The server-supplied detail, falling back to the normalized message
    pub fn detail(&self) -> String {
        match self {
            ApiError::Validation { detail, .. }
            | ApiError::Unauthorized(detail)
            | ApiError::EmailNotConfirmed(detail)
            | ApiError::Forbidden(detail)
            | ApiError::NotFound(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Worth offering the user a manual retry. Nothing is retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Server { .. } | ApiError::RateLimited
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn test_bad_request_uses_detail() {
        let err = ApiError::from_status(status(400), r#"{"detail": "User already exists"}"#);
        assert!(matches!(err, ApiError::Validation { status: 400, .. }));
        assert_eq!(err.to_string(), "User already exists");

        let err = ApiError::from_status(status(400), "");
        assert_eq!(err.to_string(), "Bad request");
    }

    #[test]
    fn test_unprocessable_entity_joins_messages() {
        let body = r#"{"detail": [{"loc": ["body", "username"], "msg": "value is not a valid email address"}, {"msg": "field required"}]}"#;
        let err = ApiError::from_status(status(422), body);
        assert_eq!(err.status_code(), Some(422));
        assert_eq!(err.to_string(), "value is not a valid email address; field required");

        assert_eq!(ApiError::from_status(status(422), "{}").to_string(), "Validation error");
    }

    #[test]
    fn test_forbidden_marker() {
        let err = ApiError::from_status(status(403), r#"{"detail": "Email not confirmed"}"#);
        assert!(matches!(err, ApiError::EmailNotConfirmed(_)));
        assert_eq!(err.to_string(), "Email not confirmed");

        let err = ApiError::from_status(status(403), "");
        assert!(matches!(err, ApiError::EmailNotConfirmed(_)));

        let err = ApiError::from_status(status(403), r#"{"detail": "Admins only"}"#);
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(err.status_code(), Some(403));
    }

    #[test]
    fn test_unauthorized_and_not_found_messages() {
        let err = ApiError::from_status(status(401), r#"{"detail": "Invalid refresh token"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(err.detail(), "Invalid refresh token");

        let err = ApiError::from_status(status(404), r#"{"detail": "User not found"}"#);
        assert_eq!(err.to_string(), "Not found");
        assert_eq!(err.detail(), "User not found");
    }

    #[test]
    fn test_server_errors_are_generic() {
        let err = ApiError::from_status(status(500), r#"{"detail": "Export failed: boom"}"#);
        assert_eq!(err.to_string(), "Server error. Please try again later.");
        assert_eq!(err.status_code(), Some(500));
        assert!(err.is_retryable());

        let err = ApiError::from_status(status(503), "upstream down");
        assert_eq!(err.detail(), "Server error. Please try again later.");
        assert!(matches!(err, ApiError::Server { status: 503, .. }));
    }

    #[test]
    fn test_other_statuses() {
        assert!(matches!(ApiError::from_status(status(429), ""), ApiError::RateLimited));

        let err = ApiError::from_status(status(409), "");
        assert_eq!(err.to_string(), "Something went wrong");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400); // 800 bytes, multi-byte chars
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
