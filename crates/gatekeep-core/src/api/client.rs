//! HTTP transport for the account API.
//!
//! `ApiClient` knows how to build and send a request and how to turn a
//! failed response into an `ApiError`. It holds no session state; the
//! `Gateway` decides which token to attach and what to do on a 401.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method};
use serde::Serialize;
use tracing::debug;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default API location for local development
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";

/// One outgoing API call, replayable after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn is_login(&self) -> bool {
        self.path == LOGIN_PATH
    }

    pub fn is_refresh(&self) -> bool {
        self.path == REFRESH_PATH
    }

    /// Whether this request already went through a refresh-and-replay cycle
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// API client for the account service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client with the default timeout
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Self::new(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("Access token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send a request, attaching `token` as a bearer credential when present.
    /// Non-2xx responses are returned as-is; network failures are errors.
    pub async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<reqwest::Response, ApiError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, authenticated = token.is_some(), "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(Self::auth_headers(token)?);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Check if response is successful, returning a normalized error if not.
    pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_response(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_classification() {
        assert!(ApiRequest::post("/auth/login").is_login());
        assert!(!ApiRequest::post("/auth/login").is_refresh());
        assert!(ApiRequest::post("/auth/refresh").is_refresh());
        assert!(!ApiRequest::get("/auth/user").is_login());
        assert!(!ApiRequest::get("/auth/user").is_retried());
    }

    #[test]
    fn test_json_body() {
        let request = ApiRequest::post("/auth/login")
            .json(&serde_json::json!({"username": "ada@example.com"}))
            .unwrap();
        assert_eq!(request.body.unwrap()["username"], "ada@example.com");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::with_base_url("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/auth/user"), "http://localhost:8000/auth/user");
    }

    #[test]
    fn test_auth_headers() {
        let headers = ApiClient::auth_headers(Some("abc.def.ghi")).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc.def.ghi");
        assert!(ApiClient::auth_headers(None).unwrap().is_empty());
        assert!(ApiClient::auth_headers(Some("bad\ntoken")).is_err());
    }

    #[tokio::test]
    async fn test_send_attaches_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/user")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&server.url()).unwrap();
        let response = client.send(&ApiRequest::get("/auth/user"), Some("a1")).await.unwrap();
        assert!(response.status().is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_response_normalizes_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/register")
            .with_status(400)
            .with_body(r#"{"detail": "User already exists"}"#)
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&server.url()).unwrap();
        let response = client.send(&ApiRequest::post("/auth/register"), None).await.unwrap();
        let err = ApiClient::check_response(response).await.unwrap_err();
        assert_eq!(err.to_string(), "User already exists");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.send(&ApiRequest::get("/auth/user"), None).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(err.is_retryable());
    }
}
