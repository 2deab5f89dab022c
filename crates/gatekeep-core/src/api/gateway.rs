//! Request gateway: token attachment and the refresh-then-retry policy.
//!
//! Every call to the account API goes through `Gateway::execute`:
//!
//! - the stored access token (if any) is attached as a bearer credential
//! - a 401 on the login call becomes `ApiError::InvalidCredentials`
//! - a 401 elsewhere triggers one coordinated refresh and one replay
//! - every other failure is normalized and returned, never retried

use chrono::Utc;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{CredentialKind, SessionManager};
use crate::models::{
    ChangePasswordRequest, DataExport, EmailConfirmationResponse, LoginCredentials,
    MessageResponse, PasswordResetConfirm, PasswordResetRequest, PasswordResetResponse,
    RefreshRequest, RegisterRequest, RegisterResponse, ResendConfirmationRequest, TokenPair,
    UserProfile,
};

use super::client::{ApiClient, ApiRequest, LOGIN_PATH, REFRESH_PATH};
use super::ApiError;

/// Where the user is sent when their session cannot be recovered.
pub trait Navigator: Send + Sync {
    /// Whether the login screen is already showing
    fn is_on_login(&self) -> bool {
        false
    }

    fn redirect_to_login(&self);
}

/// Navigator for headless use: nothing to redirect.
#[derive(Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {}
}

/// Borrowed view over a session that issues API calls on its behalf.
pub struct Gateway<'a> {
    session: &'a SessionManager,
}

impl<'a> Gateway<'a> {
    pub(crate) fn new(session: &'a SessionManager) -> Self {
        Self { session }
    }

    fn api(&self) -> &ApiClient {
        self.session.api()
    }

    /// Send a request under the session's credentials.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        let token = self.session.credentials().read(CredentialKind::Access);
        let response = self.api().send(&request, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return ApiClient::check_response(response).await;
        }

        if request.is_login() {
            debug!("Login rejected with 401");
            return Err(ApiError::InvalidCredentials);
        }

        let failure = ApiError::from_response(response).await;
        if request.is_retried() || request.is_refresh() {
            debug!(path = %request.path, retried = request.is_retried(), "Not refreshing for this request");
            return Err(failure);
        }
        request.retried = true;

        match self.session.refresh_after(token.as_deref()).await {
            Ok(new_token) => {
                debug!(path = %request.path, "Replaying request with refreshed token");
                let response = self.api().send(&request, Some(&new_token)).await?;
                ApiClient::check_response(response).await
            }
            Err(e) => {
                warn!(error = %e, path = %request.path, "Session could not be refreshed");
                self.redirect_to_login();
                Err(failure)
            }
        }
    }

    /// Execute and decode a JSON success body
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    fn redirect_to_login(&self) {
        let navigator = self.session.navigator();
        if navigator.is_on_login() {
            return;
        }
        info!("Redirecting to login");
        navigator.redirect_to_login();
    }

    // ===== Anonymous endpoints =====

    pub async fn register(&self, data: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        self.execute_json(ApiRequest::post("/auth/register").json(data)?).await
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenPair, ApiError> {
        self.execute_json(ApiRequest::post(LOGIN_PATH).json(credentials)?).await
    }

    /// Exchange a refresh token for a new pair. Sent straight to the
    /// transport without a bearer token, so it can never trigger a nested refresh.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let body = RefreshRequest { refresh_token };
        let request = ApiRequest::post(REFRESH_PATH).json(&body)?;
        let response = ApiClient::check_response(self.api().send(&request, None).await?).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", REFRESH_PATH, e)))
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<PasswordResetResponse, ApiError> {
        let body = PasswordResetRequest {
            username: email.to_string(),
        };
        self.execute_json(ApiRequest::post("/auth/request-password-reset").json(&body)?)
            .await
    }

    pub async fn reset_password(&self, data: &PasswordResetConfirm) -> Result<MessageResponse, ApiError> {
        self.execute_json(ApiRequest::post("/auth/reset-password").json(data)?)
            .await
    }

    pub async fn verify_email(&self, token: &str) -> Result<MessageResponse, ApiError> {
        let path = format!("/mail/verify/{}", urlencoding::encode(token));
        self.execute_json(ApiRequest::post(path)).await
    }

    pub async fn resend_confirmation(&self, email: &str) -> Result<EmailConfirmationResponse, ApiError> {
        let body = ResendConfirmationRequest {
            username: email.to_string(),
        };
        self.execute_json(ApiRequest::post("/mail/resend-confirmation").json(&body)?)
            .await
    }

    // ===== Authenticated endpoints =====

    pub async fn change_password(&self, data: &ChangePasswordRequest) -> Result<MessageResponse, ApiError> {
        self.execute_json(ApiRequest::post("/auth/change-password").json(data)?)
            .await
    }

    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.execute_json(ApiRequest::get("/auth/user")).await
    }

    pub async fn export_data(&self) -> Result<DataExport, ApiError> {
        let response = self.execute(ApiRequest::get("/user/export-data")).await?;
        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(default_export_filename);
        let bytes = response.bytes().await?.to_vec();
        debug!(size = bytes.len(), %filename, "Export downloaded");
        Ok(DataExport { bytes, filename })
    }

    pub async fn delete_account(&self) -> Result<MessageResponse, ApiError> {
        self.execute_json(ApiRequest::delete("/user/delete-account")).await
    }
}

/// Extract `filename` from a Content-Disposition header value
fn filename_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let name = part.strip_prefix("filename=")?.trim_matches('"');
        // Only keep the final path component
        let name = name.rsplit(['/', '\\']).next()?;
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn default_export_filename() -> String {
    format!("export-{}.json", Utc::now().format("%Y%m%d"))
}
