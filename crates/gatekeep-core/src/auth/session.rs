//! Session lifecycle coordinator.
//!
//! `SessionManager` owns the in-memory session and is the only writer of
//! it. It is constructed once per process and shared by reference (or
//! `Arc`) with whatever issues requests.
//!
//! At most one refresh runs at a time. Callers that hit a 401 with an
//! access token that has since been rotated reuse the rotated token
//! instead of refreshing again, so concurrent failures with the same
//! expired token produce a single refresh call.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, Gateway, Navigator, NoopNavigator};
use crate::models::{LoginCredentials, MessageResponse, RegisterRequest, RegisterResponse, User};

use super::credentials::{CredentialKind, CredentialStore};
use super::token;

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum SessionPhase {
    /// Process start, or a login in flight
    Loading,
    Anonymous,
    Authenticated,
    /// Startup found only a refresh token and is exchanging it
    Refreshing,
}

/// The authoritative in-memory session record.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(TS), ts(export, rename_all = "camelCase"))]
pub struct SessionState {
    user: Option<User>,
    #[cfg_attr(feature = "ts", ts(skip))]
    access_token: Option<String>,
    #[cfg_attr(feature = "ts", ts(skip))]
    refresh_token: Option<String>,
    phase: SessionPhase,
    remember_me: bool,
}

impl SessionState {
    fn initial(remember_me: bool) -> Self {
        Self {
            user: None,
            access_token: None,
            refresh_token: None,
            phase: SessionPhase::Loading,
            remember_me,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Loading | SessionPhase::Refreshing)
    }

    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    // The only way into Authenticated, so an authenticated session always has a token
    fn authenticate(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = Some(access_token);
        self.refresh_token = refresh_token;
        self.phase = SessionPhase::Authenticated;
    }

    fn reset(&mut self) {
        self.user = None;
        self.access_token = None;
        self.refresh_token = None;
        self.phase = SessionPhase::Anonymous;
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("user", &self.user)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("phase", &self.phase)
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Result of the startup check.
#[derive(Debug)]
pub struct StartupCheck {
    pub phase: SessionPhase,
    /// Background profile fetch, when the check ended authenticated
    pub enrichment: Option<JoinHandle<()>>,
}

impl StartupCheck {
    /// Wait for the background profile fetch, if any
    pub async fn wait(self) -> SessionPhase {
        if let Some(handle) = self.enrichment {
            if let Err(e) = handle.await {
                warn!(error = %e, "Profile enrichment task failed");
            }
        }
        self.phase
    }
}

pub struct SessionManager {
    api: ApiClient,
    credentials: CredentialStore,
    navigator: Arc<dyn Navigator>,
    state: RwLock<SessionState>,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(api: ApiClient, credentials: CredentialStore) -> Self {
        let remember_me = credentials.remember_me();
        Self {
            api,
            credentials,
            navigator: Arc::new(NoopNavigator),
            state: RwLock::new(SessionState::initial(remember_me)),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.api
    }

    pub(crate) fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Issue API calls under this session's credentials
    pub fn gateway(&self) -> Gateway<'_> {
        Gateway::new(self)
    }

    /// Read-only copy of the current session
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.snapshot().user
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Resolve the initial session from stored credentials.
    pub async fn check_auth(self: &Arc<Self>) -> StartupCheck {
        let access = self.credentials.read(CredentialKind::Access);
        let refresh = self.credentials.read(CredentialKind::Refresh);

        if access.is_none() && refresh.is_none() {
            debug!("No stored credentials");
            self.update(SessionState::reset);
            return self.settled(SessionPhase::Anonymous);
        }

        if let Some(access) = access.filter(|t| !token::is_expired(t)) {
            if let Some(identity) = token::claims(&access) {
                debug!(subject = %identity.subject, expires_at = %identity.expires_at, "Stored access token is valid");
                self.update(|s| s.authenticate(access, refresh));
                return StartupCheck {
                    phase: SessionPhase::Authenticated,
                    enrichment: Some(self.spawn_profile_fetch()),
                };
            }
            debug!("Stored access token has no subject");
        }

        if refresh.is_none() {
            debug!("Access token expired and no refresh token stored");
            self.credentials.clear();
            self.update(SessionState::reset);
            return self.settled(SessionPhase::Anonymous);
        }

        self.update(|s| s.phase = SessionPhase::Refreshing);
        match self.refresh().await {
            Ok(_) => StartupCheck {
                phase: SessionPhase::Authenticated,
                enrichment: Some(self.spawn_profile_fetch()),
            },
            Err(e) => {
                warn!(error = %e, "Failed to refresh token at startup");
                self.credentials.clear();
                self.update(SessionState::reset);
                self.settled(SessionPhase::Anonymous)
            }
        }
    }

    fn settled(&self, phase: SessionPhase) -> StartupCheck {
        StartupCheck {
            phase,
            enrichment: None,
        }
    }

    fn spawn_profile_fetch(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.fetch_user().await {
                warn!(error = %e, "Failed to fetch user data");
            }
        })
    }

    // =========================================================================
    // Login / Register / Logout
    // =========================================================================

    /// Log in and persist the issued tokens. Resolves after the profile
    /// fetch has completed or failed; only the login itself can fail.
    pub async fn login(&self, credentials: &LoginCredentials, remember_me: bool) -> Result<(), ApiError> {
        let previous = self.begin_loading();

        let pair = match self.gateway().login(credentials).await {
            Ok(pair) => pair,
            Err(e) => {
                self.finish_loading(previous);
                debug!(error = %e, "Login failed");
                return Err(e);
            }
        };

        self.credentials.save(CredentialKind::Access, &pair.access_token, remember_me);
        self.credentials.save(CredentialKind::Refresh, &pair.refresh_token, remember_me);
        self.credentials.set_remember_me(remember_me);

        self.update(|s| {
            s.remember_me = remember_me;
            s.authenticate(pair.access_token, Some(pair.refresh_token));
        });
        info!(remember_me, "Login successful");

        if let Err(e) = self.fetch_user().await {
            warn!(error = %e, "Failed to fetch user data");
        }
        Ok(())
    }

    /// Create an account. Never signs the user in.
    pub async fn register(&self, data: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let previous = self.begin_loading();
        let result = self.gateway().register(data).await;
        self.finish_loading(previous);
        if result.is_ok() {
            info!("Registration submitted");
        }
        result
    }

    /// Drop credentials and return to the anonymous session. No network call.
    pub fn logout(&self) {
        self.credentials.clear();
        self.credentials.set_remember_me(false);
        self.update(|s| {
            s.reset();
            s.remember_me = false;
        });
        info!("Logged out");
    }

    fn begin_loading(&self) -> SessionPhase {
        self.update(|s| std::mem::replace(&mut s.phase, SessionPhase::Loading))
    }

    fn finish_loading(&self, previous: SessionPhase) {
        self.update(|s| {
            if s.phase == SessionPhase::Loading {
                s.phase = match previous {
                    SessionPhase::Loading | SessionPhase::Refreshing => SessionPhase::Anonymous,
                    other => other,
                };
            }
        });
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Exchange the stored refresh token for a new pair. Returns the new access token.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh on behalf of a request that failed while presenting `stale`.
    /// If the stored access token changed since, it is returned without a
    /// network call: another caller already rotated it.
    pub(crate) async fn refresh_after(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.credentials.read(CredentialKind::Access) {
            if stale != Some(current.as_str()) {
                debug!("Access token already rotated, reusing it");
                return Ok(current);
            }
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.credentials.read(CredentialKind::Refresh) else {
            debug!("No refresh token stored");
            self.logout();
            return Err(ApiError::NoRefreshToken);
        };

        let pair = match self.gateway().refresh(&refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                self.credentials.clear();
                self.update(SessionState::reset);
                return Err(e);
            }
        };

        let remember_me = self.snapshot().remember_me;
        self.credentials.save(CredentialKind::Access, &pair.access_token, remember_me);
        self.credentials.save(CredentialKind::Refresh, &pair.refresh_token, remember_me);

        let subject = token::claims(&pair.access_token).map(|identity| identity.subject);
        let access_token = pair.access_token.clone();
        self.update(|s| {
            s.authenticate(pair.access_token, Some(pair.refresh_token));
            // Only an existing session picks up identity from a refreshed token
            if let (Some(user), Some(subject)) = (s.user.as_mut(), subject) {
                user.email = subject;
            }
        });
        info!("Access token refreshed");
        Ok(access_token)
    }

    // =========================================================================
    // Profile / Account
    // =========================================================================

    /// Fetch the profile and attach it to the session if still signed in.
    pub async fn fetch_user(&self) -> Result<User, ApiError> {
        let user = User::from(self.gateway().fetch_profile().await?);
        let attached = self.update(|s| {
            if s.is_authenticated() {
                s.user = Some(user.clone());
                true
            } else {
                false
            }
        });
        if !attached {
            debug!("Session ended before profile arrived");
        }
        Ok(user)
    }

    pub fn set_user(&self, user: User) {
        self.update(|s| s.user = Some(user));
    }

    /// Delete the account remotely, then log out locally.
    pub async fn delete_account(&self) -> Result<MessageResponse, ApiError> {
        let response = self.gateway().delete_account().await?;
        info!("Account deleted");
        self.logout();
        Ok(response)
    }
}
