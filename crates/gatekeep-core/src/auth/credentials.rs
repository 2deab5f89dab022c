use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::CredentialBackend;

/// Scope every credential is written under: the whole application
const CREDENTIAL_PATH: &str = "/";

/// Access token lifetime with remember-me (days)
const ACCESS_REMEMBER_DAYS: i64 = 7;

/// Refresh token lifetime with remember-me (days)
const REFRESH_REMEMBER_DAYS: i64 = 30;

/// Refresh token lifetime without remember-me (days)
const REFRESH_DEFAULT_DAYS: i64 = 7;

/// Key of the remember-me preference entry
const REMEMBER_ME_KEY: &str = "remember_me";

/// Lifetime of the remember-me preference entry (days)
const REMEMBER_ME_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Access,
    Refresh,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 2] = [CredentialKind::Access, CredentialKind::Refresh];

    pub fn key(&self) -> &'static str {
        match self {
            CredentialKind::Access => "access_token",
            CredentialKind::Refresh => "refresh_token",
        }
    }
}

/// How long a credential of a given kind lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Dies with the process
    Session,
    Days(i64),
}

impl CredentialPolicy {
    pub fn for_kind(kind: CredentialKind, remember_me: bool) -> Self {
        match (kind, remember_me) {
            (CredentialKind::Access, true) => CredentialPolicy::Days(ACCESS_REMEMBER_DAYS),
            (CredentialKind::Access, false) => CredentialPolicy::Session,
            (CredentialKind::Refresh, true) => CredentialPolicy::Days(REFRESH_REMEMBER_DAYS),
            (CredentialKind::Refresh, false) => CredentialPolicy::Days(REFRESH_DEFAULT_DAYS),
        }
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CredentialPolicy::Session => None,
            CredentialPolicy::Days(days) => Some(now + Duration::days(*days)),
        }
    }
}

/// One stored credential entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub value: String,
    /// `None` means session lifetime
    pub expires_at: Option<DateTime<Utc>>,
    pub path: String,
    pub secure: bool,
}

impl CredentialRecord {
    pub fn is_session_only(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("expires_at", &self.expires_at)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Durable store for the access and refresh tokens.
///
/// Absence is a normal state. Backend failures are logged and read as
/// absence; none of these operations fail outward.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
    secure: bool,
}

impl CredentialStore {
    /// `secure` marks records as requiring an encrypted transport (production)
    pub fn new(backend: Arc<dyn CredentialBackend>, secure: bool) -> Self {
        Self { backend, secure }
    }

    pub fn save(&self, kind: CredentialKind, value: &str, remember_me: bool) {
        self.save_at(kind, value, remember_me, Utc::now());
    }

    pub(crate) fn save_at(&self, kind: CredentialKind, value: &str, remember_me: bool, now: DateTime<Utc>) {
        let policy = CredentialPolicy::for_kind(kind, remember_me);
        let record = CredentialRecord {
            value: value.to_string(),
            expires_at: policy.expires_at(now),
            path: CREDENTIAL_PATH.to_string(),
            secure: self.secure,
        };
        if let Err(e) = self.backend.store(kind.key(), &record) {
            warn!(error = %e, kind = kind.key(), "Failed to save credential");
        } else {
            debug!(kind = kind.key(), ?policy, "Credential saved");
        }
    }

    pub fn read(&self, kind: CredentialKind) -> Option<String> {
        self.record(kind.key()).map(|r| r.value)
    }

    /// Full record, for inspecting lifetime and flags
    pub fn read_record(&self, kind: CredentialKind) -> Option<CredentialRecord> {
        self.record(kind.key())
    }

    /// Remove both tokens. Idempotent.
    pub fn clear(&self) {
        for kind in CredentialKind::ALL {
            if let Err(e) = self.backend.remove(kind.key()) {
                warn!(error = %e, kind = kind.key(), "Failed to clear credential");
            }
        }
        debug!("Credentials cleared");
    }

    pub fn has_tokens(&self) -> bool {
        CredentialKind::ALL.iter().any(|kind| self.read(*kind).is_some())
    }

    pub fn remember_me(&self) -> bool {
        self.record(REMEMBER_ME_KEY)
            .map(|r| r.value == "true")
            .unwrap_or(false)
    }

    /// Persist the remember-me preference independently of the tokens
    pub fn set_remember_me(&self, value: bool) {
        let result = if value {
            let record = CredentialRecord {
                value: "true".to_string(),
                expires_at: Some(Utc::now() + Duration::days(REMEMBER_ME_DAYS)),
                path: CREDENTIAL_PATH.to_string(),
                secure: self.secure,
            };
            self.backend.store(REMEMBER_ME_KEY, &record)
        } else {
            self.backend.remove(REMEMBER_ME_KEY)
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist remember-me preference");
        }
    }

    fn record(&self, key: &str) -> Option<CredentialRecord> {
        match self.backend.load(key) {
            Ok(Some(record)) if record.is_expired_at(Utc::now()) => {
                debug!(key, "Dropping expired credential");
                if let Err(e) = self.backend.remove(key) {
                    warn!(error = %e, key, "Failed to purge expired credential");
                }
                None
            }
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, key, "Failed to read credential");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::backend::MemoryBackend;

    fn store() -> (CredentialStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CredentialStore::new(backend.clone(), true), backend)
    }

    #[test]
    fn test_policy_table() {
        use CredentialKind::*;
        assert_eq!(CredentialPolicy::for_kind(Access, true), CredentialPolicy::Days(7));
        assert_eq!(CredentialPolicy::for_kind(Access, false), CredentialPolicy::Session);
        assert_eq!(CredentialPolicy::for_kind(Refresh, true), CredentialPolicy::Days(30));
        assert_eq!(CredentialPolicy::for_kind(Refresh, false), CredentialPolicy::Days(7));
    }

    #[test]
    fn test_save_without_remember_me() {
        let (store, _) = store();
        let now = Utc::now();
        store.save_at(CredentialKind::Access, "a1", false, now);
        store.save_at(CredentialKind::Refresh, "r1", false, now);

        let access = store.read_record(CredentialKind::Access).unwrap();
        assert_eq!(access.value, "a1");
        assert!(access.is_session_only());
        assert_eq!(access.path, "/");
        assert!(access.secure);

        let refresh = store.read_record(CredentialKind::Refresh).unwrap();
        assert_eq!(refresh.expires_at, Some(now + Duration::days(7)));
    }

    #[test]
    fn test_save_with_remember_me() {
        let (store, _) = store();
        let now = Utc::now();
        store.save_at(CredentialKind::Access, "a1", true, now);
        store.save_at(CredentialKind::Refresh, "r1", true, now);

        assert_eq!(
            store.read_record(CredentialKind::Access).unwrap().expires_at,
            Some(now + Duration::days(7))
        );
        assert_eq!(
            store.read_record(CredentialKind::Refresh).unwrap().expires_at,
            Some(now + Duration::days(30))
        );
    }

    #[test]
    fn test_expired_record_reads_as_absent() {
        let (store, backend) = store();
        store.save_at(CredentialKind::Refresh, "r1", false, Utc::now() - Duration::days(8));

        assert!(store.read(CredentialKind::Refresh).is_none());
        // purged from the backend as well
        assert!(backend.load("refresh_token").unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _) = store();
        store.save(CredentialKind::Access, "a1", false);
        store.save(CredentialKind::Refresh, "r1", false);
        assert!(store.has_tokens());

        store.clear();
        store.clear();
        assert!(!store.has_tokens());
        assert!(store.read(CredentialKind::Access).is_none());
        assert!(store.read(CredentialKind::Refresh).is_none());
    }

    #[test]
    fn test_remember_me_independent_of_tokens() {
        let (store, _) = store();
        assert!(!store.remember_me());

        store.set_remember_me(true);
        store.save(CredentialKind::Access, "a1", true);
        store.clear();
        assert!(store.remember_me());

        store.set_remember_me(false);
        assert!(!store.remember_me());
    }

    #[test]
    fn test_record_debug_hides_value() {
        let record = CredentialRecord {
            value: "secret-token".to_string(),
            expires_at: None,
            path: "/".to_string(),
            secure: false,
        };
        assert!(!format!("{:?}", record).contains("secret-token"));
    }
}
