//! Durable key-value backends for credential records.
//!
//! Every backend keeps session-lifetime records (`expires_at == None`)
//! in process memory only, so they vanish when the process exits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use super::credentials::CredentialRecord;

/// File name of the file backend inside its data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Service name used for OS keychain entries
const KEYRING_SERVICE: &str = "gatekeep";

/// Storage seam under `CredentialStore`.
pub trait CredentialBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CredentialRecord>>;
    fn store(&self, key: &str, record: &CredentialRecord) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Memory
// ============================================================================

/// Process-lifetime storage.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<CredentialRecord>> {
        Ok(lock(&self.records).get(key).cloned())
    }

    fn store(&self, key: &str, record: &CredentialRecord) -> Result<()> {
        lock(&self.records).insert(key.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.records).remove(key);
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// JSON file of persistent records plus an in-memory map of session records.
pub struct FileBackend {
    path: PathBuf,
    session: Mutex<HashMap<String, CredentialRecord>>,
    // Serializes read-modify-write cycles on the file
    file_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CREDENTIALS_FILE),
            session: Mutex::new(HashMap::new()),
            file_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<HashMap<String, CredentialRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read credentials file")?;
        serde_json::from_str(&contents).context("Failed to parse credentials file")
    }

    fn write_file(&self, records: &HashMap<String, CredentialRecord>) -> Result<()> {
        if records.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove credentials file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, contents).context("Failed to write credentials file")?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict credentials file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl CredentialBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<CredentialRecord>> {
        if let Some(record) = lock(&self.session).get(key) {
            return Ok(Some(record.clone()));
        }
        let _guard = lock(&self.file_lock);
        Ok(self.read_file()?.remove(key))
    }

    fn store(&self, key: &str, record: &CredentialRecord) -> Result<()> {
        let _guard = lock(&self.file_lock);
        let mut records = self.read_file()?;

        if record.is_session_only() {
            lock(&self.session).insert(key.to_string(), record.clone());
            // A persistent copy from an earlier remember-me login must not outlive this one
            if records.remove(key).is_some() {
                self.write_file(&records)?;
            }
        } else {
            lock(&self.session).remove(key);
            records.insert(key.to_string(), record.clone());
            self.write_file(&records)?;
        }
        debug!(key, path = %self.path.display(), "Credential stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.session).remove(key);
        let _guard = lock(&self.file_lock);
        let mut records = self.read_file()?;
        if records.remove(key).is_some() {
            self.write_file(&records)?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// One keychain entry per key, holding the JSON-encoded record.
pub struct KeyringBackend {
    service: String,
    session: Mutex<HashMap<String, CredentialRecord>>,
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            session: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn delete_entry(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self, key: &str) -> Result<Option<CredentialRecord>> {
        if let Some(record) = lock(&self.session).get(key) {
            return Ok(Some(record.clone()));
        }
        match self.entry(key)?.get_password() {
            Ok(json) => {
                let record = serde_json::from_str(&json)
                    .context("Failed to parse credential from keychain")?;
                Ok(Some(record))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn store(&self, key: &str, record: &CredentialRecord) -> Result<()> {
        if record.is_session_only() {
            lock(&self.session).insert(key.to_string(), record.clone());
            return self.delete_entry(key);
        }

        lock(&self.session).remove(key);
        let json = serde_json::to_string(record)?;
        self.entry(key)?
            .set_password(&json)
            .context("Failed to store credential in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.session).remove(key);
        self.delete_entry(key)
    }
}
