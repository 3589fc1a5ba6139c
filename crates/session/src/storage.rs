//! Durable key-value storage for the session credentials.
//!
//! The token and the serialized profile live under two separate keys so a
//! restart can restore them independently of each other.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use thiserror::Error;

use nova_auth::UserProfile;
use nova_core::{AuthError, StorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored value for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("failed to serialize value for '{key}': {reason}")]
    Serialize { key: String, reason: String },
}

/// Minimal string key-value store, the shape of browser `localStorage`.
pub trait KeyValueStorage: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed
// ─────────────────────────────────────────────────────────────────────────────

/// One file per key inside a directory.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Open the configured directory, or the per-user default.
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let dir = match &config.dir {
            Some(dir) => dir.clone(),
            None => default_storage_dir()
                .context("failed to determine storage directory - set NOVA_STORAGE_DIR")?,
        };
        let storage = Self::open(&dir)
            .with_context(|| format!("failed to open credential storage at {:?}", dir))?;
        tracing::debug!("credential storage at {:?}", storage.dir);
        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(name)
    }
}

/// `{data_dir}/nova-admin`, falling back to `~/.local/share/nova-admin`.
pub fn default_storage_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .context("neither a data directory nor a home directory is available")?;
    Ok(base.join("nova-admin"))
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential store
// ─────────────────────────────────────────────────────────────────────────────

/// What [`CredentialStore::load`] found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub token: Option<String>,
    pub profile: Option<UserProfile>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.profile.is_none()
    }
}

/// Persists the token and profile under the configured keys.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
    token_key: String,
    profile_key: String,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: &StorageConfig) -> Self {
        Self {
            storage,
            token_key: config.token_key(),
            profile_key: config.profile_key(),
        }
    }

    /// Read both entries.
    ///
    /// Never fails: unreadable or unparsable entries are logged and reported
    /// as absent. An empty token counts as no token.
    pub fn load(&self) -> StoredCredentials {
        let token = match self.storage.get(&self.token_key) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::warn!("failed to read stored token: {e}");
                None
            }
        };

        let profile = match self.storage.get(&self.profile_key) {
            Ok(Some(raw)) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    let err = AuthError::StorageCorrupt(e.to_string());
                    tracing::warn!(key = %self.profile_key, "discarding stored profile: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("failed to read stored profile: {e}");
                None
            }
        };

        StoredCredentials { token, profile }
    }

    pub fn save(&self, token: &str, profile: &UserProfile) -> Result<(), StorageError> {
        self.save_token(token)?;
        self.save_profile(profile)
    }

    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(&self.token_key, token)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let raw = serde_json::to_string(profile).map_err(|e| StorageError::Serialize {
            key: self.profile_key.clone(),
            reason: e.to_string(),
        })?;
        self.storage.set(&self.profile_key, &raw)
    }

    /// Remove both entries. Both removals are attempted even if one fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let token = self.storage.remove(&self.token_key);
        let profile = self.storage.remove(&self.profile_key);
        token.and(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile::new("1", "admin")
            .with_roles(["admin"])
            .with_permissions(["*"])
    }

    fn memory_store() -> (Arc<MemoryStorage>, CredentialStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(storage.clone(), &StorageConfig::default());
        (storage, store)
    }

    #[test]
    fn save_then_load_returns_both_entries() {
        let (_, store) = memory_store();
        store.save("tok-1", &profile()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.token.as_deref(), Some("tok-1"));
        assert_eq!(loaded.profile, Some(profile()));
    }

    #[test]
    fn clear_removes_everything() {
        let (storage, store) = memory_store();
        store.save("tok-1", &profile()).unwrap();
        store.clear().unwrap();

        assert!(storage.is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_profile_reads_as_absent() {
        let (storage, store) = memory_store();
        storage.set("nova_admin_token", "tok-1").unwrap();
        storage.set("nova_admin_user_info", "{not json").unwrap();

        let loaded = store.load();
        assert_eq!(loaded.token.as_deref(), Some("tok-1"));
        assert_eq!(loaded.profile, None);
    }

    #[test]
    fn empty_token_reads_as_absent() {
        let (storage, store) = memory_store();
        storage.set("nova_admin_token", "").unwrap();
        assert_eq!(store.load().token, None);
    }

    #[test]
    fn custom_prefix_changes_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let config = StorageConfig {
            prefix: "ops_".to_string(),
            dir: None,
        };
        let store = CredentialStore::new(storage.clone(), &config);
        store.save_token("t").unwrap();

        assert_eq!(storage.get("ops_token").unwrap().as_deref(), Some("t"));
        assert_eq!(storage.get("nova_admin_token").unwrap(), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
            let store = CredentialStore::new(storage, &StorageConfig::default());
            store.save("tok-file", &profile()).unwrap();
        }

        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let store = CredentialStore::new(storage, &StorageConfig::default());
        let loaded = store.load();
        assert_eq!(loaded.token.as_deref(), Some("tok-file"));
        assert_eq!(loaded.profile, Some(profile()));
    }

    #[test]
    fn file_storage_remove_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.remove("never_written").unwrap();
        assert_eq!(storage.get("never_written").unwrap(), None);
    }

    #[test]
    fn file_storage_keeps_keys_inside_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("../escape", "x").unwrap();

        assert!(!dir.path().parent().unwrap().join("escape").exists());
        assert_eq!(storage.get("../escape").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn config_dir_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            dir: Some(dir.path().join("nested")),
            ..StorageConfig::default()
        };
        let storage = FileStorage::from_config(&config).unwrap();
        assert!(storage.dir().ends_with("nested"));
        assert!(storage.dir().is_dir());
    }
}
