//! Persistent client-side key-value store holding the session slots.
//!
//! Three slots make up a session: the base-address override, the bearer
//! credential and a JSON-serialized profile blob. The credential and the
//! profile are always written and erased together.

use crate::errors::{AppError, ResultExt};
use crate::models::Profile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Base-address override, stored without the `/api` root.
pub const BASE_URL_KEY: &str = "apiBaseUrl";
/// Bearer credential.
pub const TOKEN_KEY: &str = "authToken";
/// JSON profile blob cached at login.
pub const PROFILE_KEY: &str = "user";
/// `"1"` turns on HTTP diagnostics at runtime.
pub const HTTP_DEBUG_KEY: &str = "httpDebug";

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;

    fn token(&self) -> Option<String> {
        self.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Cached profile. An unreadable blob is treated as absent.
    fn profile(&self) -> Option<Profile> {
        let raw = self.get(PROFILE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached profile: {}", e);
                None
            }
        }
    }

    fn save_session(&self, token: &str, profile: &Profile) -> Result<(), AppError> {
        let blob = serde_json::to_string(profile)?;
        self.set(TOKEN_KEY, token)?;
        self.set(PROFILE_KEY, &blob)
    }

    fn clear_session(&self) -> Result<(), AppError> {
        self.remove(TOKEN_KEY)?;
        self.remove(PROFILE_KEY)
    }

    fn base_override(&self) -> Option<String> {
        self.get(BASE_URL_KEY).filter(|b| !b.trim().is_empty())
    }

    fn persist_base_override(&self, origin: &str) -> Result<(), AppError> {
        self.set(BASE_URL_KEY, origin)
    }

    fn http_debug(&self) -> bool {
        self.get(HTTP_DEBUG_KEY).as_deref() == Some("1")
    }
}

/// Store that lives for the process lifetime only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object in a single file.
///
/// Every mutation rewrites the whole file; the slot set is tiny.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let slots = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    "Session store {} is corrupt, starting empty: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        tracing::debug!("Session store opened at {}", path.display());
        Self {
            path,
            slots: Mutex::new(slots),
        }
    }

    fn flush(&self, slots: &BTreeMap<String, String>) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(slots)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Writing session store {}", self.path.display()))
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(key.to_string(), value.to_string());
        self.flush(&slots)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.remove(key).is_some() {
            self.flush(&slots)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            user_id: "u-1".to_string(),
            employee_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            role: "admin".to_string(),
            ..Profile::default()
        }
    }

    #[test]
    fn test_session_written_and_cleared_together() {
        let store = MemoryStore::new();
        store.save_session("tok", &profile()).unwrap();
        assert_eq!(store.token().as_deref(), Some("tok"));
        assert_eq!(store.profile().unwrap().user_id, "u-1");

        store.persist_base_override("http://localhost:44308").unwrap();
        store.clear_session().unwrap();
        assert!(store.token().is_none());
        assert!(store.profile().is_none());
        // the address override is not part of the session
        assert_eq!(
            store.base_override().as_deref(),
            Some("http://localhost:44308")
        );
    }

    #[test]
    fn test_unreadable_profile_is_absent() {
        let store = MemoryStore::new();
        store.set(PROFILE_KEY, "{not json").unwrap();
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_http_debug_flag() {
        let store = MemoryStore::new();
        assert!(!store.http_debug());
        store.set(HTTP_DEBUG_KEY, "1").unwrap();
        assert!(store.http_debug());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path);
        store.save_session("tok", &profile()).unwrap();
        store.persist_base_override("http://localhost:49724").unwrap();
        drop(store);

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.token().as_deref(), Some("tok"));
        assert_eq!(reopened.profile().unwrap().email, "asha@example.com");
        assert_eq!(
            reopened.base_override().as_deref(),
            Some("http://localhost:49724")
        );
    }

    #[test]
    fn test_file_store_starts_empty_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = FileStore::open(&path);
        assert!(store.token().is_none());
        store.set(TOKEN_KEY, "fresh").unwrap();
        assert_eq!(FileStore::open(&path).token().as_deref(), Some("fresh"));
    }
}
