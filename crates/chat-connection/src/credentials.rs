//! Session credential lookup.
//!
//! The connection manager only ever reads the token; login flows elsewhere
//! write it into a [`SessionStore`] (or any other [`CredentialSource`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

/// Key under which the session token is stored.
pub const TOKEN_KEY: &str = "token";

/// Errors from session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only access to the current session token.
pub trait CredentialSource: Send + Sync {
    /// Returns the token, or `None` when no session exists.
    fn token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self().filter(|t| !t.is_empty())
    }
}

/// Process-wide key-value session store.
///
/// Values live in memory and, when opened with a path, are persisted to a
/// JSON file so a later process can pick up the same session.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    values: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    /// Creates an empty store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a store backed by `path`, loading existing values.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let values = load_values(&path)?;
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    /// Returns the value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Sets a value and persists the store.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.persist()
    }

    /// Removes a value and persists the store.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.persist()
    }

    pub fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.set(TOKEN_KEY, token)
    }

    pub fn clear_token(&self) -> Result<(), StoreError> {
        self.remove(TOKEN_KEY)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let map = self.values.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*map)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        debug!("persisted session store to {:?}", path);
        Ok(())
    }
}

impl CredentialSource for SessionStore {
    fn token(&self) -> Option<String> {
        self.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }
}

fn load_values(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let values: HashMap<String, String> = serde_json::from_str(&data)?;
    debug!("loaded {} session value(s) from {:?}", values.len(), path);
    Ok(values)
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Returns the default session file path.
pub fn default_session_path() -> Option<PathBuf> {
    crate::config::config_dir().map(|d| d.join("chatlink").join("session.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, SessionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        let store = SessionStore::open(path).unwrap();
        (tmp, store)
    }

    #[test]
    fn new_store_has_no_token() {
        let (_tmp, store) = test_store();
        assert!(store.token().is_none());
    }

    #[test]
    fn token_roundtrip_persists() {
        let (tmp, store) = test_store();
        store.set_token("abc").unwrap();
        assert_eq!(store.token().as_deref(), Some("abc"));

        let reopened = SessionStore::open(tmp.path().join("session.json")).unwrap();
        assert_eq!(reopened.token().as_deref(), Some("abc"));
    }

    #[test]
    fn clear_token_removes_it() {
        let (_tmp, store) = test_store();
        store.set_token("abc").unwrap();
        store.clear_token().unwrap();
        assert!(store.token().is_none());
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let store = SessionStore::in_memory();
        store.set_token("").unwrap();
        assert!(store.token().is_none());
    }

    #[test]
    fn in_memory_store_does_not_write() {
        let store = SessionStore::in_memory();
        store.set("other", "value").unwrap();
        assert_eq!(store.get("other").as_deref(), Some("value"));
        assert!(store.token().is_none());
    }

    #[test]
    fn closure_source() {
        let source = || Some("xyz".to_string());
        assert_eq!(CredentialSource::token(&source).as_deref(), Some("xyz"));

        let empty = || Some(String::new());
        assert!(CredentialSource::token(&empty).is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(SessionStore::open(path), Err(StoreError::Json(_))));
    }
}
