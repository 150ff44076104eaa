//! Persistent session flags and the initial screen decision.
//!
//! Stores a flat string map as session.json in the app data directory.
//! The dispatch pipeline never touches this store.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const LOGGED_IN_KEY: &str = "isLoggedIn";

/// First screen shown at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Auth,
    SosRequest,
}

pub struct SessionStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl SessionStore {
    /// Open the store, starting empty if the file is missing or corrupt.
    pub fn open(data_dir: PathBuf) -> Self {
        let path = data_dir.join("session.json");
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> io::Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, content)
    }
}

/// Signed-in users go straight to the SOS screen
pub fn initial_route(store: &SessionStore) -> Route {
    match store.get(LOGGED_IN_KEY) {
        Some("true") => Route::SosRequest,
        _ => Route::Auth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_install_routes_to_auth() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().to_path_buf());
        assert_eq!(initial_route(&store), Route::Auth);
    }

    #[test]
    fn test_logged_in_flag_persists() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::open(dir.path().to_path_buf());
        store.set(LOGGED_IN_KEY, "true").unwrap();

        let reopened = SessionStore::open(dir.path().to_path_buf());
        assert_eq!(reopened.get(LOGGED_IN_KEY), Some("true"));
        assert_eq!(initial_route(&reopened), Route::SosRequest);
    }

    #[test]
    fn test_other_values_route_to_auth() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::open(dir.path().to_path_buf());
        store.set(LOGGED_IN_KEY, "false").unwrap();
        assert_eq!(initial_route(&store), Route::Auth);

        store.set(LOGGED_IN_KEY, "true").unwrap();
        store.remove(LOGGED_IN_KEY).unwrap();
        assert_eq!(initial_route(&SessionStore::open(dir.path().to_path_buf())), Route::Auth);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("session.json"), "[1, 2").unwrap();
        let store = SessionStore::open(dir.path().to_path_buf());
        assert_eq!(store.get(LOGGED_IN_KEY), None);
    }
}
