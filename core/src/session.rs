//! Session token tracking.
//!
//! # Design
//! The backend hands out a session by adding `X-Session-Code` to a response
//! and revokes it by leaving the header off. `SessionState` keeps the token
//! in memory, mirrors it into a `Storage` so it survives restarts, and turns
//! each response's headers into at most one `SessionChange`.
//!
//! Storage mirrors the browser's local storage API: string keys, string
//! values, no failures reported to the caller. Implementations log I/O
//! problems and carry on.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::http::find_header;

/// Header carrying the session code in both directions.
pub const SESSION_HEADER: &str = "X-Session-Code";

/// Storage entry holding the last known session code.
pub const SESSION_STORAGE_KEY: &str = "session";

/// String key/value persistence for the session code.
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str);
    fn remove_item(&mut self, key: &str);
}

/// Process-local storage. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&mut self, key: &str) {
        self.items.remove(key);
    }
}

/// Storage backed by a JSON object file, one member per key.
///
/// The file is re-read on every access so two clients sharing a file see
/// each other's writes. A missing or unreadable file reads as empty.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read session storage");
                return HashMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "session storage is not a JSON object");
            HashMap::new()
        })
    }

    fn store(&self, items: &HashMap<String, String>) {
        let raw = match serde_json::to_string_pretty(items) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode session storage");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            warn!(path = %self.path.display(), error = %e, "failed to write session storage");
        }
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set_item(&mut self, key: &str, value: &str) {
        let mut items = self.load();
        items.insert(key.to_string(), value.to_string());
        self.store(&items);
    }

    fn remove_item(&mut self, key: &str) {
        let mut items = self.load();
        if items.remove(key).is_some() {
            self.store(&items);
        }
    }
}

/// A transition caused by one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    LoggedIn(String),
    LoggedOut,
}

/// In-memory session token plus its persisted copy.
pub struct SessionState {
    token: Option<String>,
    storage: Box<dyn Storage>,
}

impl SessionState {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            token: None,
            storage,
        }
    }

    /// The token currently held in memory.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Token to attach to the next request.
    ///
    /// Falls back to the persisted token and promotes it into memory.
    pub fn outgoing(&mut self) -> Option<String> {
        if self.token.is_none() {
            if let Some(saved) = self.storage.get_item(SESSION_STORAGE_KEY) {
                debug!("restored session from storage");
                self.token = Some(saved);
            }
        }
        self.token.clone()
    }

    /// Apply the session header (or its absence) from a response.
    pub fn observe(&mut self, headers: &[(String, String)]) -> Option<SessionChange> {
        match (find_header(headers, SESSION_HEADER), self.token.is_some()) {
            (Some(code), false) => {
                self.storage.set_item(SESSION_STORAGE_KEY, code);
                self.token = Some(code.to_string());
                Some(SessionChange::LoggedIn(code.to_string()))
            }
            (None, true) => {
                self.clear();
                Some(SessionChange::LoggedOut)
            }
            _ => None,
        }
    }

    /// Forget the token in memory and in storage.
    pub fn clear(&mut self) {
        self.storage.remove_item(SESSION_STORAGE_KEY);
        self.token = None;
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("logged_in", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
