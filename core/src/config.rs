//! Client configuration.
//!
//! Built explicitly for tests and embedding, or loaded from the environment
//! (a `.env` file is honoured when present).

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Path every relative suffix is resolved under when no prefix is configured.
pub const DEFAULT_API_PATH: &str = "/pyrar/v1.0/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where the API lives and where the session is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scheme, host and port, without a trailing slash.
    pub origin: String,

    /// Replaces `/pyrar/v1.0/` for relative suffixes.
    pub url_prefix: Option<String>,

    /// JSON file the session code is persisted in; memory only when unset.
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin: String = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            url_prefix: None,
            session_file: None,
        }
    }

    /// Load configuration from environment variables, after reading a `.env`
    /// file if one is present.
    ///
    /// - `PYRAR_ORIGIN` (required)
    /// - `PYRAR_URL_PREFIX`
    /// - `PYRAR_SESSION_FILE`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same rules as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let origin = lookup("PYRAR_ORIGIN").ok_or(ConfigError::Missing("PYRAR_ORIGIN"))?;
        if !origin.starts_with("http://") && !origin.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "PYRAR_ORIGIN",
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let mut config = Self::new(origin);
        if let Some(prefix) = lookup("PYRAR_URL_PREFIX") {
            config = config.with_url_prefix(prefix);
        }
        if let Some(file) = lookup("PYRAR_SESSION_FILE") {
            config = config.with_session_file(file);
        }
        Ok(config)
    }

    /// Builder: set a custom URL prefix.
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = Some(prefix.into());
        self
    }

    /// Builder: persist the session in a file.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Resolve a path suffix to a full URL.
    pub fn url_for(&self, sfx: &str) -> String {
        if sfx.starts_with('/') {
            return format!("{}{sfx}", self.origin);
        }
        match &self.url_prefix {
            Some(prefix) => format!("{}{prefix}{sfx}", self.origin),
            None => format!("{}{DEFAULT_API_PATH}{sfx}", self.origin),
        }
    }
}
