use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::errors::ConfigError;

/// Key of the orchestration host in the persisted API variables.
pub const LANGGRAPH_HOST_URL: &str = "LANGGRAPH_HOST_URL";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Configuration for the research client.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the research backend serving the push channel.
    pub backend_url: String,
    /// JSON file holding persisted API variables (including the orchestration
    /// host). Re-read at every session start.
    pub api_variables_path: Option<PathBuf>,
    /// JSON file backing the history store.
    pub history_path: Option<PathBuf>,
    /// Timeout for establishing a transport.
    pub connect_timeout: Duration,
    /// Bounded buffer between a transport task and the session.
    pub stream_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}

impl ClientConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            api_variables_path: None,
            history_path: None,
            connect_timeout: Duration::from_secs(30),
            stream_buffer_capacity: 128,
        }
    }

    /// Builds a config from the process environment.
    ///
    /// - `RESEARCH_BACKEND_URL` (default `http://localhost:8000`)
    /// - `RESEARCH_API_VARIABLES_PATH`
    /// - `RESEARCH_HISTORY_PATH`
    /// - `RESEARCH_CONNECT_TIMEOUT_SECS` (default 30)
    /// - `RESEARCH_STREAM_BUFFER` (default 128)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::new(get("RESEARCH_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.into()));
        config.api_variables_path = get("RESEARCH_API_VARIABLES_PATH").map(PathBuf::from);
        config.history_path = get("RESEARCH_HISTORY_PATH").map(PathBuf::from);
        if let Some(raw) = get("RESEARCH_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|e| ConfigError::invalid("RESEARCH_CONNECT_TIMEOUT_SECS", format!("{raw}: {e}")))?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("RESEARCH_STREAM_BUFFER") {
            config.stream_buffer_capacity = raw
                .parse()
                .map_err(|e| ConfigError::invalid("RESEARCH_STREAM_BUFFER", format!("{raw}: {e}")))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.backend_url = backend_url.into();
        self
    }

    pub fn api_variables_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.api_variables_path = Some(path.into());
        self
    }

    pub fn history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::invalid("backend_url", "must not be empty"));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ConfigError::invalid(
                "stream_buffer_capacity",
                "must be greater than 0",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "connect_timeout",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Looks up the orchestration host for a new session.
    ///
    /// Reads the persisted API variables first, then falls back to the
    /// `LANGGRAPH_HOST_URL` environment variable. An unreadable file counts
    /// as "no host".
    pub fn resolve_langgraph_host(&self) -> Option<String> {
        let persisted = self.api_variables_path.as_deref().and_then(|path| {
            match ApiVariables::load(path) {
                Ok(vars) => vars.get(LANGGRAPH_HOST_URL).map(ToOwned::to_owned),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable api variables");
                    None
                }
            }
        });
        persisted.or_else(|| {
            std::env::var(LANGGRAPH_HOST_URL)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

/// Persisted API variables: a flat JSON object of string values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiVariables {
    values: BTreeMap<String, String>,
}

impl ApiVariables {
    /// Loads variables from `path`. A missing file is an empty set; non-string
    /// values are ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::invalid(path.display().to_string(), err.to_string())),
        };
        let parsed: BTreeMap<String, Value> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?;
        let values = parsed
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }

    /// Writes the variables to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::invalid(parent.display().to_string(), e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?;
        std::fs::write(path, raw)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))
    }

    /// Returns a non-blank value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}
