//! Configuration for the taskboard client core, CLI and reference backend.
//!
//! Settings are read from `taskboard.toml`, then overridden by environment
//! variables, then by CLI flags. Every field has a default so an absent file
//! is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! url = "http://localhost:5000"
//! timeout_secs = 10
//!
//! [auth]
//! token = "eyJhbGciOi..."
//!
//! [sync]
//! reorder_attempts = 3
//! retry_base_delay_ms = 200
//! echo_local_mutations = false
//! channel_capacity = 256
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! accepted_tokens = ["dev-token"]
//!
//! [logging]
//! filter = "taskboard=info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "taskboard.toml";

pub const ENV_BACKEND_URL: &str = "TASKBOARD_BACKEND_URL";
pub const ENV_TOKEN: &str = "TASKBOARD_TOKEN";
pub const ENV_LOG: &str = "TASKBOARD_LOG";

/// Where the persistent store's REST API lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bearer credential used by the CLI. Interactive shells get theirs from the
/// identity provider instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Total attempts for idempotent reorder writes (1 = no retry)
    #[serde(default = "default_reorder_attempts")]
    pub reorder_attempts: u32,
    /// Base delay for exponential backoff between attempts
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Re-publish successful local mutations on the event channel
    #[serde(default)]
    pub echo_local_mutations: bool,
    /// Per-room broadcast buffer; a slower subscriber lags and must resync
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_reorder_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            reorder_attempts: default_reorder_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            echo_local_mutations: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer tokens the reference backend accepts. Empty accepts any
    /// non-empty token.
    #[serde(default)]
    pub accepted_tokens: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            accepted_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "taskboard=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Root of `taskboard.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskboardConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Load from an explicit path, or from the first default location that
    /// exists. Returns the default configuration when nothing is found.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_locations().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// `./taskboard.toml`, then `<config dir>/taskboard/taskboard.toml`.
    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("taskboard").join(CONFIG_FILE_NAME));
        }
        locations
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Blank values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend.url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.auth.token = Some(token);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.logging.filter = filter;
        }
        self
    }

    /// The REST base URL without a trailing slash.
    pub fn backend_url(&self) -> &str {
        self.backend.url.trim_end_matches('/')
    }

    /// Validate the configuration and return a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match reqwest::Url::parse(&self.backend.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => problems.push(format!(
                "backend.url must use http or https, got '{}'",
                url.scheme()
            )),
            Err(e) => problems.push(format!("backend.url '{}' is invalid: {}", self.backend.url, e)),
        }
        if self.backend.timeout_secs == 0 {
            problems.push("backend.timeout_secs must be greater than 0".to_string());
        }
        if self.sync.reorder_attempts == 0 {
            problems.push("sync.reorder_attempts must be at least 1".to_string());
        }
        if self.sync.channel_capacity == 0 {
            problems.push("sync.channel_capacity must be greater than 0".to_string());
        }
        if self.server.accepted_tokens.iter().any(|t| t.trim().is_empty()) {
            problems.push("server.accepted_tokens must not contain blank tokens".to_string());
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_empty() {
        let config = TaskboardConfig::parse("").unwrap();
        assert_eq!(config.backend.url, "http://localhost:5000");
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.sync.reorder_attempts, 3);
        assert_eq!(config.sync.channel_capacity, 256);
        assert!(!config.sync.echo_local_mutations);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.logging.filter, "taskboard=info");
        assert!(config.auth.token.is_none());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let config = TaskboardConfig::parse(
            r#"
            [backend]
            url = "https://api.example.com/"
            timeout_secs = 3

            [auth]
            token = "abc"

            [sync]
            reorder_attempts = 5
            retry_base_delay_ms = 50
            echo_local_mutations = true
            channel_capacity = 8

            [server]
            host = "0.0.0.0"
            port = 8080
            accepted_tokens = ["dev"]

            [logging]
            filter = "taskboard=debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.backend_url(), "https://api.example.com");
        assert_eq!(config.backend.timeout(), Duration::from_secs(3));
        assert_eq!(config.auth.token.as_deref(), Some("abc"));
        assert_eq!(config.sync.reorder_attempts, 5);
        assert!(config.sync.echo_local_mutations);
        assert_eq!(config.server.accepted_tokens, vec!["dev".to_string()]);
        assert!(config.logging.json);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let result = TaskboardConfig::parse("[server]\nport = \"eighty\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND_URL, "http://other:9000"),
            (ENV_TOKEN, "from-env"),
            (ENV_LOG, "taskboard=trace"),
        ]);
        let config = TaskboardConfig::default()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.backend.url, "http://other:9000");
        assert_eq!(config.auth.token.as_deref(), Some("from-env"));
        assert_eq!(config.logging.filter, "taskboard=trace");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let config = TaskboardConfig::default().with_overrides_from(|key| {
            (key == ENV_BACKEND_URL).then(|| "   ".to_string())
        });
        assert_eq!(config.backend.url, "http://localhost:5000");
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = TaskboardConfig::default();
        config.backend.url = "ftp://files".to_string();
        config.backend.timeout_secs = 0;
        config.sync.reorder_attempts = 0;
        config.sync.channel_capacity = 0;
        config.server.accepted_tokens = vec![" ".to_string()];
        let problems = config.validate();
        assert_eq!(problems.len(), 5, "{:?}", problems);
        assert!(problems[0].contains("http or https"));
    }

    #[test]
    fn test_validate_rejects_unparseable_url() {
        let mut config = TaskboardConfig::default();
        config.backend.url = "not a url".to_string();
        assert!(config.validate()[0].contains("invalid"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = TaskboardConfig::default();
        config.server.port = 7777;
        config.save(&path).unwrap();

        let loaded = TaskboardConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 7777);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempdir().unwrap();
        let result = TaskboardConfig::load_or_default(Some(&dir.path().join("nope.toml")));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read config file"));
    }
}
