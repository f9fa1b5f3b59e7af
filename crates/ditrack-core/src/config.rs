//! Engine configuration loaded from TOML.
//!
//! Lookup order, first hit wins:
//! 1. an explicit path (the CLI `--config` flag)
//! 2. `./.ditrack/config.toml` under the working root
//! 3. `ditrack/config.toml` under the user config directory
//!
//! A missing file yields defaults. `DITRACK_TICKETING_URL` overrides the
//! ticketing base URL after the file is read.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::templates::CommentTemplates;
use crate::ticketing::RetryPolicy;

/// Environment variable overriding `[ticketing] base_url`.
pub const TICKETING_URL_ENV: &str = "DITRACK_TICKETING_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub ticketing: TicketingConfig,
    #[serde(default)]
    pub comments: CommentSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl TicketingConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Settings read by the comment and progress-note handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSettings {
    /// Previous state assumed when the state log has a single entry.
    #[serde(default = "default_initial_state")]
    pub initial_state: String,
    #[serde(default = "default_progress_note_template")]
    pub progress_note_template: String,
    #[serde(default)]
    pub templates: CommentTemplates,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            initial_state: default_initial_state(),
            progress_note_template: default_progress_note_template(),
            templates: CommentTemplates::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite path, relative to the working root unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Second SQLite store kept in step during a migration. Reads never go
    /// to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            legacy_path: None,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn resolve_path(&self, root: &Path) -> PathBuf {
        resolve_under(root, &self.path)
    }

    #[must_use]
    pub fn resolve_legacy_path(&self, root: &Path) -> Option<PathBuf> {
        self.legacy_path
            .as_deref()
            .map(|path| resolve_under(root, path))
    }
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Deliveries per handler before a retryable failure is dead-lettered.
    #[serde(default = "default_bus_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_bus_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_bus_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Deliveries (and threads) running at once.
    #[serde(default = "default_bus_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_bus_max_attempts(),
            retry_base_delay_ms: default_bus_retry_base_delay_ms(),
            retry_max_delay_ms: default_bus_retry_max_delay_ms(),
            max_concurrency: default_bus_max_concurrency(),
        }
    }
}

impl BusConfig {
    #[must_use]
    pub fn redelivery_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// A loaded configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub source: Option<PathBuf>,
}

/// Parse one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML for
/// [`EngineConfig`].
pub fn load_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Candidate config paths in lookup order.
#[must_use]
pub fn candidate_paths(explicit: Option<&Path>, root: &Path) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut paths = vec![root.join(".ditrack/config.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ditrack/config.toml"));
    }
    paths
}

/// Resolve the effective configuration.
///
/// # Errors
///
/// Returns an error if an explicit path does not exist, or a discovered
/// file fails to read or parse.
pub fn load_config(explicit: Option<&Path>, root: &Path) -> Result<LoadedConfig> {
    if let Some(path) = explicit.filter(|path| !path.exists()) {
        anyhow::bail!("config file {} does not exist", path.display());
    }

    let mut loaded = LoadedConfig {
        config: EngineConfig::default(),
        source: None,
    };
    if let Some(path) = candidate_paths(explicit, root)
        .into_iter()
        .find(|path| path.exists())
    {
        loaded.config = load_file(&path)?;
        loaded.source = Some(path);
    }

    apply_env_overrides(&mut loaded.config, |key| std::env::var(key).ok());
    Ok(loaded)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(TICKETING_URL_ENV).filter(|url| !url.trim().is_empty()) {
        config.ticketing.base_url = url.trim().to_string();
    }
}

fn default_base_url() -> String {
    "https://api.trello.com".to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_timeout_ms() -> u64 {
    15_000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    250
}

const fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_initial_state() -> String {
    "requires-action".to_string()
}

fn default_progress_note_template() -> String {
    "Progress Note: {{progressNote}}\
     {{#firstName}}\nby {{firstName}} {{lastName}}{{/firstName}}\
     {{#email}} ({{email}}){{/email}}"
        .to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".ditrack/ditrack.sqlite3")
}

const fn default_bus_max_attempts() -> u32 {
    5
}

const fn default_bus_retry_base_delay_ms() -> u64 {
    100
}

const fn default_bus_retry_max_delay_ms() -> u64 {
    10_000
}

const fn default_bus_max_concurrency() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let explicit = root.path().join("nowhere.toml");
        assert!(load_config(Some(&explicit), root.path()).is_err());

        let cfg = EngineConfig::default();
        assert_eq!(cfg.comments.initial_state, "requires-action");
        assert_eq!(cfg.ticketing.max_attempts, 3);
        assert_eq!(cfg.bus.max_attempts, 5);
        assert_eq!(cfg.bus.max_concurrency, 16);
        assert_eq!(cfg.store.resolve_legacy_path(Path::new("/srv")), None);
        assert_eq!(
            cfg.bus.redelivery_policy().base_delay,
            Duration::from_millis(100)
        );
        assert_eq!(
            cfg.store.resolve_path(Path::new("/srv")),
            PathBuf::from("/srv/.ditrack/ditrack.sqlite3")
        );
    }

    #[test]
    fn project_config_is_discovered() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(".ditrack")).expect("mkdir");
        std::fs::write(
            root.path().join(".ditrack/config.toml"),
            r#"
[ticketing]
base_url = "http://localhost:9999"
max_attempts = 1

[comments]
initial_state = "pending"

[comments.templates]
default = "moved to {{currentState}}"

[store]
legacy_path = "/var/lib/ditrack/legacy.sqlite3"

[bus]
max_attempts = 2
"#,
        )
        .expect("write config");

        let loaded = load_config(None, root.path()).expect("load");
        assert_eq!(
            loaded.source,
            Some(root.path().join(".ditrack/config.toml"))
        );
        let cfg = loaded.config;
        assert_eq!(cfg.ticketing.timeout_ms, 15_000);
        assert_eq!(cfg.ticketing.max_attempts, 1);
        assert_eq!(cfg.comments.initial_state, "pending");
        assert!(cfg.comments.templates.transitions().is_empty());
        assert_eq!(
            cfg.comments.templates.default_template(),
            "moved to {{currentState}}"
        );
        assert_eq!(cfg.bus.max_attempts, 2);
        assert_eq!(
            cfg.store.resolve_legacy_path(root.path()),
            Some(PathBuf::from("/var/lib/ditrack/legacy.sqlite3"))
        );
        assert_eq!(
            cfg.store.resolve_path(root.path()),
            root.path().join(".ditrack/ditrack.sqlite3")
        );
    }

    #[test]
    fn parse_errors_name_the_file() {
        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join("bad.toml");
        std::fs::write(&path, "[ticketing\n").expect("write");
        let err = load_config(Some(&path), root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
    }

    #[test]
    fn env_override_replaces_base_url() {
        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg, |key| {
            (key == TICKETING_URL_ENV).then(|| " http://127.0.0.1:8080 ".to_string())
        });
        assert_eq!(cfg.ticketing.base_url, "http://127.0.0.1:8080");

        apply_env_overrides(&mut cfg, |_| Some(String::new()));
        assert_eq!(cfg.ticketing.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn retry_policy_has_at_least_one_attempt() {
        let cfg = TicketingConfig {
            max_attempts: 0,
            ..TicketingConfig::default()
        };
        assert_eq!(cfg.retry_policy().max_attempts, 1);
    }
}
