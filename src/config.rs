//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `--config <PATH>` on the command line
//! 2. `$MAILVAULT_CONFIG` (environment variable)
//! 3. `~/.config/mailvault/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailvault\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! Every component receives the values it needs at construction time;
//! nothing below reads process-wide state except [`load_config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Archive, index, attachment and contact-list locations.
    pub paths: PathsConfig,
    /// Mailbox sources scanned by `sync`, in order.
    pub mailboxes: Vec<MailboxConfig>,
    /// Privileged mailbox reader.
    pub reader: ReaderConfig,
    /// Retention tier boundaries.
    pub retention: RetentionConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one `.txt` archive file per message.
    pub archive_dir: PathBuf,
    /// JSON index file. Defaults to `<archive_dir>/index.json`.
    pub index_file: Option<PathBuf>,
    /// Attachment root. Defaults to `<archive_dir>/attachments`.
    pub attachments_dir: Option<PathBuf>,
    /// JSON list of authoritative contacts consulted by the pruner.
    pub contacts_file: Option<PathBuf>,
}

/// One mailbox source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Label stored in each index entry's `mailbox` field.
    pub name: String,
    /// Path to the mbox file.
    pub path: PathBuf,
}

/// Privileged mailbox reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Command prefix used when a mailbox is not directly readable.
    /// The mailbox path is appended as the final argument.
    pub privileged_command: Vec<String>,
    /// Seconds before the privileged command is killed.
    pub timeout_secs: u64,
}

/// Retention tier boundaries, in whole days of age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Tier 1 upper bound: everything this recent is kept.
    pub keep_all_days: i64,
    /// Tier 2 upper bound: still kept in full.
    pub full_retention_days: i64,
    /// Tier 3 upper bound: thinned to one file per day. Older is one per week.
    pub daily_retention_days: i64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailvault")
                .join("emails"),
            index_file: None,
            attachments_dir: None,
            contacts_file: None,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            privileged_command: vec!["sudo".to_string(), "-n".to_string(), "cat".to_string()],
            timeout_secs: 30,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_all_days: 7,
            full_retention_days: 90,
            daily_retention_days: 365,
        }
    }
}

impl PathsConfig {
    /// Resolved index file location.
    pub fn index_file(&self) -> PathBuf {
        self.index_file
            .clone()
            .unwrap_or_else(|| self.archive_dir.join("index.json"))
    }

    /// Resolved attachment root.
    pub fn attachments_dir(&self) -> PathBuf {
        self.attachments_dir
            .clone()
            .unwrap_or_else(|| self.archive_dir.join("attachments"))
    }
}

impl ReaderConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetentionConfig {
    /// Check that the tier boundaries are non-negative and increasing.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.keep_all_days < 0
            || self.keep_all_days > self.full_retention_days
            || self.full_retention_days > self.daily_retention_days
        {
            return Err(crate::error::ArchiveError::InvalidConfig(format!(
                "retention tiers must satisfy 0 <= {} <= {} <= {}",
                self.keep_all_days, self.full_retention_days, self.daily_retention_days
            )));
        }
        Ok(())
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations unless `explicit` is given.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> Config {
    let path = explicit.map(Path::to_path_buf).or_else(config_file_path);
    if let Some(path) = path {
        if path.exists() {
            match load_config_from(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded config");
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Read and parse a specific config file.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<Config>(&contents)?)
}

/// Save configuration to `path`, creating its parent directories.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// The config file in use: `explicit` (from `--config`) when given,
/// otherwise [`config_file_path`].
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(config_file_path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILVAULT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailvault").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailvault")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailvault.log")
}
