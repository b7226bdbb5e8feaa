//! Run configuration.
//!
//! Loaded once at startup from `config.json` (or a `.toml` file) and never
//! mutated afterwards. A missing file is not fatal: the built-in defaults are
//! used instead so the monitor can still start.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";

/// Discord allows at most ten embeds per message.
pub const MAX_IMAGES_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Discord bot token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub channel_id: u64,
    #[serde(default = "default_search_terms")]
    pub search_terms: Vec<String>,
    /// Seconds to sleep between poll cycles.
    #[serde(default = "default_refresh_delay")]
    pub refresh_delay: u64,
    #[serde(default = "default_max_images")]
    pub max_images_per_post: usize,
    #[serde(default = "default_country_filter")]
    pub country_filter: String,
    #[serde(default = "default_auth_backoff")]
    pub auth_backoff_secs: u64,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// File path for the JSON ledger, or a `sqlite://` URL.
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Extra log file next to stdout. `None` disables it.
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

fn default_search_terms() -> Vec<String> {
    vec!["ralph lauren".to_string()]
}

fn default_refresh_delay() -> u64 {
    3
}

fn default_max_images() -> usize {
    4
}

fn default_country_filter() -> String {
    "Deutschland".to_string()
}

fn default_auth_backoff() -> u64 {
    30
}

fn default_host() -> String {
    "www.vinted.de".to_string()
}

fn default_per_page() -> u32 {
    24
}

fn default_locale() -> String {
    "de".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_ledger_path() -> String {
    "products.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<String> {
    Some("vinted_monitor.log".to_string())
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: 0,
            search_terms: default_search_terms(),
            refresh_delay: default_refresh_delay(),
            max_images_per_post: default_max_images(),
            country_filter: default_country_filter(),
            auth_backoff_secs: default_auth_backoff(),
            marketplace: MarketplaceConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            per_page: default_per_page(),
            locale: default_locale(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_ledger_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Where a loaded [`RunConfig`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file existed at the requested path.
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Log where the configuration came from. Callers that load the config
    /// before a subscriber is installed call this once logging is up.
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                info!("Loaded configuration from {}", path.display())
            }
            ConfigSource::Defaults(path) => {
                warn!("Config not found at {}, using default values", path.display())
            }
        }
    }
}

impl RunConfig {
    /// Load the configuration at `path`, falling back to defaults when the file
    /// does not exist. The `DISCORD_TOKEN` environment variable overrides the
    /// token from the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let (config, source) = Self::load_with_source(path)?;
        source.log();
        Ok(config)
    }

    /// Like [`RunConfig::load`], but reports the source instead of logging it.
    pub fn load_with_source(path: impl AsRef<Path>) -> Result<(Self, ConfigSource), ConfigError> {
        let path = path.as_ref();
        let (mut config, source) = match std::fs::read_to_string(path) {
            Ok(raw) => (
                Self::parse(path, &raw)?,
                ConfigSource::File(path.to_path_buf()),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigSource::Defaults(path.to_path_buf()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ConfigError::PermissionDenied {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidFormat {
                    details: format!("{}: {}", path.display(), e),
                });
            }
        };

        if let Ok(token) = std::env::var(ENV_DISCORD_TOKEN) {
            if !token.trim().is_empty() {
                config.token = Some(token);
            }
        }

        config.validate()?;
        Ok((config, source))
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            Ok(toml::from_str(raw)?)
        } else {
            serde_json::from_str(raw).map_err(|e| ConfigError::InvalidFormat {
                details: e.to_string(),
            })
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_terms.iter().all(|term| term.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one non-empty search term is required".to_string(),
            });
        }

        if self.max_images_per_post == 0 || self.max_images_per_post > MAX_IMAGES_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "max_images_per_post".to_string(),
                value: self.max_images_per_post.to_string(),
            });
        }

        if self.country_filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "country_filter".to_string(),
                value: self.country_filter.clone(),
            });
        }

        if self.marketplace.host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "marketplace.host".to_string(),
            });
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_delay)
    }

    pub fn auth_backoff(&self) -> Duration {
        Duration::from_secs(self.auth_backoff_secs)
    }

    /// Search terms in configured order, blanks removed.
    pub fn active_search_terms(&self) -> impl Iterator<Item = &str> {
        self.search_terms
            .iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
    }
}
