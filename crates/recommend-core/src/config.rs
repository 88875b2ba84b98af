//! Pipeline config, persisted as TOML in the app data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL, DEFAULT_MAX_LENGTH};

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_LISTING_URL: &str = "http://re-comme-nd.jp/breed/";
pub const DEFAULT_TERMINALS: &str = "。！？";
pub const DEFAULT_USER_AGENT: &str = concat!("recommend/", env!("CARGO_PKG_VERSION"));

/// What the driver does when one item fails to fetch or embed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnItemError {
    /// Record the reason and continue with the remaining items.
    #[default]
    Skip,
    /// Fail the whole run on the first item error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Ollama server URL.
    pub base_url: String,
    /// Embedding model served by Ollama.
    pub model: String,
    /// Context length of `model`, in tokens.
    pub max_length: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing page the catalog is discovered from.
    pub listing_url: String,
    /// Minimum pause between two requests to the site, in milliseconds.
    pub request_delay_ms: u64,
    pub user_agent: String,
    /// Items fetched concurrently. All of them still share one pacing gate.
    pub concurrency: usize,
    /// Items per encoder call.
    pub embed_batch_size: usize,
    /// Only process the first `limit` catalog records.
    pub limit: Option<usize>,
    pub on_item_error: OnItemError,
    /// Sentence-terminal marks used by the segmenter.
    pub terminals: String,
    pub encoder: EncoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            request_delay_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 4,
            embed_batch_size: 8,
            limit: None,
            on_item_error: OnItemError::Skip,
            terminals: DEFAULT_TERMINALS.to_string(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl Config {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Path of the config file in the app data directory.
pub fn default_config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Load config. An explicit `path` must exist and parse; without one the app data
/// directory is tried and a missing file yields the default config.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return read_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => read_config(&path),
        _ => Ok(Config::default()),
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    parse_config(&s).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Parse config from TOML text. Missing keys take their defaults.
pub fn parse_config(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}

/// Save config to the app data directory. Returns the path written.
pub fn save_config(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = default_config_path().ok_or(ConfigError::NoDataDir)?;
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
}
