use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    chunk::ChunkStrategy,
    retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_STATUSES, RetryPolicy},
    source::{
        SourceSettings, Units,
        cdo::{CDO_DATA_URL, DEFAULT_DATASET, DEFAULT_TIMEOUT, FIRST_OFFSET, MAX_PAGE_SIZE},
    },
};

/// Environment variable consulted for the API token before the config file.
pub const TOKEN_ENV_VAR: &str = "NOAA_CDO_TOKEN";

/// Retry section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_secs: f64,
    pub max_backoff_secs: f64,
    pub statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: 1.0,
            max_backoff_secs: 120.0,
            statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        if self.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }

        let backoff = Duration::try_from_secs_f64(self.backoff_secs)
            .with_context(|| format!("Invalid retry.backoff_secs: {}", self.backoff_secs))?;
        let max_backoff = Duration::try_from_secs_f64(self.max_backoff_secs)
            .with_context(|| format!("Invalid retry.max_backoff_secs: {}", self.max_backoff_secs))?;

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
            max_backoff,
            retry_statuses: self.statuses.clone(),
        })
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// token = "..."
/// station = "GHCND:USW00094728"
/// dataset = "GSOD"
/// chunking = "monthly"
///
/// [retry]
/// max_attempts = 5
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token: Option<String>,
    pub endpoint: String,
    pub dataset: String,
    pub units: Units,

    /// Station used when none is given on the command line.
    pub station: Option<String>,

    pub page_size: u32,
    pub start_offset: u32,
    pub timeout_secs: u64,
    pub use_system_proxy: bool,
    pub output_dir: PathBuf,
    pub chunking: ChunkStrategy,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            endpoint: CDO_DATA_URL.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            units: Units::default(),
            station: None,
            page_size: MAX_PAGE_SIZE,
            start_offset: FIRST_OFFSET,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            use_system_proxy: false,
            output_dir: PathBuf::from("data/raw"),
            chunking: ChunkStrategy::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("dataset", &self.dataset)
            .field("units", &self.units)
            .field("station", &self.station)
            .field("page_size", &self.page_size)
            .field("start_offset", &self.start_offset)
            .field("timeout_secs", &self.timeout_secs)
            .field("use_system_proxy", &self.use_system_proxy)
            .field("output_dir", &self.output_dir)
            .field("chunking", &self.chunking)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("gov", "noaa-cdo", "cdo-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Picks the token from `explicit`, then `env` (the value of [`TOKEN_ENV_VAR`]), then the
    /// config file.
    pub fn resolve_token(&self, explicit: Option<&str>, env: Option<&str>) -> Result<String> {
        [explicit, env, self.token.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                anyhow!(
                    "No API token configured.\n\
                     Hint: run `cdo configure` or set {TOKEN_ENV_VAR}."
                )
            })
    }

    pub fn resolve_station(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .or(self.station.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                anyhow!(
                    "No station given.\n\
                     Hint: pass --station (e.g. GHCND:USW00094728) or run `cdo configure --station <id>`."
                )
            })
    }

    pub fn validate_page_size(page_size: u32) -> Result<u32> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(anyhow!("Page size {page_size} is out of range; expected 1..={MAX_PAGE_SIZE}"));
        }
        Ok(page_size)
    }

    pub fn source_settings(&self, token: String) -> SourceSettings {
        SourceSettings {
            token,
            endpoint: self.endpoint.clone(),
            dataset: self.dataset.clone(),
            units: self.units,
            timeout: Duration::from_secs(self.timeout_secs),
            use_system_proxy: self.use_system_proxy,
        }
    }
}
