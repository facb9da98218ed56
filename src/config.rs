//! Configuration management for NWP Fetcher
//!
//! Unified TOML configuration with multi-source loading and zero-config
//! defaults. Values resolve in precedence order: CLI arguments, then
//! environment variables, then the config file, then built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{FetchConfig, PublishConfig};
use crate::constants::{env as env_vars, limits, logging, stores, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Pipeline defaults (product, cycle, lead-time ceiling)
    pub workflow: WorkflowConfig,
    /// Fetch stage settings
    pub fetch: FetchConfigToml,
    /// Publish stage settings
    pub publish: PublishConfigToml,
    /// Source and destination store roots
    pub stores: StoresConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Pipeline-level defaults, all overridable on the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Default product when none is given (`gfs`, `ecmwf-hres`, `ecmwf-ens`)
    pub product: Option<String>,
    /// Grid resolution label used in source and destination keys
    pub resolution: String,
    /// Default forecast cycle (ISO-8601); normally supplied per run
    pub cycle: Option<String>,
    /// Default maximum lead time in hours
    pub max_lead_time: Option<u32>,
    /// Explicit source kind (`archive` or `realtime`); when unset the
    /// kind is inferred from the source bucket name
    pub source_kind: Option<String>,
    /// Run availability validation before fetching
    pub validate_before_fetch: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            product: None,
            resolution: "0p25".to_string(),
            cycle: None,
            max_lead_time: None,
            source_kind: None,
            validate_before_fetch: true,
        }
    }
}

/// TOML-friendly fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfigToml {
    /// Re-transfer files whose destination already exists
    pub overwrite: bool,
    /// Concurrent transfers
    pub concurrency: usize,
    /// Re-probe every destination after the batch drains
    pub verify: bool,
}

impl Default for FetchConfigToml {
    fn default() -> Self {
        Self {
            overwrite: false,
            concurrency: workers::DEFAULT_FETCH_CONCURRENCY,
            verify: false,
        }
    }
}

/// TOML-friendly publish configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfigToml {
    /// Concurrent chunk uploads
    pub concurrency: usize,
    /// Retries per chunk after the first attempt
    pub max_retries: u32,
    /// Timeout for a single upload attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Audit the destination listing after the control file lands
    pub verify: bool,
}

impl Default for PublishConfigToml {
    fn default() -> Self {
        Self {
            concurrency: workers::DEFAULT_PUBLISH_CONCURRENCY,
            max_retries: limits::UPLOAD_MAX_RETRIES,
            attempt_timeout: limits::UPLOAD_TIMEOUT,
            verify: true,
        }
    }
}

/// Store roots for each pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// Source root override (`gs://bucket`, `s3://bucket`); defaults to
    /// the product's public bucket
    pub source_root: Option<String>,
    /// Fetch destination: a bucket URI or a local directory
    pub destination_root: String,
    /// Publish destination root for chunked archives
    pub publish_root: Option<String>,
    /// Local directory holding the chunked archive to publish
    pub chunk_dir: Option<PathBuf>,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            source_root: None,
            destination_root: stores::DEFAULT_LOCAL_DOWNLOAD_DIR.to_string(),
            publish_root: None,
            chunk_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. CLI arguments (applied by the command layer)
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = if let Some(path) = config_file_override {
            if !path.exists() {
                return Err(ConfigError::NotFound { path });
            }
            Some(path)
        } else {
            Self::find_config_file()
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let search_paths = [
            // Project-local config
            PathBuf::from("./nwp-fetcher.toml"),
            PathBuf::from("./config.toml"),
            // System config (Unix only)
            #[cfg(unix)]
            PathBuf::from("/etc/nwp-fetcher/config.toml"),
        ];

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &PathBuf) -> ConfigResult<Self> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|_| ConfigError::NotFound {
                    path: path.clone(),
                })?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write a commented default configuration file
    pub async fn write_default(path: &PathBuf) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|_| ConfigError::NotFound { path: path.clone() })?;
            }
        }
        tokio::fs::write(path, Self::default_config_content())
            .await
            .map_err(|_| ConfigError::NotFound { path: path.clone() })?;
        info!("Wrote default configuration to: {}", path.display());
        Ok(())
    }

    /// Resolve the forecast cycle: CLI value, then `$CYCLE`, then the
    /// config file.
    pub fn resolve_cycle(&self, cli_cycle: Option<&str>) -> ConfigResult<DateTime<Utc>> {
        let raw = cli_cycle
            .map(String::from)
            .or_else(|| std::env::var(env_vars::CYCLE).ok())
            .or_else(|| self.workflow.cycle.clone())
            .ok_or(ConfigError::MissingCycle)?;
        parse_cycle(&raw)
    }

    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            overwrite: self.fetch.overwrite,
            concurrency: self.fetch.concurrency,
        }
    }

    pub fn to_publish_config(&self) -> PublishConfig {
        PublishConfig {
            concurrency: self.publish.concurrency,
            max_retries: self.publish.max_retries,
            attempt_timeout: self.publish.attempt_timeout,
            verify: self.publish.verify,
        }
    }

    /// Reject out-of-range settings before any stage runs
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("fetch.concurrency", self.fetch.concurrency),
            ("publish.concurrency", self.publish.concurrency),
        ] {
            if value == 0 || value > workers::MAX_CONCURRENCY {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: format!("must be between 1 and {}", workers::MAX_CONCURRENCY),
                });
            }
        }
        Ok(())
    }

    /// Generate default configuration content with helpful comments
    fn default_config_content() -> String {
        format!(
            r#"# NWP Fetcher Configuration
# Any setting here can be overridden on the command line.

[workflow]
# Default product: "gfs", "ecmwf-hres", or "ecmwf-ens"
# product = "gfs"

# Grid resolution label used in object keys
resolution = "0p25"

# Default forecast cycle; usually passed per run via --cycle or $CYCLE
# cycle = "2024-01-01T00"

# Default maximum lead time in hours
# max_lead_time = 240

# Source kind: "archive" or "realtime". Leave unset to infer from the
# source bucket name.
# source_kind = "archive"

# Run availability validation before fetching
validate_before_fetch = true

[fetch]
overwrite = false
concurrency = {fetch_concurrency}
verify = false

[publish]
concurrency = {publish_concurrency}
max_retries = {max_retries}
attempt_timeout = "10m"
verify = true

[stores]
# Source bucket override; defaults to the product's public bucket
# source_root = "gs://global-forecast-system"

# Fetch destination: bucket URI or local directory
destination_root = "{download_dir}"

# Publish destination for chunked archives
# publish_root = "gs://my-archive-bucket/forecasts"

# Local chunked archive to publish
# chunk_dir = "/tmp/nwp-zarr"

[logging]
level = "{log_level}"
"#,
            fetch_concurrency = workers::DEFAULT_FETCH_CONCURRENCY,
            publish_concurrency = workers::DEFAULT_PUBLISH_CONCURRENCY,
            max_retries = limits::UPLOAD_MAX_RETRIES,
            download_dir = stores::DEFAULT_LOCAL_DOWNLOAD_DIR,
            log_level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}

/// Parse a cycle timestamp.
///
/// Accepts full RFC 3339 (`2024-01-01T00:00:00Z`), a naive timestamp
/// (`2024-01-01T00:00:00`), or the short cycle notation
/// (`2024-01-01T00`). All are interpreted as UTC.
pub fn parse_cycle(raw: &str) -> ConfigResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(ConfigError::InvalidValue {
        field: "cycle".to_string(),
        value: raw.to_string(),
        reason: "expected an ISO-8601 timestamp such as 2024-01-01T00".to_string(),
    })
}
