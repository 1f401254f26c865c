//! Configuration management for the fraud scoring pipeline
//!
//! Sources, lowest precedence first:
//! 1. `config/config.toml` (optional)
//! 2. `PIPELINE__<SECTION>__<KEY>` environment variables
//! 3. the deployment's historical variable names (`API_URL`, `BUCKET_NAME`, ...)
//!
//! `.env` is loaded into the process environment before any of these.

use anyhow::{bail, ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Historical environment variable names and the keys they override.
const LEGACY_ENV_KEYS: [(&str, &str); 13] = [
    ("API_URL", "source.url"),
    ("BUCKET_NAME", "storage.bucket"),
    ("AWS_DEFAULT_REGION", "storage.region"),
    ("AWS_ACCESS_KEY_ID", "storage.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "storage.secret_access_key"),
    ("BACKEND_STORE_URI", "database.url"),
    ("MLFLOW_TRACKING_URI", "model.tracking_uri"),
    ("MODEL_URI", "model.model_uri"),
    ("MODEL_SERVING_URL", "model.serving_url"),
    ("CYCLE_INTERVAL_SECONDS", "pipeline.interval_secs"),
    ("CYCLE_BACKOFF_SECONDS", "pipeline.backoff_secs"),
    ("MAX_CYCLES", "pipeline.max_cycles"),
    ("NATS_URL", "alerts.nats_url"),
];

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transaction source endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Endpoint returning one transaction per GET
    #[serde(default)]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

fn default_source_timeout() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_source_timeout(),
        }
    }
}

/// Blob storage backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible bucket
    #[default]
    S3,
    /// Process memory, for dry runs
    Memory,
}

/// Artifact archive storage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub bucket: String,
    /// Key prefix under which the raw/silver/gold layers live
    #[serde(default = "default_storage_prefix")]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

fn default_storage_prefix() -> String {
    "bloc4/data".to_string()
}

fn default_region() -> String {
    "eu-north-1".to_string()
}

fn default_storage_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: String::new(),
            prefix: default_storage_prefix(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            timeout_secs: default_storage_timeout(),
        }
    }
}

/// Relational store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Model registry and scoring endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// MLflow tracking server used for the registry lookup
    #[serde(default)]
    pub tracking_uri: String,
    /// `models:/<name>/<version|stage>`, `models:/<name>@<alias>` or `runs:/...`
    #[serde(default)]
    pub model_uri: String,
    /// Server exposing `POST /invocations` for the model
    #[serde(default)]
    pub serving_url: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_timeout() -> u64 {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tracking_uri: String::new(),
            model_uri: String::new(),
            serving_url: String::new(),
            timeout_secs: default_model_timeout(),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Probability at or above which a score is read as a fraud verdict
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Run loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Pause after a successful cycle
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Pause after a failed cycle
    #[serde(default = "default_interval")]
    pub backoff_secs: u64,
    /// Stop after this many cycles; unset runs until cancelled
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_interval() -> u64 {
    20
}

impl PipelineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            backoff_secs: default_interval(),
            max_cycles: None,
        }
    }
}

/// Fraud alert side channel
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// NATS server; alerts are only logged when unset
    #[serde(default)]
    pub nats_url: Option<String>,
    /// Subject for outgoing fraud alerts
    #[serde(default = "default_alert_subject")]
    pub subject: String,
}

fn default_alert_subject() -> String {
    "fraud.alerts".to_string()
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject: default_alert_subject(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, the default file and the process environment, then validate
    pub fn load() -> Result<Self> {
        // A missing .env is normal outside local development.
        let _ = dotenvy::dotenv();
        Self::load_from(DEFAULT_CONFIG_PATH, std::env::vars().collect())
    }

    /// Load from a specific file and an explicit variable map, then validate
    pub fn load_from<P: AsRef<Path>>(path: P, vars: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("PIPELINE")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = vars.get(var).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Failed to apply {}", var))?;
        }

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject missing or unusable values before anything connects
    pub fn validate(&self) -> Result<()> {
        require_http_url("source.url (API_URL)", &self.source.url)?;
        require_http_url("model.tracking_uri (MLFLOW_TRACKING_URI)", &self.model.tracking_uri)?;
        require_http_url("model.serving_url (MODEL_SERVING_URL)", &self.model.serving_url)?;
        require("model.model_uri (MODEL_URI)", &self.model.model_uri)?;
        require("database.url (BACKEND_STORE_URI)", &self.database.url)?;

        if self.storage.backend == StorageBackend::S3 {
            require("storage.bucket (BUCKET_NAME)", &self.storage.bucket)?;
            require("storage.region (AWS_DEFAULT_REGION)", &self.storage.region)?;
        }

        ensure!(
            (0.0..=1.0).contains(&self.detection.threshold),
            "detection.threshold must be within [0, 1], got {}",
            self.detection.threshold
        );
        ensure!(
            self.pipeline.max_cycles != Some(0),
            "pipeline.max_cycles must be at least 1 when set"
        );
        ensure!(self.source.timeout_secs > 0, "source.timeout_secs must be positive");
        ensure!(self.model.timeout_secs > 0, "model.timeout_secs must be positive");

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => bail!("logging.format must be 'json' or 'pretty', got '{}'", other),
        }

        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{} is required", name);
    }
    Ok(())
}

fn require_http_url(name: &str, value: &str) -> Result<()> {
    require(name, value)?;
    let url = reqwest::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => bail!("{} must be http or https, got '{}'", name, scheme),
    }
}
