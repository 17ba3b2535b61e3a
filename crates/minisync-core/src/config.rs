//! Configuration module for MiniSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, `MINISYNC_*` environment overrides, validation, defaults, and a
//! builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for MiniSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored into the bucket.
    pub root: PathBuf,
    /// Seconds between reconciliation sweeps.
    pub reconcile_interval: u64,
}

/// Object store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Endpoint URL, e.g. `http://localhost:9000`. A bare `host:port` is
    /// treated as plain HTTP.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Where the daemon publishes its status for `minisync status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub file: PathBuf,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/minisync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("minisync")
            .join("config.yaml")
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Copy of this configuration with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.store.access_key = mask(&copy.store.access_key);
        copy.store.secret_key = mask(&copy.store.secret_key);
        copy
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

impl StoreConfig {
    /// Endpoint with an explicit scheme.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("MiniSync"),
            reconcile_interval: 300,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "minisync".to_string(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            force_path_style: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            file: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("minisync")
                .join("status.json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

pub const ENV_BACKUP_FOLDER: &str = "MINISYNC_BACKUPFOLDER";
pub const ENV_LOG_FOLDER: &str = "MINISYNC_LOGFOLDER";
pub const ENV_ENDPOINT: &str = "MINISYNC_MINIO_ENDPOINT";
pub const ENV_BUCKET: &str = "MINISYNC_MINIO_BUCKETNAME";
pub const ENV_FREQUENCY: &str = "MINISYNC_MINIO_BACKUPFREQUENCYSECONDS";
pub const ENV_ACCESS_KEY: &str = "MINISYNC_MINIO_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "MINISYNC_MINIO_SECRET_KEY";

/// File name used when only a log folder is given.
pub const LOG_FILE_NAME: &str = "MiniSync.log";

impl Config {
    /// Apply `MINISYNC_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ValidationError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names. Empty
    /// values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = get(ENV_BACKUP_FOLDER) {
            self.sync.root = PathBuf::from(root);
        }
        if let Some(folder) = get(ENV_LOG_FOLDER) {
            self.logging.file = Some(PathBuf::from(folder).join(LOG_FILE_NAME));
        }
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.store.endpoint = endpoint;
        }
        if let Some(bucket) = get(ENV_BUCKET) {
            self.store.bucket = bucket;
        }
        if let Some(access_key) = get(ENV_ACCESS_KEY) {
            self.store.access_key = access_key;
        }
        if let Some(secret_key) = get(ENV_SECRET_KEY) {
            self.store.secret_key = secret_key;
        }
        if let Some(seconds) = get(ENV_FREQUENCY) {
            self.sync.reconcile_interval =
                seconds.trim().parse().map_err(|_| ValidationError {
                    field: ENV_FREQUENCY.into(),
                    message: format!("not a number of seconds: '{seconds}'"),
                })?;
        }
        Ok(())
    }
}

impl Config {
    /// Effective configuration for the binaries: the file at `path` (or at
    /// [`Config::default_path`], which may be absent) with environment
    /// overrides resolved through `lookup`.
    ///
    /// An explicit `path` must exist. A file that exists but does not parse
    /// is always an error.
    pub fn load_with_overrides<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(&default).with_context(|| {
                        format!("Failed to load config from {}", default.display())
                    })?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides_from(lookup)?;
        Ok(config)
    }

    /// Fails with every validation error listed, one per line.
    pub fn ensure_valid(&self) -> anyhow::Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        anyhow::bail!("Invalid configuration:\n{}", lines.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.reconcile_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- sync ---
        if !self.sync.root.is_absolute() {
            push(
                "sync.root",
                format!("must be an absolute path: {}", self.sync.root.display()),
            );
        } else if !self.sync.root.is_dir() {
            push(
                "sync.root",
                format!("directory does not exist: {}", self.sync.root.display()),
            );
        }
        if self.sync.reconcile_interval == 0 {
            push("sync.reconcile_interval", "must be greater than 0".into());
        }

        // --- store ---
        if self.store.endpoint.trim().is_empty() {
            push("store.endpoint", "must not be empty".into());
        }
        if let Err(message) = validate_bucket_name(&self.store.bucket) {
            push("store.bucket", message);
        }
        if self.store.region.trim().is_empty() {
            push("store.region", "must not be empty".into());
        }
        if self.store.access_key.is_empty() {
            push("store.access_key", "must not be empty".into());
        }
        if self.store.secret_key.is_empty() {
            push("store.secret_key", "must not be empty".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

/// S3 bucket naming rules: 3-63 characters of lowercase letters, digits,
/// `.` and `-`, starting and ending with a letter or digit.
fn validate_bucket_name(name: &str) -> Result<(), String> {
    if !(3..=63).contains(&name.len()) {
        return Err(format!("'{name}' must be 3 to 63 characters long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(format!(
            "'{name}' may only contain lowercase letters, digits, '.' and '-'"
        ));
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(format!("'{name}' must start and end with a letter or digit"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use minisync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/srv/backup"))
///     .reconcile_interval(60)
///     .store_bucket("backups")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn reconcile_interval(mut self, seconds: u64) -> Self {
        self.config.sync.reconcile_interval = seconds;
        self
    }

    // --- store ---

    pub fn store_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.store.endpoint = endpoint.into();
        self
    }

    pub fn store_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.store.bucket = bucket.into();
        self
    }

    pub fn store_region(mut self, region: impl Into<String>) -> Self {
        self.config.store.region = region.into();
        self
    }

    pub fn store_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.config.store.access_key = access_key.into();
        self.config.store.secret_key = secret_key.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    // --- status ---

    pub fn status_file(mut self, file: PathBuf) -> Self {
        self.config.status.file = file;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
