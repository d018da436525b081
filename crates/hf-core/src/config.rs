//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, storage, batch, and retention sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::{Error, TargetFormat};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub batch: BatchConfig,
    pub retention: RetentionConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file, failing if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.batch.max_files == 0 {
            warnings.push("batch.max_files is 0; every batch will be rejected".into());
        }

        if self.batch.max_concurrent_conversions == 0 {
            warnings.push(
                "batch.max_concurrent_conversions is 0; one conversion slot will be used".into(),
            );
        }

        if !(1..=100).contains(&self.batch.default_quality) {
            warnings.push(format!(
                "batch.default_quality {} is outside 1..=100",
                self.batch.default_quality
            ));
        }

        if self.batch.default_format.parse::<TargetFormat>().is_err() {
            warnings.push(format!(
                "batch.default_format '{}' is not a supported format",
                self.batch.default_format
            ));
        }

        if self.retention.enabled && self.retention.sweep_interval_secs == 0 {
            warnings.push(
                "retention.sweep_interval_secs is 0; the sweeper will be disabled".into(),
            );
        }

        if let Some(ref dir) = self.server.static_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "server.static_dir {} does not exist",
                    dir.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional front-end assets served as the router fallback.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            static_dir: None,
        }
    }
}

/// Working storage for uploads, intermediate outputs, and archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub temp_dir: PathBuf,
    /// Remove leftovers from a previous process at startup.
    pub purge_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp_files"),
            purge_on_start: true,
        }
    }
}

/// Limits and defaults for conversion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_files: usize,
    pub default_format: String,
    pub default_quality: u8,
    pub max_upload_bytes: usize,
    pub file_timeout_secs: u64,
    /// Conversions allowed to run on the blocking pool at once. A timed-out
    /// conversion keeps its slot until the decoder actually returns.
    pub max_concurrent_conversions: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            default_format: "jpeg".into(),
            default_quality: 90,
            max_upload_bytes: 512 * 1024 * 1024,
            file_timeout_secs: 120,
            max_concurrent_conversions: 4,
        }
    }
}

impl BatchConfig {
    /// The configured default output format, or JPEG if it does not parse.
    pub fn default_target(&self) -> TargetFormat {
        self.default_format.parse().unwrap_or(TargetFormat::Jpeg)
    }
}

/// Expiry of finished jobs and their working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub job_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}
