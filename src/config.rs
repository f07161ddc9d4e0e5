//! Configuration management for the classification service

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "RETINA_CONFIG";

/// Config file used when `RETINA_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Compute device for the ONNX session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CUDA when the build and the host support it, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum accepted request body, in bytes
    pub body_limit_bytes: usize,
    /// Include the error cause chain (`traceback`) in failure responses
    pub expose_error_details: bool,
}

/// Model and label configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// ONNX model file
    pub path: String,
    /// JSON array of class names, index-aligned with model outputs
    pub labels_path: String,
    /// Execution device
    #[serde(default)]
    pub device: Device,
    /// Intra-op threads for ONNX Runtime
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Number of ranked entries returned per prediction
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_intra_threads() -> usize {
    1
}

/// Largest number of ranked classes `/predict` may return
pub const MAX_TOP_K: usize = 5;

fn default_top_k() -> usize {
    MAX_TOP_K
}

/// Periodic metrics summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `RETINA_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// Layers, lowest precedence first: built-in defaults, the TOML file (optional),
    /// then `RETINA__SECTION__KEY` environment variables.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults =
            Config::try_from(&AppConfig::default()).context("Failed to encode default configuration")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("RETINA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.server.port > 0, "server.port must be non-zero");
        ensure!(
            self.server.body_limit_bytes > 0,
            "server.body_limit_bytes must be non-zero"
        );
        ensure!(
            (1..=MAX_TOP_K).contains(&self.model.top_k),
            "model.top_k must be between 1 and {}",
            MAX_TOP_K
        );
        ensure!(
            self.model.intra_threads > 0,
            "model.intra_threads must be at least 1"
        );
        Ok(())
    }

    /// `host:port` string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 7000,
                body_limit_bytes: 16 * 1024 * 1024,
                expose_error_details: false,
            },
            model: ModelConfig {
                path: "models/swinv2_small_window16_256.onnx".to_string(),
                labels_path: "labels.json".to_string(),
                device: Device::Auto,
                intra_threads: default_intra_threads(),
                top_k: default_top_k(),
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:7000");
        assert_eq!(config.model.top_k, 5);
        assert_eq!(config.model.device, Device::Auto);
        assert!(!config.server.expose_error_details);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.model.labels_path, "labels.json");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8088

[model]
path = "weights/model.onnx"
device = "cpu"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.path, "weights/model.onnx");
        assert_eq!(config.model.device, Device::Cpu);
        assert_eq!(config.model.top_k, 5);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = AppConfig::default();
        config.model.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_k_capped_at_five() {
        let mut config = AppConfig::default();
        config.model.top_k = MAX_TOP_K;
        assert!(config.validate().is_ok());

        config.model.top_k = MAX_TOP_K + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.top_k"));
    }
}
