use std::time::Duration;

use serde::Deserialize;

use crate::domain::experiment::{DEFAULT_CONFIDENCE_LEVEL, DEFAULT_MIN_SAMPLES_PER_VARIANT};
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
///
/// Loaded from `config/default`, then `config/local`, then `APP__*`
/// environment variables (e.g. `APP__SERVER__PORT=9000`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
    #[serde(default)]
    pub model_serving: ModelServingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Defaults applied to new experiments and routed predictions
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentsConfig {
    #[serde(default = "default_min_samples")]
    pub default_min_samples_per_variant: u64,
    #[serde(default = "default_confidence_level")]
    pub default_confidence_level: f64,
    /// Upper bound on a single model serving round trip
    #[serde(default = "default_prediction_timeout_ms")]
    pub prediction_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelServingConfig {
    #[serde(default = "default_model_serving_url")]
    pub base_url: String,
    #[serde(default = "default_model_serving_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_min_samples() -> u64 {
    DEFAULT_MIN_SAMPLES_PER_VARIANT
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

fn default_prediction_timeout_ms() -> u64 {
    5000
}

fn default_model_serving_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_model_serving_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ExperimentsConfig {
    fn default() -> Self {
        Self {
            default_min_samples_per_variant: default_min_samples(),
            default_confidence_level: default_confidence_level(),
            prediction_timeout_ms: default_prediction_timeout_ms(),
        }
    }
}

impl ExperimentsConfig {
    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_millis(self.prediction_timeout_ms)
    }
}

impl Default for ModelServingConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_serving_url(),
            timeout_ms: default_model_serving_timeout_ms(),
        }
    }
}

impl ModelServingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
