//! Model experiment engine
//!
//! A/B testing for fraud detection model variants:
//! - Deterministic, sticky traffic assignment by caller
//! - Lock-free per-variant outcome counters
//! - Two-proportion z-tests and winner selection
//! - Experiment lifecycle with optional persistence

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use domain::experiment::ExperimentSettings;
use domain::DomainError;
use infrastructure::experiment::InMemoryExperimentRepository;
use infrastructure::serving::HttpModelServingService;
use infrastructure::services::{ExperimentRegistry, RegistryConfig};

/// Registry defaults taken from configuration
pub fn registry_config(config: &AppConfig) -> Result<RegistryConfig, DomainError> {
    let settings = ExperimentSettings::new(
        config.experiments.default_min_samples_per_variant,
        config.experiments.default_confidence_level,
    );
    settings.validate()?;

    Ok(RegistryConfig {
        default_settings: settings,
        prediction_timeout: config.experiments.prediction_timeout(),
    })
}

/// Build the registry backed by the HTTP model serving backend
pub fn build_registry(config: &AppConfig) -> Result<ExperimentRegistry, DomainError> {
    let model_serving = HttpModelServingService::new(
        &config.model_serving.base_url,
        config.model_serving.timeout(),
    )?;

    Ok(
        ExperimentRegistry::new(Arc::new(model_serving), registry_config(config)?)
            .with_repository(Arc::new(InMemoryExperimentRepository::new())),
    )
}

/// Create application state from configuration
pub fn create_app_state(config: &AppConfig) -> Result<AppState, DomainError> {
    Ok(AppState::new(Arc::new(build_registry(config)?)))
}
