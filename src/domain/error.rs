use thiserror::Error;

use super::experiment::{ExperimentStateError, ExperimentValidationError};

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String },

    #[error("Experiment '{experiment_id}' is not running (status: {status})")]
    NotRunning {
        experiment_id: String,
        status: String,
    },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn not_running(experiment_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::NotRunning {
            experiment_id: experiment_id.into(),
            status: status.into(),
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Experiment not found helper
    pub fn experiment_not_found(id: impl std::fmt::Display) -> Self {
        Self::not_found(format!("Experiment '{}' not found", id))
    }
}

impl From<ExperimentValidationError> for DomainError {
    fn from(err: ExperimentValidationError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<ExperimentStateError> for DomainError {
    fn from(err: ExperimentStateError) -> Self {
        Self::invalid_transition(err.to_string())
    }
}
