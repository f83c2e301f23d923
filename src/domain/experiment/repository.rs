//! Experiment repository trait and query types

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{Experiment, ExperimentId};
use super::status::ExperimentStatus;
use crate::domain::DomainError;

// ============================================================================
// ExperimentQuery
// ============================================================================

/// Query parameters for listing experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by model reference (matches any variant)
    pub model_reference: Option<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl ExperimentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_model(mut self, model_reference: impl Into<String>) -> Self {
        self.model_reference = Some(model_reference.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check whether an experiment passes the filters
    pub fn matches(&self, experiment: &Experiment) -> bool {
        if let Some(status) = self.status {
            if experiment.status() != status {
                return false;
            }
        }

        if let Some(ref model_reference) = self.model_reference {
            if !experiment
                .referenced_models()
                .contains(&model_reference.as_str())
            {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// ExperimentRepository
// ============================================================================

/// Durable store for experiment definitions
///
/// Holds configuration, status and the last analysis. Live counters are
/// not persisted; a restored experiment starts counting from zero.
#[async_trait]
pub trait ExperimentRepository: Send + Sync + Debug {
    /// Persist a new experiment; fails with a conflict if the ID exists
    async fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError>;

    /// Overwrite an existing experiment
    async fn update(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError>;

    /// List experiments, newest first
    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError>;

    async fn exists(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        Ok(self.get(id).await?.is_some())
    }
}
