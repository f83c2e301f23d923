use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Fraud verdict returned by a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub is_fraud: bool,
    /// Fraud probability in [0, 1]
    pub probability: f64,
}

impl ModelPrediction {
    pub fn new(is_fraud: bool, probability: f64) -> Self {
        Self {
            is_fraud,
            probability,
        }
    }
}

/// Backend that evaluates a model on a feature vector
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelServingService: Send + Sync {
    /// Run the referenced model on the given features
    async fn predict(
        &self,
        model_reference: &str,
        features: &[f64],
    ) -> Result<ModelPrediction, DomainError>;
}
