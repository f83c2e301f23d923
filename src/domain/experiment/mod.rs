//! Experiment domain module for A/B testing
//!
//! Types for comparing fraud-detection model variants on live traffic:
//! experiment configuration, lifecycle, per-variant metrics and analysis.

mod entity;
mod repository;
mod result;
mod status;
mod validation;

pub use entity::{
    AssignmentHash, Experiment, ExperimentId, ExperimentSettings, VariantConfig,
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_MIN_SAMPLES_PER_VARIANT,
};
pub use repository::{ExperimentQuery, ExperimentRepository};
pub use result::{
    AnalysisResult, ComparisonResult, ExperimentReport, Improvement, VariantCounts,
    VariantMetrics,
};
pub use status::{ExperimentStateError, ExperimentStatus};
pub use validation::{
    traffic_sums_to_100, traffic_total, validate_experiment_id, validate_variants,
    ExperimentValidationError, TRAFFIC_SUM_TOLERANCE,
};

#[cfg(test)]
pub use repository::mock::MockExperimentRepository;
