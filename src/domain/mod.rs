//! Domain layer - Core business logic and entities

pub mod error;
pub mod experiment;
pub mod serving;

pub use error::DomainError;
pub use experiment::{
    AnalysisResult, ComparisonResult, Experiment, ExperimentId, ExperimentQuery,
    ExperimentReport, ExperimentRepository, ExperimentSettings, ExperimentStatus, VariantConfig,
    VariantMetrics,
};
pub use serving::{ModelPrediction, ModelServingService};
