//! Infrastructure services

mod experiment_service;

pub use experiment_service::{
    CreateExperimentRequest, CreateFromModelsRequest, ExperimentRegistry, PredictionOutcome,
    RegistryConfig,
};
