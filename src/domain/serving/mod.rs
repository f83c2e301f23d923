//! Model serving domain module
//!
//! The experiment engine never loads models itself; it forwards features to
//! a serving backend addressed by each variant's model reference.

mod provider;

pub use provider::{ModelPrediction, ModelServingService};

#[cfg(test)]
pub use provider::mock::FakeModelServing;
#[cfg(test)]
pub use provider::MockModelServingService;
