//! Deterministic caller-to-variant routing

use crate::domain::experiment::{Experiment, VariantConfig};

use super::consistent_hashing::ConsistentHasher;

/// Routes callers to experiment variants
///
/// Pure over the experiment's configuration: no state, no locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentRouter;

impl AssignmentRouter {
    pub fn new() -> Self {
        Self
    }

    /// Pick the variant for a caller
    ///
    /// Experiments that are not running always serve the control.
    pub fn assign<'a>(
        &self,
        experiment: &'a Experiment,
        caller_id: &str,
    ) -> Option<&'a VariantConfig> {
        if !experiment.status().is_running() {
            return experiment.control_variant();
        }

        let bucket = ConsistentHasher::bucket(
            experiment.assignment_hash(),
            caller_id,
            experiment.id().as_str(),
        );

        Self::select(experiment.variants(), bucket)
    }

    /// First variant whose cumulative share exceeds the bucket, else the last
    pub fn select(variants: &[VariantConfig], bucket: u32) -> Option<&VariantConfig> {
        let bucket = bucket as f64;
        let mut cumulative = 0.0;

        for variant in variants {
            cumulative += variant.traffic_percentage();

            if bucket < cumulative {
                return Some(variant);
            }
        }

        variants.last()
    }
}
