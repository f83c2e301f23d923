//! Consistent hashing for experiment variant assignment
//!
//! Ensures the same caller always lands in the same bucket for a given
//! experiment, across restarts and across instances.

use sha2::{Digest, Sha256};

use crate::domain::experiment::AssignmentHash;

/// Number of buckets traffic percentages are laid over
pub const BUCKET_COUNT: u32 = 100;

/// Consistent hasher for experiment assignments
#[derive(Debug, Clone, Copy)]
pub struct ConsistentHasher;

impl ConsistentHasher {
    /// Deterministic bucket (0-99) for a caller and experiment
    pub fn bucket(scheme: AssignmentHash, caller_id: &str, experiment_id: &str) -> u32 {
        match scheme {
            AssignmentHash::Sha256V1 => Self::sha256_bucket(caller_id, experiment_id),
        }
    }

    /// SHA-256 of `"{caller}:{experiment}"`, digest as a big-endian integer mod 100
    fn sha256_bucket(caller_id: &str, experiment_id: &str) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(caller_id.as_bytes());
        hasher.update(b":");
        hasher.update(experiment_id.as_bytes());
        let digest = hasher.finalize();

        // Horner reduction keeps the full 256-bit value's residue
        digest
            .iter()
            .fold(0u32, |acc, &byte| (acc * 256 + byte as u32) % BUCKET_COUNT)
    }
}
