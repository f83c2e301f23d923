//! Infrastructure layer for experiment A/B testing
//!
//! Routing, counters, statistics and the in-memory repository.

mod consistent_hashing;
mod in_memory_repository;
mod metrics_aggregator;
mod router;
mod statistical;

pub use consistent_hashing::{ConsistentHasher, BUCKET_COUNT};
pub use in_memory_repository::InMemoryExperimentRepository;
pub use metrics_aggregator::MetricsAggregator;
pub use router::AssignmentRouter;
pub use statistical::{
    compare, determine_winner, normal_cdf, two_proportion_z_test, MIN_ACCURACY_IMPROVEMENT,
};
