//! Concurrent per-variant outcome counters
//!
//! Each (experiment, variant) pair owns its own set of atomics. The maps are
//! only locked long enough to clone an `Arc` to the counters, so unrelated
//! variants and experiments never serialize on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::domain::experiment::{VariantConfig, VariantCounts, VariantMetrics};
use crate::domain::DomainError;

// ============================================================================
// AtomicF64
// ============================================================================

/// Atomic f64 stored as bits in an AtomicU64
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn fetch_add(&self, val: f64) -> f64 {
        loop {
            let current = self.0.load(Ordering::Relaxed);
            let current_f64 = f64::from_bits(current);
            let new = (current_f64 + val).to_bits();
            if self
                .0
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current_f64;
            }
        }
    }
}

// ============================================================================
// VariantCounters
// ============================================================================

#[derive(Debug, Default)]
struct VariantCounters {
    predictions: AtomicU64,
    fraud_flagged: AtomicU64,
    correct_predictions: AtomicU64,
    false_positives: AtomicU64,
    false_negatives: AtomicU64,
    total_response_time_ms: AtomicF64,
}

impl VariantCounters {
    fn record_prediction(&self, predicted_fraud: bool, response_time_ms: f64) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms.fetch_add(response_time_ms);

        if predicted_fraud {
            self.fraud_flagged.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Exactly one of correct / false positive / false negative
    fn record_ground_truth(&self, predicted_fraud: bool, actual_fraud: bool) {
        let counter = match (predicted_fraud, actual_fraud) {
            (p, a) if p == a => &self.correct_predictions,
            (true, false) => &self.false_positives,
            _ => &self.false_negatives,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Each counter is read individually; the view is not linearizable
    fn snapshot(&self) -> VariantCounts {
        VariantCounts {
            predictions: self.predictions.load(Ordering::Relaxed),
            fraud_flagged: self.fraud_flagged.load(Ordering::Relaxed),
            correct_predictions: self.correct_predictions.load(Ordering::Relaxed),
            false_positives: self.false_positives.load(Ordering::Relaxed),
            false_negatives: self.false_negatives.load(Ordering::Relaxed),
            total_response_time_ms: self.total_response_time_ms.load(),
        }
    }
}

type VariantMap = RwLock<HashMap<String, Arc<VariantCounters>>>;

// ============================================================================
// MetricsAggregator
// ============================================================================

/// Counter store for every registered experiment
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    experiments: RwLock<HashMap<String, Arc<VariantMap>>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment with zeroed counters, replacing any previous ones
    pub fn register<'a>(
        &self,
        experiment_id: &str,
        variant_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), DomainError> {
        let variants: HashMap<_, _> = variant_names
            .into_iter()
            .map(|name| (name.to_string(), Arc::new(VariantCounters::default())))
            .collect();

        let mut experiments = self.experiments.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        experiments.insert(experiment_id.to_string(), Arc::new(RwLock::new(variants)));

        debug!(experiment_id = %experiment_id, "Registered experiment counters");
        Ok(())
    }

    /// Add zeroed counters for a new variant
    pub fn add_variant(&self, experiment_id: &str, variant_name: &str) -> Result<(), DomainError> {
        let variants = self.variant_map(experiment_id)?;
        let mut variants = variants.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        variants
            .entry(variant_name.to_string())
            .or_insert_with(|| Arc::new(VariantCounters::default()));

        Ok(())
    }

    /// Drop all counters of an experiment
    pub fn remove(&self, experiment_id: &str) -> Result<bool, DomainError> {
        let mut experiments = self.experiments.write().map_err(|e| {
            DomainError::internal(format!("Failed to acquire write lock: {}", e))
        })?;

        Ok(experiments.remove(experiment_id).is_some())
    }

    /// Record one prediction, with ground truth when it is already known
    pub fn record_outcome(
        &self,
        experiment_id: &str,
        variant_name: &str,
        predicted_fraud: bool,
        actual_fraud: Option<bool>,
        response_time_ms: f64,
    ) -> Result<(), DomainError> {
        let counters = self.counters(experiment_id, variant_name)?;

        counters.record_prediction(predicted_fraud, response_time_ms);

        if let Some(actual_fraud) = actual_fraud {
            counters.record_ground_truth(predicted_fraud, actual_fraud);
        }

        Ok(())
    }

    /// Classify ground truth that arrived after the prediction was recorded
    pub fn record_feedback(
        &self,
        experiment_id: &str,
        variant_name: &str,
        predicted_fraud: bool,
        actual_fraud: bool,
    ) -> Result<(), DomainError> {
        self.counters(experiment_id, variant_name)?
            .record_ground_truth(predicted_fraud, actual_fraud);
        Ok(())
    }

    /// Raw counters of one variant
    pub fn counts(
        &self,
        experiment_id: &str,
        variant_name: &str,
    ) -> Result<VariantCounts, DomainError> {
        Ok(self.counters(experiment_id, variant_name)?.snapshot())
    }

    /// Derived metrics of one variant
    pub fn snapshot(
        &self,
        experiment_id: &str,
        variant_name: &str,
    ) -> Result<VariantMetrics, DomainError> {
        let counts = self.counts(experiment_id, variant_name)?;
        Ok(VariantMetrics::from_counts(variant_name, counts))
    }

    /// Derived metrics of every variant, in the given order
    ///
    /// Variants without counters report zeroes.
    pub fn snapshot_all(
        &self,
        experiment_id: &str,
        variants: &[VariantConfig],
    ) -> Result<Vec<VariantMetrics>, DomainError> {
        let map = self.variant_map(experiment_id)?;
        let map = map.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(variants
            .iter()
            .map(|v| {
                let counts = map
                    .get(v.name())
                    .map(|c| c.snapshot())
                    .unwrap_or_default();
                VariantMetrics::from_counts(v.name(), counts)
            })
            .collect())
    }

    fn variant_map(&self, experiment_id: &str) -> Result<Arc<VariantMap>, DomainError> {
        let experiments = self.experiments.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        experiments
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| DomainError::experiment_not_found(experiment_id))
    }

    fn counters(
        &self,
        experiment_id: &str,
        variant_name: &str,
    ) -> Result<Arc<VariantCounters>, DomainError> {
        let map = self.variant_map(experiment_id)?;
        let variants = map.read().map_err(|e| {
            DomainError::internal(format!("Failed to acquire read lock: {}", e))
        })?;

        variants.get(variant_name).cloned().ok_or_else(|| {
            DomainError::not_found(format!(
                "Variant '{}' not found in experiment '{}'",
                variant_name, experiment_id
            ))
        })
    }
}
