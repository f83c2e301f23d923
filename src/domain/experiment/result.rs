//! Experiment result types for metrics and statistical analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::Experiment;

// ============================================================================
// VariantCounts
// ============================================================================

/// Raw counter values for one variant, read at a single point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantCounts {
    pub predictions: u64,
    pub fraud_flagged: u64,
    pub correct_predictions: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub total_response_time_ms: f64,
}

impl VariantCounts {
    /// Number of outcomes with known ground truth
    pub fn labeled(&self) -> u64 {
        self.correct_predictions + self.false_positives + self.false_negatives
    }

    /// Fraud predictions that were confirmed as fraud
    pub fn true_positives(&self) -> u64 {
        self.fraud_flagged.saturating_sub(self.false_positives)
    }
}

// ============================================================================
// VariantMetrics
// ============================================================================

/// Metrics derived from a variant's counters at read time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    /// Variant name
    pub variant_name: String,
    /// Total number of recorded predictions
    pub predictions: u64,
    /// Predictions flagged as fraud
    pub fraud_flagged: u64,
    /// Labeled predictions that matched the ground truth
    pub correct_predictions: u64,
    /// Predicted fraud, actually legitimate
    pub false_positives: u64,
    /// Predicted legitimate, actually fraud
    pub false_negatives: u64,
    /// Sum of model response times
    pub total_response_time_ms: f64,
    /// Fraction of predictions flagged as fraud
    pub fraud_rate: f64,
    /// Average model response time
    pub avg_response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
}

impl VariantMetrics {
    /// Derive metrics from raw counts
    ///
    /// Accuracy, precision, recall and F1 are only reported once some
    /// ground truth has been recorded for the variant.
    pub fn from_counts(variant_name: impl Into<String>, counts: VariantCounts) -> Self {
        let mut metrics = Self {
            variant_name: variant_name.into(),
            predictions: counts.predictions,
            fraud_flagged: counts.fraud_flagged,
            correct_predictions: counts.correct_predictions,
            false_positives: counts.false_positives,
            false_negatives: counts.false_negatives,
            total_response_time_ms: counts.total_response_time_ms,
            ..Default::default()
        };

        if counts.predictions > 0 {
            let n = counts.predictions as f64;
            metrics.fraud_rate = counts.fraud_flagged as f64 / n;
            metrics.avg_response_time_ms = counts.total_response_time_ms / n;
        }

        let labeled = counts.labeled();

        if labeled == 0 {
            return metrics;
        }

        metrics.accuracy = Some(counts.correct_predictions as f64 / labeled as f64);

        let tp = counts.true_positives() as f64;

        if counts.fraud_flagged > 0 {
            metrics.precision = Some(tp / counts.fraud_flagged as f64);
        }

        let recall_denominator = tp + counts.false_negatives as f64;

        if recall_denominator > 0.0 {
            metrics.recall = Some(tp / recall_denominator);
        }

        if let (Some(p), Some(r)) = (metrics.precision, metrics.recall) {
            metrics.f1_score = Some(if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 });
        }

        metrics
    }

    /// Raw counts backing these metrics
    pub fn counts(&self) -> VariantCounts {
        VariantCounts {
            predictions: self.predictions,
            fraud_flagged: self.fraud_flagged,
            correct_predictions: self.correct_predictions,
            false_positives: self.false_positives,
            false_negatives: self.false_negatives,
            total_response_time_ms: self.total_response_time_ms,
        }
    }

    /// Number of outcomes with known ground truth
    pub fn labeled(&self) -> u64 {
        self.counts().labeled()
    }
}

// ============================================================================
// ComparisonResult
// ============================================================================

/// Signed treatment-minus-control differences
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub fraud_rate: f64,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Two-proportion z-test of one treatment against the control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub control_variant: String,
    pub treatment_variant: String,
    pub control_metrics: VariantMetrics,
    pub treatment_metrics: VariantMetrics,
    pub z_statistic: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub confidence_level: f64,
    pub improvement: Improvement,
}

// ============================================================================
// AnalysisResult
// ============================================================================

/// Outcome of analyzing an experiment; a later analysis produces a new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub experiment_id: String,
    pub control_variant_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_variant_name: Option<String>,
    /// Highest `1 - p_value` across comparisons
    pub confidence: f64,
    pub per_variant_comparison: BTreeMap<String, ComparisonResult>,
    pub statistically_significant: bool,
    pub recommendation: String,
    /// Set when any variant is below the minimum sample size
    pub low_confidence: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undersampled_variants: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Comparison for a treatment variant
    pub fn comparison(&self, variant_name: &str) -> Option<&ComparisonResult> {
        self.per_variant_comparison.get(variant_name)
    }
}

// ============================================================================
// ExperimentReport
// ============================================================================

/// Exported view of an experiment with its metrics and analysis
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub experiment: Experiment,
    pub variant_metrics: Vec<VariantMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}
