//! Statistical analysis functions for A/B testing
//!
//! Fraud rates are compared with a two-proportion z-test; the winner is
//! chosen on accuracy against the control.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::experiment::{
    AnalysisResult, ComparisonResult, Experiment, Improvement, VariantMetrics,
};
use crate::domain::DomainError;

/// Accuracy gain a treatment needs over the control to be recommended
pub const MIN_ACCURACY_IMPROVEMENT: f64 = 0.01;

/// Two-proportion z-test
///
/// Returns `(z, two_tailed_p)`. With an empty sample on either side there is
/// nothing to compare, so the result is `(0, 1)`.
pub fn two_proportion_z_test(p1: f64, n1: u64, p2: f64, n2: u64) -> (f64, f64) {
    if n1 == 0 || n2 == 0 {
        return (0.0, 1.0);
    }

    let (n1, n2) = (n1 as f64, n2 as f64);
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    let z = if se > 0.0 { (p2 - p1) / se } else { 0.0 };
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));

    (z, p_value)
}

/// Compare a treatment's fraud rate against the control's
pub fn compare(
    control: &VariantMetrics,
    treatment: &VariantMetrics,
    confidence_level: f64,
) -> ComparisonResult {
    let (z_statistic, p_value) = two_proportion_z_test(
        control.fraud_rate,
        control.predictions,
        treatment.fraud_rate,
        treatment.predictions,
    );

    let accuracy = match (control.accuracy, treatment.accuracy) {
        (None, None) => None,
        (c, t) => Some(t.unwrap_or(0.0) - c.unwrap_or(0.0)),
    };

    ComparisonResult {
        control_variant: control.variant_name.clone(),
        treatment_variant: treatment.variant_name.clone(),
        control_metrics: control.clone(),
        treatment_metrics: treatment.clone(),
        z_statistic,
        p_value,
        is_significant: p_value < 1.0 - confidence_level,
        confidence_level,
        improvement: Improvement {
            fraud_rate: treatment.fraud_rate - control.fraud_rate,
            response_time_ms: treatment.avg_response_time_ms - control.avg_response_time_ms,
            accuracy,
        },
    }
}

/// Analyze an experiment from a snapshot of its variant metrics
///
/// `metrics` is matched to variants by name; variants missing from it are
/// treated as having no observations. Small samples mark the result as low
/// confidence but never prevent it.
pub fn determine_winner(
    experiment: &Experiment,
    metrics: &[VariantMetrics],
) -> Result<AnalysisResult, DomainError> {
    let control = experiment.control_variant().ok_or_else(|| {
        DomainError::validation(format!("Experiment '{}' has no variants", experiment.id()))
    })?;

    let by_name: BTreeMap<&str, &VariantMetrics> = metrics
        .iter()
        .map(|m| (m.variant_name.as_str(), m))
        .collect();

    let metrics_for = |name: &str| {
        by_name
            .get(name)
            .map(|m| (*m).clone())
            .unwrap_or_else(|| VariantMetrics::from_counts(name, Default::default()))
    };

    let min_samples = experiment.min_samples_per_variant();
    let undersampled_variants: Vec<String> = experiment
        .variants()
        .iter()
        .filter(|v| metrics_for(v.name()).predictions < min_samples)
        .map(|v| v.name().to_string())
        .collect();

    for name in &undersampled_variants {
        warn!(
            experiment_id = %experiment.id(),
            variant = %name,
            predictions = metrics_for(name).predictions,
            min_samples = min_samples,
            "Variant is below the minimum sample size"
        );
    }

    let control_metrics = metrics_for(control.name());
    let control_accuracy = control_metrics.accuracy.unwrap_or(0.0);

    let mut per_variant_comparison = BTreeMap::new();
    let mut best: Option<&str> = None;
    let mut best_improvement = 0.0;

    for variant in experiment.variants() {
        if variant.name() == control.name() {
            continue;
        }

        let treatment_metrics = metrics_for(variant.name());
        let improvement = treatment_metrics.accuracy.unwrap_or(0.0) - control_accuracy;

        // Strict comparison keeps the earliest variant on ties
        if improvement > best_improvement {
            best_improvement = improvement;
            best = Some(variant.name());
        }

        per_variant_comparison.insert(
            variant.name().to_string(),
            compare(&control_metrics, &treatment_metrics, experiment.confidence_level()),
        );
    }

    let (winner, recommendation) = match best {
        Some(name) if best_improvement > MIN_ACCURACY_IMPROVEMENT => {
            (name, format!("Deploy variant '{}'", name))
        }
        _ => (
            control.name(),
            format!("Keep current model '{}'", control.name()),
        ),
    };

    let confidence = per_variant_comparison
        .values()
        .map(|c: &ComparisonResult| 1.0 - c.p_value)
        .fold(0.0, f64::max);

    let statistically_significant = per_variant_comparison.values().any(|c| c.is_significant);

    info!(
        experiment_id = %experiment.id(),
        winner = %winner,
        confidence = confidence,
        significant = statistically_significant,
        "Analyzed experiment"
    );

    Ok(AnalysisResult {
        experiment_id: experiment.id().to_string(),
        control_variant_name: control.name().to_string(),
        winner_variant_name: Some(winner.to_string()),
        confidence,
        per_variant_comparison,
        statistically_significant,
        recommendation,
        low_confidence: !undersampled_variants.is_empty(),
        undersampled_variants,
        analyzed_at: Utc::now(),
    })
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function approximation
///
/// Abramowitz and Stegun 7.1.26 evaluated with Horner's method.
/// Accurate to about 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        ExperimentId, ExperimentSettings, VariantConfig, VariantCounts,
    };

    fn metrics(name: &str, predictions: u64, flagged: u64, correct: u64, labeled: u64) -> VariantMetrics {
        // Errors split evenly between FP and FN, rounding toward FN
        let wrong = labeled - correct;
        let false_positives = (wrong / 2).min(flagged);
        VariantMetrics::from_counts(
            name,
            VariantCounts {
                predictions,
                fraud_flagged: flagged,
                correct_predictions: correct,
                false_positives,
                false_negatives: wrong - false_positives,
                total_response_time_ms: predictions as f64 * 10.0,
            },
        )
    }

    fn experiment(variants: Vec<VariantConfig>, min_samples: u64) -> Experiment {
        Experiment::new(
            ExperimentId::new("stats-exp").unwrap(),
            "Stats",
            "",
            variants,
            ExperimentSettings::new(min_samples, 0.95),
        )
        .unwrap()
    }

    fn two_variants() -> Experiment {
        experiment(
            vec![
                VariantConfig::new("control", "m1", 50.0).with_control(true),
                VariantConfig::new("treatment", "m2", 50.0),
            ],
            100,
        )
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
    }

    #[test]
    fn test_z_test_worked_example() {
        let (z, p) = two_proportion_z_test(0.02, 1000, 0.025, 1000);

        assert!((z - 0.7538854550531678).abs() < 1e-9, "z = {}", z);
        assert!((p - 0.4509180050542356).abs() < 1e-6, "p = {}", p);
        assert!(p >= 0.05);
    }

    #[test]
    fn test_z_test_empty_sample() {
        assert_eq!(two_proportion_z_test(0.0, 0, 0.5, 100), (0.0, 1.0));
        assert_eq!(two_proportion_z_test(0.5, 100, 0.0, 0), (0.0, 1.0));
    }

    #[test]
    fn test_z_test_zero_variance() {
        let (z, p) = two_proportion_z_test(0.0, 500, 0.0, 500);
        assert_eq!(z, 0.0);
        assert!((p - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_z_test_significant_difference() {
        let (z, p) = two_proportion_z_test(0.02, 5000, 0.05, 5000);
        assert!(z > 0.0);
        assert!(p < 0.001);
    }

    #[test]
    fn test_compare_reports_improvements() {
        let control = metrics("control", 1000, 20, 0, 0);
        let treatment = metrics("treatment", 1000, 25, 0, 0);

        let result = compare(&control, &treatment, 0.95);

        assert!(!result.is_significant);
        assert!((result.improvement.fraud_rate - 0.005).abs() < 1e-12);
        assert_eq!(result.improvement.response_time_ms, 0.0);
        assert!(result.improvement.accuracy.is_none());
        assert_eq!(result.control_variant, "control");
    }

    #[test]
    fn test_tied_accuracy_keeps_control() {
        let exp = two_variants();
        let snapshot = vec![
            metrics("control", 500, 50, 450, 500),
            metrics("treatment", 500, 50, 450, 500),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();

        assert_eq!(result.winner_variant_name.as_deref(), Some("control"));
        assert_eq!(result.recommendation, "Keep current model 'control'");
        assert_eq!(result.control_variant_name, "control");
    }

    #[test]
    fn test_small_improvement_keeps_control() {
        let exp = two_variants();
        // 0.90 vs 0.905
        let snapshot = vec![
            metrics("control", 1000, 100, 900, 1000),
            metrics("treatment", 1000, 100, 905, 1000),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();
        assert_eq!(result.winner_variant_name.as_deref(), Some("control"));
    }

    #[test]
    fn test_clear_improvement_deploys_treatment() {
        let exp = two_variants();
        let snapshot = vec![
            metrics("control", 1000, 100, 850, 1000),
            metrics("treatment", 1000, 100, 950, 1000),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();

        assert_eq!(result.winner_variant_name.as_deref(), Some("treatment"));
        assert_eq!(result.recommendation, "Deploy variant 'treatment'");
        assert!(!result.low_confidence);
        assert_eq!(result.per_variant_comparison.len(), 1);
    }

    #[test]
    fn test_best_of_several_treatments() {
        let exp = experiment(
            vec![
                VariantConfig::new("variant_A", "m1", 25.0).with_control(true),
                VariantConfig::new("variant_B", "m2", 25.0),
                VariantConfig::new("variant_C", "m3", 25.0),
                VariantConfig::new("variant_D", "m4", 25.0),
            ],
            10,
        );
        let snapshot = vec![
            metrics("variant_A", 100, 10, 80, 100),
            metrics("variant_B", 100, 10, 90, 100),
            metrics("variant_C", 100, 10, 95, 100),
            metrics("variant_D", 100, 10, 95, 100),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();

        // C and D tie; the earlier one wins
        assert_eq!(result.winner_variant_name.as_deref(), Some("variant_C"));
        assert_eq!(result.per_variant_comparison.len(), 3);
    }

    #[test]
    fn test_undersampled_annotates_result() {
        let exp = two_variants();
        let snapshot = vec![
            metrics("control", 150, 15, 120, 150),
            metrics("treatment", 40, 4, 38, 40),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();

        assert!(result.low_confidence);
        assert_eq!(result.undersampled_variants, vec!["treatment".to_string()]);
        assert_eq!(result.winner_variant_name.as_deref(), Some("treatment"));
    }

    #[test]
    fn test_no_observations() {
        let exp = two_variants();

        let result = determine_winner(&exp, &[]).unwrap();

        assert_eq!(result.winner_variant_name.as_deref(), Some("control"));
        assert_eq!(result.confidence, 0.0);
        assert!(!result.statistically_significant);
        assert!(result.low_confidence);
        let comparison = result.comparison("treatment").unwrap();
        assert_eq!(comparison.p_value, 1.0);
    }

    #[test]
    fn test_single_variant_has_zero_confidence() {
        let exp = experiment(vec![VariantConfig::new("only", "m1", 100.0)], 1);

        let result = determine_winner(&exp, &[metrics("only", 10, 1, 0, 0)]).unwrap();

        assert_eq!(result.confidence, 0.0);
        assert!(result.per_variant_comparison.is_empty());
        assert_eq!(result.recommendation, "Keep current model 'only'");
    }

    #[test]
    fn test_confidence_is_max_over_comparisons() {
        let exp = experiment(
            vec![
                VariantConfig::new("control", "m1", 34.0).with_control(true),
                VariantConfig::new("b", "m2", 33.0),
                VariantConfig::new("c", "m3", 33.0),
            ],
            1,
        );
        let snapshot = vec![
            metrics("control", 1000, 20, 0, 0),
            metrics("b", 1000, 25, 0, 0),
            metrics("c", 1000, 60, 0, 0),
        ];

        let result = determine_winner(&exp, &snapshot).unwrap();

        let best = result
            .per_variant_comparison
            .values()
            .map(|c| 1.0 - c.p_value)
            .fold(0.0, f64::max);
        assert_eq!(result.confidence, best);
        assert!(result.comparison("c").unwrap().is_significant);
        assert!(result.statistically_significant);
    }
}
