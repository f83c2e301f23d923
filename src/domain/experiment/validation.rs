//! Experiment validation utilities

use std::collections::HashSet;

use thiserror::Error;

use super::entity::VariantConfig;

/// Maximum length for experiment IDs
pub const MAX_EXPERIMENT_ID_LENGTH: usize = 50;

/// Maximum length for experiment names
pub const MAX_EXPERIMENT_NAME_LENGTH: usize = 200;

/// Maximum length for variant names
pub const MAX_VARIANT_NAME_LENGTH: usize = 64;

/// Allowed deviation of the traffic split total from 100
pub const TRAFFIC_SUM_TOLERANCE: f64 = 0.01;

// Absorbs binary rounding so that e.g. 33.33 * 3 sits on the boundary, not past it.
const FLOAT_SLACK: f64 = 1e-9;

/// Validation errors for experiments and variants
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExperimentValidationError {
    #[error("Experiment ID cannot be empty")]
    EmptyId,

    #[error("Experiment ID exceeds maximum length of {0} characters")]
    IdTooLong(usize),

    #[error("Experiment ID must start with a letter or number")]
    InvalidIdStart,

    #[error("Experiment ID must end with a letter or number")]
    InvalidIdEnd,

    #[error("Experiment ID contains invalid character: '{0}'")]
    InvalidIdCharacter(char),

    #[error("Experiment ID cannot contain consecutive hyphens")]
    ConsecutiveHyphens,

    #[error("Experiment name cannot be empty")]
    EmptyName,

    #[error("Experiment name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("Experiment must have at least one variant")]
    NoVariants,

    #[error("Variant name cannot be empty")]
    EmptyVariantName,

    #[error("Variant name exceeds maximum length of {0} characters")]
    VariantNameTooLong(usize),

    #[error("Duplicate variant name: '{0}'")]
    DuplicateVariantName(String),

    #[error("Variant '{0}' has an empty model reference")]
    EmptyModelReference(String),

    #[error("Variant '{name}' has invalid traffic percentage {percentage} (expected 0-100)")]
    InvalidTrafficPercentage { name: String, percentage: f64 },

    #[error("Traffic percentages must sum to 100, got {0}")]
    InvalidTrafficSum(f64),

    #[error("At most one control variant is allowed, found {0}")]
    MultipleControlVariants(usize),

    #[error("Confidence level must be between 0 and 1 (exclusive), got {0}")]
    InvalidConfidenceLevel(f64),
}

/// Validate an experiment ID
pub fn validate_experiment_id(id: &str) -> Result<(), ExperimentValidationError> {
    let (Some(first_char), Some(last_char)) = (id.chars().next(), id.chars().last()) else {
        return Err(ExperimentValidationError::EmptyId);
    };

    if id.len() > MAX_EXPERIMENT_ID_LENGTH {
        return Err(ExperimentValidationError::IdTooLong(MAX_EXPERIMENT_ID_LENGTH));
    }

    if !first_char.is_ascii_alphanumeric() {
        return Err(ExperimentValidationError::InvalidIdStart);
    }

    if !last_char.is_ascii_alphanumeric() {
        return Err(ExperimentValidationError::InvalidIdEnd);
    }

    let mut prev_was_hyphen = false;

    for ch in id.chars() {
        if ch == '-' {
            if prev_was_hyphen {
                return Err(ExperimentValidationError::ConsecutiveHyphens);
            }
            prev_was_hyphen = true;
        } else if ch.is_ascii_alphanumeric() {
            prev_was_hyphen = false;
        } else {
            return Err(ExperimentValidationError::InvalidIdCharacter(ch));
        }
    }

    Ok(())
}

/// Validate a human-readable experiment name
pub fn validate_experiment_name(name: &str) -> Result<(), ExperimentValidationError> {
    if name.trim().is_empty() {
        return Err(ExperimentValidationError::EmptyName);
    }

    if name.len() > MAX_EXPERIMENT_NAME_LENGTH {
        return Err(ExperimentValidationError::NameTooLong(
            MAX_EXPERIMENT_NAME_LENGTH,
        ));
    }

    Ok(())
}

/// Validate a variant name
pub fn validate_variant_name(name: &str) -> Result<(), ExperimentValidationError> {
    if name.trim().is_empty() {
        return Err(ExperimentValidationError::EmptyVariantName);
    }

    if name.len() > MAX_VARIANT_NAME_LENGTH {
        return Err(ExperimentValidationError::VariantNameTooLong(
            MAX_VARIANT_NAME_LENGTH,
        ));
    }

    Ok(())
}

/// Validate the statistical confidence level
pub fn validate_confidence_level(level: f64) -> Result<(), ExperimentValidationError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(ExperimentValidationError::InvalidConfidenceLevel(level));
    }

    Ok(())
}

/// Sum of traffic percentages across variants
pub fn traffic_total(variants: &[VariantConfig]) -> f64 {
    variants.iter().map(|v| v.traffic_percentage()).sum()
}

/// Check that a traffic total is 100 within tolerance
pub fn traffic_sums_to_100(total: f64) -> bool {
    (total - 100.0).abs() <= TRAFFIC_SUM_TOLERANCE + FLOAT_SLACK
}

/// Validate a full variant list: names, percentages, control count and split
pub fn validate_variants(variants: &[VariantConfig]) -> Result<(), ExperimentValidationError> {
    if variants.is_empty() {
        return Err(ExperimentValidationError::NoVariants);
    }

    let mut seen = HashSet::new();

    for variant in variants {
        validate_variant_name(variant.name())?;

        if !seen.insert(variant.name()) {
            return Err(ExperimentValidationError::DuplicateVariantName(
                variant.name().to_string(),
            ));
        }

        if variant.model_reference().trim().is_empty() {
            return Err(ExperimentValidationError::EmptyModelReference(
                variant.name().to_string(),
            ));
        }

        let percentage = variant.traffic_percentage();

        if !(0.0..=100.0).contains(&percentage) {
            return Err(ExperimentValidationError::InvalidTrafficPercentage {
                name: variant.name().to_string(),
                percentage,
            });
        }
    }

    let controls = variants.iter().filter(|v| v.is_control()).count();

    if controls > 1 {
        return Err(ExperimentValidationError::MultipleControlVariants(controls));
    }

    let total = traffic_total(variants);

    if !traffic_sums_to_100(total) {
        return Err(ExperimentValidationError::InvalidTrafficSum(total));
    }

    Ok(())
}
