//! Experiment domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::result::AnalysisResult;
use super::status::{ExperimentStateError, ExperimentStatus};
use super::validation::{
    traffic_sums_to_100, traffic_total, validate_confidence_level, validate_experiment_id,
    validate_experiment_name, validate_variants, ExperimentValidationError,
};
use crate::domain::DomainError;

/// Default minimum number of observations per variant before analysis is trusted
pub const DEFAULT_MIN_SAMPLES_PER_VARIANT: u64 = 1000;

/// Default confidence level for significance testing
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

// ============================================================================
// ExperimentId
// ============================================================================

/// Unique identifier for an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Create an experiment ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ExperimentValidationError> {
        let id = id.into();
        validate_experiment_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh opaque ID
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("exp-{}", &uuid[..12]))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentId {
    type Error = ExperimentValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExperimentId> for String {
    fn from(id: ExperimentId) -> Self {
        id.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// AssignmentHash
// ============================================================================

/// Versioned hash scheme used to bucket callers
///
/// Changing the scheme reassigns every caller, so an experiment keeps the
/// scheme it was created with for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AssignmentHash {
    /// SHA-256 of `"{caller}:{experiment}"`, digest taken as a big-endian integer mod 100
    #[default]
    #[serde(rename = "sha256-v1")]
    Sha256V1,
}

impl fmt::Display for AssignmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256V1 => write!(f, "sha256-v1"),
        }
    }
}

// ============================================================================
// VariantConfig
// ============================================================================

/// One model variant under test and its share of traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    name: String,
    model_reference: String,
    traffic_percentage: f64,
    #[serde(default)]
    is_control: bool,
}

impl VariantConfig {
    /// Create a new (non-control) variant
    pub fn new(
        name: impl Into<String>,
        model_reference: impl Into<String>,
        traffic_percentage: f64,
    ) -> Self {
        Self {
            name: name.into(),
            model_reference: model_reference.into(),
            traffic_percentage,
            is_control: false,
        }
    }

    /// Set whether this is the control variant
    pub fn with_control(mut self, is_control: bool) -> Self {
        self.is_control = is_control;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque handle passed to the model serving service
    pub fn model_reference(&self) -> &str {
        &self.model_reference
    }

    pub fn traffic_percentage(&self) -> f64 {
        self.traffic_percentage
    }

    pub fn is_control(&self) -> bool {
        self.is_control
    }
}

// ============================================================================
// ExperimentSettings
// ============================================================================

/// Statistical settings of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    pub min_samples_per_variant: u64,
    pub confidence_level: f64,
}

impl ExperimentSettings {
    pub fn new(min_samples_per_variant: u64, confidence_level: f64) -> Self {
        Self {
            min_samples_per_variant,
            confidence_level,
        }
    }

    pub fn validate(&self) -> Result<(), ExperimentValidationError> {
        validate_confidence_level(self.confidence_level)
    }
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            min_samples_per_variant: DEFAULT_MIN_SAMPLES_PER_VARIANT,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

// ============================================================================
// Experiment
// ============================================================================

/// An A/B test comparing model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ExperimentData", into = "ExperimentData")]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    description: String,
    status: ExperimentStatus,
    variants: Vec<VariantConfig>,
    variant_index: HashMap<String, usize>,
    settings: ExperimentSettings,
    assignment_hash: AssignmentHash,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_result: Option<AnalysisResult>,
}

impl Experiment {
    /// Create a validated experiment in Draft status
    pub fn new(
        id: ExperimentId,
        name: impl Into<String>,
        description: impl Into<String>,
        variants: Vec<VariantConfig>,
        settings: ExperimentSettings,
    ) -> Result<Self, ExperimentValidationError> {
        let name = name.into();
        validate_experiment_name(&name)?;
        validate_variants(&variants)?;
        settings.validate()?;

        let now = Utc::now();
        Ok(Self {
            id,
            name,
            description: description.into(),
            status: ExperimentStatus::Draft,
            variant_index: build_index(&variants),
            variants,
            settings,
            assignment_hash: AssignmentHash::default(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            last_result: None,
        })
    }

    // Getters

    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Variants in insertion order
    pub fn variants(&self) -> &[VariantConfig] {
        &self.variants
    }

    pub fn settings(&self) -> ExperimentSettings {
        self.settings
    }

    pub fn min_samples_per_variant(&self) -> u64 {
        self.settings.min_samples_per_variant
    }

    pub fn confidence_level(&self) -> f64 {
        self.settings.confidence_level
    }

    pub fn assignment_hash(&self) -> AssignmentHash {
        self.assignment_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Snapshot of the most recent analysis
    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last_result.as_ref()
    }

    /// Look up a variant by name
    pub fn variant(&self, name: &str) -> Option<&VariantConfig> {
        self.variant_index.get(name).map(|&i| &self.variants[i])
    }

    /// The control variant: first marked control, else the first variant
    pub fn control_variant(&self) -> Option<&VariantConfig> {
        self.variants
            .iter()
            .find(|v| v.is_control())
            .or_else(|| self.variants.first())
    }

    /// Whether any variant is explicitly marked as control
    pub fn has_explicit_control(&self) -> bool {
        self.variants.iter().any(|v| v.is_control())
    }

    /// Model references used by the variants
    pub fn referenced_models(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.model_reference()).collect()
    }

    // Configuration

    /// Append a variant; the resulting variant list must be valid
    pub fn add_variant(&mut self, variant: VariantConfig) -> Result<(), DomainError> {
        if !self.status.is_editable() {
            return Err(ExperimentStateError::NotEditable(self.status).into());
        }

        let mut variants = self.variants.clone();
        variants.push(variant);
        validate_variants(&variants)?;

        self.variant_index = build_index(&variants);
        self.variants = variants;
        self.touch();
        Ok(())
    }

    // Status transitions

    /// Start the experiment (Draft -> Running)
    pub fn start(&mut self) -> Result<(), ExperimentStateError> {
        if self.status != ExperimentStatus::Draft {
            return Err(self.invalid("start"));
        }

        if self.variants.is_empty() {
            return Err(ExperimentStateError::NoVariants);
        }

        let total = traffic_total(&self.variants);

        if !traffic_sums_to_100(total) {
            return Err(ExperimentStateError::InvalidTrafficSum(total));
        }

        self.status = ExperimentStatus::Running;
        self.started_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Pause the experiment (Running -> Paused)
    pub fn pause(&mut self) -> Result<(), ExperimentStateError> {
        if self.status != ExperimentStatus::Running {
            return Err(self.invalid("pause"));
        }

        self.status = ExperimentStatus::Paused;
        self.touch();
        Ok(())
    }

    /// Resume the experiment (Paused -> Running)
    pub fn resume(&mut self) -> Result<(), ExperimentStateError> {
        if self.status != ExperimentStatus::Paused {
            return Err(self.invalid("resume"));
        }

        self.status = ExperimentStatus::Running;
        self.touch();
        Ok(())
    }

    /// Complete the experiment with its final analysis (Running|Paused -> Completed)
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), ExperimentStateError> {
        if !self.status.can_transition_to(ExperimentStatus::Completed) {
            return Err(self.invalid("complete"));
        }

        self.status = ExperimentStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.last_result = Some(result);
        self.touch();
        Ok(())
    }

    /// Cancel the experiment from any non-terminal status
    pub fn cancel(&mut self) -> Result<(), ExperimentStateError> {
        if !self.status.can_transition_to(ExperimentStatus::Cancelled) {
            return Err(self.invalid("cancel"));
        }

        self.status = ExperimentStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Record an on-demand analysis without changing status
    ///
    /// Terminal experiments keep the analysis they finished with.
    pub fn set_last_result(&mut self, result: AnalysisResult) -> Result<(), ExperimentStateError> {
        if self.status.is_terminal() {
            return Err(self.invalid("analyze"));
        }

        self.last_result = Some(result);
        self.touch();
        Ok(())
    }

    // Private helpers

    fn invalid(&self, action: &'static str) -> ExperimentStateError {
        ExperimentStateError::InvalidTransition {
            from: self.status,
            action,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn build_index(variants: &[VariantConfig]) -> HashMap<String, usize> {
    variants
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name().to_string(), i))
        .collect()
}

/// Serialized form of an experiment; the name index is rebuilt on load
#[derive(Serialize, Deserialize)]
struct ExperimentData {
    id: ExperimentId,
    name: String,
    #[serde(default)]
    description: String,
    status: ExperimentStatus,
    variants: Vec<VariantConfig>,
    min_samples_per_variant: u64,
    confidence_level: f64,
    #[serde(default)]
    assignment_hash: AssignmentHash,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_result: Option<AnalysisResult>,
}

impl From<ExperimentData> for Experiment {
    fn from(data: ExperimentData) -> Self {
        Self {
            variant_index: build_index(&data.variants),
            id: data.id,
            name: data.name,
            description: data.description,
            status: data.status,
            variants: data.variants,
            settings: ExperimentSettings::new(data.min_samples_per_variant, data.confidence_level),
            assignment_hash: data.assignment_hash,
            created_at: data.created_at,
            updated_at: data.updated_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
            last_result: data.last_result,
        }
    }
}

impl From<Experiment> for ExperimentData {
    fn from(experiment: Experiment) -> Self {
        Self {
            id: experiment.id,
            name: experiment.name,
            description: experiment.description,
            status: experiment.status,
            variants: experiment.variants,
            min_samples_per_variant: experiment.settings.min_samples_per_variant,
            confidence_level: experiment.settings.confidence_level,
            assignment_hash: experiment.assignment_hash,
            created_at: experiment.created_at,
            updated_at: experiment.updated_at,
            started_at: experiment.started_at,
            completed_at: experiment.completed_at,
            last_result: experiment.last_result,
        }
    }
}
