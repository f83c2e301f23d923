//! Experiment registry for A/B testing
//!
//! Owns every experiment and its counters, routes callers to variants and
//! runs analysis on demand or at completion.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::experiment::{
    AnalysisResult, Experiment, ExperimentId, ExperimentQuery, ExperimentReport,
    ExperimentRepository, ExperimentSettings, ExperimentStatus, VariantConfig, VariantMetrics,
};
use crate::domain::serving::{ModelPrediction, ModelServingService};
use crate::domain::DomainError;
use crate::infrastructure::experiment::{determine_winner, AssignmentRouter, MetricsAggregator};
use crate::infrastructure::observability::{
    record_prediction, record_transition, PredictionMetricParams, PredictionStatus,
};
use crate::infrastructure::serving::MODEL_SERVING_SERVICE;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Request to create a new experiment
#[derive(Debug, Clone, Default)]
pub struct CreateExperimentRequest {
    pub name: String,
    pub description: String,
    pub variants: Vec<VariantConfig>,
    pub min_samples_per_variant: Option<u64>,
    pub confidence_level: Option<f64>,
}

/// Request to create an experiment straight from model references
///
/// Variants are named `variant_A`, `variant_B`, ... with the first model as
/// control. Traffic is split equally unless a split is given.
#[derive(Debug, Clone, Default)]
pub struct CreateFromModelsRequest {
    pub name: String,
    pub description: String,
    pub control_model: String,
    pub treatment_models: Vec<String>,
    pub traffic_split: Option<Vec<f64>>,
    pub min_samples_per_variant: Option<u64>,
}

/// Result of a routed prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub experiment_id: String,
    pub variant_name: String,
    pub model_reference: String,
    pub prediction: ModelPrediction,
    pub response_time_ms: f64,
}

/// Registry defaults
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub default_settings: ExperimentSettings,
    pub prediction_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_settings: ExperimentSettings::default(),
            prediction_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Registry Entry
// ============================================================================

/// One experiment plus the guard that serializes its transitions
#[derive(Debug)]
struct ExperimentEntry {
    experiment: RwLock<Experiment>,
    transitions: tokio::sync::Mutex<()>,
}

impl ExperimentEntry {
    fn new(experiment: Experiment) -> Self {
        Self {
            experiment: RwLock::new(experiment),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Experiment>, DomainError> {
        self.experiment
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn snapshot(&self) -> Result<Experiment, DomainError> {
        Ok(self.read()?.clone())
    }

    fn replace(&self, experiment: Experiment) -> Result<(), DomainError> {
        let mut current = self
            .experiment
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;
        *current = experiment;
        Ok(())
    }
}

// ============================================================================
// Experiment Registry
// ============================================================================

/// Catalogue of experiments, shared behind an `Arc`
///
/// The map lock is only held to look up, insert or remove an entry. Each
/// experiment has its own lock, and nothing is locked while waiting on the
/// model serving backend or while computing statistics.
pub struct ExperimentRegistry {
    experiments: RwLock<HashMap<String, Arc<ExperimentEntry>>>,
    aggregator: MetricsAggregator,
    router: AssignmentRouter,
    model_serving: Arc<dyn ModelServingService>,
    repository: Option<Arc<dyn ExperimentRepository>>,
    config: RegistryConfig,
}

impl ExperimentRegistry {
    /// Create a purely in-memory registry
    pub fn new(model_serving: Arc<dyn ModelServingService>, config: RegistryConfig) -> Self {
        Self {
            experiments: RwLock::new(HashMap::new()),
            aggregator: MetricsAggregator::new(),
            router: AssignmentRouter::new(),
            model_serving,
            repository: None,
            config,
        }
    }

    /// Persist experiment definitions to a repository
    pub fn with_repository(mut self, repository: Arc<dyn ExperimentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ========================================================================
    // Catalogue
    // ========================================================================

    /// Create an experiment in Draft status
    pub async fn create_experiment(
        &self,
        request: CreateExperimentRequest,
    ) -> Result<Experiment, DomainError> {
        let defaults = self.config.default_settings;
        let settings = ExperimentSettings::new(
            request
                .min_samples_per_variant
                .unwrap_or(defaults.min_samples_per_variant),
            request.confidence_level.unwrap_or(defaults.confidence_level),
        );

        let experiment = Experiment::new(
            ExperimentId::generate(),
            request.name,
            request.description,
            request.variants,
            settings,
        )?;

        if !experiment.has_explicit_control() {
            if let Some(fallback) = experiment.control_variant() {
                warn!(
                    experiment_id = %experiment.id(),
                    control = %fallback.name(),
                    "No control variant marked, using the first variant"
                );
            }
        }

        self.insert(experiment.clone())?;

        if let Some(ref repository) = self.repository {
            if let Err(e) = repository.create(experiment.clone()).await {
                self.discard(experiment.id().as_str())?;
                return Err(e);
            }
        }

        info!(
            experiment_id = %experiment.id(),
            name = %experiment.name(),
            variants = experiment.variants().len(),
            "Created experiment"
        );

        Ok(experiment)
    }

    /// Create an experiment from a control model and treatment models
    pub async fn create_from_models(
        &self,
        request: CreateFromModelsRequest,
    ) -> Result<Experiment, DomainError> {
        let models: Vec<String> = std::iter::once(request.control_model)
            .chain(request.treatment_models)
            .collect();

        let split = match request.traffic_split {
            Some(split) if split.len() != models.len() => {
                return Err(DomainError::validation(format!(
                    "Traffic split has {} entries for {} models",
                    split.len(),
                    models.len()
                )));
            }
            Some(split) => split,
            None => vec![100.0 / models.len() as f64; models.len()],
        };

        let variants = models
            .into_iter()
            .zip(split)
            .enumerate()
            .map(|(i, (model, percentage))| {
                VariantConfig::new(generated_variant_name(i), model, percentage)
                    .with_control(i == 0)
            })
            .collect();

        self.create_experiment(CreateExperimentRequest {
            name: request.name,
            description: request.description,
            variants,
            min_samples_per_variant: request.min_samples_per_variant,
            confidence_level: None,
        })
        .await
    }

    /// Get an experiment by ID
    pub fn get_experiment(&self, id: &str) -> Result<Option<Experiment>, DomainError> {
        match self.lookup(id)? {
            Some(entry) => Ok(Some(entry.snapshot()?)),
            None => Ok(None),
        }
    }

    /// List experiments, newest first, optionally filtered by status
    pub fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> Result<Vec<Experiment>, DomainError> {
        let entries: Vec<Arc<ExperimentEntry>> = {
            let experiments = self.experiments.read().map_err(|e| {
                DomainError::internal(format!("Failed to acquire read lock: {}", e))
            })?;
            experiments.values().cloned().collect()
        };

        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            let experiment = entry.snapshot()?;

            if status.is_none_or(|s| experiment.status() == s) {
                results.push(experiment);
            }
        }

        results.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        Ok(results)
    }

    /// Experiments currently routing traffic
    pub fn get_active_experiments(&self) -> Result<Vec<Experiment>, DomainError> {
        self.list_experiments(Some(ExperimentStatus::Running))
    }

    /// Drop an experiment together with its counters
    ///
    /// The stored copy goes first; if that fails the experiment stays live.
    pub async fn remove_experiment(&self, id: &str) -> Result<bool, DomainError> {
        let Some(entry) = self.lookup(id)? else {
            return Ok(false);
        };
        let _guard = entry.transitions.lock().await;

        if let Some(ref repository) = self.repository {
            let experiment_id = entry.read()?.id().clone();
            repository.delete(&experiment_id).await?;
        }

        let removed = self.discard(id)?;

        if removed {
            info!(experiment_id = %id, "Removed experiment");
        }

        Ok(removed)
    }

    /// Stored experiment definitions matching a query, newest first
    ///
    /// Includes experiments this instance has not restored.
    pub async fn list_stored_experiments(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<Experiment>, DomainError> {
        let repository = self.repository.as_ref().ok_or_else(|| {
            DomainError::configuration("No experiment repository configured")
        })?;

        repository.list(query).await
    }

    /// Load a persisted experiment into the registry with fresh counters
    pub async fn restore_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        let repository = self.repository.as_ref().ok_or_else(|| {
            DomainError::configuration("No experiment repository configured")
        })?;

        let experiment_id = ExperimentId::new(id)?;
        let experiment = repository
            .get(&experiment_id)
            .await?
            .ok_or_else(|| DomainError::experiment_not_found(id))?;

        self.insert(experiment.clone())?;

        info!(
            experiment_id = %id,
            status = %experiment.status(),
            "Restored experiment"
        );

        Ok(experiment)
    }

    // ========================================================================
    // Configuration & Lifecycle
    // ========================================================================

    /// Add a variant to a Draft experiment
    pub async fn add_variant(
        &self,
        id: &str,
        variant: VariantConfig,
    ) -> Result<Experiment, DomainError> {
        let name = variant.name().to_string();
        let experiment = self
            .transition(id, "add_variant", |e| e.add_variant(variant))
            .await?;

        self.aggregator.add_variant(id, &name)?;
        Ok(experiment)
    }

    pub async fn start_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        self.transition(id, "start", |e| Ok(e.start()?)).await
    }

    pub async fn pause_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        self.transition(id, "pause", |e| Ok(e.pause()?)).await
    }

    pub async fn resume_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        self.transition(id, "resume", |e| Ok(e.resume()?)).await
    }

    pub async fn cancel_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        self.transition(id, "cancel", |e| Ok(e.cancel()?)).await
    }

    /// Analyze and complete a Running or Paused experiment
    pub async fn complete_experiment(&self, id: &str) -> Result<AnalysisResult, DomainError> {
        let experiment = self.entry(id)?.snapshot()?;

        if !experiment
            .status()
            .can_transition_to(ExperimentStatus::Completed)
        {
            return Err(DomainError::invalid_transition(format!(
                "Cannot complete an experiment in {} status",
                experiment.status()
            )));
        }

        let result = self.analyze(&experiment)?;
        let attached = result.clone();

        self.transition(id, "complete", move |e| Ok(e.complete(attached)?))
            .await?;

        Ok(result)
    }

    /// Analyze without completing; the result is kept as the last analysis
    ///
    /// A finished experiment keeps the analysis it finished with, even when
    /// it finishes while this analysis is running.
    pub async fn analyze_experiment(&self, id: &str) -> Result<AnalysisResult, DomainError> {
        let experiment = self.entry(id)?.snapshot()?;
        let result = self.analyze(&experiment)?;

        let snapshot = result.clone();
        let stored = self
            .modify(id, move |e| {
                if e.status().is_terminal() {
                    return Ok(false);
                }

                e.set_last_result(snapshot)?;
                Ok(true)
            })
            .await?;

        if stored.is_some() {
            debug!(
                experiment_id = %id,
                winner = ?result.winner_variant_name,
                "Stored analysis"
            );
        }

        Ok(result)
    }

    /// Experiment snapshot with per-variant metrics and analysis
    ///
    /// Completed experiments are re-analyzed over the current counters.
    pub fn export_report(&self, id: &str) -> Result<ExperimentReport, DomainError> {
        let experiment = self.entry(id)?.snapshot()?;
        let variant_metrics = self.aggregator.snapshot_all(id, experiment.variants())?;

        let analysis = if experiment.status() == ExperimentStatus::Completed {
            Some(determine_winner(&experiment, &variant_metrics)?)
        } else {
            experiment.last_result().cloned()
        };

        Ok(ExperimentReport {
            experiment,
            variant_metrics,
            analysis,
        })
    }

    // ========================================================================
    // Traffic
    // ========================================================================

    /// Variant a caller would be routed to, without calling any model
    pub fn assign_variant(&self, id: &str, caller_id: &str) -> Result<VariantConfig, DomainError> {
        let entry = self.entry(id)?;
        let experiment = entry.read()?;

        self.router
            .assign(&experiment, caller_id)
            .cloned()
            .ok_or_else(|| DomainError::validation(format!("Experiment '{}' has no variants", id)))
    }

    /// Route a caller, run the variant's model and record the outcome
    pub async fn predict(
        &self,
        id: &str,
        caller_id: &str,
        features: &[f64],
    ) -> Result<PredictionOutcome, DomainError> {
        self.predict_with_timeout(id, caller_id, features, self.config.prediction_timeout)
            .await
    }

    /// Same as [`predict`](Self::predict) with an explicit serving timeout
    ///
    /// Timeouts, serving errors and dropped futures record nothing.
    pub async fn predict_with_timeout(
        &self,
        id: &str,
        caller_id: &str,
        features: &[f64],
        timeout: Duration,
    ) -> Result<PredictionOutcome, DomainError> {
        let entry = self.entry(id)?;

        let variant = {
            let experiment = entry.read()?;

            if !experiment.status().is_running() {
                return Err(DomainError::not_running(id, experiment.status().as_str()));
            }

            self.router
                .assign(&experiment, caller_id)
                .cloned()
                .ok_or_else(|| {
                    DomainError::validation(format!("Experiment '{}' has no variants", id))
                })?
        };

        debug!(
            experiment_id = %id,
            caller_id = %caller_id,
            variant = %variant.name(),
            "Routing prediction"
        );

        let started = Instant::now();
        let served = tokio::time::timeout(
            timeout,
            self.model_serving
                .predict(variant.model_reference(), features),
        )
        .await;
        let elapsed = started.elapsed();

        let prediction = match served {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(e)) => {
                warn!(
                    experiment_id = %id,
                    variant = %variant.name(),
                    error = %e,
                    "Model serving failed"
                );
                self.observe(id, variant.name(), PredictionStatus::Error, elapsed);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    experiment_id = %id,
                    variant = %variant.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Model serving timed out"
                );
                self.observe(id, variant.name(), PredictionStatus::Timeout, elapsed);
                return Err(DomainError::external_service(
                    MODEL_SERVING_SERVICE,
                    format!("Prediction timed out after {}ms", timeout.as_millis()),
                ));
            }
        };

        let response_time_ms = elapsed.as_secs_f64() * 1000.0;

        self.aggregator.record_outcome(
            id,
            variant.name(),
            prediction.is_fraud,
            None,
            response_time_ms,
        )?;
        self.observe(id, variant.name(), PredictionStatus::Success, elapsed);

        Ok(PredictionOutcome {
            experiment_id: id.to_string(),
            variant_name: variant.name().to_string(),
            model_reference: variant.model_reference().to_string(),
            prediction,
            response_time_ms,
        })
    }

    /// Record an outcome for callers that run inference themselves
    pub fn record_outcome(
        &self,
        id: &str,
        variant_name: &str,
        predicted_fraud: bool,
        actual_fraud: Option<bool>,
        response_time_ms: f64,
    ) -> Result<(), DomainError> {
        self.aggregator
            .record_outcome(id, variant_name, predicted_fraud, actual_fraud, response_time_ms)
    }

    /// Record ground truth for an earlier prediction
    pub fn record_feedback(
        &self,
        id: &str,
        variant_name: &str,
        predicted_fraud: bool,
        actual_fraud: bool,
    ) -> Result<(), DomainError> {
        self.aggregator
            .record_feedback(id, variant_name, predicted_fraud, actual_fraud)
    }

    /// Metrics of one variant
    pub fn variant_metrics(
        &self,
        id: &str,
        variant_name: &str,
    ) -> Result<VariantMetrics, DomainError> {
        self.aggregator.snapshot(id, variant_name)
    }

    /// Metrics of every variant in list order
    pub fn experiment_metrics(&self, id: &str) -> Result<Vec<VariantMetrics>, DomainError> {
        let experiment = self.entry(id)?.snapshot()?;
        self.aggregator.snapshot_all(id, experiment.variants())
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    fn lookup(&self, id: &str) -> Result<Option<Arc<ExperimentEntry>>, DomainError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(experiments.get(id).cloned())
    }

    fn entry(&self, id: &str) -> Result<Arc<ExperimentEntry>, DomainError> {
        self.lookup(id)?
            .ok_or_else(|| DomainError::experiment_not_found(id))
    }

    fn insert(&self, experiment: Experiment) -> Result<(), DomainError> {
        let id = experiment.id().as_str().to_string();
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if experiments.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' already exists",
                id
            )));
        }

        self.aggregator
            .register(&id, experiment.variants().iter().map(|v| v.name()))?;
        experiments.insert(id, Arc::new(ExperimentEntry::new(experiment)));

        Ok(())
    }

    fn discard(&self, id: &str) -> Result<bool, DomainError> {
        let removed = {
            let mut experiments = self.experiments.write().map_err(|e| {
                DomainError::internal(format!("Failed to acquire write lock: {}", e))
            })?;
            experiments.remove(id).is_some()
        };

        if removed {
            self.aggregator.remove(id)?;
        }

        Ok(removed)
    }

    /// Apply a change to a copy, persist it, then publish it
    ///
    /// `apply` sees the live experiment under its transition lock and returns
    /// `false` when there is nothing to save. A rejected change or a failed
    /// save leaves the live experiment untouched.
    async fn modify<F>(&self, id: &str, apply: F) -> Result<Option<Experiment>, DomainError>
    where
        F: FnOnce(&mut Experiment) -> Result<bool, DomainError>,
    {
        let entry = self.entry(id)?;
        let _guard = entry.transitions.lock().await;

        let mut updated = entry.snapshot()?;

        if !apply(&mut updated)? {
            return Ok(None);
        }

        if let Some(ref repository) = self.repository {
            repository.update(updated.clone()).await?;
        }

        entry.replace(updated.clone())?;
        Ok(Some(updated))
    }

    /// A lifecycle or configuration change, counted and logged
    async fn transition<F>(
        &self,
        id: &str,
        action: &'static str,
        apply: F,
    ) -> Result<Experiment, DomainError>
    where
        F: FnOnce(&mut Experiment) -> Result<(), DomainError>,
    {
        let mut from = None;
        let updated = self
            .modify(id, |e| {
                from = Some(e.status());
                apply(e)?;
                Ok(true)
            })
            .await?
            .ok_or_else(|| DomainError::internal("Transition produced no change"))?;
        let from = from.unwrap_or(updated.status());

        record_transition(id, action);

        info!(
            experiment_id = %id,
            action = action,
            from = %from,
            to = %updated.status(),
            "Experiment updated"
        );

        Ok(updated)
    }

    fn analyze(&self, experiment: &Experiment) -> Result<AnalysisResult, DomainError> {
        let id = experiment.id().as_str();
        let metrics = self.aggregator.snapshot_all(id, experiment.variants())?;
        determine_winner(experiment, &metrics)
    }

    fn observe(&self, id: &str, variant: &str, status: PredictionStatus, duration: Duration) {
        record_prediction(PredictionMetricParams {
            experiment_id: id,
            variant,
            status,
            duration,
        });
    }
}

/// `variant_A`, `variant_B`, ... then `variant_27`, `variant_28`, ...
fn generated_variant_name(index: usize) -> String {
    if index < 26 {
        format!("variant_{}", (b'A' + index as u8) as char)
    } else {
        format!("variant_{}", index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::MockExperimentRepository;
    use crate::domain::serving::{FakeModelServing, MockModelServingService};
    use crate::infrastructure::experiment::InMemoryExperimentRepository;

    const BASELINE: &str = "models/baseline.pkl";
    const CANDIDATE: &str = "models/candidate.pkl";

    fn fake_serving() -> FakeModelServing {
        FakeModelServing::new()
            .with_response(BASELINE, ModelPrediction::new(false, 0.05))
            .with_response(CANDIDATE, ModelPrediction::new(true, 0.92))
    }

    fn create_registry(serving: FakeModelServing) -> ExperimentRegistry {
        ExperimentRegistry::new(Arc::new(serving), RegistryConfig::default())
    }

    fn create_request() -> CreateExperimentRequest {
        CreateExperimentRequest {
            name: "Baseline vs candidate".to_string(),
            description: "Fraud model rollout".to_string(),
            variants: vec![
                VariantConfig::new("baseline", BASELINE, 50.0).with_control(true),
                VariantConfig::new("candidate", CANDIDATE, 50.0),
            ],
            min_samples_per_variant: Some(50),
            confidence_level: None,
        }
    }

    async fn running_experiment(registry: &ExperimentRegistry) -> String {
        let experiment = registry.create_experiment(create_request()).await.unwrap();
        let id = experiment.id().to_string();
        registry.start_experiment(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_create_experiment() {
        let registry = create_registry(fake_serving());

        let experiment = registry.create_experiment(create_request()).await.unwrap();

        assert_eq!(experiment.status(), ExperimentStatus::Draft);
        assert_eq!(experiment.min_samples_per_variant(), 50);
        assert_eq!(experiment.confidence_level(), 0.95);

        let loaded = registry
            .get_experiment(experiment.id().as_str())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name(), "Baseline vs candidate");
    }

    #[tokio::test]
    async fn test_create_invalid_split_registers_nothing() {
        let registry = create_registry(fake_serving());
        let mut request = create_request();
        request.variants[1] = VariantConfig::new("candidate", CANDIDATE, 40.0);

        let err = registry.create_experiment(request).await.unwrap_err();

        assert!(matches!(err, DomainError::Validation { .. }));
        assert!(registry.list_experiments(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_confidence_level() {
        let registry = create_registry(fake_serving());
        let mut request = create_request();
        request.confidence_level = Some(1.5);

        let err = registry.create_experiment(request).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_from_models() {
        let registry = create_registry(fake_serving());

        let experiment = registry
            .create_from_models(CreateFromModelsRequest {
                name: "Three way".to_string(),
                control_model: "m0".to_string(),
                treatment_models: vec!["m1".to_string(), "m2".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let names: Vec<_> = experiment.variants().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["variant_A", "variant_B", "variant_C"]);
        assert!(experiment.variants()[0].is_control());
        assert!(!experiment.variants()[1].is_control());
        assert!((experiment.variants()[2].traffic_percentage() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_create_from_models_split_length_mismatch() {
        let registry = create_registry(fake_serving());

        let err = registry
            .create_from_models(CreateFromModelsRequest {
                name: "Mismatch".to_string(),
                control_model: "m0".to_string(),
                treatment_models: vec!["m1".to_string()],
                traffic_split: Some(vec![100.0]),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn test_generated_variant_names() {
        assert_eq!(generated_variant_name(0), "variant_A");
        assert_eq!(generated_variant_name(25), "variant_Z");
        assert_eq!(generated_variant_name(26), "variant_27");
    }

    #[tokio::test]
    async fn test_list_and_active() {
        let registry = create_registry(fake_serving());
        let running = running_experiment(&registry).await;
        registry.create_experiment(create_request()).await.unwrap();

        assert_eq!(registry.list_experiments(None).unwrap().len(), 2);

        let active = registry.get_active_experiments().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id().as_str(), running);

        let drafts = registry
            .list_experiments(Some(ExperimentStatus::Draft))
            .unwrap();
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        let paused = registry.pause_experiment(&id).await.unwrap();
        assert_eq!(paused.status(), ExperimentStatus::Paused);

        let err = registry.pause_experiment(&id).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        registry.resume_experiment(&id).await.unwrap();
        let cancelled = registry.cancel_experiment(&id).await.unwrap();
        assert_eq!(cancelled.status(), ExperimentStatus::Cancelled);

        let err = registry.complete_experiment(&id).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert!(registry
            .get_experiment(&id)
            .unwrap()
            .unwrap()
            .last_result()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_experiment() {
        let registry = create_registry(fake_serving());

        assert!(registry.get_experiment("missing").unwrap().is_none());
        assert!(matches!(
            registry.start_experiment("missing").await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            registry.predict("missing", "caller", &[1.0]).await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(!registry.remove_experiment("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_variant_only_in_draft() {
        let registry = create_registry(fake_serving());
        let experiment = registry.create_experiment(create_request()).await.unwrap();
        let id = experiment.id().to_string();

        let err = registry
            .add_variant(&id, VariantConfig::new("extra", "m3", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(
            registry.get_experiment(&id).unwrap().unwrap().variants().len(),
            2
        );

        let updated = registry
            .add_variant(&id, VariantConfig::new("shadow", "m3", 0.0))
            .await
            .unwrap();
        assert_eq!(updated.variants().len(), 3);
        assert_eq!(registry.variant_metrics(&id, "shadow").unwrap().predictions, 0);

        registry.start_experiment(&id).await.unwrap();
        let err = registry
            .add_variant(&id, VariantConfig::new("late", "m4", 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_predict_requires_running() {
        let serving = Arc::new(fake_serving());
        let registry = ExperimentRegistry::new(serving.clone(), RegistryConfig::default());
        let experiment = registry.create_experiment(create_request()).await.unwrap();
        let id = experiment.id().to_string();

        let err = registry.predict(&id, "caller-1", &[1.0]).await.unwrap_err();

        assert!(matches!(err, DomainError::NotRunning { .. }));
        assert_eq!(serving.calls(), 0);

        registry.start_experiment(&id).await.unwrap();
        registry.pause_experiment(&id).await.unwrap();

        let err = registry.predict(&id, "caller-1", &[1.0]).await.unwrap_err();
        assert!(matches!(err, DomainError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_predict_routes_and_records() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        let outcome = registry.predict(&id, "caller-7", &[0.5, 3.0]).await.unwrap();
        let assigned = registry.assign_variant(&id, "caller-7").unwrap();

        assert_eq!(outcome.variant_name, assigned.name());
        assert_eq!(outcome.model_reference, assigned.model_reference());
        assert_eq!(outcome.prediction.is_fraud, assigned.name() == "candidate");

        let metrics = registry.variant_metrics(&id, assigned.name()).unwrap();
        assert_eq!(metrics.predictions, 1);
        assert!(metrics.accuracy.is_none());
    }

    #[tokio::test]
    async fn test_predict_passes_model_reference_and_features() {
        let mut serving = MockModelServingService::new();
        serving
            .expect_predict()
            .withf(|model, features| model == BASELINE && features == [4.0, 2.0])
            .times(1)
            .returning(|_, _| Ok(ModelPrediction::new(false, 0.2)));

        let registry = ExperimentRegistry::new(Arc::new(serving), RegistryConfig::default());
        let mut request = create_request();
        request.variants = vec![VariantConfig::new("baseline", BASELINE, 100.0)];
        let experiment = registry.create_experiment(request).await.unwrap();
        let id = experiment.id().to_string();
        registry.start_experiment(&id).await.unwrap();

        let outcome = registry.predict(&id, "caller", &[4.0, 2.0]).await.unwrap();
        assert_eq!(outcome.variant_name, "baseline");
    }

    #[tokio::test]
    async fn test_serving_failure_records_nothing() {
        let registry = create_registry(
            FakeModelServing::new()
                .with_failure(BASELINE)
                .with_failure(CANDIDATE),
        );
        let id = running_experiment(&registry).await;

        let err = registry.predict(&id, "caller-1", &[1.0]).await.unwrap_err();

        assert!(matches!(err, DomainError::ExternalService { .. }));
        for metrics in registry.experiment_metrics(&id).unwrap() {
            assert_eq!(metrics.predictions, 0);
        }
    }

    #[tokio::test]
    async fn test_timeout_records_nothing() {
        let registry =
            create_registry(fake_serving().with_delay(Duration::from_millis(500)));
        let id = running_experiment(&registry).await;

        let err = registry
            .predict_with_timeout(&id, "caller-1", &[1.0], Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::ExternalService { .. }));
        assert!(err.to_string().contains("timed out"));
        for metrics in registry.experiment_metrics(&id).unwrap() {
            assert_eq!(metrics.predictions, 0);
        }
    }

    #[tokio::test]
    async fn test_dropped_prediction_records_nothing() {
        let serving = Arc::new(fake_serving().with_delay(Duration::from_millis(500)));
        let registry = ExperimentRegistry::new(serving.clone(), RegistryConfig::default());
        let id = running_experiment(&registry).await;

        tokio::select! {
            _ = registry.predict(&id, "caller-1", &[1.0]) => panic!("prediction should not finish"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        assert_eq!(serving.calls(), 1);
        for metrics in registry.experiment_metrics(&id).unwrap() {
            assert_eq!(metrics.predictions, 0);
        }
    }

    #[tokio::test]
    async fn test_assignment_is_stable() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        for i in 0..50 {
            let caller = format!("caller-{}", i);
            let first = registry.predict(&id, &caller, &[1.0]).await.unwrap();
            let second = registry.predict(&id, &caller, &[2.0]).await.unwrap();
            assert_eq!(first.variant_name, second.variant_name);
        }
    }

    #[tokio::test]
    async fn test_assign_variant_serves_control_when_not_running() {
        let registry = create_registry(fake_serving());
        let mut request = create_request();
        request.variants = vec![
            VariantConfig::new("candidate", CANDIDATE, 90.0),
            VariantConfig::new("baseline", BASELINE, 10.0).with_control(true),
        ];
        let experiment = registry.create_experiment(request).await.unwrap();

        for i in 0..20 {
            let variant = registry
                .assign_variant(experiment.id().as_str(), &format!("caller-{}", i))
                .unwrap();
            assert_eq!(variant.name(), "baseline");
        }
    }

    #[tokio::test]
    async fn test_record_outcome_and_feedback() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        registry
            .record_outcome(&id, "baseline", true, Some(true), 12.0)
            .unwrap();
        registry
            .record_outcome(&id, "baseline", false, None, 8.0)
            .unwrap();
        registry
            .record_feedback(&id, "baseline", false, true)
            .unwrap();

        let metrics = registry.variant_metrics(&id, "baseline").unwrap();
        assert_eq!(metrics.predictions, 2);
        assert_eq!(metrics.correct_predictions, 1);
        assert_eq!(metrics.false_negatives, 1);
        assert_eq!(metrics.avg_response_time_ms, 10.0);
        assert_eq!(metrics.accuracy, Some(0.5));

        let err = registry
            .record_outcome(&id, "missing", true, None, 1.0)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_predictions_conserve_counts() {
        let registry = Arc::new(create_registry(fake_serving()));
        let id = running_experiment(&registry).await;

        let handles: Vec<_> = (0..20)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        let caller = format!("caller-{}-{}", t, i);
                        registry.predict(&id, &caller, &[1.0]).await.unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let total: u64 = registry
            .experiment_metrics(&id)
            .unwrap()
            .iter()
            .map(|m| m.predictions)
            .sum();
        assert_eq!(total, 1000);
    }

    #[tokio::test]
    async fn test_analyze_keeps_running_and_stores_result() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        let result = registry.analyze_experiment(&id).await.unwrap();

        let experiment = registry.get_experiment(&id).unwrap().unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Running);
        assert_eq!(experiment.last_result(), Some(&result));
        assert!(result.low_confidence);
    }

    #[tokio::test]
    async fn test_end_to_end_two_hundred_callers() {
        // A fixed ID pins every caller's bucket
        let repository = Arc::new(InMemoryExperimentRepository::new());
        let request = create_request();
        let experiment = Experiment::new(
            ExperimentId::new("exp-fraud-rollout").unwrap(),
            request.name,
            request.description,
            request.variants,
            ExperimentSettings::new(50, 0.95),
        )
        .unwrap();
        repository.create(experiment).await.unwrap();

        let registry = create_registry(fake_serving()).with_repository(repository);
        registry.restore_experiment("exp-fraud-rollout").await.unwrap();
        let id = "exp-fraud-rollout";
        registry.start_experiment(id).await.unwrap();

        // variant -> (served, labeled, labeled fraud)
        let mut tally: HashMap<String, (u64, u64, u64)> = HashMap::new();

        for i in 0..200 {
            let caller = format!("customer-{}", i);
            let outcome = registry.predict(id, &caller, &[i as f64]).await.unwrap();
            let actual_fraud = i % 10 == 0;

            let (served, labeled, labeled_fraud) =
                tally.entry(outcome.variant_name.clone()).or_default();
            *served += 1;

            // Ground truth only arrives for every other caller of a variant
            if *served % 2 == 1 {
                *labeled += 1;
                if actual_fraud {
                    *labeled_fraud += 1;
                }

                registry
                    .record_feedback(
                        id,
                        &outcome.variant_name,
                        outcome.prediction.is_fraud,
                        actual_fraud,
                    )
                    .unwrap();
            }
        }

        let metrics = registry.experiment_metrics(id).unwrap();
        let baseline = &metrics[0];
        let candidate = &metrics[1];
        let (baseline_served, baseline_labeled, baseline_fraud) = tally["baseline"];
        let (candidate_served, candidate_labeled, candidate_fraud) = tally["candidate"];

        assert_eq!(baseline.predictions + candidate.predictions, 200);
        assert_eq!(baseline.predictions, baseline_served);
        assert_eq!(candidate.predictions, candidate_served);
        // 50/50 split, within 3 standard deviations of 100
        assert!((79..=121).contains(&baseline.predictions), "{}", baseline.predictions);

        // Rates cover every prediction, accuracy only the labeled half
        assert_eq!(baseline.fraud_rate, 0.0);
        assert_eq!(candidate.fraud_rate, 1.0);
        assert_eq!(baseline.labeled(), baseline_labeled);
        assert_eq!(baseline.labeled(), baseline.predictions.div_ceil(2));
        assert_eq!(candidate.labeled(), candidate.predictions.div_ceil(2));
        assert_eq!(baseline.correct_predictions, baseline_labeled - baseline_fraud);
        assert_eq!(baseline.false_negatives, baseline_fraud);
        assert_eq!(candidate.correct_predictions, candidate_fraud);
        assert_eq!(candidate.false_positives, candidate_labeled - candidate_fraud);

        let result = registry.complete_experiment(id).await.unwrap();

        assert_eq!(result.winner_variant_name.as_deref(), Some("baseline"));
        assert_eq!(result.recommendation, "Keep current model 'baseline'");
        assert!(result.statistically_significant);
        assert!(result.confidence > 0.99);
        assert!(!result.low_confidence);

        let comparison = result.comparison("candidate").unwrap();
        assert_eq!(comparison.control_variant, "baseline");
        assert_eq!(comparison.control_metrics.predictions, baseline.predictions);
        assert!(comparison.p_value.is_finite());
        assert!(comparison.p_value < 0.05, "{}", comparison.p_value);
        assert!(comparison.z_statistic > 0.0);
        assert!(comparison.is_significant);

        let experiment = registry.get_experiment(id).unwrap().unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Completed);
        assert!(experiment.completed_at().is_some());
        assert_eq!(experiment.last_result(), Some(&result));

        let err = registry.predict(id, "customer-1", &[1.0]).await.unwrap_err();
        assert!(matches!(err, DomainError::NotRunning { .. }));

        let report = registry.export_report(id).unwrap();
        assert_eq!(report.variant_metrics.len(), 2);
        assert_eq!(
            report.analysis.unwrap().winner_variant_name.as_deref(),
            Some("baseline")
        );
    }

    #[tokio::test]
    async fn test_analysis_never_replaces_completion_result() {
        let repository = Arc::new(
            MockExperimentRepository::new().with_update_delay(Duration::from_millis(100)),
        );
        let registry =
            Arc::new(create_registry(fake_serving()).with_repository(repository.clone()));
        let id = running_experiment(&registry).await;

        let completing = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.complete_experiment(&id).await })
        };

        // Completion now holds the transition lock while it is being saved
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry
            .record_outcome(&id, "candidate", true, None, 5.0)
            .unwrap();

        let analysis = registry.analyze_experiment(&id).await.unwrap();
        let completion = completing.await.unwrap().unwrap();

        assert_eq!(
            analysis.comparison("candidate").unwrap().treatment_metrics.predictions,
            1
        );
        assert_eq!(
            completion.comparison("candidate").unwrap().treatment_metrics.predictions,
            0
        );

        let experiment = registry.get_experiment(&id).unwrap().unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Completed);
        assert_eq!(experiment.last_result(), Some(&completion));

        let stored = repository
            .get(&ExperimentId::new(&id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_result(), Some(&completion));
    }

    #[tokio::test]
    async fn test_analyze_after_completion_keeps_final_result() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        let completion = registry.complete_experiment(&id).await.unwrap();
        registry
            .record_outcome(&id, "candidate", true, None, 5.0)
            .unwrap();

        let analysis = registry.analyze_experiment(&id).await.unwrap();

        assert_eq!(
            analysis.comparison("candidate").unwrap().treatment_metrics.predictions,
            1
        );
        let experiment = registry.get_experiment(&id).unwrap().unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Completed);
        assert_eq!(experiment.last_result(), Some(&completion));
    }

    #[tokio::test]
    async fn test_analyze_persists_result_without_status_change() {
        let repository = Arc::new(InMemoryExperimentRepository::new());
        let registry = create_registry(fake_serving()).with_repository(repository.clone());
        let id = running_experiment(&registry).await;
        let before = registry.get_experiment(&id).unwrap().unwrap();

        let result = registry.analyze_experiment(&id).await.unwrap();

        let stored = repository
            .get(&ExperimentId::new(&id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), ExperimentStatus::Running);
        assert_eq!(stored.started_at(), before.started_at());
        assert_eq!(stored.last_result(), Some(&result));
    }

    #[tokio::test]
    async fn test_remove_drops_counters() {
        let registry = create_registry(fake_serving());
        let id = running_experiment(&registry).await;

        assert!(registry.remove_experiment(&id).await.unwrap());

        assert!(registry.get_experiment(&id).unwrap().is_none());
        assert!(matches!(
            registry.variant_metrics(&id, "baseline"),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_repository_persists_transitions_and_restores() {
        let repository = Arc::new(InMemoryExperimentRepository::new());
        let registry = create_registry(fake_serving()).with_repository(repository.clone());
        let id = running_experiment(&registry).await;

        registry
            .record_outcome(&id, "baseline", false, None, 5.0)
            .unwrap();

        let stored = repository
            .get(&ExperimentId::new(&id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), ExperimentStatus::Running);

        // A second instance picks the experiment up with zeroed counters
        let other = create_registry(fake_serving()).with_repository(repository.clone());
        let restored = other.restore_experiment(&id).await.unwrap();

        assert_eq!(restored.status(), ExperimentStatus::Running);
        assert_eq!(other.variant_metrics(&id, "baseline").unwrap().predictions, 0);
        assert_eq!(
            other.assign_variant(&id, "customer-9").unwrap().name(),
            registry.assign_variant(&id, "customer-9").unwrap().name()
        );

        let err = other.restore_experiment(&id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_experiment() {
        let repository = Arc::new(MockExperimentRepository::new());
        let registry = create_registry(fake_serving()).with_repository(repository.clone());
        let id = running_experiment(&registry).await;
        registry
            .record_outcome(&id, "baseline", false, None, 5.0)
            .unwrap();

        repository.set_failing(true);
        let err = registry.remove_experiment(&id).await.unwrap_err();

        assert!(matches!(err, DomainError::Storage { .. }));
        assert!(registry.get_experiment(&id).unwrap().is_some());
        assert_eq!(registry.variant_metrics(&id, "baseline").unwrap().predictions, 1);

        repository.set_failing(false);
        let experiment_id = ExperimentId::new(&id).unwrap();
        assert!(repository.exists(&experiment_id).await.unwrap());

        assert!(registry.remove_experiment(&id).await.unwrap());
        assert!(!repository.exists(&experiment_id).await.unwrap());
        assert!(!registry.remove_experiment(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_stored_experiments() {
        let repository = Arc::new(InMemoryExperimentRepository::new());
        let registry = create_registry(fake_serving()).with_repository(repository.clone());
        let running = running_experiment(&registry).await;
        let draft = registry
            .create_from_models(CreateFromModelsRequest {
                name: "Neural net".to_string(),
                control_model: BASELINE.to_string(),
                treatment_models: vec!["models/nn.pkl".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        // Stored definitions are visible before this instance restores them
        let other = create_registry(fake_serving()).with_repository(repository);
        assert!(other.list_experiments(None).unwrap().is_empty());

        let all = other
            .list_stored_experiments(&ExperimentQuery::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let by_status = other
            .list_stored_experiments(&ExperimentQuery::new().with_status(ExperimentStatus::Running))
            .await
            .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].id().as_str(), running);

        let by_model = other
            .list_stored_experiments(&ExperimentQuery::new().with_model("models/nn.pkl"))
            .await
            .unwrap();
        assert_eq!(by_model.len(), 1);
        assert_eq!(by_model[0].id(), draft.id());

        let page = other
            .list_stored_experiments(&ExperimentQuery::new().with_offset(1).with_limit(5))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_without_repository() {
        let registry = create_registry(fake_serving());

        let err = registry.restore_experiment("exp-1").await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));

        let err = registry
            .list_stored_experiments(&ExperimentQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_applied() {
        let repository = Arc::new(MockExperimentRepository::new().with_error());
        let registry = create_registry(fake_serving()).with_repository(repository.clone());

        let err = registry.create_experiment(create_request()).await.unwrap_err();

        assert!(matches!(err, DomainError::Storage { .. }));
        assert!(registry.list_experiments(None).unwrap().is_empty());

        repository.set_failing(false);
        let experiment = registry.create_experiment(create_request()).await.unwrap();

        assert_eq!(registry.list_experiments(None).unwrap().len(), 1);
        assert_eq!(
            registry.variant_metrics(experiment.id().as_str(), "baseline").unwrap().predictions,
            0
        );
        let stored = registry
            .list_stored_experiments(&ExperimentQuery::new())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), experiment.id());
    }
}
