//! Experiment (A/B testing) admin endpoints

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::experiment::{
    AnalysisResult, Experiment, ExperimentQuery, ExperimentReport, ExperimentStatus, VariantConfig,
    VariantMetrics,
};
use crate::infrastructure::experiment::ConsistentHasher;
use crate::infrastructure::services::{
    CreateExperimentRequest, CreateFromModelsRequest, PredictionOutcome,
};

// ============================================================================
// Request Types
// ============================================================================

/// Request to create a new experiment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExperimentApiRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantApiRequest>,
    #[serde(default)]
    pub min_samples_per_variant: Option<u64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
}

/// Variant definition
#[derive(Debug, Clone, Deserialize)]
pub struct VariantApiRequest {
    pub name: String,
    pub model_reference: String,
    pub traffic_percentage: f64,
    #[serde(default)]
    pub is_control: bool,
}

/// Request to create an experiment from model references
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFromModelsApiRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub control_model: String,
    pub treatment_models: Vec<String>,
    #[serde(default)]
    pub traffic_split: Option<Vec<f64>>,
    #[serde(default)]
    pub min_samples_per_variant: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListExperimentsQuery {
    pub status: Option<String>,
}

/// Filters for stored experiment definitions
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoredExperimentsQuery {
    pub status: Option<String>,
    pub model_reference: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentQuery {
    pub caller_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictApiRequest {
    pub caller_id: String,
    pub features: Vec<f64>,
}

/// Outcome recorded by callers that ran the model themselves
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeApiRequest {
    pub variant_name: String,
    pub predicted_fraud: bool,
    #[serde(default)]
    pub actual_fraud: Option<bool>,
    #[serde(default)]
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackApiRequest {
    pub variant_name: String,
    pub predicted_fraud: bool,
    pub actual_fraud: bool,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ListExperimentsResponse {
    pub experiments: Vec<Experiment>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResponse {
    pub experiment_id: String,
    pub caller_id: String,
    pub bucket: u32,
    pub variant_name: String,
    pub model_reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentMetricsResponse {
    pub experiment_id: String,
    pub variants: Vec<VariantMetrics>,
}

// ============================================================================
// Conversion Implementations
// ============================================================================

fn parse_status(s: &str) -> Result<ExperimentStatus, ApiError> {
    ExperimentStatus::from_str(s).map_err(|_| {
        ApiError::bad_request(format!(
            "Invalid status '{}'. Valid values: draft, running, paused, completed, cancelled",
            s
        ))
    })
}

impl From<VariantApiRequest> for VariantConfig {
    fn from(request: VariantApiRequest) -> Self {
        VariantConfig::new(
            request.name,
            request.model_reference,
            request.traffic_percentage,
        )
        .with_control(request.is_control)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /admin/experiments
pub async fn list_experiments(
    State(state): State<AppState>,
    Query(params): Query<ListExperimentsQuery>,
) -> Result<Json<ListExperimentsResponse>, ApiError> {
    debug!("Admin listing experiments");

    let status = params.status.as_deref().map(parse_status).transpose()?;
    let experiments = state.registry.list_experiments(status)?;
    let total = experiments.len();

    Ok(Json(ListExperimentsResponse { experiments, total }))
}

/// GET /admin/experiments/stored
pub async fn list_stored_experiments(
    State(state): State<AppState>,
    Query(params): Query<StoredExperimentsQuery>,
) -> Result<Json<ListExperimentsResponse>, ApiError> {
    debug!("Admin listing stored experiments");

    let mut query = ExperimentQuery::new();

    if let Some(status) = params.status.as_deref() {
        query = query.with_status(parse_status(status)?);
    }
    if let Some(model_reference) = params.model_reference {
        query = query.with_model(model_reference);
    }
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.with_offset(offset);
    }

    let experiments = state.registry.list_stored_experiments(&query).await?;
    let total = experiments.len();

    Ok(Json(ListExperimentsResponse { experiments, total }))
}

/// POST /admin/experiments
pub async fn create_experiment(
    State(state): State<AppState>,
    Json(request): Json<CreateExperimentApiRequest>,
) -> Result<(StatusCode, Json<Experiment>), ApiError> {
    debug!(name = %request.name, "Admin creating experiment");

    let experiment = state
        .registry
        .create_experiment(CreateExperimentRequest {
            name: request.name,
            description: request.description.unwrap_or_default(),
            variants: request.variants.into_iter().map(VariantConfig::from).collect(),
            min_samples_per_variant: request.min_samples_per_variant,
            confidence_level: request.confidence_level,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(experiment)))
}

/// POST /admin/experiments/from-models
pub async fn create_from_models(
    State(state): State<AppState>,
    Json(request): Json<CreateFromModelsApiRequest>,
) -> Result<(StatusCode, Json<Experiment>), ApiError> {
    debug!(name = %request.name, "Admin creating experiment from models");

    let experiment = state
        .registry
        .create_from_models(CreateFromModelsRequest {
            name: request.name,
            description: request.description.unwrap_or_default(),
            control_model: request.control_model,
            treatment_models: request.treatment_models,
            traffic_split: request.traffic_split,
            min_samples_per_variant: request.min_samples_per_variant,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(experiment)))
}

/// GET /admin/experiments/:id
pub async fn get_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin getting experiment");

    let experiment = state
        .registry
        .get_experiment(&experiment_id)?
        .ok_or_else(|| {
            ApiError::not_found(format!("Experiment '{}' not found", experiment_id))
        })?;

    Ok(Json(experiment))
}

/// DELETE /admin/experiments/:id
pub async fn delete_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin deleting experiment");

    if state.registry.remove_experiment(&experiment_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "Experiment '{}' not found",
            experiment_id
        )))
    }
}

/// POST /admin/experiments/:id/variants
pub async fn add_variant(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Json(request): Json<VariantApiRequest>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, variant = %request.name, "Admin adding variant");

    let experiment = state
        .registry
        .add_variant(&experiment_id, request.into())
        .await?;

    Ok(Json(experiment))
}

/// POST /admin/experiments/:id/start
pub async fn start_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin starting experiment");
    Ok(Json(state.registry.start_experiment(&experiment_id).await?))
}

/// POST /admin/experiments/:id/pause
pub async fn pause_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin pausing experiment");
    Ok(Json(state.registry.pause_experiment(&experiment_id).await?))
}

/// POST /admin/experiments/:id/resume
pub async fn resume_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin resuming experiment");
    Ok(Json(state.registry.resume_experiment(&experiment_id).await?))
}

/// POST /admin/experiments/:id/cancel
pub async fn cancel_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin cancelling experiment");
    Ok(Json(state.registry.cancel_experiment(&experiment_id).await?))
}

/// POST /admin/experiments/:id/complete
pub async fn complete_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin completing experiment");
    Ok(Json(state.registry.complete_experiment(&experiment_id).await?))
}

/// POST /admin/experiments/:id/analyze
pub async fn analyze_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    debug!(experiment_id = %experiment_id, "Admin analyzing experiment");
    Ok(Json(state.registry.analyze_experiment(&experiment_id).await?))
}

/// GET /admin/experiments/:id/report
pub async fn export_report(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<ExperimentReport>, ApiError> {
    Ok(Json(state.registry.export_report(&experiment_id)?))
}

/// GET /admin/experiments/:id/assignment?caller_id=
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let experiment = state
        .registry
        .get_experiment(&experiment_id)?
        .ok_or_else(|| {
            ApiError::not_found(format!("Experiment '{}' not found", experiment_id))
        })?;

    let variant = state
        .registry
        .assign_variant(&experiment_id, &query.caller_id)?;
    let bucket = ConsistentHasher::bucket(
        experiment.assignment_hash(),
        &query.caller_id,
        &experiment_id,
    );

    Ok(Json(AssignmentResponse {
        experiment_id,
        caller_id: query.caller_id,
        bucket,
        variant_name: variant.name().to_string(),
        model_reference: variant.model_reference().to_string(),
    }))
}

/// POST /admin/experiments/:id/predict
pub async fn predict(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Json(request): Json<PredictApiRequest>,
) -> Result<Json<PredictionOutcome>, ApiError> {
    let outcome = state
        .registry
        .predict(&experiment_id, &request.caller_id, &request.features)
        .await?;

    Ok(Json(outcome))
}

/// POST /admin/experiments/:id/outcomes
pub async fn record_outcome(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Json(request): Json<OutcomeApiRequest>,
) -> Result<StatusCode, ApiError> {
    state.registry.record_outcome(
        &experiment_id,
        &request.variant_name,
        request.predicted_fraud,
        request.actual_fraud,
        request.response_time_ms,
    )?;

    Ok(StatusCode::ACCEPTED)
}

/// POST /admin/experiments/:id/feedback
pub async fn record_feedback(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Json(request): Json<FeedbackApiRequest>,
) -> Result<StatusCode, ApiError> {
    state.registry.record_feedback(
        &experiment_id,
        &request.variant_name,
        request.predicted_fraud,
        request.actual_fraud,
    )?;

    Ok(StatusCode::ACCEPTED)
}

/// GET /admin/experiments/:id/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<ExperimentMetricsResponse>, ApiError> {
    let variants = state.registry.experiment_metrics(&experiment_id)?;

    Ok(Json(ExperimentMetricsResponse {
        experiment_id,
        variants,
    }))
}

/// GET /admin/experiments/:id/metrics/:variant
pub async fn get_variant_metrics(
    State(state): State<AppState>,
    Path((experiment_id, variant_name)): Path<(String, String)>,
) -> Result<Json<VariantMetrics>, ApiError> {
    Ok(Json(
        state
            .registry
            .variant_metrics(&experiment_id, &variant_name)?,
    ))
}
