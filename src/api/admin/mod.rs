//! Admin API endpoints for managing experiments

pub mod experiments;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/experiments",
            get(experiments::list_experiments).post(experiments::create_experiment),
        )
        .route(
            "/experiments/from-models",
            post(experiments::create_from_models),
        )
        .route(
            "/experiments/stored",
            get(experiments::list_stored_experiments),
        )
        .route(
            "/experiments/{experiment_id}",
            get(experiments::get_experiment).delete(experiments::delete_experiment),
        )
        .route(
            "/experiments/{experiment_id}/variants",
            post(experiments::add_variant),
        )
        // Lifecycle
        .route(
            "/experiments/{experiment_id}/start",
            post(experiments::start_experiment),
        )
        .route(
            "/experiments/{experiment_id}/pause",
            post(experiments::pause_experiment),
        )
        .route(
            "/experiments/{experiment_id}/resume",
            post(experiments::resume_experiment),
        )
        .route(
            "/experiments/{experiment_id}/cancel",
            post(experiments::cancel_experiment),
        )
        .route(
            "/experiments/{experiment_id}/complete",
            post(experiments::complete_experiment),
        )
        // Analysis
        .route(
            "/experiments/{experiment_id}/analyze",
            post(experiments::analyze_experiment),
        )
        .route(
            "/experiments/{experiment_id}/report",
            get(experiments::export_report),
        )
        // Traffic
        .route(
            "/experiments/{experiment_id}/assignment",
            get(experiments::get_assignment),
        )
        .route(
            "/experiments/{experiment_id}/predict",
            post(experiments::predict),
        )
        .route(
            "/experiments/{experiment_id}/outcomes",
            post(experiments::record_outcome),
        )
        .route(
            "/experiments/{experiment_id}/feedback",
            post(experiments::record_feedback),
        )
        .route(
            "/experiments/{experiment_id}/metrics",
            get(experiments::get_metrics),
        )
        .route(
            "/experiments/{experiment_id}/metrics/{variant_name}",
            get(experiments::get_variant_metrics),
        )
}
