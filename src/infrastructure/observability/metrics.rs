//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;

/// Prometheus metrics handle for serving the scrape endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Render metrics in the Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("experiment_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Router exposing the scrape endpoint at the configured path
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// How a routed prediction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStatus {
    Success,
    Error,
    Timeout,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// Parameters for prediction metrics
pub struct PredictionMetricParams<'a> {
    pub experiment_id: &'a str,
    pub variant: &'a str,
    pub status: PredictionStatus,
    pub duration: Duration,
}

/// Record one routed prediction
///
/// A no-op when no recorder is installed.
pub fn record_prediction(params: PredictionMetricParams) {
    let labels = [
        ("experiment", params.experiment_id.to_string()),
        ("variant", params.variant.to_string()),
        ("status", params.status.as_str().to_string()),
    ];

    counter!("experiment_predictions_total", &labels).increment(1);
    histogram!("experiment_prediction_duration_seconds", &labels)
        .record(params.duration.as_secs_f64());
}

/// Record a lifecycle transition
pub fn record_transition(experiment_id: &str, action: &'static str) {
    counter!(
        "experiment_transitions_total",
        "experiment" => experiment_id.to_string(),
        "action" => action
    )
    .increment(1);
}
