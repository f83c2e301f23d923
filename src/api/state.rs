//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::services::ExperimentRegistry;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ExperimentRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ExperimentRegistry>) -> Self {
        Self { registry }
    }
}
