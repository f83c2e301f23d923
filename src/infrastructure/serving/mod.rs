//! Model serving clients

mod http_service;

pub use http_service::{HttpModelServingService, MODEL_SERVING_SERVICE};
