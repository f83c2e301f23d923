use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::serving::{ModelPrediction, ModelServingService};
use crate::domain::DomainError;

/// Service name used in external service errors
pub const MODEL_SERVING_SERVICE: &str = "model-serving";

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64],
}

/// Model serving backend reached over HTTP
///
/// Calls `POST {base_url}/v1/models/{model_reference}/predict`.
#[derive(Debug, Clone)]
pub struct HttpModelServingService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpModelServingService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DomainError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            DomainError::configuration(format!("Invalid model serving URL '{}': {}", base_url, e))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(DomainError::configuration(format!(
                "Model serving URL '{}' cannot be used as a base",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }

    fn predict_url(&self, model_reference: &str) -> Result<Url, DomainError> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| DomainError::configuration("Model serving URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v1", "models", model_reference, "predict"]);

        Ok(url)
    }
}

#[async_trait]
impl ModelServingService for HttpModelServingService {
    async fn predict(
        &self,
        model_reference: &str,
        features: &[f64],
    ) -> Result<ModelPrediction, DomainError> {
        let url = self.predict_url(model_reference)?;

        debug!(model_reference = %model_reference, url = %url, "Requesting prediction");

        let response = self
            .client
            .post(url)
            .json(&PredictRequest { features })
            .send()
            .await
            .map_err(|e| {
                DomainError::external_service(MODEL_SERVING_SERVICE, format!("Request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(DomainError::external_service(
                MODEL_SERVING_SERVICE,
                format!("HTTP {}: {}", status, error_body),
            ));
        }

        let prediction: ModelPrediction = response.json().await.map_err(|e| {
            DomainError::external_service(
                MODEL_SERVING_SERVICE,
                format!("Failed to parse response: {}", e),
            )
        })?;

        if !(0.0..=1.0).contains(&prediction.probability) {
            return Err(DomainError::external_service(
                MODEL_SERVING_SERVICE,
                format!("Probability {} is outside [0, 1]", prediction.probability),
            ));
        }

        Ok(prediction)
    }
}
