use std::time::Duration;

use crate::api::ModelsResponse;
use crate::core::transport::{body_snippet, endpoint_url, TransportError};

const MODELS_ENDPOINT: &str = "v1/models";

/// Query `GET {base}/v1/models`.
///
/// An empty `data` array is a successful response: the server is reachable
/// but nothing is loaded. Callers distinguish that from transport failures.
pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
) -> Result<ModelsResponse, TransportError> {
    let models_url = endpoint_url(base_url, MODELS_ENDPOINT)?;
    let response = client
        .get(models_url)
        .header("Content-Type", "application/json")
        .timeout(timeout)
        .send()
        .await
        .map_err(TransportError::from_reqwest)?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(TransportError::from_reqwest)?;

    if !status.is_success() {
        return Err(TransportError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    serde_json::from_str::<ModelsResponse>(&body).map_err(|err| TransportError::Decode {
        detail: err.to_string(),
        snippet: body_snippet(&body),
    })
}

/// Sort models by id for stable listing output.
pub fn sort_models(models: &mut [crate::api::ModelInfo]) {
    models.sort_by(|a, b| a.id.to_lowercase().cmp(&b.id.to_lowercase()));
}
