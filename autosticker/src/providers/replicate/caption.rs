//! Image captioning through the synchronous prediction endpoint.
//!
//! Captioning models finish in one round trip, so the request carries a
//! `Prefer: wait` header and the response already holds the terminal
//! prediction. There is no polling on this path.

use super::client::ReplicateClient;
use super::prediction::{PredictionPayload, PredictionSpec, PredictionStatus};
use crate::codec;
use crate::pipeline::Captioner;
use crate::providers::common::{ApiClient, ServiceError, ensure_success};
use async_trait::async_trait;
use image::DynamicImage;
use serde_json::json;
use tracing::{debug, instrument};

/// Captioning model: one image in, one descriptive string out.
#[derive(Clone)]
pub struct CaptionModel {
    client: ReplicateClient,
    version: String,
    use_beam_search: bool,
}

impl std::fmt::Debug for CaptionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionModel")
            .field("version", &self.version)
            .field("use_beam_search", &self.use_beam_search)
            .finish_non_exhaustive()
    }
}

impl CaptionModel {
    /// Create a new caption model with beam search enabled.
    pub(crate) fn new(client: ReplicateClient, version: impl Into<String>) -> Self {
        Self {
            client,
            version: version.into(),
            use_beam_search: true,
        }
    }

    /// Toggle the decoding strategy between beam search and sampling.
    #[must_use]
    pub const fn with_beam_search(mut self, use_beam_search: bool) -> Self {
        self.use_beam_search = use_beam_search;
        self
    }

    /// Pull the caption text out of a terminal prediction payload.
    fn caption_from_payload(payload: &PredictionPayload) -> Result<String, ServiceError> {
        if payload.status != PredictionStatus::Succeeded {
            let detail = payload.error.clone().unwrap_or_default();
            return Err(ServiceError::Malformed(format!(
                "caption prediction {} ended {:?}: {detail}",
                payload.id, payload.status
            )));
        }
        let caption = payload
            .output
            .as_ref()
            .and_then(|output| output.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if caption.is_empty() {
            return Err(ServiceError::Malformed(format!(
                "caption prediction {} succeeded with an empty caption",
                payload.id
            )));
        }
        Ok(caption.to_string())
    }
}

#[async_trait]
impl Captioner for CaptionModel {
    #[instrument(skip(self, image), fields(version = %self.version))]
    async fn caption(&self, image: &DynamicImage) -> Result<String, ServiceError> {
        let spec = PredictionSpec {
            version: self.version.clone(),
            input: json!({
                "image": codec::to_data_url(image)?,
                "use_beam_search": self.use_beam_search,
            }),
        };
        let url = format!("{}/predictions", self.client.base_url());

        let response = self
            .client
            .http_client()
            .post(&url)
            .headers(self.client.auth_headers())
            .header("Prefer", "wait")
            .json(&spec)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let payload: PredictionPayload = response.json().await?;

        let caption = Self::caption_from_payload(&payload)?;
        debug!(caption = %caption, "Image captioned");
        Ok(caption)
    }
}
