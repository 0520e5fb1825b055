//! Seeded image generation through asynchronous predictions.
//!
//! A generation call submits one prediction, drives it to a terminal state
//! via [`JobPoller`], then downloads and decodes every output artifact. All
//! failure modes come back as typed errors; deciding whether one failed job
//! sinks the batch is the pipeline's business, not this client's.

use super::client::ReplicateClient;
use super::prediction::PredictionSpec;
use crate::codec;
use crate::job::JobPoller;
use crate::pipeline::{DownloadError, GenerationError, ImageGenerator};
use crate::providers::common::{ApiClient, ServiceError};
use async_trait::async_trait;
use futures::future::try_join_all;
use image::DynamicImage;
use serde_json::json;
use tracing::{debug, instrument};

/// Default output width in pixels.
pub const DEFAULT_WIDTH: u32 = 512;

/// Default output height in pixels.
pub const DEFAULT_HEIGHT: u32 = 512;

/// Default weight of the prompt against the seed image.
pub const DEFAULT_PROMPT_STRENGTH: f32 = 0.8;

/// Diffusion model: prompt plus seed image in, generated images out.
#[derive(Clone)]
pub struct DiffusionModel {
    client: ReplicateClient,
    version: String,
    width: u32,
    height: u32,
    prompt_strength: f32,
    poller: JobPoller,
}

impl std::fmt::Debug for DiffusionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffusionModel")
            .field("version", &self.version)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("prompt_strength", &self.prompt_strength)
            .finish_non_exhaustive()
    }
}

impl DiffusionModel {
    /// Create a new diffusion model with the default output dimensions,
    /// prompt strength, and poller.
    pub(crate) fn new(client: ReplicateClient, version: impl Into<String>) -> Self {
        Self {
            client,
            version: version.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            prompt_strength: DEFAULT_PROMPT_STRENGTH,
            poller: JobPoller::new(),
        }
    }

    /// Set the output dimensions in pixels.
    #[must_use]
    pub const fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the weight of the prompt against the seed image.
    #[must_use]
    pub const fn with_prompt_strength(mut self, prompt_strength: f32) -> Self {
        self.prompt_strength = prompt_strength;
        self
    }

    /// Replace the job poller, e.g. to change the interval or deadline.
    #[must_use]
    pub const fn with_poller(mut self, poller: JobPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Build the prediction spec for one generation job.
    fn build_spec(&self, prompt: &str, seed: &DynamicImage) -> Result<PredictionSpec, ServiceError> {
        Ok(PredictionSpec {
            version: self.version.clone(),
            input: json!({
                "prompt": prompt,
                "width": self.width,
                "height": self.height,
                "init_image": codec::to_data_url(seed)?,
                "prompt_strength": self.prompt_strength,
            }),
        })
    }

    /// Fetch one artifact URL and decode it into a bitmap.
    async fn download(&self, url: &str) -> Result<DynamicImage, DownloadError> {
        let response = self.client.http_client().get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        Ok(codec::decode(&bytes)?)
    }
}

#[async_trait]
impl ImageGenerator for DiffusionModel {
    #[instrument(skip(self, seed), fields(version = %self.version, prompt = %prompt))]
    async fn generate(
        &self,
        prompt: &str,
        seed: &DynamicImage,
    ) -> Result<Vec<DynamicImage>, GenerationError> {
        let spec = self.build_spec(prompt, seed)?;
        let urls = self.poller.run(&self.client, &spec).await?;
        debug!(artifacts = urls.len(), "Generation job finished");

        let images = try_join_all(urls.iter().map(|url| self.download(url))).await?;
        Ok(images)
    }
}
