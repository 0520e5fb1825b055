//! Replicate API client.

use super::caption::CaptionModel;
use super::diffusion::DiffusionModel;
use crate::providers::common::{ApiClient, FromEnv, HttpClientConfig};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;

/// Default Replicate API base URL.
pub const REPLICATE_API_BASE_URL: &str = "https://api.replicate.com/v1";

/// Replicate API client for creating prediction-backed models.
#[derive(Clone)]
pub struct ReplicateClient {
    http_client: reqwest::Client,
    api_token: Arc<str>,
    base_url: Arc<str>,
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ReplicateClient {
    /// Create a new client with the given API token and the default base URL.
    #[must_use]
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::builder().api_token(api_token).build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ReplicateClientBuilder {
        ReplicateClientBuilder::default()
    }

    /// Create a captioning model for the given model version.
    #[must_use]
    pub fn caption_model(&self, version: impl Into<String>) -> CaptionModel {
        CaptionModel::new(self.clone(), version)
    }

    /// Create a diffusion model for the given model version.
    #[must_use]
    pub fn diffusion_model(&self, version: impl Into<String>) -> DiffusionModel {
        DiffusionModel::new(self.clone(), version)
    }
}

impl ApiClient for ReplicateClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        if let Ok(value) = HeaderValue::from_str(&format!("Token {}", self.api_token)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

impl FromEnv for ReplicateClient {
    /// Create a new client from `REPLICATE_API_TOKEN` and, optionally,
    /// `REPLICATE_BASE_URL`.
    ///
    /// # Panics
    ///
    /// Panics if `REPLICATE_API_TOKEN` is not set.
    fn from_env() -> Self {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .expect("REPLICATE_API_TOKEN environment variable not set");

        let mut builder = Self::builder().api_token(api_token);
        if let Ok(base_url) = std::env::var("REPLICATE_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        builder.build()
    }
}

/// Builder for [`ReplicateClient`].
#[derive(Debug, Default)]
pub struct ReplicateClientBuilder {
    api_token: Option<String>,
    base_url: Option<String>,
    http_config: HttpClientConfig,
}

impl ReplicateClientBuilder {
    /// Set the API token.
    #[must_use]
    pub fn api_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(api_token.into());
        self
    }

    /// Set a custom base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds.
    ///
    /// The timeout bounds individual submit/fetch/download requests, not the
    /// lifetime of an asynchronous prediction.
    #[must_use]
    pub fn timeout_secs(mut self, timeout: u64) -> Self {
        self.http_config.timeout_secs = Some(timeout);
        self
    }

    /// Build the client.
    ///
    /// # Panics
    ///
    /// Panics if the API token is not set or the HTTP client fails to build.
    #[must_use]
    pub fn build(self) -> ReplicateClient {
        let api_token = self.api_token.expect("API token is required");
        let base_url = self
            .base_url
            .unwrap_or_else(|| REPLICATE_API_BASE_URL.to_string());

        ReplicateClient {
            http_client: self.http_config.build_client(),
            api_token: api_token.into(),
            base_url: base_url.into(),
        }
    }
}
