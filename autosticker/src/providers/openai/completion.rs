//! Prompt expansion over the OpenAI completions endpoint.
//!
//! Implements the [`PromptExpander`] seam: the aggregated captions become a
//! single newline-joined document, and the model's continuation is split
//! back into a bounded batch of candidate diffusion prompts.

use super::client::OpenAIClient;
use crate::pipeline::PromptExpander;
use crate::providers::common::{ApiClient, ServiceError, ensure_success};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default sampling temperature for prompt expansion.
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

/// Default token budget for the completion.
pub const DEFAULT_MAX_TOKENS: u32 = 64;

/// Default upper bound on the number of derived prompts.
pub const DEFAULT_MAX_PROMPTS: usize = 4;

/// Completion model that expands captions into diffusion prompts.
#[derive(Clone)]
pub struct CompletionModel {
    client: OpenAIClient,
    model_id: String,
    temperature: f32,
    max_tokens: u32,
    max_prompts: usize,
}

impl std::fmt::Debug for CompletionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionModel")
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_prompts", &self.max_prompts)
            .finish_non_exhaustive()
    }
}

impl CompletionModel {
    /// Create a new completion model with the default sampling parameters.
    pub(crate) fn new(client: OpenAIClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_prompts: DEFAULT_MAX_PROMPTS,
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the upper bound on derived prompts.
    #[must_use]
    pub const fn with_max_prompts(mut self, max_prompts: usize) -> Self {
        self.max_prompts = max_prompts;
        self
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    text: String,
}

/// Split completion choices into prompt lines, in choice order.
///
/// Blank lines and duplicates are dropped; the batch is truncated to `max`.
fn derive_prompts(choices: &[Choice], max: usize) -> Vec<String> {
    let mut prompts: Vec<String> = Vec::new();
    for choice in choices {
        for line in choice.text.lines() {
            let line = line.trim();
            if line.is_empty() || prompts.iter().any(|p| p == line) {
                continue;
            }
            prompts.push(line.to_string());
            if prompts.len() == max {
                return prompts;
            }
        }
    }
    prompts
}

#[async_trait]
impl PromptExpander for CompletionModel {
    #[instrument(skip(self, captions), fields(model = %self.model_id))]
    async fn expand(&self, captions: &[String]) -> Result<Vec<String>, ServiceError> {
        let mut document = String::new();
        for caption in captions {
            document.push_str(caption.trim());
            document.push('\n');
        }

        let body = CompletionRequest {
            model: &self.model_id,
            prompt: &document,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let url = format!("{}/completions", self.client.base_url());

        let response = self
            .client
            .http_client()
            .post(&url)
            .headers(self.client.auth_headers())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let parsed: CompletionResponse = response.json().await?;

        let prompts = derive_prompts(&parsed.choices, self.max_prompts);
        debug!(count = prompts.len(), ?prompts, "Derived diffusion prompts");
        Ok(prompts)
    }
}
