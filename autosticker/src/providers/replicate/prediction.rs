//! Wire types for the predictions endpoint and the job-service plumbing.

use super::client::ReplicateClient;
use crate::job::{Job, JobError, JobService, JobStatus};
use crate::providers::common::{ApiClient, ensure_success};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One prediction submission: a pinned model version plus its input payload.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionSpec {
    /// Pinned model version identifier.
    pub version: String,
    /// Model-specific input object.
    pub input: serde_json::Value,
}

/// Prediction resource as returned by submit and status requests.
#[derive(Debug, Deserialize)]
pub(crate) struct PredictionPayload {
    pub(crate) id: String,
    pub(crate) status: PredictionStatus,
    #[serde(default)]
    pub(crate) output: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl From<PredictionStatus> for JobStatus {
    fn from(status: PredictionStatus) -> Self {
        match status {
            PredictionStatus::Starting | PredictionStatus::Processing => Self::Pending,
            PredictionStatus::Succeeded => Self::Succeeded,
            PredictionStatus::Failed => Self::Failed,
            PredictionStatus::Canceled => Self::Canceled,
        }
    }
}

impl PredictionPayload {
    /// View this payload as a job snapshot with artifact URLs as output.
    pub(crate) fn into_job(self) -> Job<Vec<String>> {
        Job {
            id: self.id,
            status: self.status.into(),
            output: self.output.as_ref().map(artifact_urls),
            error: self.error,
        }
    }
}

/// Extract artifact URLs from a prediction output value.
///
/// Models return either a single URL string or an array of them.
fn artifact_urls(output: &serde_json::Value) -> Vec<String> {
    match output {
        serde_json::Value::String(url) => vec![url.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(ToString::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl JobService for ReplicateClient {
    type Spec = PredictionSpec;
    type Output = Vec<String>;

    async fn submit(&self, spec: &PredictionSpec) -> Result<Job<Vec<String>>, JobError> {
        let url = format!("{}/predictions", self.base_url());
        let response = self
            .http_client()
            .post(&url)
            .headers(self.auth_headers())
            .json(spec)
            .send()
            .await
            .map_err(crate::providers::ServiceError::from)?;
        let response = ensure_success(response).await?;
        let payload: PredictionPayload = response
            .json()
            .await
            .map_err(crate::providers::ServiceError::from)?;
        Ok(payload.into_job())
    }

    async fn fetch(&self, id: &str) -> Result<Job<Vec<String>>, JobError> {
        let url = format!("{}/predictions/{id}", self.base_url());
        let response = self
            .http_client()
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await
            .map_err(crate::providers::ServiceError::from)?;
        let response = ensure_success(response).await?;
        let payload: PredictionPayload = response
            .json()
            .await
            .map_err(crate::providers::ServiceError::from)?;
        Ok(payload.into_job())
    }
}
