//! Shared infrastructure for HTTP service clients.

use crate::codec::CodecError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Errors from a synchronous remote service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The HTTP request failed below the application layer.
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("StatusError ({status}): {detail}")]
    Status {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Response body, as far as it could be read.
        detail: String,
    },

    /// The service answered 2xx but the payload was not the expected shape.
    #[error("MalformedResponse: {0}")]
    Malformed(String),

    /// The request payload could not be built locally.
    #[error("CodecError: {0}")]
    Codec(#[from] CodecError),
}

/// Base configuration shared by all API clients.
pub trait ApiClient: Clone + Send + Sync {
    /// Base URL for API requests, without a trailing slash.
    fn base_url(&self) -> &str;

    /// The shared HTTP client instance.
    fn http_client(&self) -> &reqwest::Client;

    /// Authentication headers for API requests.
    fn auth_headers(&self) -> HeaderMap;
}

/// Clients that can be created from process environment variables.
pub trait FromEnv: Sized {
    /// Create a new client from environment variables.
    ///
    /// # Panics
    ///
    /// Panics if a required environment variable is not set.
    fn from_env() -> Self;
}

/// HTTP client construction settings shared by the provider builders.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds, `None` for no timeout.
    pub timeout_secs: Option<u64>,
    /// User agent string.
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(120),
            user_agent: None,
        }
    }
}

impl HttpClientConfig {
    /// Build a reqwest client with this configuration.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn build_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }

        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder.build().expect("Failed to build HTTP client")
    }
}

/// Turn a non-success response into a [`ServiceError::Status`], reading the
/// body for the error detail.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    Err(ServiceError::Status { status, detail })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout_secs, Some(120));
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_build_client_without_timeout() {
        let config = HttpClientConfig {
            timeout_secs: None,
            user_agent: Some("autosticker-test".to_string()),
        };
        // Should not panic.
        let _client = config.build_client();
    }
}
