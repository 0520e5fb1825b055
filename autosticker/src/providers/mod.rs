//! Remote service clients.
//!
//! Each service the pipeline depends on gets a small client built on a
//! shared [`reqwest::Client`]: the captioning and diffusion models live
//! behind the Replicate predictions API, prompt expansion behind the OpenAI
//! completions API. Clients are cheap to clone and safe to share across
//! concurrent tasks; all per-call state is owned by the call.

pub mod common;
pub mod openai;
pub mod replicate;

pub use common::{ApiClient, FromEnv, HttpClientConfig, ServiceError};
pub use openai::OpenAIClient;
pub use replicate::ReplicateClient;
