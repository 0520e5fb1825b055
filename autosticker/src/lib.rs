//! Autosticker expands a set of input images into new, thematically related
//! images by chaining three remote services: every input is captioned, the
//! aggregated captions are expanded into candidate diffusion prompts by a
//! text-completion model, and each prompt is rendered by a diffusion model
//! seeded with one of the original inputs.
//!
//! The interesting part is the orchestration, not the individual calls:
//! captioning and generation fan out concurrently, the diffusion service is
//! an asynchronous job that must be polled to completion, and a single bad
//! generation job must not void the rest of the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autosticker::pipeline::GenerationPipeline;
//! use autosticker::providers::{FromEnv, OpenAIClient, ReplicateClient};
//!
//! let replicate = ReplicateClient::from_env();
//! let openai = OpenAIClient::from_env();
//!
//! let pipeline = GenerationPipeline::new(
//!     Arc::new(replicate.caption_model("rmokady/clip_prefix_caption")),
//!     Arc::new(openai.completion_model("gpt-3.5-turbo-instruct")),
//!     Arc::new(replicate.diffusion_model("stability-ai/stable-diffusion")),
//! );
//!
//! let outputs = pipeline.generate(inputs).await?;
//! ```

pub mod codec;
pub mod job;
pub mod pipeline;
pub mod providers;

pub use codec::CodecError;
pub use job::{Job, JobError, JobPoller, JobService, JobStatus, TimeoutError};
pub use pipeline::{
    Captioner, DownloadError, GenerationError, GenerationPipeline, ImageGenerator,
    PipelineConfig, PipelineError, PromptExpander,
};
pub use providers::{FromEnv, ServiceError};
