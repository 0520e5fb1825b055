//! Replicate API client plus the caption and diffusion models built on it.
//!
//! Captioning uses the synchronous form of the predictions endpoint (the
//! request blocks until the prediction finishes); diffusion uses the
//! asynchronous form and is driven by [`crate::job::JobPoller`].

mod caption;
mod client;
mod diffusion;
mod prediction;

pub use caption::CaptionModel;
pub use client::{REPLICATE_API_BASE_URL, ReplicateClient, ReplicateClientBuilder};
pub use diffusion::DiffusionModel;
pub use prediction::PredictionSpec;
