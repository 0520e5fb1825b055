//! OpenAI API client and the completion-backed prompt expander.

mod client;
mod completion;

pub use client::{OPENAI_API_BASE_URL, OpenAIClient, OpenAIClientBuilder};
pub use completion::CompletionModel;
