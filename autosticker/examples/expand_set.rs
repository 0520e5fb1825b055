//! Expand every image in a directory into new suggestions.
//!
//! Usage: `cargo run --example expand_set -- [input_dir] [output_dir]`
//!
//! Requires `REPLICATE_API_TOKEN` and `OPENAI_API_KEY` in the environment.

use anyhow::{Context, Result};
use autosticker::pipeline::GenerationPipeline;
use autosticker::providers::{FromEnv, OpenAIClient, ReplicateClient};
use std::sync::Arc;

const CAPTION_MODEL_VERSION: &str = "rmokady/clip_prefix_caption";
const DIFFUSION_MODEL_VERSION: &str = "stability-ai/stable-diffusion";
const COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autosticker=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let input_dir = args.next().unwrap_or_else(|| "photos".to_string());
    let output_dir = args.next().unwrap_or_else(|| "results".to_string());

    let replicate = ReplicateClient::from_env();
    let openai = OpenAIClient::from_env();

    let pipeline = GenerationPipeline::new(
        Arc::new(replicate.caption_model(CAPTION_MODEL_VERSION)),
        Arc::new(openai.completion_model(COMPLETION_MODEL)),
        Arc::new(replicate.diffusion_model(DIFFUSION_MODEL_VERSION)),
    );

    let mut images = Vec::new();
    for entry in std::fs::read_dir(&input_dir)
        .with_context(|| format!("reading input directory {input_dir}"))?
    {
        let path = entry?.path();
        match image::open(&path) {
            Ok(image) => images.push(image),
            Err(error) => eprintln!("skipping {}: {error}", path.display()),
        }
    }

    let outputs = pipeline
        .generate(images)
        .await
        .context("pipeline call failed")?;
    println!("generated {} images", outputs.len());

    std::fs::create_dir_all(&output_dir)?;
    for (index, image) in outputs.iter().enumerate() {
        let path = format!("{output_dir}/generated-{index:02}.png");
        image.save(&path).with_context(|| format!("saving {path}"))?;
    }

    Ok(())
}
