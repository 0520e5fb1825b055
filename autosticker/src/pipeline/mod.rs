//! The staged generation pipeline.
//!
//! One call runs three stages over the service seams defined here: inputs
//! are captioned concurrently (all-or-nothing), the captions are expanded
//! into a bounded prompt batch (single call), and each prompt is rendered
//! concurrently with a randomly chosen seed image (failures isolated per
//! job). Fan-out always launches every task before awaiting any, and
//! results are reassembled in submission order regardless of completion
//! order.

mod error;

pub use error::{DownloadError, GenerationError, PipelineError};

use crate::providers::ServiceError;
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use image::DynamicImage;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument, warn};

/// A captioning service: one image in, one descriptive string out.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Describe `image` in natural language, trimmed of whitespace.
    async fn caption(&self, image: &DynamicImage) -> Result<String, ServiceError>;
}

/// A prompt-expansion service over aggregated captions.
#[async_trait]
pub trait PromptExpander: Send + Sync {
    /// Expand `captions` into a bounded batch of non-empty prompts.
    ///
    /// An empty batch is a legitimate outcome, not an error.
    async fn expand(&self, captions: &[String]) -> Result<Vec<String>, ServiceError>;
}

/// An image-generation service: prompt plus seed image in, images out.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Render `prompt` seeded from `seed`, returning zero or more images.
    async fn generate(
        &self,
        prompt: &str,
        seed: &DynamicImage,
    ) -> Result<Vec<DynamicImage>, GenerationError>;
}

/// Cost-control knobs for one pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Largest number of input images captioned per call; larger inputs are
    /// subsampled down to this many.
    pub max_input_images: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_input_images: 8,
        }
    }
}

/// Orchestrates captioning, prompt expansion, and generation.
///
/// Instances are self-contained: configuration and the random source are
/// owned here, so independent pipelines (per test, per tenant) never share
/// state. The service seams are trait objects so tests can substitute
/// doubles with injected latency and failure.
pub struct GenerationPipeline {
    captioner: Arc<dyn Captioner>,
    expander: Arc<dyn PromptExpander>,
    generator: Arc<dyn ImageGenerator>,
    config: PipelineConfig,
    rng: Mutex<fastrand::Rng>,
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GenerationPipeline {
    /// Create a pipeline with the default configuration and an
    /// entropy-seeded random source.
    #[must_use]
    pub fn new(
        captioner: Arc<dyn Captioner>,
        expander: Arc<dyn PromptExpander>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            captioner,
            expander,
            generator,
            config: PipelineConfig::default(),
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the random source, e.g. with a seeded one for reproducible
    /// subsampling and seed-image choice.
    #[must_use]
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Run the full pipeline over `images`.
    ///
    /// Returns the flattened generated images in prompt-submission order,
    /// then artifact order within each job. The result may be shorter than
    /// the prompt batch: a failed generation job is logged and contributes
    /// nothing, without aborting its siblings. An empty prompt batch
    /// returns an empty `Vec` without issuing any generation calls.
    ///
    /// Dropping the returned future abandons all in-flight stage calls;
    /// remote jobs themselves are not canceled.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyInput`] for an empty input slice, and
    /// [`PipelineError::Caption`] / [`PipelineError::Expand`] when those
    /// prerequisite stages fail.
    #[instrument(skip_all, fields(inputs = images.len()))]
    pub async fn generate(
        &self,
        images: Vec<DynamicImage>,
    ) -> Result<Vec<DynamicImage>, PipelineError> {
        if images.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let inputs = self.subsample(images);
        debug!(kept = inputs.len(), "Selected input images");

        // Stage 1: concurrent captioning, all-or-nothing, input order.
        let captions = try_join_all(inputs.iter().map(|image| self.captioner.caption(image)))
            .await
            .map_err(PipelineError::Caption)?;
        debug!(?captions, "Image captions");

        // Stage 2: one expansion call over the aggregated captions.
        let prompts = self
            .expander
            .expand(&captions)
            .await
            .map_err(PipelineError::Expand)?;
        debug!(?prompts, "Diffusion prompts");
        if prompts.is_empty() {
            return Ok(Vec::new());
        }

        // Seed images are drawn up front so no RNG state crosses tasks.
        let seeds: Vec<usize> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (0..prompts.len()).map(|_| rng.usize(..inputs.len())).collect()
        };

        // Stage 3: concurrent generation, failures isolated per job.
        let inputs = &inputs;
        let jobs = prompts.iter().zip(&seeds).map(|(prompt, &seed)| async move {
            match self.generator.generate(prompt, &inputs[seed]).await {
                Ok(generated) => generated,
                Err(error) => {
                    warn!(%prompt, %error, "Generation job failed; dropping its contribution");
                    Vec::new()
                }
            }
        });
        let generated = join_all(jobs).await;

        let results: Vec<DynamicImage> = generated.into_iter().flatten().collect();
        debug!(outputs = results.len(), "Pipeline finished");
        Ok(results)
    }

    /// Uniformly sample the inputs down to the configured maximum, without
    /// replacement and preserving relative order. A no-op when the input is
    /// already within budget.
    fn subsample(&self, images: Vec<DynamicImage>) -> Vec<DynamicImage> {
        let max = self.config.max_input_images;
        if images.len() <= max {
            return images;
        }

        let mut indices: Vec<usize> = (0..images.len()).collect();
        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.shuffle(&mut indices);
        }
        indices.truncate(max);

        let mut chosen = vec![false; images.len()];
        for index in indices {
            chosen[index] = true;
        }
        images
            .into_iter()
            .zip(chosen)
            .filter_map(|(image, keep)| keep.then_some(image))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Test images are identified by width; height stays 1.
    fn img(width: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::new(width, 1))
    }

    /// Captions an image as `caption-<width>`, sleeping longer for earlier
    /// inputs so completion order inverts submission order.
    struct SlowCaptioner {
        calls: AtomicUsize,
    }

    impl SlowCaptioner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Captioner for SlowCaptioner {
        async fn caption(&self, image: &DynamicImage) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = 1000 / u64::from(image.width());
            sleep(Duration::from_millis(delay)).await;
            Ok(format!("caption-{}", image.width()))
        }
    }

    /// Fails on images of the given width, succeeds otherwise.
    struct FlakyCaptioner {
        poison_width: u32,
    }

    #[async_trait]
    impl Captioner for FlakyCaptioner {
        async fn caption(&self, image: &DynamicImage) -> Result<String, ServiceError> {
            if image.width() == self.poison_width {
                return Err(ServiceError::Malformed("no caption".to_string()));
            }
            Ok(format!("caption-{}", image.width()))
        }
    }

    /// Returns a fixed prompt batch and remembers the captions it saw.
    struct FixedExpander {
        prompts: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    impl FixedExpander {
        fn new(prompts: &[&str]) -> Self {
            Self {
                prompts: prompts.iter().map(ToString::to_string).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PromptExpander for FixedExpander {
        async fn expand(&self, captions: &[String]) -> Result<Vec<String>, ServiceError> {
            *self.seen.lock().expect("lock") = captions.to_vec();
            Ok(self.prompts.clone())
        }
    }

    /// Produces one image per prompt whose width encodes the prompt, or
    /// fails outright for a designated prompt.
    struct MarkingGenerator {
        fail_on: Option<String>,
        calls: AtomicUsize,
    }

    impl MarkingGenerator {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                fail_on: fail_on.map(ToString::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for MarkingGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _seed: &DynamicImage,
        ) -> Result<Vec<DynamicImage>, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(prompt) {
                return Err(GenerationError::Service(ServiceError::Malformed(
                    "submission rejected".to_string(),
                )));
            }
            // Prompts are "prompt-<n>"; the output width marks which one.
            let marker: u32 = prompt
                .rsplit('-')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            Ok(vec![img(100 + marker)])
        }
    }

    fn pipeline(
        captioner: impl Captioner + 'static,
        expander: impl PromptExpander + 'static,
        generator: impl ImageGenerator + 'static,
    ) -> GenerationPipeline {
        GenerationPipeline::new(Arc::new(captioner), Arc::new(expander), Arc::new(generator))
            .with_rng(fastrand::Rng::with_seed(7))
    }

    #[test]
    fn test_subsample_within_budget_is_noop() {
        let p = pipeline(
            SlowCaptioner::new(),
            FixedExpander::new(&[]),
            MarkingGenerator::new(None),
        );

        let kept = p.subsample((1..=8).map(img).collect());
        assert_eq!(kept.len(), 8);
        let widths: Vec<u32> = kept.iter().map(DynamicImage::width).collect();
        assert_eq!(widths, (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_subsample_over_budget_draws_from_input() {
        let p = pipeline(
            SlowCaptioner::new(),
            FixedExpander::new(&[]),
            MarkingGenerator::new(None),
        );

        let kept = p.subsample((1..=20).map(img).collect());
        assert_eq!(kept.len(), 8);

        let widths: HashSet<u32> = kept.iter().map(DynamicImage::width).collect();
        assert_eq!(widths.len(), 8, "sample must be without replacement");
        assert!(widths.iter().all(|w| (1..=20).contains(w)));
    }

    // Widths 1..=4 give delays 1000ms..250ms, so the last submission
    // finishes first; the expander must still see captions in input order.
    #[tokio::test(start_paused = true)]
    async fn test_caption_order_observed_by_expander() {
        let expander = Arc::new(FixedExpander::new(&[]));
        let p = GenerationPipeline::new(
            Arc::new(SlowCaptioner::new()),
            Arc::clone(&expander) as Arc<dyn PromptExpander>,
            Arc::new(MarkingGenerator::new(None)),
        );

        p.generate((1..=4).map(img).collect()).await.expect("ok");

        let seen = expander.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec!["caption-1", "caption-2", "caption-3", "caption-4"]
        );
    }

    #[tokio::test]
    async fn test_single_caption_failure_aborts_call() {
        let p = pipeline(
            FlakyCaptioner { poison_width: 3 },
            FixedExpander::new(&["prompt-1"]),
            MarkingGenerator::new(None),
        );

        let result = p.generate((1..=4).map(img).collect()).await;
        assert!(matches!(result, Err(PipelineError::Caption(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_isolated_and_order_preserved() {
        let generator = Arc::new(MarkingGenerator::new(Some("prompt-2")));
        let p = GenerationPipeline::new(
            Arc::new(SlowCaptioner::new()),
            Arc::new(FixedExpander::new(&["prompt-1", "prompt-2", "prompt-3"])),
            Arc::clone(&generator) as Arc<dyn ImageGenerator>,
        )
        .with_rng(fastrand::Rng::with_seed(7));

        let result = p.generate(vec![img(1), img(2)]).await.expect("ok");

        let widths: Vec<u32> = result.iter().map(DynamicImage::width).collect();
        assert_eq!(widths, vec![101, 103], "failed prompt's slot is empty");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_two_prompts_two_images() {
        let generator = Arc::new(MarkingGenerator::new(None));
        let expander = Arc::new(FixedExpander::new(&["prompt-1", "prompt-2"]));
        let p = GenerationPipeline::new(
            Arc::new(SlowCaptioner::new()),
            Arc::clone(&expander) as Arc<dyn PromptExpander>,
            Arc::clone(&generator) as Arc<dyn ImageGenerator>,
        )
        .with_rng(fastrand::Rng::with_seed(7));

        let result = p.generate((1..=8).map(img).collect()).await.expect("ok");

        let widths: Vec<u32> = result.iter().map(DynamicImage::width).collect();
        assert_eq!(widths, vec![101, 102]);

        let seen = expander.seen.lock().expect("lock").clone();
        assert_eq!(seen.len(), 8);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_prompt_batch_issues_no_generation_calls() {
        let generator = Arc::new(MarkingGenerator::new(None));
        let p = GenerationPipeline::new(
            Arc::new(SlowCaptioner::new()),
            Arc::new(FixedExpander::new(&[])),
            Arc::clone(&generator) as Arc<dyn ImageGenerator>,
        );

        let result = p.generate(vec![img(1), img(2)]).await.expect("ok");

        assert!(result.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let p = pipeline(
            SlowCaptioner::new(),
            FixedExpander::new(&[]),
            MarkingGenerator::new(None),
        );

        let result = p.generate(Vec::new()).await;
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_input_captions_at_most_max() {
        let captioner = Arc::new(SlowCaptioner::new());
        let p = GenerationPipeline::new(
            Arc::clone(&captioner) as Arc<dyn Captioner>,
            Arc::new(FixedExpander::new(&[])),
            Arc::new(MarkingGenerator::new(None)),
        )
        .with_rng(fastrand::Rng::with_seed(42));

        p.generate((1..=20).map(img).collect()).await.expect("ok");

        assert_eq!(captioner.calls.load(Ordering::SeqCst), 8);
    }
}
