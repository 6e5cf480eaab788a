//! Room edit processor
//!
//! This module provides the `RoomEditProcessor` that consolidates the business
//! logic of every request: decoding, preprocessing, reference handling, mode
//! selection, prompt synthesis, the single generation call and persistence.
//! The CLI and any service frontend drive requests through it so behavior
//! stays identical across surfaces.

use crate::{
    context::ServiceContext,
    error::{LuminaError, Result},
    inference::{ControlledGenerateRequest, InpaintRequest},
    reference::ResolvedReference,
    services::{
        ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker,
    },
    types::{
        ArtifactKind, DetectedObject, EditMode, EditOutcome, EditRequest, GenerateOutcome,
        GenerateRequest, ProcessingTimings, ProductCategory, ReferenceAttributes,
        SynthesizedPrompt,
    },
    utils::{ImagePreprocessor, PreprocessingOptions},
};
use image::DynamicImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument, Instrument};

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn blocking_stage_error(stage: &str, error: &tokio::task::JoinError) -> LuminaError {
    LuminaError::processing_stage_error(stage, &error.to_string(), None)
}

/// Decoded edit inputs
struct DecodedEdit {
    image: DynamicImage,
    mask: DynamicImage,
}

/// Stateless request processor over a shared service context
pub struct RoomEditProcessor {
    context: Arc<ServiceContext>,
    reporter: Arc<dyn ProgressReporter>,
}

impl RoomEditProcessor {
    /// Create a processor that reports no progress
    #[must_use]
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self {
            context,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Attach a progress reporter
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    fn options(&self) -> PreprocessingOptions {
        PreprocessingOptions::from(self.context.config())
    }

    /// Run a masked edit
    ///
    /// Without a usable reference the masked region is cleared (remove mode);
    /// with one it is filled with a rendition of the product (stage mode).
    /// Exactly one generation call is made.
    ///
    /// # Errors
    /// - `Decode` when the base image or mask cannot be decoded
    /// - `InvalidInput` for zero-sized inputs
    /// - `Generation` or `GenerationTimeout` from the backend
    /// - `Persistence` when the artifact cannot be written
    #[instrument(
        skip(self, request),
        fields(
            category = ?request.category,
            prompt_chars = request.user_prompt.chars().count()
        )
    )]
    pub async fn edit(&self, request: EditRequest) -> Result<EditOutcome> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let result = self.run_edit(request, &mut tracker).await;
        match &result {
            Ok(outcome) => {
                tracker.report_stage(ProcessingStage::Completed);
                tracker.report_completion(&outcome.timings);
            },
            Err(e) => tracker.report_error(&e.to_string()),
        }
        result
    }

    async fn run_edit(
        &self,
        request: EditRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<EditOutcome> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let config = self.context.config();
        let EditRequest {
            base_image,
            mask,
            reference,
            user_prompt,
            category,
            style,
        } = request;

        tracker.report_stage(ProcessingStage::Decoding);
        let decode_start = Instant::now();
        let decoded = tokio::task::spawn_blocking(move || -> Result<DecodedEdit> {
            Ok(DecodedEdit {
                image: ImageIOService::decode(&base_image, "base image")?,
                mask: ImageIOService::decode(&mask, "mask")?,
            })
        })
        .await
        .map_err(|e| blocking_stage_error("decoding", &e))??;
        timings.decode_ms = elapsed_ms(decode_start);
        debug!(
            image = %format!("{}x{}", decoded.image.width(), decoded.image.height()),
            mask = %format!("{}x{}", decoded.mask.width(), decoded.mask.height()),
            "Decoded edit inputs"
        );

        tracker.report_stage(ProcessingStage::Preprocessing);
        tracker.report_stage(ProcessingStage::ReferenceResolution);
        let options = self.options();
        let preprocess = async {
            let start = Instant::now();
            let prepared = tokio::task::spawn_blocking(move || {
                ImagePreprocessor::prepare_for_edit(&decoded.image, &decoded.mask, &options)
            })
            .await
            .map_err(|e| blocking_stage_error("preprocessing", &e))?;
            prepared.map(|prepared| (prepared, elapsed_ms(start)))
        }
        .instrument(info_span!("preprocessing"));
        let resolve = async {
            let start = Instant::now();
            let resolved = self.context.resolver().resolve(&reference).await;
            (resolved, elapsed_ms(start))
        }
        .instrument(info_span!("reference_resolution"));

        let (prepared, (resolved, reference_ms)) = tokio::join!(preprocess, resolve);
        let (prepared, preprocessing_ms) = prepared?;
        timings.preprocessing_ms = preprocessing_ms;
        timings.reference_ms = reference_ms;

        let (reference_image, reference_origin) = match resolved {
            Some(ResolvedReference { image, origin }) => (Some(image), Some(origin)),
            None => (None, None),
        };

        let (mode, prompt, attributes) = match &reference_image {
            Some(reference) => {
                tracker.report_stage(ProcessingStage::Analysis);
                let analysis_start = Instant::now();
                let attributes = self
                    .context
                    .analyzer()
                    .analyze(reference, &user_prompt, category);
                timings.analysis_ms = elapsed_ms(analysis_start);

                tracker.report_stage(ProcessingStage::PromptSynthesis);
                let prompt = self
                    .context
                    .synthesizer()
                    .build_staging_prompt(&user_prompt, &attributes);
                (EditMode::Stage, prompt, Some(attributes))
            },
            None => {
                tracker.report_stage(ProcessingStage::PromptSynthesis);
                (
                    EditMode::Remove,
                    self.context.synthesizer().build_removal_prompt(),
                    None,
                )
            },
        };

        let prompt = self.context.synthesizer().apply_style(prompt, style);

        info!(
            mode = ?mode,
            origin = ?reference_origin,
            color = %attributes.as_ref().map(|a| a.dominant_color.as_str()).unwrap_or(""),
            guidance = prompt.guidance_scale,
            "Edit mode selected"
        );

        tracker.report_stage_with_description(
            ProcessingStage::Generation,
            format!("Generating image ({} mode)", mode.as_str()),
        );
        let generation_start = Instant::now();
        let inpaint = InpaintRequest {
            prompt: prompt.clone(),
            image: prepared.image,
            mask: prepared.mask,
            steps: config.edit_steps,
            reference: reference_image,
        };
        let generated = self
            .context
            .with_generator(|backend| {
                let inpaint = &inpaint;
                async move { backend.inpaint(inpaint).await }
            })
            .instrument(info_span!("generation", mode = ?mode))
            .await?;
        timings.generation_ms = elapsed_ms(generation_start);

        tracker.report_stage(ProcessingStage::Persisting);
        let persist_start = Instant::now();
        let artifact = self
            .context
            .gallery()
            .store(generated, ArtifactKind::Edit)
            .await?;
        timings.persist_ms = elapsed_ms(persist_start);
        timings.total_ms = elapsed_ms(total_start);

        info!(
            file = %artifact.filename,
            total_ms = timings.total_ms,
            generation_ms = timings.generation_ms,
            "Edit completed"
        );

        Ok(EditOutcome {
            mode,
            prompt,
            attributes,
            reference_origin,
            artifact,
            timings,
        })
    }

    /// Restyle a whole room, keeping its structure through an edge map
    ///
    /// # Errors
    /// - `Decode` when the image cannot be decoded
    /// - `Generation` or `GenerationTimeout` from the backend
    /// - `Persistence` when the artifact cannot be written
    #[instrument(skip(self, request), fields(style = ?request.style))]
    pub async fn generate_room(&self, request: GenerateRequest) -> Result<GenerateOutcome> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let result = self.run_generate(request, &mut tracker).await;
        match &result {
            Ok(outcome) => {
                tracker.report_stage(ProcessingStage::Completed);
                tracker.report_completion(&outcome.timings);
            },
            Err(e) => tracker.report_error(&e.to_string()),
        }
        result
    }

    async fn run_generate(
        &self,
        request: GenerateRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<GenerateOutcome> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let config = self.context.config();
        let GenerateRequest {
            image,
            user_prompt,
            style,
        } = request;

        tracker.report_stage(ProcessingStage::Decoding);
        let decode_start = Instant::now();
        let decoded = tokio::task::spawn_blocking(move || {
            ImageIOService::decode(&image, "base image")
        })
        .await
        .map_err(|e| blocking_stage_error("decoding", &e))??;
        timings.decode_ms = elapsed_ms(decode_start);

        tracker.report_stage(ProcessingStage::Preprocessing);
        let preprocessing_start = Instant::now();
        let options = self.options();
        let edges = tokio::task::spawn_blocking(move || {
            ImagePreprocessor::prepare_structural(&decoded, &options)
        })
        .instrument(info_span!("preprocessing"))
        .await
        .map_err(|e| blocking_stage_error("preprocessing", &e))?;
        timings.preprocessing_ms = elapsed_ms(preprocessing_start);

        tracker.report_stage(ProcessingStage::PromptSynthesis);
        let prompt: SynthesizedPrompt = self
            .context
            .synthesizer()
            .build_generation_prompt(&user_prompt, style);
        debug!(positive = %prompt.positive, "Generation prompt built");

        tracker.report_stage(ProcessingStage::Generation);
        let generation_start = Instant::now();
        let request = ControlledGenerateRequest {
            prompt: prompt.clone(),
            conditioning: edges,
            steps: config.generation_steps,
        };
        let generated = self
            .context
            .with_generator(|backend| {
                let request = &request;
                async move { backend.generate(request).await }
            })
            .instrument(info_span!("generation"))
            .await?;
        timings.generation_ms = elapsed_ms(generation_start);

        tracker.report_stage(ProcessingStage::Persisting);
        let persist_start = Instant::now();
        let artifact = self
            .context
            .gallery()
            .store(generated, ArtifactKind::Generation)
            .await?;
        timings.persist_ms = elapsed_ms(persist_start);
        timings.total_ms = elapsed_ms(total_start);

        info!(file = %artifact.filename, total_ms = timings.total_ms, "Room generation completed");

        Ok(GenerateOutcome {
            prompt,
            artifact,
            timings,
        })
    }

    /// Detect objects in a room photo
    ///
    /// Results below the configured confidence are dropped, boxes are clamped
    /// to the image and the list is ordered by confidence, highest first.
    ///
    /// # Errors
    /// - `Decode` when the image cannot be decoded
    /// - `InvalidConfig` when no detector is available
    /// - Detector failures
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub async fn detect_objects(&self, image_bytes: &[u8]) -> Result<Vec<DetectedObject>> {
        let bytes = image_bytes.to_vec();
        let max_dimension = self.context.config().max_edit_dimension;
        let image = tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
            let image = ImageIOService::decode(&bytes, "image")?;
            Ok(ImagePreprocessor::bound_image(&image, max_dimension))
        })
        .await
        .map_err(|e| blocking_stage_error("decoding", &e))??;

        let detector = self.context.detector().await?;
        let raw = detector.detect(&image).await?;
        let found = raw.len();

        let config = self.context.config();
        let threshold = config.min_detection_confidence;
        let allowed = |label: &str| {
            config.detection_labels.is_empty()
                || config
                    .detection_labels
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(label))
        };
        let mut objects: Vec<DetectedObject> = raw
            .into_iter()
            .filter(|object| object.confidence >= threshold)
            .filter(|object| allowed(&object.label))
            .map(|object| DetectedObject {
                bbox: object.bbox.clamped(),
                ..object
            })
            .collect();
        objects.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        debug!(found, kept = objects.len(), threshold, "Detection finished");
        Ok(objects)
    }

    /// Attributes the analyzer would infer for a reference image
    ///
    /// Runs no generation. Useful for previewing how a product will be
    /// described before staging it.
    ///
    /// # Errors
    /// - `Decode` when the reference cannot be decoded
    pub async fn analyze_reference(
        &self,
        reference_bytes: &[u8],
        user_prompt: &str,
        category: Option<ProductCategory>,
    ) -> Result<(ReferenceAttributes, SynthesizedPrompt)> {
        let bytes = reference_bytes.to_vec();
        let options = self.options();
        let reference = tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
            let image = ImageIOService::decode(&bytes, "reference image")?;
            Ok(ImagePreprocessor::prepare_reference(&image, &options))
        })
        .await
        .map_err(|e| blocking_stage_error("decoding", &e))??;

        let attributes = self
            .context
            .analyzer()
            .analyze(&reference, user_prompt, category);
        let prompt = self
            .context
            .synthesizer()
            .build_staging_prompt(user_prompt, &attributes);
        Ok((attributes, prompt))
    }
}
