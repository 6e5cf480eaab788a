//! Generation and detection backend abstractions

use crate::{
    error::Result,
    types::{DetectedObject, SynthesizedPrompt},
};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage};

/// Masked edit request for one inpainting call
#[derive(Debug, Clone)]
pub struct InpaintRequest {
    pub prompt: SynthesizedPrompt,
    /// Base image, already bounded and snapped
    pub image: DynamicImage,
    /// Mask at exactly the base image dimensions; white selects the region
    pub mask: GrayImage,
    pub steps: u32,
    /// Reference product used for image conditioning in stage mode
    pub reference: Option<DynamicImage>,
}

/// Whole-image generation conditioned on an edge map
#[derive(Debug, Clone)]
pub struct ControlledGenerateRequest {
    pub prompt: SynthesizedPrompt,
    /// Binary edge map used as structural conditioning
    pub conditioning: GrayImage,
    pub steps: u32,
}

/// Trait for diffusion generation backends
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs and errors
    fn name(&self) -> &str;

    /// Fill the masked region of an image
    ///
    /// # Errors
    /// - Backend unreachable or reporting a failure
    /// - Response cannot be decoded
    async fn inpaint(&self, request: &InpaintRequest) -> Result<DynamicImage>;

    /// Generate a whole image from an edge map
    ///
    /// # Errors
    /// - Backend unreachable or reporting a failure
    /// - Response cannot be decoded
    async fn generate(&self, request: &ControlledGenerateRequest) -> Result<DynamicImage>;

    /// Return accelerator memory held after a call
    ///
    /// Called once after every generation attempt, whatever its outcome.
    /// Failures are logged by the caller and never surfaced.
    async fn release_memory(&self) -> Result<()> {
        Ok(())
    }
}

/// Trait for object detectors
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Short identifier used in logs and errors
    fn name(&self) -> &str;

    /// Detect objects with boxes normalized to the image size
    ///
    /// # Errors
    /// - Detector failures
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>>;
}
