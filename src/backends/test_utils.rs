//! Test utilities and mock backends
//!
//! Mock implementations of `GenerationBackend` and `ObjectDetector` that record
//! every call, so pipeline tests can assert on prompts, conditioning and
//! memory release without a diffusion server.

use crate::{
    error::{LuminaError, Result},
    inference::{ControlledGenerateRequest, GenerationBackend, InpaintRequest, ObjectDetector},
    types::{DetectedObject, SynthesizedPrompt},
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// What the mock saw for one inpainting call
#[derive(Debug, Clone)]
pub struct RecordedInpaint {
    pub prompt: SynthesizedPrompt,
    pub image_dimensions: (u32, u32),
    pub mask_dimensions: (u32, u32),
    pub reference_dimensions: Option<(u32, u32)>,
    pub steps: u32,
}

/// Recording generation backend
#[derive(Debug, Clone, Default)]
pub struct MockGenerationBackend {
    inpaint_calls: Arc<Mutex<Vec<RecordedInpaint>>>,
    generate_calls: Arc<Mutex<Vec<SynthesizedPrompt>>>,
    releases: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockGenerationBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every call fails like an out-of-memory device
    #[must_use]
    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// A backend that sleeps before answering
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn inpaint_calls(&self) -> Vec<RecordedInpaint> {
        self.inpaint_calls.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> Vec<SynthesizedPrompt> {
        self.generate_calls.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Highest number of generation calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(LuminaError::generation("CUDA out of memory"));
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn inpaint(&self, request: &InpaintRequest) -> Result<DynamicImage> {
        self.inpaint_calls.lock().unwrap().push(RecordedInpaint {
            prompt: request.prompt.clone(),
            image_dimensions: request.image.dimensions(),
            mask_dimensions: request.mask.dimensions(),
            reference_dimensions: request.reference.as_ref().map(GenericImageView::dimensions),
            steps: request.steps,
        });
        self.simulate().await?;

        let (width, height) = request.image.dimensions();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 190, 180]))))
    }

    async fn generate(&self, request: &ControlledGenerateRequest) -> Result<DynamicImage> {
        self.generate_calls.lock().unwrap().push(request.prompt.clone());
        self.simulate().await?;

        let (width, height) = request.conditioning.dimensions();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 110, 100]))))
    }

    async fn release_memory(&self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Detector that returns a fixed list
#[derive(Debug, Clone, Default)]
pub struct MockDetector {
    objects: Vec<DetectedObject>,
    calls: Arc<AtomicUsize>,
}

impl MockDetector {
    #[must_use]
    pub fn with_objects(objects: Vec<DetectedObject>) -> Self {
        Self {
            objects,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectDetector for MockDetector {
    fn name(&self) -> &str {
        "mock-detector"
    }

    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<DetectedObject>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[tokio::test]
    async fn test_failing_backend_records_the_attempt() {
        let backend = MockGenerationBackend::new_failing();
        let request = ControlledGenerateRequest {
            prompt: SynthesizedPrompt {
                positive: "loft".to_string(),
                negative: String::new(),
                guidance_scale: 7.5,
            },
            conditioning: GrayImage::new(8, 8),
            steps: 20,
        };

        assert!(matches!(
            backend.generate(&request).await,
            Err(LuminaError::Generation(_))
        ));
        assert_eq!(backend.generate_calls().len(), 1);
        assert_eq!(backend.release_count(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_history() {
        let backend = MockGenerationBackend::new();
        let clone = backend.clone();
        clone.release_memory().await.unwrap();
        assert_eq!(backend.release_count(), 1);
    }
}
