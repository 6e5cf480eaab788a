//! Shared fixtures for integration tests
//!
//! A recording stub backend stands in for the diffusion server, and a
//! counting fetcher proves which references went over the network.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat, Luma, Rgb, RgbImage};
use lumina_stage::{
    BackendFactory, ControlledGenerateRequest, GenerationBackend, InpaintRequest, LuminaError,
    ObjectDetector, PipelineConfig, RemoteFetcher, Result, RoomEditProcessor, ServiceContext,
    SynthesizedPrompt,
};
use std::{
    io::Cursor,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// What the stub saw for one inpainting call
#[derive(Debug, Clone)]
pub struct SeenInpaint {
    pub prompt: SynthesizedPrompt,
    pub image_dimensions: (u32, u32),
    pub mask_dimensions: (u32, u32),
    pub reference_dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum StubBehavior {
    #[default]
    Succeed,
    Fail,
    Hang,
}

/// Generation backend returning flat images and recording every call
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    behavior: StubBehavior,
    inpaints: Arc<Mutex<Vec<SeenInpaint>>>,
    generations: Arc<Mutex<Vec<SynthesizedPrompt>>>,
    releases: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn inpaints(&self) -> Vec<SeenInpaint> {
        self.inpaints.lock().unwrap().clone()
    }

    pub fn generations(&self) -> Vec<SynthesizedPrompt> {
        self.generations.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    async fn act(&self) -> Result<()> {
        match self.behavior {
            StubBehavior::Succeed => Ok(()),
            StubBehavior::Fail => Err(LuminaError::generation("CUDA out of memory")),
            StubBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn inpaint(&self, request: &InpaintRequest) -> Result<DynamicImage> {
        self.inpaints.lock().unwrap().push(SeenInpaint {
            prompt: request.prompt.clone(),
            image_dimensions: request.image.dimensions(),
            mask_dimensions: request.mask.dimensions(),
            reference_dimensions: request.reference.as_ref().map(GenericImageView::dimensions),
        });
        self.act().await?;
        let (width, height) = request.image.dimensions();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([210, 200, 190]))))
    }

    async fn generate(&self, request: &ControlledGenerateRequest) -> Result<DynamicImage> {
        self.generations.lock().unwrap().push(request.prompt.clone());
        self.act().await?;
        let (width, height) = request.conditioning.dimensions();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))))
    }

    async fn release_memory(&self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out clones of one stub
pub struct StubFactory(pub StubBackend);

impl BackendFactory for StubFactory {
    fn create_generator(&self, _config: &PipelineConfig) -> Result<Arc<dyn GenerationBackend>> {
        Ok(Arc::new(self.0.clone()))
    }

    fn create_detector(&self, _config: &PipelineConfig) -> Result<Arc<dyn ObjectDetector>> {
        Err(LuminaError::invalid_config("no detector in tests"))
    }
}

/// Fetcher serving one fixed payload and counting requests
#[derive(Debug, Default)]
pub struct CountingFetcher {
    pub payload: Option<Vec<u8>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl RemoteFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payload
            .clone()
            .ok_or_else(|| LuminaError::network_error(url, "connection refused"))
    }
}

impl CountingFetcher {
    pub fn serving(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Pipeline wired to stubs and a temporary storage root
pub struct Harness {
    pub processor: RoomEditProcessor,
    pub backend: StubBackend,
    pub fetcher: Arc<CountingFetcher>,
    pub storage: tempfile::TempDir,
}

impl Harness {
    pub fn new(behavior: StubBehavior, fetcher: CountingFetcher) -> Self {
        Self::with_timeout(behavior, fetcher, 300)
    }

    pub fn with_timeout(behavior: StubBehavior, fetcher: CountingFetcher, timeout_secs: u64) -> Self {
        let storage = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .storage_root(storage.path())
            .public_base_url("http://localhost:8000")
            .generation_timeout_secs(timeout_secs)
            .build()
            .unwrap();

        let backend = StubBackend::new(behavior);
        let fetcher = Arc::new(fetcher);
        let context = ServiceContext::builder(config)
            .factory(Box::new(StubFactory(backend.clone())))
            .fetcher(fetcher.clone())
            .build()
            .unwrap();

        Self {
            processor: RoomEditProcessor::new(Arc::new(context)),
            backend,
            fetcher,
            storage,
        }
    }

    pub fn gallery_files(&self) -> Vec<String> {
        let dir = self.storage.path().join("gallery");
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

/// Gradient room photo encoded as JPEG
pub fn room_jpeg(width: u32, height: u32) -> Vec<u8> {
    let room = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8 + 40, (y % 200) as u8 + 30, 150])
    });
    encode(&DynamicImage::ImageRgb8(room), ImageFormat::Jpeg)
}

/// Mask with a filled center rectangle, encoded as PNG
pub fn center_mask_png(width: u32, height: u32) -> Vec<u8> {
    let mask = image::GrayImage::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
        Luma([if inside { 255 } else { 0 }])
    });
    encode(&DynamicImage::ImageLuma8(mask), ImageFormat::Png)
}

/// Product shot on a white backdrop, encoded as PNG
pub fn product_png(width: u32, height: u32, color: [u8; 3], margin: u32) -> Vec<u8> {
    let shot = RgbImage::from_fn(width, height, |x, y| {
        let inside = x >= margin && y >= margin && x < width - margin && y < height - margin;
        if inside {
            Rgb(color)
        } else {
            Rgb([255, 255, 255])
        }
    });
    encode(&DynamicImage::ImageRgb8(shot), ImageFormat::Png)
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}
