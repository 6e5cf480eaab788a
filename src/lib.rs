#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Lumina Stage
//!
//! Room photo editing around a conditioned diffusion backend: masked furniture
//! removal, reference-guided virtual staging and whole-room restyling.
//!
//! ## Features
//!
//! - **Two edit modes**: a masked edit without a usable reference removes what
//!   is under the mask; with a reference it stages that product in its place
//! - **Reference analysis**: dominant color and shape inferred from the
//!   product photo and folded into the staging prompt
//! - **Reference resolution**: uploads, published storage paths (read from
//!   disk, never fetched) and remote URLs with bounded retries
//! - **Structure preservation**: Canny edge maps condition whole-room generation
//! - **Gallery**: collision-free artifact storage and newest-first listing
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumina_stage::{
//!     EditRequest, PipelineConfig, ReferenceSource, RoomEditProcessor, ServiceContext,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .backend_url("http://127.0.0.1:7860")
//!     .storage_root("static")
//!     .build()?;
//!
//! // One context per process; it owns the backend handle and the generation lock
//! let context = Arc::new(ServiceContext::new(config)?);
//! let processor = RoomEditProcessor::new(context);
//!
//! let request = EditRequest::new(
//!     std::fs::read("living_room.jpg")?,
//!     std::fs::read("sofa_mask.png")?,
//!     "green velvet sofa",
//! )
//! .with_reference(ReferenceSource::Uri(
//!     "https://cdn.example.com/products/sofa.jpg".to_string(),
//! ));
//!
//! let outcome = processor.edit(request).await?;
//! println!("{:?} -> {}", outcome.mode, outcome.artifact.public_url);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom backends
//!
//! The generation backend and the object detector are created through a
//! [`BackendFactory`]. The default factory talks to a WebUI/Forge server and
//! provides no detector.
//!
//! ```rust,no_run
//! use lumina_stage::{
//!     BackendFactory, GenerationBackend, ObjectDetector, PipelineConfig, ServiceContext,
//!     WebUiBackend,
//! };
//! use std::sync::Arc;
//!
//! struct MyFactory;
//!
//! impl BackendFactory for MyFactory {
//!     fn create_generator(
//!         &self,
//!         config: &PipelineConfig,
//!     ) -> lumina_stage::Result<Arc<dyn GenerationBackend>> {
//!         Ok(Arc::new(WebUiBackend::new(config.backend.clone())?))
//!     }
//!
//!     fn create_detector(
//!         &self,
//!         _config: &PipelineConfig,
//!     ) -> lumina_stage::Result<Arc<dyn ObjectDetector>> {
//!         Err(lumina_stage::LuminaError::invalid_config("no detector"))
//!     }
//! }
//!
//! # fn example() -> anyhow::Result<()> {
//! let _context = ServiceContext::builder(PipelineConfig::default())
//!     .factory(Box::new(MyFactory))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` spans and events and `log` records and never
//! installs a subscriber. The CLI configures one through `TracingConfig`.

pub mod analysis;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod inference;
pub mod processor;
pub mod prompt;
pub mod reference;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use analysis::{AttributeAnalyzer, HeuristicAnalyzer};
pub use backends::WebUiBackend;
pub use config::{BackendConfig, PipelineConfig, PipelineConfigBuilder};
pub use context::{BackendFactory, DefaultBackendFactory, ServiceContext, ServiceContextBuilder};
pub use error::{LuminaError, Result};
pub use inference::{ControlledGenerateRequest, GenerationBackend, InpaintRequest, ObjectDetector};
pub use processor::RoomEditProcessor;
pub use prompt::PromptSynthesizer;
pub use reference::{HttpFetcher, ReferenceResolver, RemoteFetcher, ResolvedReference};
pub use services::{
    ConsoleProgressReporter, GalleryStore, ImageIOService, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    ArtifactKind, ColorLabel, DetectedObject, EditMode, EditOutcome, EditRequest, GalleryEntry,
    GenerateOutcome, GenerateRequest, GeneratedArtifact, NormalizedBox, ProcessingTimings,
    ProductCategory, ReferenceAttributes, ReferenceOrigin, ReferenceSource, StyleTag,
    SynthesizedPrompt,
};
pub use utils::{ImagePreprocessor, PreprocessingOptions};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, init_cli_tracing, spans, TracingConfig, TracingFormat,
};
