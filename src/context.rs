//! Process-wide service context
//!
//! Built once at startup and shared by every request. Owns the lazily created
//! model handles and the lock that serializes generation calls; everything
//! else a request needs is per-request state.

use crate::{
    analysis::{AttributeAnalyzer, HeuristicAnalyzer},
    backends::WebUiBackend,
    config::PipelineConfig,
    error::{LuminaError, Result},
    inference::{GenerationBackend, ObjectDetector},
    prompt::PromptSynthesizer,
    reference::{HttpFetcher, ReferenceResolver, RemoteFetcher},
    services::GalleryStore,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{info, warn};

/// Factory trait for creating model handles
pub trait BackendFactory: Send + Sync {
    /// Create the generation backend
    ///
    /// # Errors
    /// - Backend client construction failures
    fn create_generator(&self, config: &PipelineConfig) -> Result<Arc<dyn GenerationBackend>>;

    /// Create the object detector
    ///
    /// # Errors
    /// - No detector available from this factory
    /// - Detector construction failures
    fn create_detector(&self, config: &PipelineConfig) -> Result<Arc<dyn ObjectDetector>>;
}

/// Default backend factory implementation
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_generator(&self, config: &PipelineConfig) -> Result<Arc<dyn GenerationBackend>> {
        Ok(Arc::new(WebUiBackend::new(config.backend.clone())?))
    }

    fn create_detector(&self, _config: &PipelineConfig) -> Result<Arc<dyn ObjectDetector>> {
        // Detection models live outside this crate and are injected by the frontend
        Err(LuminaError::invalid_config(
            "No object detector available in core. Must be injected through a BackendFactory.",
        ))
    }
}

async fn release_backend(backend: &Arc<dyn GenerationBackend>) {
    if let Err(e) = backend.release_memory().await {
        warn!(backend = backend.name(), error = %e, "Failed to release backend memory");
    }
}

/// Holds the generation lock and releases backend memory before giving it up
///
/// If the owning future is dropped mid-call, the release runs on a spawned
/// task that keeps the lock until it finishes.
struct ReleaseGuard {
    backend: Option<Arc<dyn GenerationBackend>>,
    lock: Option<OwnedMutexGuard<()>>,
}

impl ReleaseGuard {
    async fn release(mut self) {
        if let Some(backend) = self.backend.take() {
            release_backend(&backend).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        let lock = self.lock.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(backend = backend.name(), "Generation call cancelled, releasing memory");
                handle.spawn(async move {
                    release_backend(&backend).await;
                    drop(lock);
                });
            },
            Err(_) => warn!(
                backend = backend.name(),
                "Generation call dropped outside a runtime, memory not released"
            ),
        }
    }
}

/// Shared state for all requests
pub struct ServiceContext {
    config: PipelineConfig,
    factory: Box<dyn BackendFactory>,
    generator: OnceCell<Arc<dyn GenerationBackend>>,
    detector: OnceCell<Arc<dyn ObjectDetector>>,
    generation_lock: Arc<Mutex<()>>,
    gallery: GalleryStore,
    resolver: ReferenceResolver,
    analyzer: Arc<dyn AttributeAnalyzer>,
    synthesizer: PromptSynthesizer,
}

impl ServiceContext {
    /// Create a context with the default factory, fetcher and analyzer
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client construction failures
    pub fn new(config: PipelineConfig) -> Result<Self> {
        ServiceContextBuilder::new(config).build()
    }

    /// Start building a context with injected collaborators
    #[must_use]
    pub fn builder(config: PipelineConfig) -> ServiceContextBuilder {
        ServiceContextBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn gallery(&self) -> &GalleryStore {
        &self.gallery
    }

    #[must_use]
    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    #[must_use]
    pub fn analyzer(&self) -> &dyn AttributeAnalyzer {
        self.analyzer.as_ref()
    }

    #[must_use]
    pub fn synthesizer(&self) -> &PromptSynthesizer {
        &self.synthesizer
    }

    /// Generation handle, created on first use
    ///
    /// Concurrent first callers share a single initialization. A failed
    /// initialization leaves the slot empty so the next call retries.
    ///
    /// # Errors
    /// - Factory failures
    pub async fn generator(&self) -> Result<Arc<dyn GenerationBackend>> {
        self.generator
            .get_or_try_init(|| async {
                let backend = self.factory.create_generator(&self.config)?;
                info!(backend = backend.name(), "Generation backend initialized");
                Ok(backend)
            })
            .await
            .cloned()
    }

    /// Detector handle, created on first use
    ///
    /// # Errors
    /// - Factory failures, including factories without a detector
    pub async fn detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        self.detector
            .get_or_try_init(|| async {
                let detector = self.factory.create_detector(&self.config)?;
                info!(detector = detector.name(), "Object detector initialized");
                Ok(detector)
            })
            .await
            .cloned()
    }

    /// Run one generation call with exclusive access to the backend
    ///
    /// The call is bounded by `generation_timeout_secs`. Whatever the outcome,
    /// `release_memory` runs before the lock is given up, including when the
    /// returned future is dropped before completion.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Errors returned by `operation`
    /// - `GenerationTimeout` when the bound expires
    pub async fn with_generator<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn GenerationBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backend = self.generator().await?;
        let lock = Arc::clone(&self.generation_lock).lock_owned().await;
        let guard = ReleaseGuard {
            backend: Some(Arc::clone(&backend)),
            lock: Some(lock),
        };

        let limit = self.config.generation_timeout_secs;
        let outcome = match tokio::time::timeout(Duration::from_secs(limit), operation(backend)).await
        {
            Ok(result) => result,
            Err(_) => Err(LuminaError::GenerationTimeout(limit)),
        };

        guard.release().await;
        outcome
    }
}

/// Builder for `ServiceContext`
pub struct ServiceContextBuilder {
    config: PipelineConfig,
    factory: Option<Box<dyn BackendFactory>>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    analyzer: Option<Arc<dyn AttributeAnalyzer>>,
}

impl ServiceContextBuilder {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            factory: None,
            fetcher: None,
            analyzer: None,
        }
    }

    #[must_use]
    pub fn factory(mut self, factory: Box<dyn BackendFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn AttributeAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Validate the configuration and assemble the context
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client construction failures for the default fetcher
    pub fn build(self) -> Result<ServiceContext> {
        self.config.validate()?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.config)?),
        };

        Ok(ServiceContext {
            factory: self
                .factory
                .unwrap_or_else(|| Box::new(DefaultBackendFactory)),
            generator: OnceCell::new(),
            detector: OnceCell::new(),
            generation_lock: Arc::new(Mutex::new(())),
            gallery: GalleryStore::new(&self.config),
            resolver: ReferenceResolver::new(&self.config, fetcher),
            analyzer: self.analyzer.unwrap_or_else(|| Arc::new(HeuristicAnalyzer)),
            synthesizer: PromptSynthesizer::from(&self.config),
            config: self.config,
        })
    }
}
