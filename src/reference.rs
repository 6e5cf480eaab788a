//! Reference image resolution
//!
//! Turns the reference part of an edit request into a decoded, bounded image
//! or nothing at all. Uploads win over URIs. URIs inside the service's own
//! static namespace are read straight from the storage root; everything else
//! goes through a [`RemoteFetcher`]. Every failure here is recoverable: the
//! caller simply proceeds without a reference.

use crate::{
    config::{normalized_mount, PipelineConfig},
    error::{LuminaError, Result},
    types::{ReferenceOrigin, ReferenceSource},
    utils::{ImagePreprocessor, PreprocessingOptions},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use image::DynamicImage;
use reqwest::{Client, StatusCode};
use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

/// Base delay between fetch attempts, doubled after each failure
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Outbound retrieval of reference bytes
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the raw bytes behind `url`
    ///
    /// # Errors
    /// - Transport failures, non-success statuses or oversized bodies
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// A single failed attempt, tagged with whether another try could help
struct FetchFailure {
    transient: bool,
    error: LuminaError,
}

impl FetchFailure {
    fn transient(error: LuminaError) -> Self {
        Self {
            transient: true,
            error,
        }
    }

    fn permanent(error: LuminaError) -> Self {
        Self {
            transient: false,
            error,
        }
    }
}

/// Statuses worth retrying
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// HTTP fetcher with a browser identity, bounded retries and a size cap
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
    retries: u32,
}

impl HttpFetcher {
    /// Create a fetcher from the pipeline configuration
    ///
    /// # Errors
    /// - The HTTP client cannot be built
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.fetch_user_agent.clone())
            .timeout(Duration::from_secs(config.reference_fetch_timeout_secs))
            .build()
            .map_err(|e| LuminaError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            max_bytes: config.max_reference_bytes,
            retries: config.reference_fetch_retries,
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let error = LuminaError::network_error(&format!("Failed to fetch {}", url), &e);
            if e.is_timeout() || e.is_connect() {
                FetchFailure::transient(error)
            } else {
                FetchFailure::permanent(error)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error = LuminaError::Network(format!("HTTP error {} for {}", status, url));
            return Err(if is_transient_status(status) {
                FetchFailure::transient(error)
            } else {
                FetchFailure::permanent(error)
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(FetchFailure::permanent(LuminaError::Network(format!(
                    "{} declares {} bytes, limit is {}",
                    url, length, self.max_bytes
                ))));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                let error = LuminaError::network_error("Failed to read reference stream", &e);
                if e.is_timeout() {
                    FetchFailure::transient(error)
                } else {
                    FetchFailure::permanent(error)
                }
            })?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchFailure::permanent(LuminaError::Network(format!(
                    "{} exceeds the {} byte limit",
                    url, self.max_bytes
                ))));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(url, bytes = body.len(), attempt, "Fetched reference");
                    return Ok(body);
                },
                Err(failure) if failure.transient && attempt < self.retries => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!(
                        url,
                        attempt,
                        error = %failure.error,
                        "Transient reference fetch failure, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

/// A decoded reference ready for analysis and conditioning
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    /// Reference bounded to the configured maximum dimension
    pub image: DynamicImage,
    pub origin: ReferenceOrigin,
}

/// Resolves reference sources to decoded images
pub struct ReferenceResolver {
    fetcher: Arc<dyn RemoteFetcher>,
    storage_root: PathBuf,
    /// URI prefixes that denote the service's own static namespace
    local_prefixes: Vec<String>,
    min_reference_bytes: usize,
    options: PreprocessingOptions,
}

impl ReferenceResolver {
    /// Create a resolver over the configured storage root
    pub fn new(config: &PipelineConfig, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        let mount = normalized_mount(&config.static_mount);
        let local_prefixes = vec![
            format!("{}/", config.public_storage_prefix()),
            format!("{}/", mount),
        ];

        Self {
            fetcher,
            storage_root: config.storage_root.clone(),
            local_prefixes,
            min_reference_bytes: config.min_reference_bytes,
            options: PreprocessingOptions::from(config),
        }
    }

    /// Resolve a reference source, returning `None` when no usable reference exists
    ///
    /// An upload counts only if it is larger than the minimum size and decodes.
    /// Otherwise the URI, if any, is tried.
    pub async fn resolve(&self, source: &ReferenceSource) -> Option<ResolvedReference> {
        let (upload, uri) = match source {
            ReferenceSource::None => return None,
            ReferenceSource::Upload(bytes) => (Some(bytes), None),
            ReferenceSource::Uri(uri) => (None, Some(uri.as_str())),
            ReferenceSource::UploadOrUri { upload, uri } => (Some(upload), Some(uri.as_str())),
        };

        if let Some(bytes) = upload {
            match self.resolve_upload(bytes).await {
                Ok(reference) => return Some(reference),
                Err(e) => debug!(error = %e, "Ignoring reference upload"),
            }
        }

        let uri = uri?;
        match self.resolve_uri(uri).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(uri, error = %e, "Reference unavailable, continuing without it");
                None
            },
        }
    }

    /// Decode an uploaded reference
    ///
    /// # Errors
    /// - The upload is not larger than the minimum size
    /// - The bytes do not decode as an image
    pub async fn resolve_upload(&self, bytes: &[u8]) -> Result<ResolvedReference> {
        if bytes.len() <= self.min_reference_bytes {
            return Err(LuminaError::reference_unavailable(format!(
                "upload of {} bytes is below the {} byte minimum",
                bytes.len(),
                self.min_reference_bytes
            )));
        }
        let image = self.decode(bytes.to_vec()).await?;
        Ok(ResolvedReference {
            image,
            origin: ReferenceOrigin::Upload,
        })
    }

    /// Load a reference from a URI
    ///
    /// URIs in the local static namespace are read from disk and never fetched.
    ///
    /// # Errors
    /// - The local path escapes the storage root or cannot be read
    /// - The remote fetch fails
    /// - The bytes do not decode as an image
    pub async fn resolve_uri(&self, uri: &str) -> Result<ResolvedReference> {
        let uri = uri.trim();
        if let Some(path) = self.local_path(uri) {
            let path = path?;
            debug!(uri, path = %path.display(), "Reading reference from local storage");
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                LuminaError::reference_unavailable(format!(
                    "cannot read '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let image = self.decode(bytes).await?;
            return Ok(ResolvedReference {
                image,
                origin: ReferenceOrigin::LocalStorage(path),
            });
        }

        let bytes = self
            .fetcher
            .fetch(uri)
            .await
            .map_err(|e| LuminaError::reference_unavailable(e.to_string()))?;
        let image = self.decode(bytes).await?;
        Ok(ResolvedReference {
            image,
            origin: ReferenceOrigin::Remote(uri.to_string()),
        })
    }

    /// Map a URI in the local static namespace to a path under the storage root
    ///
    /// Returns `None` for URIs outside the namespace, and an error for paths
    /// that would leave the storage root.
    pub fn local_path(&self, uri: &str) -> Option<Result<PathBuf>> {
        let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
        let relative = self
            .local_prefixes
            .iter()
            .find_map(|prefix| without_query.strip_prefix(prefix.as_str()))?;

        Some(contained_path(&self.storage_root, relative))
    }

    async fn decode(&self, bytes: Vec<u8>) -> Result<DynamicImage> {
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| LuminaError::reference_unavailable(format!("undecodable image: {}", e)))?;
            Ok(ImagePreprocessor::prepare_reference(&image, &options))
        })
        .await
        .map_err(|e| LuminaError::processing_stage_error("reference decoding", &e.to_string(), None))?
    }
}

/// Join `relative` onto `root`, rejecting anything but plain path segments
fn contained_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let mut path = root.to_path_buf();
    let mut segments = 0usize;
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                path.push(segment);
                segments += 1;
            },
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LuminaError::reference_unavailable(format!(
                    "'{}' escapes the storage root",
                    relative.display()
                )));
            },
        }
    }
    if segments == 0 {
        return Err(LuminaError::reference_unavailable("empty local reference path"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FETCH_USER_AGENT;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::{io::Cursor, sync::Mutex};

    /// Fetcher that records every URL and serves a fixed answer
    struct RecordingFetcher {
        calls: Mutex<Vec<String>>,
        response: Option<Vec<u8>>,
    }

    impl RecordingFetcher {
        fn serving(bytes: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: Some(bytes),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: None,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteFetcher for RecordingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            self.response
                .clone()
                .ok_or_else(|| LuminaError::Network("HTTP error 403 Forbidden".to_string()))
        }
    }

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn config_for(root: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .storage_root(root)
            .public_base_url("http://localhost:8000")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_uri_is_read_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gallery")).unwrap();
        std::fs::write(dir.path().join("gallery/sofa.png"), png_bytes(64, 32, [20, 120, 30])).unwrap();

        let fetcher = RecordingFetcher::serving(png_bytes(8, 8, [0, 0, 0]));
        let resolver = ReferenceResolver::new(&config_for(dir.path()), fetcher.clone());

        for uri in [
            "http://localhost:8000/static/gallery/sofa.png",
            "/static/gallery/sofa.png?v=3",
        ] {
            let resolved = resolver
                .resolve(&ReferenceSource::Uri(uri.to_string()))
                .await
                .expect("local reference should resolve");
            assert_eq!(
                resolved.origin,
                ReferenceOrigin::LocalStorage(dir.path().join("gallery").join("sofa.png"))
            );
            assert_eq!(resolved.image.dimensions(), (64, 32));
        }
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::serving(png_bytes(8, 8, [0, 0, 0]));
        let resolver = ReferenceResolver::new(&config_for(dir.path()), fetcher.clone());

        let result = resolver.resolve_uri("/static/../secrets.png").await;
        assert!(matches!(result, Err(LuminaError::ReferenceUnavailable(_))));
        assert!(resolver
            .resolve(&ReferenceSource::Uri("/static/../secrets.png".to_string()))
            .await
            .is_none());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_upload_wins_over_uri() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::serving(png_bytes(8, 8, [0, 0, 0]));
        let resolver = ReferenceResolver::new(&config_for(dir.path()), fetcher.clone());

        let source = ReferenceSource::UploadOrUri {
            upload: png_bytes(600, 300, [10, 10, 10]),
            uri: "https://cdn.example.com/sofa.jpg".to_string(),
        };
        let resolved = resolver.resolve(&source).await.unwrap();
        assert_eq!(resolved.origin, ReferenceOrigin::Upload);
        assert_eq!(resolved.image.dimensions(), (512, 256));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tiny_upload_falls_back_to_uri() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::serving(png_bytes(40, 40, [200, 30, 30]));
        let resolver = ReferenceResolver::new(&config_for(dir.path()), fetcher.clone());

        let source = ReferenceSource::UploadOrUri {
            upload: vec![0u8; 50],
            uri: "https://cdn.example.com/chair.png".to_string(),
        };
        let resolved = resolver.resolve(&source).await.unwrap();
        assert_eq!(
            resolved.origin,
            ReferenceOrigin::Remote("https://cdn.example.com/chair.png".to_string())
        );
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let resolver =
            ReferenceResolver::new(&config_for(dir.path()), RecordingFetcher::failing());
        let garbage = vec![0x42u8; 4096];
        assert!(resolver
            .resolve(&ReferenceSource::Upload(garbage))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::failing();
        let resolver = ReferenceResolver::new(&config_for(dir.path()), fetcher.clone());

        let result = resolver
            .resolve(&ReferenceSource::Uri("https://cdn.example.com/blocked.png".to_string()))
            .await;
        assert!(result.is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn test_local_path_mapping() {
        let config = config_for(Path::new("/srv/static"));
        let resolver = ReferenceResolver::new(&config, RecordingFetcher::failing());

        assert!(resolver.local_path("https://cdn.example.com/static/x.png").is_none());
        assert!(resolver.local_path("/assets/x.png").is_none());
        assert_eq!(
            resolver.local_path("/static/products/x.png").unwrap().unwrap(),
            PathBuf::from("/srv/static/products/x.png")
        );
        assert!(resolver.local_path("/static/").unwrap().is_err());
    }

    /// Minimal HTTP server answering one scripted response per connection
    ///
    /// Returns the base URL and the request heads it received, lowercased.
    async fn scripted_server(responses: Vec<(u16, Vec<u8>)>) -> (String, Arc<Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let heads = Arc::new(Mutex::new(Vec::new()));
        let seen = heads.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head: Vec<u8> = Vec::new();
                let mut buffer = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let read = socket.read(&mut buffer).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    head.extend_from_slice(&buffer[..read]);
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).to_lowercase());

                let mut reply = format!(
                    "HTTP/1.1 {} Scripted\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    status,
                    body.len()
                )
                .into_bytes();
                reply.extend_from_slice(&body);
                socket.write_all(&reply).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (url, heads)
    }

    #[tokio::test]
    async fn test_http_fetcher_retries_transient_status() {
        let image = png_bytes(32, 32, [10, 200, 10]);
        let (url, heads) =
            scripted_server(vec![(503, b"busy".to_vec()), (200, image.clone())]).await;
        let fetcher = HttpFetcher::new(&PipelineConfig::default()).unwrap();

        let body = fetcher.fetch(&format!("{}/sofa.png", url)).await.unwrap();
        assert_eq!(body, image);

        let heads = heads.lock().unwrap();
        assert_eq!(heads.len(), 2);
        let agent = format!("user-agent: {}", DEFAULT_FETCH_USER_AGENT.to_lowercase());
        assert!(heads.iter().all(|head| head.contains(&agent)));
        assert!(heads[0].starts_with("get /sofa.png"));
    }

    #[tokio::test]
    async fn test_http_fetcher_does_not_retry_forbidden() {
        let (url, heads) = scripted_server(vec![
            (403, b"denied".to_vec()),
            (200, png_bytes(8, 8, [0, 0, 0])),
        ])
        .await;
        let fetcher = HttpFetcher::new(&PipelineConfig::default()).unwrap();

        let error = fetcher.fetch(&format!("{}/sofa.png", url)).await.unwrap_err();
        assert!(matches!(error, LuminaError::Network(ref message) if message.contains("403")));
        assert_eq!(heads.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }
}
