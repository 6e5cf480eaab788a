//! Configuration types for room editing operations

use crate::error::{LuminaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Browser-like identity sent with outbound reference fetches.
///
/// Product CDNs commonly reject default library user agents.
pub const DEFAULT_FETCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Furniture and decor classes kept by object detection
pub const DEFAULT_DETECTION_LABELS: [&str; 6] = ["chair", "couch", "plant", "bed", "table", "vase"];

/// Connection settings for the WebUI-compatible generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the WebUI/Forge API server
    pub base_url: String,

    /// Optional bearer token for the API
    pub api_key: Option<String>,

    /// ControlNet model used for edge-map conditioning
    pub controlnet_canny_model: String,

    /// Preprocessor module for reference conditioning
    pub ip_adapter_module: String,

    /// Model used for reference conditioning
    pub ip_adapter_model: String,

    /// Weight of the reference conditioning unit
    pub ip_adapter_weight: f32,

    /// Sampler name passed to the backend
    pub sampler_name: String,

    /// Blur radius applied to the mask edges by the backend
    pub mask_blur: u32,

    /// HTTP request timeout for a single backend call (seconds)
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7860".to_string(),
            api_key: None,
            controlnet_canny_model: "control_v11p_sd15_canny".to_string(),
            ip_adapter_module: "ip-adapter_clip_sd15".to_string(),
            ip_adapter_model: "ip-adapter_sd15".to_string(),
            ip_adapter_weight: 0.8,
            sampler_name: "UniPC".to_string(),
            mask_blur: 4,
            request_timeout_secs: 600,
        }
    }
}

/// Configuration for the editing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest side for base images and masks before editing
    pub max_edit_dimension: u32,

    /// Longest side for images before edge detection
    pub max_structural_dimension: u32,

    /// Longest side for reference product images
    pub max_reference_dimension: u32,

    /// Canny hysteresis low threshold
    pub canny_low_threshold: f32,

    /// Canny hysteresis high threshold
    pub canny_high_threshold: f32,

    /// Guidance scale for whole-room generation
    pub generation_guidance: f32,

    /// Guidance scale for removal inpainting
    pub removal_guidance: f32,

    /// Guidance scale for staging inpainting (must exceed removal)
    pub staging_guidance: f32,

    /// Inference steps for whole-room generation
    pub generation_steps: u32,

    /// Inference steps for masked edits
    pub edit_steps: u32,

    /// Upper bound for a single generation call (seconds)
    pub generation_timeout_secs: u64,

    /// Uploads at or below this size are treated as absent
    pub min_reference_bytes: usize,

    /// Largest reference download accepted
    pub max_reference_bytes: usize,

    /// Timeout for a single outbound reference fetch (seconds)
    pub reference_fetch_timeout_secs: u64,

    /// Extra attempts after a transient reference fetch failure
    pub reference_fetch_retries: u32,

    /// User agent for outbound reference fetches
    pub fetch_user_agent: String,

    /// Detections below this confidence are dropped
    pub min_detection_confidence: f32,

    /// Detector labels that are reported; empty keeps every label
    pub detection_labels: Vec<String>,

    /// Root directory served under `static_mount`
    pub storage_root: PathBuf,

    /// Externally visible base URL of the service
    pub public_base_url: String,

    /// Path prefix under which `storage_root` is published
    pub static_mount: String,

    /// Generation backend settings
    pub backend: BackendConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_edit_dimension: 1024,
            max_structural_dimension: 1024,
            max_reference_dimension: 512,
            canny_low_threshold: 100.0,
            canny_high_threshold: 200.0,
            generation_guidance: 7.5,
            removal_guidance: 7.5,
            staging_guidance: 10.0,
            generation_steps: 20,
            edit_steps: 30,
            generation_timeout_secs: 300,
            min_reference_bytes: 100,
            max_reference_bytes: 20 * 1024 * 1024,
            reference_fetch_timeout_secs: 15,
            reference_fetch_retries: 2,
            fetch_user_agent: DEFAULT_FETCH_USER_AGENT.to_string(),
            min_detection_confidence: 0.25,
            detection_labels: DEFAULT_DETECTION_LABELS
                .iter()
                .map(|label| (*label).to_string())
                .collect(),
            storage_root: PathBuf::from("static"),
            public_base_url: "http://localhost:8000".to_string(),
            static_mount: "/static".to_string(),
            backend: BackendConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lumina_stage::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .storage_root("/srv/lumina/static")
    ///     .public_base_url("https://staging.example.com")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_edit_dimension, 1024);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    /// - The file cannot be read
    /// - The file is not valid JSON for this structure
    /// - The loaded values fail validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LuminaError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            LuminaError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default location of the configuration file, if a config dir exists
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lumina-stage").join("config.json"))
    }

    /// Directory holding generated artifacts
    #[must_use]
    pub fn gallery_dir(&self) -> PathBuf {
        self.storage_root.join("gallery")
    }

    /// Public URL prefix of `storage_root`, without trailing slash
    #[must_use]
    pub fn public_storage_prefix(&self) -> String {
        format!(
            "{}{}",
            self.public_base_url.trim_end_matches('/'),
            normalized_mount(&self.static_mount)
        )
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero dimensions or steps
    /// - Canny thresholds out of order
    /// - Guidance scales outside 1.0-30.0, or staging not above removal
    /// - Zero generation timeout
    /// - Detection confidence outside 0.0-1.0
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max edit dimension", self.max_edit_dimension),
            ("max structural dimension", self.max_structural_dimension),
            ("max reference dimension", self.max_reference_dimension),
        ] {
            if !(8..=4096).contains(&value) {
                return Err(LuminaError::config_value_error(name, value, "8-4096", Some(1024)));
            }
        }

        if self.canny_low_threshold < 0.0 || self.canny_low_threshold >= self.canny_high_threshold
        {
            return Err(LuminaError::invalid_config(format!(
                "Canny thresholds must satisfy 0 <= low < high (got {} / {})",
                self.canny_low_threshold, self.canny_high_threshold
            )));
        }

        for (name, value, recommended) in [
            ("generation guidance", self.generation_guidance, 7.5),
            ("removal guidance", self.removal_guidance, 7.5),
            ("staging guidance", self.staging_guidance, 10.0),
        ] {
            if !(1.0..=30.0).contains(&value) {
                return Err(LuminaError::config_value_error(
                    name,
                    value,
                    "1.0-30.0",
                    Some(recommended),
                ));
            }
        }

        if self.staging_guidance <= self.removal_guidance {
            return Err(LuminaError::invalid_config(format!(
                "staging guidance ({}) must be higher than removal guidance ({})",
                self.staging_guidance, self.removal_guidance
            )));
        }

        if self.generation_steps == 0 || self.edit_steps == 0 {
            return Err(LuminaError::invalid_config("inference steps must be at least 1"));
        }

        if self.generation_timeout_secs == 0 {
            return Err(LuminaError::config_value_error(
                "generation timeout",
                self.generation_timeout_secs,
                "1 or more seconds",
                Some(300),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(LuminaError::config_value_error(
                "minimum detection confidence",
                self.min_detection_confidence,
                "0.0-1.0",
                Some(0.25),
            ));
        }

        if self.max_reference_bytes <= self.min_reference_bytes {
            return Err(LuminaError::invalid_config(
                "max reference bytes must exceed min reference bytes",
            ));
        }

        Ok(())
    }
}

/// Mount path with exactly one leading slash and no trailing slash
pub(crate) fn normalized_mount(mount: &str) -> String {
    let trimmed = mount.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the bound for edit inputs
    #[must_use]
    pub fn max_edit_dimension(mut self, dimension: u32) -> Self {
        self.config.max_edit_dimension = dimension;
        self
    }

    /// Set the bound for reference images
    #[must_use]
    pub fn max_reference_dimension(mut self, dimension: u32) -> Self {
        self.config.max_reference_dimension = dimension;
        self
    }

    /// Set the removal and staging guidance scales
    #[must_use]
    pub fn edit_guidance(mut self, removal: f32, staging: f32) -> Self {
        self.config.removal_guidance = removal;
        self.config.staging_guidance = staging;
        self
    }

    /// Set the whole-room generation guidance scale
    #[must_use]
    pub fn generation_guidance(mut self, guidance: f32) -> Self {
        self.config.generation_guidance = guidance;
        self
    }

    /// Set the generation timeout in seconds
    #[must_use]
    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    /// Set the minimum upload size for a reference to count
    #[must_use]
    pub fn min_reference_bytes(mut self, bytes: usize) -> Self {
        self.config.min_reference_bytes = bytes;
        self
    }

    /// Set the number of retries for outbound reference fetches
    #[must_use]
    pub fn reference_fetch_retries(mut self, retries: u32) -> Self {
        self.config.reference_fetch_retries = retries;
        self
    }

    /// Set the detector labels that are reported
    #[must_use]
    pub fn detection_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.detection_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage root published under the static mount
    #[must_use]
    pub fn storage_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.storage_root = root.into();
        self
    }

    /// Set the public base URL of the service
    #[must_use]
    pub fn public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.public_base_url = url.into();
        self
    }

    /// Set the static mount path
    #[must_use]
    pub fn static_mount<S: Into<String>>(mut self, mount: S) -> Self {
        self.config.static_mount = mount.into();
        self
    }

    /// Set the backend configuration
    #[must_use]
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the backend base URL
    #[must_use]
    pub fn backend_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.backend.base_url = url.into();
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
