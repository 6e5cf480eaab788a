//! Error types for room editing operations

use thiserror::Error;

/// Result type alias for room editing operations
pub type Result<T> = std::result::Result<T, LuminaError>;

/// Error taxonomy for the editing pipeline
///
/// `Decode` and `InvalidInput` are caller mistakes. `ReferenceUnavailable` is
/// recovered inside the pipeline by downgrading to removal and is only ever
/// observed by code that resolves references directly. Everything else is a
/// server-side failure.
#[derive(Error, Debug)]
pub enum LuminaError {
    /// Input image or mask bytes could not be decoded
    #[error("Decode error: failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// Request parameters that can never be processed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reference image could not be fetched or decoded
    #[error("Reference unavailable: {0}")]
    ReferenceUnavailable(String),

    /// The generation capability reported a failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// The generation capability did not answer in time
    #[error("Generation timed out after {0} seconds")]
    GenerationTimeout(u64),

    /// Writing a generated artifact failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Network errors talking to a backend or a remote host
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LuminaError {
    /// Create a new decode error for the named input
    pub fn decode<W: Into<String>, R: std::fmt::Display>(what: W, reason: R) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new reference unavailable error
    pub fn reference_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ReferenceUnavailable(msg.into())
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error from an underlying transport error
    pub fn network_error<E: std::fmt::Display>(context: &str, error: E) -> Self {
        Self::Network(format!("{}: {}", context, error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create generation error with backend context
    pub fn generation_with_backend(backend: &str, operation: &str, error: &str) -> Self {
        Self::Generation(format!(
            "{} failed on '{}' backend: {}",
            operation, backend, error
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Internal(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the failure was caused by the caller's input
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::InvalidInput(_))
    }

    /// HTTP-style status code for surfacing the error at a service boundary
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decode { .. } | Self::InvalidInput(_) => 400,
            Self::ReferenceUnavailable(_) => 424,
            Self::Generation(_) | Self::Network(_) => 502,
            Self::GenerationTimeout(_) => 504,
            Self::Persistence(_)
            | Self::InvalidConfig(_)
            | Self::Io(_)
            | Self::Image(_)
            | Self::Internal(_) => 500,
        }
    }
}
