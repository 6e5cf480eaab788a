//! Image I/O operations service
//!
//! Decoding of request inputs and lossless encoding of results, kept apart
//! from the pipeline so both can be tested without a backend.

use crate::error::{LuminaError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use std::path::Path;

/// Service for handling image input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode request bytes into an image
    ///
    /// `what` names the input in the error, e.g. "base image" or "mask".
    ///
    /// # Errors
    /// - Empty input
    /// - Bytes that no enabled codec recognizes
    ///
    /// # Examples
    /// ```rust,no_run
    /// use lumina_stage::services::ImageIOService;
    ///
    /// let bytes = std::fs::read("room.jpg")?;
    /// let image = ImageIOService::decode(&bytes, "base image")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn decode(bytes: &[u8], what: &str) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(LuminaError::decode(what, "no data"));
        }
        image::load_from_memory(bytes).map_err(|e| LuminaError::decode(what, e))
    }

    /// Encode an image as PNG
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| LuminaError::internal(format!("Failed to encode PNG: {}", e)))?;
        Ok(buffer)
    }

    /// Encode an image as base64 PNG for JSON transport
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_png_base64(image: &DynamicImage) -> Result<String> {
        Ok(BASE64.encode(Self::encode_png(image)?))
    }

    /// Decode a base64 image, tolerating a `data:` URL prefix
    ///
    /// # Errors
    /// - Invalid base64
    /// - Bytes that do not decode as an image
    pub fn decode_base64(payload: &str, what: &str) -> Result<DynamicImage> {
        let data = payload
            .split_once(";base64,")
            .map_or(payload, |(_, data)| data)
            .trim();
        let bytes = BASE64
            .decode(data)
            .map_err(|e| LuminaError::decode(what, format!("invalid base64: {}", e)))?;
        Self::decode(&bytes, what)
    }

    /// Read raw bytes from a file
    ///
    /// # Errors
    /// - The file cannot be read
    pub async fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        tokio::fs::read(path_ref)
            .await
            .map_err(|e| LuminaError::file_io_error("read image file", path_ref, &e))
    }

}
