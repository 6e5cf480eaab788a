//! Filesystem gallery of generated artifacts
//!
//! Artifacts are written once under `{prefix}_{uuid}.png` and never touched
//! again. The gallery directory doubles as the listing source, ordered by
//! modification time.

use crate::{
    config::PipelineConfig,
    error::{LuminaError, Result},
    services::ImageIOService,
    types::{ArtifactKind, GalleryEntry, GeneratedArtifact},
};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Fresh names tried before giving up on a write
const MAX_NAME_ATTEMPTS: usize = 5;

/// Extensions shown in gallery listings
const LISTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Gallery of generated images under the storage root
#[derive(Debug, Clone)]
pub struct GalleryStore {
    dir: PathBuf,
    public_prefix: String,
}

impl GalleryStore {
    /// Create a store over `{storage_root}/gallery`
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dir: config.gallery_dir(),
            public_prefix: format!("{}/gallery", config.public_storage_prefix()),
        }
    }

    /// Directory holding the artifacts
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Public URL of a stored file
    #[must_use]
    pub fn public_url(&self, filename: &str) -> String {
        format!("{}/{}", self.public_prefix, filename)
    }

    /// Encode an image as PNG and persist it
    ///
    /// # Errors
    /// - PNG encoding fails
    /// - The gallery directory or file cannot be written
    pub async fn store(&self, image: DynamicImage, kind: ArtifactKind) -> Result<GeneratedArtifact> {
        let png = tokio::task::spawn_blocking(move || ImageIOService::encode_png(&image))
            .await
            .map_err(|e| {
                LuminaError::processing_stage_error("artifact encoding", &e.to_string(), None)
            })??;
        self.store_png(png, kind).await
    }

    /// Persist already encoded PNG bytes
    ///
    /// # Errors
    /// - The gallery directory or file cannot be written
    pub async fn store_png(&self, png: Vec<u8>, kind: ArtifactKind) -> Result<GeneratedArtifact> {
        let prefix = kind.prefix();
        let (filename, stored_path) = self
            .write_unique(&png, || format!("{}_{}.png", prefix, uuid::Uuid::new_v4()))
            .await?;

        debug!(file = %stored_path.display(), bytes = png.len(), "Stored artifact");

        Ok(GeneratedArtifact {
            public_url: self.public_url(&filename),
            image_bytes: png,
            filename,
            stored_path,
            kind,
            created_at: Utc::now(),
        })
    }

    /// Write `bytes` under the first name that does not exist yet
    async fn write_unique<F: FnMut() -> String>(
        &self,
        bytes: &[u8],
        mut next_name: F,
    ) -> Result<(String, PathBuf)> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            LuminaError::persistence(format!(
                "cannot create gallery directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = next_name();
            let path = self.dir.join(&filename);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(file = %filename, "Artifact name already taken, drawing a new one");
                    continue;
                },
                Err(e) => {
                    return Err(LuminaError::persistence(format!(
                        "cannot create '{}': {}",
                        path.display(),
                        e
                    )))
                },
            };

            let written = match file.write_all(bytes).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                drop(file);
                // Do not leave a truncated artifact behind
                let _ = tokio::fs::remove_file(&path).await;
                return Err(LuminaError::persistence(format!(
                    "cannot write '{}': {}",
                    path.display(),
                    e
                )));
            }

            return Ok((filename, path));
        }

        Err(LuminaError::persistence(format!(
            "no free artifact name after {} attempts",
            MAX_NAME_ATTEMPTS
        )))
    }

    /// List stored images, newest first
    ///
    /// Ties on modification time are broken by filename, descending. A missing
    /// gallery directory lists as empty.
    ///
    /// # Errors
    /// - The directory exists but cannot be read
    pub async fn list(&self) -> Result<Vec<GalleryEntry>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LuminaError::file_io_error("list gallery", &self.dir, &e)),
        };

        let mut listed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LuminaError::file_io_error("list gallery", &self.dir, &e))?
        {
            let path = entry.path();
            let listed_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase)
                .is_some_and(|ext| LISTED_EXTENSIONS.contains(&ext.as_str()));
            if !listed_extension {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    log::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                },
            };
            let modified: DateTime<Utc> = match metadata.modified() {
                Ok(time) => time.into(),
                Err(e) => {
                    log::debug!("No modification time for {}: {}", path.display(), e);
                    continue;
                },
            };

            let filename = entry.file_name().to_string_lossy().into_owned();
            listed.push(GalleryEntry {
                public_url: self.public_url(&filename),
                filename,
                modified,
            });
        }

        listed.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(listed)
    }
}
