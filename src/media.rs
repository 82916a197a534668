use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{constants::RECIPE_IMAGE_DIR, error::Error};

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// A decoded `data:image/<ext>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn from_data_uri(value: &str) -> Result<Self, &'static str> {
        let (header, payload) = value
            .split_once(',')
            .ok_or("Image must be a base64 data URI.")?;

        let mime = header
            .strip_prefix("data:")
            .and_then(|header| header.strip_suffix(";base64"))
            .ok_or("Image must be a base64 data URI.")?;

        let extension = mime
            .strip_prefix("image/")
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or("Unsupported image type.")?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| "Image payload is not valid base64.")?;

        if bytes.is_empty() {
            return Err("Image is empty.");
        }

        Ok(Self { extension, bytes })
    }
}

/// Writes uploads under the media root and turns stored paths into URLs.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url: String,
}

impl MediaStorage {
    pub fn new(root: PathBuf, url: String) -> Self {
        Self { root, url }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saves the image and returns its path relative to the media root.
    pub async fn save_recipe_image(&self, image: &ImageUpload) -> Result<String, Error> {
        let relative = format!(
            "{RECIPE_IMAGE_DIR}/{}.{}",
            uuid::Uuid::new_v4(),
            image.extension
        );
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("Could not create media dir: {e}")))?;
        }
        tokio::fs::write(&target, &image.bytes)
            .await
            .map_err(|e| Error::Internal(format!("Could not write image: {e}")))?;

        log::debug!("Stored recipe image at {}", target.display());
        Ok(relative)
    }

    /// Best effort; a missing file is not an error.
    pub async fn remove(&self, relative: &str) {
        if let Err(e) = tokio::fs::remove_file(self.root.join(relative)).await {
            log::warn!("Could not remove media file {relative}: {e}");
        }
    }

    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.url, relative)
    }
}
