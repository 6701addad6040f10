//! Capture cache
//!
//! Every dispatched capture leaves two files behind, named by an id derived
//! from the capture time: the image sent to OCR (`<id>.temp.png`) and the
//! recognized words plus matched fields (`<id>.json`). Replay and import
//! work entirely from these.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::card::Field;
use crate::vision::OcrWord;

const IMAGE_SUFFIX: &str = ".temp.png";
const JSON_SUFFIX: &str = ".json";

/// Capture id for a timestamp
pub fn derive_id(at: DateTime<Local>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// JSON side of one cached capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCapture {
    pub id: String,
    pub captured_at: DateTime<Local>,
    /// Raw OCR output, in the image's coordinates
    pub words: Vec<OcrWord>,
    /// Fields matched at capture time
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Directory of cached captures
#[derive(Debug, Clone)]
pub struct CaptureCache {
    dir: PathBuf,
}

impl CaptureCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{IMAGE_SUFFIX}"))
    }

    pub fn json_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{JSON_SUFFIX}"))
    }

    /// Write both files of a capture
    pub fn store(&self, capture: &CachedCapture, image: &RgbImage) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;

        let image_path = self.image_path(&capture.id);
        image
            .save(&image_path)
            .with_context(|| format!("Failed to write {:?}", image_path))?;

        let json_path = self.json_path(&capture.id);
        let content = serde_json::to_string_pretty(capture)?;
        std::fs::write(&json_path, content).with_context(|| format!("Failed to write {:?}", json_path))?;

        debug!("Cached capture {} ({} words)", capture.id, capture.words.len());
        Ok(())
    }

    /// The JSON side of a capture, or `None` if it was never written
    pub fn load(&self, id: &str) -> Result<Option<CachedCapture>> {
        let path = self.json_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let capture = serde_json::from_str(&content).with_context(|| format!("Malformed capture {:?}", path))?;
        Ok(Some(capture))
    }

    pub fn load_image(&self, id: &str) -> Result<RgbImage> {
        let path = self.image_path(id);
        let image = image::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        Ok(image.to_rgb8())
    }

    /// Modification time of the cached image, used as the original capture time on import
    pub fn image_modified(&self, id: &str) -> Result<DateTime<Local>> {
        let path = self.image_path(id);
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {:?}", path))?;
        Ok(DateTime::<Local>::from(modified))
    }

    /// Ids of all cached images, oldest first
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list cache directory {:?}", self.dir))?;

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(IMAGE_SUFFIX))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
