//! Application Configuration
//!
//! User settings stored in TOML format. Every component gets its own section
//! at construction; nothing reads configuration from global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::card::{FieldSpec, FieldType, MatcherConfig};
use crate::vision::{LocatorConfig, OcrConfig, Palette};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera settings
    pub camera: CameraConfig,
    /// Key bindings
    pub keys: KeyConfig,
    /// Output locations
    pub output: OutputConfig,
    /// Window settings
    pub window: WindowConfig,
    /// Field matching tolerances
    pub matching: MatcherConfig,
    /// Stability gate before OCR is triggered
    pub stability: StabilityConfig,
    /// Barcode locator and crop settings
    pub locator: LocatorConfig,
    /// OCR service settings
    pub ocr: OcrConfig,
    /// Result colours
    pub palette: Palette,
    /// Expected card layout
    pub schema: SchemaConfig,
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Which camera to read when more than one is attached
    pub index: u32,
    /// Mirror frames horizontally
    pub flip: bool,
    /// Directory the frame grabber writes into (one `camera<index>` subdirectory per camera)
    pub spool_dir: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            flip: false,
            spool_dir: PathBuf::from("spool"),
        }
    }
}

/// Key bindings, by egui key name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Confirm a result, or capture immediately while monitoring
    pub capture: String,
    /// Quit the application
    pub exit: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            capture: "Space".to_string(),
            exit: "Escape".to_string(),
        }
    }
}

impl KeyConfig {
    pub fn capture_key(&self) -> Option<egui::Key> {
        parse_key(&self.capture)
    }

    pub fn exit_key(&self) -> Option<egui::Key> {
        parse_key(&self.exit)
    }
}

fn parse_key(name: &str) -> Option<egui::Key> {
    let key = egui::Key::from_name(name);
    if key.is_none() {
        warn!("Unknown key name '{}', binding disabled", name);
    }
    key
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV file records are upserted into
    pub records: PathBuf,
    /// Directory for cached capture images and recognized words
    pub cache_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            records: PathBuf::from("output.csv"),
            cache_dir: PathBuf::from("image_cache"),
        }
    }
}

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Multiplier for the result panel text size
    pub result_text_scale: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Camera".to_string(),
            result_text_scale: 1.0,
        }
    }
}

/// Stability gate before OCR is triggered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// How long the barcode must stay put, in milliseconds
    pub dwell_ms: u64,
    /// Barcode movement (px) still counted as stationary
    pub jitter_px: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1000,
            jitter_px: 6.0,
        }
    }
}

impl StabilityConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// Expected card layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Fields in top-to-bottom order
    pub fields: Vec<FieldSpec>,
    /// Number of digits in a student ID
    pub id_length: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::required(FieldType::Name, 0),
                FieldSpec::required(FieldType::StudentId, 1),
            ],
            id_length: 8,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load from an explicit path, or from the platform config directory.
///
/// An explicit path must exist. The default location falls back to defaults
/// when the file has not been written yet.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        info!("Loading configuration from {:?}", path);
        return load_config(path).with_context(|| format!("Failed to load config {:?}", path));
    }

    let path = crate::storage::get_config_dir()?.join("config.toml");
    if path.exists() {
        info!("Loading configuration from {:?}", path);
        load_config(&path).with_context(|| format!("Failed to load config {:?}", path))
    } else {
        info!("No configuration at {:?}, using defaults", path);
        Ok(AppConfig::default())
    }
}
