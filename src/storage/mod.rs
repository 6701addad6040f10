//! Storage Layer
//!
//! CSV records keyed by student ID, and the on-disk cache of captures used
//! for replay and import.

pub mod cache;
pub mod records;

pub use cache::{derive_id, CachedCapture, CaptureCache};
pub use records::{Record, RecordEdits, RecordStore};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "cardcapture", "CardCapture")
        .ok_or_else(|| anyhow::anyhow!("Could not determine project directories"))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
