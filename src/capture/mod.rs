//! Capture Layer
//!
//! Camera frame sources, the OCR pipeline that runs off the render thread,
//! and the session state machine that decides when to run it.

pub mod frame;
pub mod pipeline;
pub mod session;
pub mod worker;

pub use frame::CapturedFrame;
pub use pipeline::{CardResult, Pipeline, PipelineFailure, PipelineOutcome};
pub use session::{CaptureSession, CaptureState, CaptureStatus};

use image::imageops;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Anything that yields camera frames. `None` means no frame this tick.
pub trait FrameSource: Send {
    fn read(&mut self) -> Option<RgbImage>;
}

/// Reads the newest frame an external grabber wrote into a spool directory
pub struct SpoolCamera {
    dir: PathBuf,
    last: Option<(PathBuf, SystemTime, RgbImage)>,
}

impl SpoolCamera {
    pub fn new(spool_dir: &Path, index: u32) -> Self {
        let dir = spool_dir.join(format!("camera{index}"));
        info!("Reading camera {} frames from {:?}", index, dir);
        Self { dir, last: None }
    }

    fn newest_frame(&self) -> Option<(PathBuf, SystemTime)> {
        std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .filter_map(|path| {
                let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
    }
}

impl FrameSource for SpoolCamera {
    fn read(&mut self) -> Option<RgbImage> {
        let (path, modified) = self.newest_frame()?;

        if let Some((last_path, last_modified, image)) = &self.last {
            if *last_path == path && *last_modified == modified {
                return Some(image.clone());
            }
        }

        match image::open(&path) {
            Ok(image) => {
                let image = image.to_rgb8();
                self.last = Some((path, modified, image.clone()));
                Some(image)
            }
            Err(e) => {
                // Usually a frame that is still being written
                debug!("Skipping frame {:?}: {}", path, e);
                self.last.as_ref().map(|(_, _, image)| image.clone())
            }
        }
    }
}

/// Serves one still image forever
pub struct StillCamera {
    image: RgbImage,
}

impl StillCamera {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let image = image::open(path)
            .with_context(|| format!("Failed to open still image {:?}", path))?
            .to_rgb8();
        Ok(Self::new(image))
    }
}

impl FrameSource for StillCamera {
    fn read(&mut self) -> Option<RgbImage> {
        Some(self.image.clone())
    }
}

/// Camera collaborator: a frame source plus the configured mirror flip
pub struct Camera {
    source: Box<dyn FrameSource>,
    flip: bool,
    missing: u64,
}

impl Camera {
    pub fn new(source: Box<dyn FrameSource>, flip: bool) -> Self {
        Self {
            source,
            flip,
            missing: 0,
        }
    }

    /// Live spool camera as configured
    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(Box::new(SpoolCamera::new(&config.spool_dir, config.index)), config.flip)
    }

    /// Read one frame, stamped with the current time
    pub fn read(&mut self) -> Option<CapturedFrame> {
        let Some(mut image) = self.source.read() else {
            self.missing += 1;
            // Log once, then every few seconds at 100 ticks/s
            if self.missing == 1 || self.missing % 500 == 0 {
                warn!("No camera frame available ({} ticks)", self.missing);
            }
            return None;
        };
        self.missing = 0;

        if self.flip {
            imageops::flip_horizontal_in_place(&mut image);
        }
        Some(CapturedFrame::new(image))
    }
}
