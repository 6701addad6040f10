//! Frame data structures for camera content

use chrono::{DateTime, Local};
use image::RgbImage;
use std::time::Instant;

/// A frame read from the camera
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Pixel data, already flipped if configured
    pub image: RgbImage,
    /// Monotonic read time, used for the stability check
    pub timestamp: Instant,
    /// Wall-clock read time, stamped onto cards
    pub captured_at: DateTime<Local>,
}

impl CapturedFrame {
    /// Create a new frame stamped with the current time
    pub fn new(image: RgbImage) -> Self {
        Self::at(image, Instant::now())
    }

    /// Create a frame with an explicit monotonic timestamp
    pub fn at(image: RgbImage, timestamp: Instant) -> Self {
        Self {
            image,
            timestamp,
            captured_at: Local::now(),
        }
    }
}
