//! Barcode anchor locator
//!
//! Finds the densest patch of vertical bars in a frame using gradient
//! difference, blur, threshold and morphology, then crops the card region
//! around it for OCR.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::filter::box_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::{close, dilate, erode};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

use crate::card::{BoundingBox, Point};
use crate::error::BadBoundingError;

/// Whether a frame contained a barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    Found,
    NotFound,
}

/// Result of locating the anchor in one frame
#[derive(Debug, Clone)]
pub struct Detection {
    /// Copy of the frame with the barcode outlined
    pub annotated: RgbImage,
    /// Barcode region in frame coordinates
    pub bounds: Option<BoundingBox>,
}

impl Detection {
    pub fn status(&self) -> DetectionStatus {
        if self.bounds.is_some() {
            DetectionStatus::Found
        } else {
            DetectionStatus::NotFound
        }
    }
}

/// Locates the card anchor and prepares the OCR crop around it
pub trait AnchorLocator: Send + Sync {
    /// Locate the anchor. Never fails: an absent anchor is `NotFound`.
    fn detect(&self, frame: &RgbImage) -> Detection;

    /// Crop and rescale the card region around `bounds`
    fn optimise(&self, frame: &RgbImage, bounds: &BoundingBox) -> Result<RgbImage, BadBoundingError>;
}

/// Configuration for barcode location and the OCR crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Frames wider than this are downscaled before detection
    pub detect_width: u32,
    /// Box blur radius applied to the gradient image
    pub blur_radius: u32,
    /// Gradient level (0-255) that counts as bar texture
    pub gradient_threshold: u8,
    /// Closing radius that fuses bars into one blob
    pub close_radius: u8,
    /// Erode/dilate radius that removes small blobs
    pub clean_radius: u8,
    /// Smallest accepted blob, as a fraction of the frame area
    pub min_area_fraction: f64,
    /// Smallest accepted width/height ratio
    pub min_aspect: f64,
    /// Crop margin left and right, in barcode widths
    pub margin_x: f64,
    /// Crop margin above the barcode, in barcode heights
    pub margin_above: f64,
    /// Crop margin below the barcode, in barcode heights
    pub margin_below: f64,
    /// Width of the image sent to OCR
    pub ocr_width: u32,
    /// Outline colour drawn around the barcode
    pub outline: [u8; 3],
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            detect_width: 640,
            blur_radius: 4,
            gradient_threshold: 100,
            close_radius: 7,
            clean_radius: 4,
            min_area_fraction: 0.01,
            min_aspect: 1.2,
            margin_x: 1.0,
            margin_above: 4.0,
            margin_below: 1.0,
            ocr_width: 1024,
            outline: [0, 255, 0],
        }
    }
}

/// Gradient-based barcode locator
#[derive(Debug, Clone)]
pub struct BarcodeLocator {
    config: LocatorConfig,
}

impl BarcodeLocator {
    /// Create a locator with default configuration
    pub fn new() -> Self {
        Self::with_config(LocatorConfig::default())
    }

    /// Create a locator with custom configuration
    pub fn with_config(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Binary mask of bar-textured regions
    fn bar_mask(&self, gray: &GrayImage) -> GrayImage {
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);

        // Vertical bars: strong change along x, little along y
        let gradient = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let dx = gx.get_pixel(x, y)[0].unsigned_abs() as i32;
            let dy = gy.get_pixel(x, y)[0].unsigned_abs() as i32;
            Luma([(dx - dy).clamp(0, 255) as u8])
        });

        let mut blurred = box_filter(&gradient, self.config.blur_radius, self.config.blur_radius);
        let level = self.config.gradient_threshold;
        for pixel in blurred.pixels_mut() {
            pixel[0] = if pixel[0] >= level { 255 } else { 0 };
        }

        let closed = close(&blurred, Norm::LInf, self.config.close_radius);
        let cleaned = erode(&closed, Norm::LInf, self.config.clean_radius);
        dilate(&cleaned, Norm::LInf, self.config.clean_radius)
    }

    /// Largest acceptable blob in mask coordinates
    fn largest_blob(&self, mask: &GrayImage) -> Option<BoundingBox> {
        let min_area = (mask.width() as f64 * mask.height() as f64) * self.config.min_area_fraction;

        find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| {
                let vertices: Vec<Point> = c.points.iter().map(|p| Point::new(p.x, p.y)).collect();
                let b = BoundingBox::from_vertices(&vertices).ok()?;
                // Contour points are inclusive pixel coordinates
                BoundingBox::new(b.tl(), Point::new(b.br().x + 1, b.br().y + 1)).ok()
            })
            .filter(|b| b.area() as f64 >= min_area)
            .filter(|b| b.width() as f64 >= b.height() as f64 * self.config.min_aspect)
            .max_by_key(|b| b.area())
    }
}

impl Default for BarcodeLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorLocator for BarcodeLocator {
    fn detect(&self, frame: &RgbImage) -> Detection {
        let start = Instant::now();
        let mut annotated = frame.clone();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Detection {
                annotated,
                bounds: None,
            };
        }

        let scale = if width > self.config.detect_width {
            self.config.detect_width as f64 / width as f64
        } else {
            1.0
        };
        let gray = if scale < 1.0 {
            let small_h = ((height as f64 * scale).round() as u32).max(1);
            imageops::grayscale(&imageops::resize(
                frame,
                self.config.detect_width,
                small_h,
                FilterType::Triangle,
            ))
        } else {
            imageops::grayscale(frame)
        };

        let mask = self.bar_mask(&gray);
        let bounds = self.largest_blob(&mask).and_then(|b| {
            let up = |v: i32| (v as f64 / scale).round() as i32;
            let tl = Point::new(up(b.tl().x), up(b.tl().y));
            let br = Point::new(
                up(b.br().x).min(width as i32),
                up(b.br().y).min(height as i32),
            );
            BoundingBox::new(tl, br).ok()
        });

        if let Some(b) = bounds {
            let [r, g, bl] = self.config.outline;
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(b.tl().x, b.tl().y).of_size(b.width() as u32, b.height() as u32),
                Rgb([r, g, bl]),
            );
            trace!("Barcode at {:?} in {:?}", b, start.elapsed());
        } else {
            trace!("No barcode ({:?})", start.elapsed());
        }

        Detection { annotated, bounds }
    }

    fn optimise(&self, frame: &RgbImage, bounds: &BoundingBox) -> Result<RgbImage, BadBoundingError> {
        let (width, height) = frame.dimensions();
        if !bounds.fits_in(width, height) {
            return Err(BadBoundingError::new(format!(
                "barcode {:?} outside {}x{} frame",
                bounds, width, height
            )));
        }

        let bw = bounds.width() as f64;
        let bh = bounds.height() as f64;
        let left = (bounds.tl().x as f64 - bw * self.config.margin_x).max(0.0) as u32;
        let top = (bounds.tl().y as f64 - bh * self.config.margin_above).max(0.0) as u32;
        let right = (bounds.br().x as f64 + bw * self.config.margin_x).min(width as f64) as u32;
        let bottom = (bounds.br().y as f64 + bh * self.config.margin_below).min(height as f64) as u32;

        let crop_w = right.saturating_sub(left);
        let crop_h = bottom.saturating_sub(top);
        if crop_w == 0 || crop_h == 0 {
            return Err(BadBoundingError::new("empty card crop"));
        }

        let crop = imageops::crop_imm(frame, left, top, crop_w, crop_h).to_image();
        let target_h = ((crop_h as f64 * self.config.ocr_width as f64 / crop_w as f64).round() as u32).max(1);
        debug!(
            "Optimised crop {}x{} at ({}, {}) -> {}x{}",
            crop_w, crop_h, left, top, self.config.ocr_width, target_h
        );

        Ok(imageops::resize(&crop, self.config.ocr_width, target_h, FilterType::CatmullRom))
    }
}
