//! Result frame annotation
//!
//! Outlines matched fields on the OCR image, and renders failures on a
//! desaturated copy so they read as "not accepted" at a glance.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::card::{Card, CardValidator, Field};
use crate::error::BadBoundingError;

/// Colours used for result rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub success: [u8; 3],
    pub failure: [u8; 3],
    pub neutral: [u8; 3],
    pub outline: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            success: [0, 255, 0],
            failure: [255, 0, 0],
            neutral: [255, 255, 255],
            outline: [0, 0, 0],
        }
    }
}

/// Grayscale copy of an image, kept in RGB so it can still be drawn on
pub fn desaturate(image: &RgbImage) -> RgbImage {
    let mut gray = image.clone();
    for pixel in gray.pixels_mut() {
        let [r, g, b] = pixel.0;
        // Standard luminance weights
        let luma = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) as u8;
        pixel.0 = [luma, luma, luma];
    }
    gray
}

/// Outline each field in `colour`, backed by a one-pixel `backing` ring so
/// the box stays visible on any card colour. Fails without drawing if any
/// box leaves the image.
pub fn highlight_fields(
    image: &mut RgbImage,
    fields: &[&Field],
    colour: [u8; 3],
    backing: [u8; 3],
) -> Result<(), BadBoundingError> {
    let (width, height) = image.dimensions();
    if let Some(field) = fields.iter().find(|f| !f.bounds.fits_in(width, height)) {
        return Err(BadBoundingError::new(format!(
            "{} field {:?} outside {}x{} image",
            field.field_type, field.bounds, width, height
        )));
    }
    draw_fields(image, fields, colour, backing);
    Ok(())
}

/// Draw the outlines; the backing ring is clipped at the image edge
fn draw_fields(image: &mut RgbImage, fields: &[&Field], colour: [u8; 3], backing: [u8; 3]) {
    for field in fields {
        let b = field.bounds;
        draw_hollow_rect_mut(
            image,
            Rect::at(b.tl().x - 1, b.tl().y - 1).of_size(b.width() as u32 + 2, b.height() as u32 + 2),
            Rgb(backing),
        );
        draw_hollow_rect_mut(
            image,
            Rect::at(b.tl().x, b.tl().y).of_size(b.width() as u32, b.height() as u32),
            Rgb(colour),
        );
    }
}

/// Render a matched card onto the image it was read from.
///
/// Valid cards outline everything neutral and the valid fields in success;
/// invalid cards outline everything in failure and the valid fields in
/// success. If a field box lies outside the image the result falls back to
/// [`render_failure`].
pub fn render_card(image: &RgbImage, card: &Card, validator: &CardValidator, palette: &Palette) -> RgbImage {
    let all: Vec<&Field> = card.fields.iter().collect();
    let valid = validator.get_valid_fields(card);
    let base = if validator.is_valid(card) {
        palette.neutral
    } else {
        palette.failure
    };

    let mut out = image.clone();
    let drawn = highlight_fields(&mut out, &all, base, palette.outline)
        .and_then(|_| highlight_fields(&mut out, &valid, palette.success, palette.outline));

    match drawn {
        Ok(()) => out,
        Err(e) => {
            debug!("Falling back to failure render: {}", e);
            render_failure(image, &valid, palette)
        }
    }
}

/// Desaturated image with whatever fields fit outlined in failure
pub fn render_failure(image: &RgbImage, fields: &[&Field], palette: &Palette) -> RgbImage {
    let mut out = desaturate(image);
    let (width, height) = out.dimensions();
    let visible: Vec<&Field> = fields
        .iter()
        .copied()
        .filter(|f| f.bounds.fits_in(width, height))
        .collect();
    if visible.len() < fields.len() {
        debug!("{} field(s) outside the image left unmarked", fields.len() - visible.len());
    }
    draw_fields(&mut out, &visible, palette.failure, palette.outline);
    out
}
