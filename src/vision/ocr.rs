//! OCR (Optical Character Recognition) boundary
//!
//! The pipeline only sees word boxes; which service produced them is hidden
//! behind [`TextRecognizer`].

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::card::BoundingBox;
use crate::error::OcrError;

/// Single recognized word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrWord {
    /// Recognized text
    pub text: String,
    /// Word box in the coordinates of the recognized image
    pub bounds: BoundingBox,
}

/// Anything that can turn an image into word boxes.
///
/// Implementations may block on network I/O; callers must keep them off the
/// frame-rendering path.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<OcrWord>, OcrError>;
}

/// Recognizer that replays a fixed word list (offline replay and tests)
#[derive(Debug, Clone, Default)]
pub struct CannedRecognizer {
    words: Vec<OcrWord>,
}

impl CannedRecognizer {
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self { words }
    }
}

impl TextRecognizer for CannedRecognizer {
    fn recognize(&self, _image: &RgbImage) -> Result<Vec<OcrWord>, OcrError> {
        Ok(self.words.clone())
    }
}
