//! Vision Layer
//!
//! Everything that looks at pixels:
//! - Barcode anchor location and the OCR crop around it
//! - The OCR service boundary (Cloud Vision backend, canned words for replay)
//! - Result frame annotation

pub mod annotate;
pub mod barcode;
pub mod cloud_vision;
pub mod ocr;

pub use annotate::{desaturate, highlight_fields, render_card, render_failure, Palette};
pub use barcode::{AnchorLocator, BarcodeLocator, Detection, DetectionStatus, LocatorConfig};
pub use cloud_vision::{CloudVisionClient, OcrConfig};
pub use ocr::{CannedRecognizer, OcrWord, TextRecognizer};
