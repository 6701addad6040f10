//! OCR + match + validate pipeline
//!
//! One run turns a stable frame and its barcode into either an annotated
//! card or a classified failure. Nothing here panics or escapes as an
//! unhandled error: every failure becomes a [`PipelineFailure`].

use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::card::{BoundingBox, Card, CardValidator, Field, FieldMatcher};
use crate::error::{ErrorKind, PipelineError};
use crate::storage::{derive_id, CachedCapture, CaptureCache};
use crate::vision::{render_card, render_failure, AnchorLocator, OcrWord, Palette, TextRecognizer};

/// A card that passed validation, with its annotated image
#[derive(Debug, Clone)]
pub struct CardResult {
    pub card: Card,
    pub frame: RgbImage,
}

/// A failed run: the classified error, whatever fields were read, and a
/// desaturated frame for display
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub card: Option<Card>,
    pub frame: RgbImage,
}

impl PipelineFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

pub type PipelineOutcome = Result<CardResult, PipelineFailure>;

/// Everything needed to read one card
pub struct Pipeline {
    locator: Arc<dyn AnchorLocator>,
    recognizer: Arc<dyn TextRecognizer>,
    matcher: FieldMatcher,
    validator: CardValidator,
    palette: Palette,
    cache: Option<CaptureCache>,
}

impl Pipeline {
    pub fn new(
        locator: Arc<dyn AnchorLocator>,
        recognizer: Arc<dyn TextRecognizer>,
        matcher: FieldMatcher,
        validator: CardValidator,
        palette: Palette,
    ) -> Self {
        Self {
            locator,
            recognizer,
            matcher,
            validator,
            palette,
            cache: None,
        }
    }

    /// Cache every recognized capture in `cache`
    pub fn with_cache(mut self, cache: CaptureCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn locator(&self) -> &dyn AnchorLocator {
        self.locator.as_ref()
    }

    /// Optimise, recognize, match, validate
    pub fn run(&self, frame: &RgbImage, barcode: &BoundingBox, captured_at: DateTime<Local>) -> PipelineOutcome {
        let start = Instant::now();

        let crop = self.locator.optimise(frame, barcode).map_err(|e| PipelineFailure {
            error: e.into(),
            card: None,
            frame: render_failure(frame, &[], &self.palette),
        })?;

        let words = self.recognizer.recognize(&crop).map_err(|e| {
            warn!("OCR failed: {}", e);
            PipelineFailure {
                error: e.into(),
                card: None,
                frame: render_failure(&crop, &[], &self.palette),
            }
        })?;
        debug!("Recognized {} word(s)", words.len());

        let outcome = self.assemble(&crop, &words, captured_at);
        self.cache_capture(&crop, words, &outcome, captured_at);

        match &outcome {
            Ok(result) => info!(
                "Read card for {} in {:?}",
                result.card.student_id.as_deref().unwrap_or("?"),
                start.elapsed()
            ),
            Err(failure) => info!("Card rejected ({}) in {:?}", failure.error, start.elapsed()),
        }
        outcome
    }

    /// Match and validate already-recognized words against `image`, the
    /// image the word boxes refer to
    pub fn assemble(&self, image: &RgbImage, words: &[OcrWord], captured_at: DateTime<Local>) -> PipelineOutcome {
        let fields = self.matcher.match_words(words).map_err(|e| {
            info!("{}", e);
            PipelineFailure {
                error: e.into(),
                card: None,
                frame: render_failure(image, &[], &self.palette),
            }
        })?;

        let card = Card::new(fields, captured_at);
        if self.validator.is_valid(&card) {
            let frame = render_card(image, &card, &self.validator, &self.palette);
            return Ok(CardResult { card, frame });
        }

        let valid: Vec<&Field> = self.validator.get_valid_fields(&card);
        let frame = render_failure(image, &valid, &self.palette);
        Err(PipelineFailure {
            error: PipelineError::InvalidCard,
            card: Some(card),
            frame,
        })
    }

    fn cache_capture(&self, image: &RgbImage, words: Vec<OcrWord>, outcome: &PipelineOutcome, at: DateTime<Local>) {
        let Some(cache) = &self.cache else {
            return;
        };

        let fields = match outcome {
            Ok(result) => result.card.fields.clone(),
            Err(failure) => failure.card.as_ref().map(|c| c.fields.clone()).unwrap_or_default(),
        };
        let capture = CachedCapture {
            id: derive_id(at),
            captured_at: at,
            words,
            fields,
        };
        if let Err(e) = cache.store(&capture, image) {
            warn!("Failed to cache capture {}: {:#}", capture.id, e);
        }
    }
}
