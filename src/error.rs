//! Error taxonomy for the capture pipeline
//!
//! Geometry and matching errors are caught at the pipeline worker boundary
//! and turned into state transitions. OCR and persistence errors are reported
//! to the caller, which decides whether the user can retry.

use std::path::PathBuf;
use std::time::Duration;

/// A bounding box is inverted, degenerate, or outside the frame extent
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("bad bounding box: {reason}")]
pub struct BadBoundingError {
    pub reason: String,
}

impl BadBoundingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An OCR word could belong to either of two adjacent fields or rows
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("uncertain match for '{word}': could be {first} or {second}")]
pub struct UncertainMatchError {
    /// Text of the ambiguous word
    pub word: String,
    /// First candidate assignment
    pub first: String,
    /// Second candidate assignment
    pub second: String,
}

/// Failure at the OCR service boundary
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OcrError {
    #[error("OCR service error: {0}")]
    Service(String),
    #[error("OCR request timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure writing to the record store
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record file {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("card has no {0} value to persist")]
    MissingField(&'static str),
    #[error("no successful capture to save")]
    NothingToSave,
}

/// Plain error classification the state machine switches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadBounding,
    UncertainMatch,
    OcrService,
    OcrTimeout,
    InvalidCard,
    WorkerCrashed,
}

impl ErrorKind {
    /// Short label for status display
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::BadBounding => "Card out of frame",
            ErrorKind::UncertainMatch => "Uncertain match",
            ErrorKind::OcrService => "OCR service error",
            ErrorKind::OcrTimeout => "OCR timed out",
            ErrorKind::InvalidCard => "Card incomplete",
            ErrorKind::WorkerCrashed => "Internal error",
        }
    }
}

/// Everything that can go wrong inside one OCR + match + validate run
#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    BadBounding(#[from] BadBoundingError),
    #[error(transparent)]
    UncertainMatch(#[from] UncertainMatchError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("card failed validation")]
    InvalidCard,
    #[error("pipeline worker panicked: {0}")]
    WorkerCrashed(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::BadBounding(_) => ErrorKind::BadBounding,
            PipelineError::UncertainMatch(_) => ErrorKind::UncertainMatch,
            PipelineError::Ocr(OcrError::Service(_)) => ErrorKind::OcrService,
            PipelineError::Ocr(OcrError::Timeout(_)) => ErrorKind::OcrTimeout,
            PipelineError::InvalidCard => ErrorKind::InvalidCard,
            PipelineError::WorkerCrashed(_) => ErrorKind::WorkerCrashed,
        }
    }
}
