//! Capture session state machine
//!
//! ```text
//! CAPTURE --barcode--> MONITOR --stable for dwell--> DETECT --worker--> SUCCESS
//!    ^                    |                                  \-------> ERRORED
//!    +----barcode lost----+        ERRORED --barcode--> MONITOR (automatic retry)
//! ```
//!
//! The render loop owns the session and is its only writer. The pipeline
//! runs on a worker thread whose result comes back over a channel and is
//! applied on the next tick, only if no reset happened in between.

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::frame::CapturedFrame;
use super::pipeline::Pipeline;
use super::worker::{self, Job, WorkerResult};
use crate::card::{BoundingBox, Card};
use crate::config::StabilityConfig;
use crate::error::{PersistenceError, PipelineError};
use crate::storage::{Record, RecordEdits, RecordStore};

/// Lifecycle position of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Waiting for a barcode
    Capture,
    /// Barcode in view, waiting for it to hold still
    Monitor,
    /// Pipeline running
    Detect,
    /// Valid card waiting for confirmation
    Success,
    /// Last pipeline run failed
    Errored,
}

impl CaptureStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureStatus::Capture => "Waiting for card",
            CaptureStatus::Monitor => "Hold still...",
            CaptureStatus::Detect => "Reading card...",
            CaptureStatus::Success => "Card read",
            CaptureStatus::Errored => "Could not read card",
        }
    }
}

/// Everything the renderer needs to draw the session
#[derive(Debug, Clone)]
pub struct CaptureState {
    pub status: CaptureStatus,
    /// Latest camera frame
    pub frame: Option<CapturedFrame>,
    /// Latest frame with the barcode outlined
    pub debug_frame: Option<RgbImage>,
    /// Barcode position the stability check is measured against
    pub barcode: Option<BoundingBox>,
    /// Card from the last pipeline run (partial when errored)
    pub card: Option<Card>,
    /// Annotated image from the last pipeline run
    pub result_frame: Option<RgbImage>,
    /// Failure from the last pipeline run
    pub error: Option<PipelineError>,
    /// Time of the last transition or barcode movement
    pub modified: Instant,
}

impl CaptureState {
    fn new(now: Instant) -> Self {
        Self {
            status: CaptureStatus::Capture,
            frame: None,
            debug_frame: None,
            barcode: None,
            card: None,
            result_frame: None,
            error: None,
            modified: now,
        }
    }
}

/// Stability-gated capture lifecycle for one camera
pub struct CaptureSession {
    pipeline: Arc<Pipeline>,
    stability: StabilityConfig,
    state: CaptureState,
    /// Bumped on every reset; results from older generations are stale
    generation: u64,
    /// Generation of the worker still running, if any
    in_flight: Option<u64>,
    results_tx: Sender<WorkerResult>,
    results_rx: Receiver<WorkerResult>,
}

impl CaptureSession {
    pub fn new(pipeline: Arc<Pipeline>, stability: StabilityConfig) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self {
            pipeline,
            stability,
            state: CaptureState::new(Instant::now()),
            generation: 0,
            in_flight: None,
            results_tx,
            results_rx,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn status(&self) -> CaptureStatus {
        self.state.status
    }

    /// Whether a worker (current or stale) has not reported back yet
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Advance the state machine with one camera frame
    pub fn tick(&mut self, frame: CapturedFrame) {
        self.poll_worker();
        let now = frame.timestamp;

        match self.state.status {
            CaptureStatus::Capture | CaptureStatus::Errored => {
                let bounds = self.locate(&frame);
                self.state.frame = Some(frame);
                if let Some(bounds) = bounds {
                    if self.in_flight.is_some() {
                        trace!("Barcode found but a worker is still running");
                    } else {
                        self.state.barcode = Some(bounds);
                        self.transition(CaptureStatus::Monitor, now);
                    }
                }
            }
            CaptureStatus::Monitor => {
                let bounds = self.locate(&frame);
                self.state.frame = Some(frame);
                match (bounds, self.state.barcode) {
                    (None, _) => {
                        self.state.barcode = None;
                        self.transition(CaptureStatus::Capture, now);
                    }
                    (Some(bounds), Some(anchor)) if bounds.displacement(&anchor) <= self.stability.jitter_px => {
                        if now.saturating_duration_since(self.state.modified) >= self.stability.dwell() {
                            self.dispatch(now);
                        }
                    }
                    (Some(bounds), _) => {
                        trace!("Barcode moved to {:?}", bounds);
                        self.state.barcode = Some(bounds);
                        self.state.modified = now;
                    }
                }
            }
            CaptureStatus::Detect | CaptureStatus::Success => {
                self.state.frame = Some(frame);
            }
        }
    }

    /// Apply any finished worker result
    pub fn poll_worker(&mut self) {
        while let Ok(result) = self.results_rx.try_recv() {
            if self.in_flight == Some(result.generation) {
                self.in_flight = None;
            }

            if result.generation != self.generation || self.state.status != CaptureStatus::Detect {
                debug!(
                    "Discarding stale result from generation {} (now {})",
                    result.generation, self.generation
                );
                continue;
            }

            let now = Instant::now();
            match result.outcome {
                Ok(result) => {
                    self.state.card = Some(result.card);
                    self.state.result_frame = Some(result.frame);
                    self.state.error = None;
                    self.transition(CaptureStatus::Success, now);
                }
                Err(failure) => {
                    warn!("Capture failed ({:?}): {}", failure.kind(), failure.error);
                    self.state.card = failure.card;
                    self.state.result_frame = Some(failure.frame);
                    self.state.error = Some(failure.error);
                    self.state.barcode = None;
                    self.transition(CaptureStatus::Errored, now);
                }
            }
        }
    }

    /// Capture key while monitoring: run the pipeline without waiting out the dwell
    pub fn trigger_now(&mut self) -> bool {
        if self.state.status != CaptureStatus::Monitor {
            return false;
        }
        let now = self
            .state
            .frame
            .as_ref()
            .map(|f| f.timestamp)
            .unwrap_or_else(Instant::now);
        self.dispatch(now)
    }

    /// Back to CAPTURE from any state. A running worker is left to finish and
    /// its result is dropped.
    pub fn reset_lifecycle(&mut self) {
        self.generation += 1;
        self.state.card = None;
        self.state.result_frame = None;
        self.state.error = None;
        self.state.barcode = None;
        self.transition(CaptureStatus::Capture, Instant::now());
    }

    /// Save the held card, with optional corrections, then reset.
    ///
    /// On failure the session stays in SUCCESS so the save can be retried.
    pub fn confirm(&mut self, store: &RecordStore, edits: &RecordEdits) -> Result<Record, PersistenceError> {
        let card = match (&self.state.status, &self.state.card) {
            (CaptureStatus::Success, Some(card)) => card,
            _ => return Err(PersistenceError::NothingToSave),
        };

        let record = Record::from_card(card, edits, None)?;
        if let Err(e) = store.upsert(record.clone()) {
            error!("Failed to save record for {}: {}", record.student_id, e);
            return Err(e);
        }

        self.reset_lifecycle();
        Ok(record)
    }

    fn locate(&mut self, frame: &CapturedFrame) -> Option<BoundingBox> {
        let detection = self.pipeline.locator().detect(&frame.image);
        self.state.debug_frame = Some(detection.annotated);
        detection.bounds
    }

    fn dispatch(&mut self, now: Instant) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        let (Some(frame), Some(barcode)) = (&self.state.frame, self.state.barcode) else {
            return false;
        };

        let job = Job {
            generation: self.generation,
            frame: frame.image.clone(),
            barcode,
            captured_at: frame.captured_at,
        };
        match worker::spawn(self.pipeline.clone(), job, self.results_tx.clone()) {
            Ok(_) => {
                self.in_flight = Some(self.generation);
                self.state.error = None;
                self.transition(CaptureStatus::Detect, now);
                true
            }
            Err(e) => {
                error!("Failed to start pipeline worker: {}", e);
                self.transition(CaptureStatus::Capture, now);
                false
            }
        }
    }

    fn transition(&mut self, status: CaptureStatus, now: Instant) {
        if self.state.status != status {
            info!("{:?} -> {:?}", self.state.status, status);
        }
        self.state.status = status;
        self.state.modified = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pipeline::tests::card_words;
    use crate::card::{CardValidator, FieldMatcher, FieldSpec, FieldType, MatcherConfig};
    use crate::error::{BadBoundingError, ErrorKind, OcrError};
    use crate::vision::{AnchorLocator, Detection, OcrWord, Palette, TextRecognizer};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Locator whose answer the test controls
    struct ScriptedLocator {
        bounds: Mutex<Option<BoundingBox>>,
    }

    impl ScriptedLocator {
        fn set(&self, bounds: Option<BoundingBox>) {
            *self.bounds.lock() = bounds;
        }
    }

    impl AnchorLocator for ScriptedLocator {
        fn detect(&self, frame: &RgbImage) -> Detection {
            Detection {
                annotated: frame.clone(),
                bounds: *self.bounds.lock(),
            }
        }

        fn optimise(&self, frame: &RgbImage, _bounds: &BoundingBox) -> Result<RgbImage, BadBoundingError> {
            Ok(frame.clone())
        }
    }

    /// Recognizer that counts calls and can be held until released
    struct GatedRecognizer {
        calls: AtomicUsize,
        panics: AtomicBool,
        gate: Mutex<Option<Receiver<()>>>,
        result: Result<Vec<OcrWord>, OcrError>,
    }

    impl TextRecognizer for GatedRecognizer {
        fn recognize(&self, _image: &RgbImage) -> Result<Vec<OcrWord>, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics.load(Ordering::SeqCst) {
                panic!("recognizer crashed");
            }
            if let Some(gate) = self.gate.lock().as_ref() {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            self.result.clone()
        }
    }

    struct Harness {
        session: CaptureSession,
        locator: Arc<ScriptedLocator>,
        recognizer: Arc<GatedRecognizer>,
        release: Option<Sender<()>>,
        start: Instant,
    }

    fn barcode_at(x: i32) -> BoundingBox {
        BoundingBox::from_xywh(x, 150, 100, 30).unwrap()
    }

    fn harness(result: Result<Vec<OcrWord>, OcrError>, gated: bool) -> Harness {
        let locator = Arc::new(ScriptedLocator {
            bounds: Mutex::new(Some(barcode_at(10))),
        });
        let (release, gate) = if gated {
            let (tx, rx) = unbounded();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let recognizer = Arc::new(GatedRecognizer {
            calls: AtomicUsize::new(0),
            panics: AtomicBool::new(false),
            gate: Mutex::new(gate),
            result,
        });

        let schema = vec![
            FieldSpec::required(FieldType::Name, 0),
            FieldSpec::required(FieldType::StudentId, 1),
        ];
        let pipeline = Pipeline::new(
            locator.clone(),
            recognizer.clone(),
            FieldMatcher::new(schema.clone(), MatcherConfig::default()),
            CardValidator::new(schema, 8),
            Palette::default(),
        );

        Harness {
            session: CaptureSession::new(Arc::new(pipeline), StabilityConfig::default()),
            locator,
            recognizer,
            release,
            start: Instant::now(),
        }
    }

    impl Harness {
        fn tick_at(&mut self, ms: u64) {
            let frame = CapturedFrame::at(RgbImage::new(300, 200), self.start + Duration::from_millis(ms));
            self.session.tick(frame);
        }

        /// Keep ticking until the worker reports back
        fn wait_for_worker(&mut self, mut ms: u64) -> u64 {
            for _ in 0..500 {
                if !self.session.is_busy() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
                ms += 10;
                self.tick_at(ms);
            }
            assert!(!self.session.is_busy(), "worker never reported back");
            ms
        }

        fn calls(&self) -> usize {
            self.recognizer.calls.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_stable_barcode_dispatches_once() {
        let mut h = harness(Ok(card_words()), false);

        h.tick_at(0);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.tick_at(500);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.tick_at(1001);
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        h.tick_at(1100);
        h.tick_at(1200);

        let ms = h.wait_for_worker(1200);
        assert_eq!(h.session.status(), CaptureStatus::Success);
        let card = h.session.state().card.as_ref().unwrap();
        assert_eq!(card.full_name(), Some("John Smith"));

        // Holding the card in SUCCESS never re-dispatches
        h.tick_at(ms + 2000);
        h.tick_at(ms + 4000);
        assert_eq!(h.session.status(), CaptureStatus::Success);
        assert_eq!(h.calls(), 1);
    }

    #[test]
    fn test_reset_during_detect_discards_result() {
        let mut h = harness(Ok(card_words()), true);
        h.tick_at(0);
        h.tick_at(1000);
        assert_eq!(h.session.status(), CaptureStatus::Detect);

        h.session.reset_lifecycle();
        assert_eq!(h.session.status(), CaptureStatus::Capture);

        // The old worker still blocks a new cycle
        h.tick_at(1100);
        assert_eq!(h.session.status(), CaptureStatus::Capture);
        assert!(h.session.is_busy());

        h.locator.set(None);
        if let Some(release) = h.release.take() {
            release.send(()).unwrap();
        }
        let ms = h.wait_for_worker(1100);

        assert_eq!(h.session.status(), CaptureStatus::Capture);
        assert!(h.session.state().card.is_none());
        assert!(h.session.state().result_frame.is_none());
        assert_eq!(h.calls(), 1);

        // A fresh cycle can start once the stale worker is gone
        h.locator.set(Some(barcode_at(10)));
        h.tick_at(ms + 10);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
    }

    #[test]
    fn test_moving_barcode_delays_detect() {
        let mut h = harness(Ok(card_words()), false);
        h.tick_at(0);
        h.locator.set(Some(barcode_at(40)));
        h.tick_at(800);
        assert_eq!(h.session.state().modified, h.start + Duration::from_millis(800));

        // Sub-jitter wobble does not restart the clock
        h.locator.set(Some(barcode_at(43)));
        h.tick_at(1500);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.tick_at(1800);
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        h.wait_for_worker(1800);
    }

    #[test]
    fn test_lost_barcode_returns_to_capture() {
        let mut h = harness(Ok(card_words()), false);
        h.tick_at(0);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.locator.set(None);
        h.tick_at(500);
        assert_eq!(h.session.status(), CaptureStatus::Capture);
        h.tick_at(2000);
        assert_eq!(h.calls(), 0);
    }

    #[test]
    fn test_ocr_failure_errors_then_retries() {
        let mut h = harness(Err(OcrError::Timeout(Duration::from_secs(15))), false);
        h.tick_at(0);
        h.tick_at(1000);
        h.locator.set(None);
        let ms = h.wait_for_worker(1000);

        assert_eq!(h.session.status(), CaptureStatus::Errored);
        let state = h.session.state();
        assert_eq!(state.error.as_ref().map(|e| e.kind()), Some(ErrorKind::OcrTimeout));
        assert!(state.result_frame.is_some());

        // Next detection starts over without user action
        h.locator.set(Some(barcode_at(10)));
        h.tick_at(ms + 10);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.tick_at(ms + 1100);
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        h.wait_for_worker(ms + 1100);
        assert_eq!(h.calls(), 2);
    }

    #[test]
    fn test_worker_panic_does_not_wedge_session() {
        let mut h = harness(Ok(card_words()), false);
        h.recognizer.panics.store(true, Ordering::SeqCst);

        h.tick_at(0);
        h.tick_at(1000);
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        h.session.reset_lifecycle();
        h.locator.set(None);

        let ms = h.wait_for_worker(1000);
        assert_eq!(h.session.status(), CaptureStatus::Capture);

        // Next card is read normally
        h.recognizer.panics.store(false, Ordering::SeqCst);
        h.locator.set(Some(barcode_at(10)));
        h.tick_at(ms + 10);
        assert_eq!(h.session.status(), CaptureStatus::Monitor);
        h.tick_at(ms + 1100);
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        h.wait_for_worker(ms + 1100);
        assert_eq!(h.session.status(), CaptureStatus::Success);
        assert_eq!(h.calls(), 2);
    }

    #[test]
    fn test_worker_panic_is_errored() {
        let mut h = harness(Ok(card_words()), false);
        h.recognizer.panics.store(true, Ordering::SeqCst);
        h.tick_at(0);
        assert!(h.session.trigger_now());
        h.locator.set(None);
        h.wait_for_worker(0);

        assert_eq!(h.session.status(), CaptureStatus::Errored);
        let error = h.session.state().error.as_ref().map(|e| e.kind());
        assert_eq!(error, Some(ErrorKind::WorkerCrashed));
    }

    #[test]
    fn test_trigger_now_skips_dwell() {
        let mut h = harness(Ok(card_words()), false);
        assert!(!h.session.trigger_now());
        h.tick_at(0);
        assert!(h.session.trigger_now());
        assert_eq!(h.session.status(), CaptureStatus::Detect);
        assert!(!h.session.trigger_now());
        h.wait_for_worker(0);
        assert_eq!(h.session.status(), CaptureStatus::Success);
    }

    #[test]
    fn test_confirm_saves_and_resets() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("output.csv"));
        let mut h = harness(Ok(card_words()), false);

        assert!(matches!(
            h.session.confirm(&store, &RecordEdits::default()),
            Err(PersistenceError::NothingToSave)
        ));

        h.tick_at(0);
        h.session.trigger_now();
        h.wait_for_worker(0);

        let record = h.session.confirm(&store, &RecordEdits::default()).unwrap();
        assert_eq!(record.student_id, "12345678");
        assert_eq!(h.session.status(), CaptureStatus::Capture);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_confirm_failure_keeps_card() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.csv");
        std::fs::create_dir(&path).unwrap();
        let store = RecordStore::new(&path);
        let mut h = harness(Ok(card_words()), false);

        h.tick_at(0);
        h.session.trigger_now();
        h.wait_for_worker(0);

        assert!(h.session.confirm(&store, &RecordEdits::default()).is_err());
        assert_eq!(h.session.status(), CaptureStatus::Success);
        assert!(h.session.state().card.is_some());
    }
}
