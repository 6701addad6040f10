//! Replay and import of cached captures
//!
//! Walks a list of cached capture ids one key press at a time, re-running
//! barcode detection on the cached image and the matcher and validator on
//! the cached words with the current configuration. Import mode can save
//! each card with the capture's original time.

use anyhow::Result;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::{Pipeline, PipelineOutcome};
use crate::card::Card;
use crate::error::PersistenceError;
use crate::storage::{CaptureCache, Record, RecordEdits, RecordStore};

/// Position in a fixed-length list, advanced manually
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    len: usize,
    wrap: bool,
}

impl Cursor {
    pub fn new(len: usize, wrap: bool) -> Self {
        Self { index: 0, len, wrap }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Step forward. Without wrap the cursor stops on the last item and
    /// returns false.
    pub fn advance(&mut self) -> bool {
        if self.len == 0 {
            return false;
        }
        if self.index + 1 < self.len {
            self.index += 1;
            true
        } else if self.wrap {
            self.index = 0;
            true
        } else {
            false
        }
    }
}

/// One cached capture, re-evaluated
#[derive(Debug)]
pub struct ReplayItem {
    pub id: String,
    pub captured_at: DateTime<Local>,
    /// Cached image with the barcode outlined, if one is visible
    pub debug_frame: RgbImage,
    pub outcome: PipelineOutcome,
}

impl ReplayItem {
    /// Card read from the capture, complete or partial
    pub fn card(&self) -> Option<&Card> {
        match &self.outcome {
            Ok(result) => Some(&result.card),
            Err(failure) => failure.card.as_ref(),
        }
    }

    /// Annotated result image
    pub fn result_frame(&self) -> &RgbImage {
        match &self.outcome {
            Ok(result) => &result.frame,
            Err(failure) => &failure.frame,
        }
    }
}

/// Steps through cached captures
pub struct Replay {
    cache: CaptureCache,
    ids: Vec<String>,
    cursor: Cursor,
    pipeline: Arc<Pipeline>,
    current: Option<ReplayItem>,
}

impl Replay {
    pub fn new(cache: CaptureCache, ids: Vec<String>, pipeline: Arc<Pipeline>, wrap: bool) -> Self {
        let cursor = Cursor::new(ids.len(), wrap);
        Self {
            cache,
            ids,
            cursor,
            pipeline,
            current: None,
        }
    }

    /// Every capture in the cache directory, oldest first
    pub fn from_cache_dir(cache: CaptureCache, pipeline: Arc<Pipeline>) -> Result<Self> {
        let ids = cache.list_ids()?;
        info!("Found {} cached capture(s) in {:?}", ids.len(), cache.dir());
        Ok(Self::new(cache, ids, pipeline, false))
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn current(&self) -> Option<&ReplayItem> {
        self.current.as_ref()
    }

    /// Load the item under the cursor, skipping ids that cannot be loaded.
    /// Returns `None` when nothing in the list is loadable.
    pub fn load_current(&mut self) -> Option<&ReplayItem> {
        self.current = None;
        for _ in 0..self.cursor.len() {
            let id = self.ids[self.cursor.index()].clone();
            match self.evaluate(&id) {
                Ok(Some(item)) => {
                    self.current = Some(item);
                    break;
                }
                Ok(None) => debug!("Skipping {}: no cached words", id),
                Err(e) => warn!("Skipping {}: {:#}", id, e),
            }
            if !self.cursor.advance() {
                break;
            }
        }
        self.current.as_ref()
    }

    /// Move to the next capture and load it. Returns `None` at the end of a
    /// non-wrapping list.
    pub fn advance(&mut self) -> Option<&ReplayItem> {
        if !self.cursor.advance() {
            self.current = None;
            return None;
        }
        self.load_current()
    }

    /// Save the current card, timestamped with the capture file's time
    pub fn save_current(&self, store: &RecordStore, edits: &RecordEdits) -> Result<Record, PersistenceError> {
        let item = self.current.as_ref().ok_or(PersistenceError::NothingToSave)?;
        let card = item.card().ok_or(PersistenceError::NothingToSave)?;

        let original_time = match self.cache.image_modified(&item.id) {
            Ok(time) => time,
            Err(e) => {
                warn!("Using capture time for {}: {:#}", item.id, e);
                item.captured_at
            }
        };

        let record = Record::from_card(card, edits, Some(original_time))?;
        store.upsert(record.clone())?;
        Ok(record)
    }

    fn evaluate(&self, id: &str) -> Result<Option<ReplayItem>> {
        let Some(cached) = self.cache.load(id)? else {
            return Ok(None);
        };
        let image = self.cache.load_image(id)?;

        let detection = self.pipeline.locator().detect(&image);
        let outcome = self.pipeline.assemble(&image, &cached.words, cached.captured_at);
        debug!(
            "Replayed {}: barcode {:?}, {}",
            id,
            detection.status(),
            if outcome.is_ok() { "valid" } else { "rejected" }
        );

        Ok(Some(ReplayItem {
            id: id.to_string(),
            captured_at: cached.captured_at,
            debug_frame: detection.annotated,
            outcome,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pipeline::tests::{card_words, pipeline, word};
    use crate::storage::CachedCapture;
    use crate::vision::CannedRecognizer;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_cursor_wraps() {
        let mut cursor = Cursor::new(3, true);
        assert!(cursor.advance());
        assert!(cursor.advance());
        assert_eq!(cursor.index(), 2);
        assert!(cursor.advance());
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_cursor_stops_without_wrap() {
        let mut cursor = Cursor::new(2, false);
        assert!(cursor.advance());
        assert!(!cursor.advance());
        assert_eq!(cursor.index(), 1);

        let mut empty = Cursor::new(0, true);
        assert!(empty.is_empty());
        assert!(!empty.advance());
    }

    fn seed(cache: &CaptureCache, id: &str, words: Vec<crate::vision::OcrWord>) {
        let capture = CachedCapture {
            id: id.to_string(),
            captured_at: Local.with_ymd_and_hms(2018, 6, 24, 22, 40, 50).unwrap(),
            words,
            fields: vec![],
        };
        cache.store(&capture, &RgbImage::new(300, 200)).unwrap();
    }

    fn replay(dir: &TempDir) -> Replay {
        let cache = CaptureCache::new(dir.path());
        let pipeline = Arc::new(pipeline(Arc::new(CannedRecognizer::default())));
        Replay::from_cache_dir(cache, pipeline).unwrap()
    }

    #[test]
    fn test_replay_reevaluates_cached_words() {
        let dir = TempDir::new().unwrap();
        let cache = CaptureCache::new(dir.path());
        seed(&cache, "20180624224050", card_words());
        seed(&cache, "20180624224051", vec![word("John", 10, 20), word("1234", 10, 90)]);

        let mut replay = replay(&dir);
        let first = replay.load_current().unwrap();
        assert_eq!(first.id, "20180624224050");
        assert!(first.outcome.is_ok());

        let second = replay.advance().unwrap();
        assert_eq!(second.id, "20180624224051");
        assert!(second.outcome.is_err());
        assert_eq!(second.card().and_then(|c| c.full_name()), Some("John"));

        assert!(replay.advance().is_none());
    }

    #[test]
    fn test_replay_skips_missing_json() {
        let dir = TempDir::new().unwrap();
        let cache = CaptureCache::new(dir.path());
        seed(&cache, "20180624224050", card_words());
        seed(&cache, "20180624224051", card_words());
        std::fs::remove_file(cache.json_path("20180624224050")).unwrap();

        let mut replay = replay(&dir);
        assert_eq!(replay.load_current().unwrap().id, "20180624224051");
    }

    #[test]
    fn test_import_saves_with_file_time() {
        let dir = TempDir::new().unwrap();
        let cache = CaptureCache::new(dir.path().join("cache"));
        seed(&cache, "20180624224050", card_words());
        let store = RecordStore::new(dir.path().join("output.csv"));

        let pipeline = Arc::new(pipeline(Arc::new(CannedRecognizer::default())));
        let mut replay = Replay::from_cache_dir(cache.clone(), pipeline).unwrap();
        replay.load_current().unwrap();

        let record = replay.save_current(&store, &RecordEdits::default()).unwrap();
        let expected = cache
            .image_modified("20180624224050")
            .unwrap()
            .format(crate::storage::records::TIMESTAMP_FORMAT)
            .to_string();
        assert_eq!(record.timestamp, expected);
        assert_eq!(store.load().unwrap(), vec![record]);
    }
}
