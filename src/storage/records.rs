//! CSV record store
//!
//! One row per card, keyed by student ID. Writes go through a temporary file
//! and a rename so a failed save never leaves a half-written table behind.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::card::Card;
use crate::error::PersistenceError;

/// Timestamp column format
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

/// One persisted row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub full_name: String,
    pub student_id: String,
    pub timestamp: String,
}

/// Corrections typed into the result form before saving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEdits {
    pub full_name: Option<String>,
    pub student_id: Option<String>,
}

impl Record {
    pub fn new(full_name: impl Into<String>, student_id: impl Into<String>, at: DateTime<Local>) -> Self {
        Self {
            full_name: full_name.into(),
            student_id: student_id.into(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Build a row from a card. Edits replace the read values; the timestamp
    /// is the capture time unless overridden.
    pub fn from_card(
        card: &Card,
        edits: &RecordEdits,
        timestamp_override: Option<DateTime<Local>>,
    ) -> Result<Self, PersistenceError> {
        let full_name = non_empty(edits.full_name.as_deref())
            .or_else(|| non_empty(card.full_name()))
            .ok_or(PersistenceError::MissingField("full_name"))?;
        let student_id = non_empty(edits.student_id.as_deref())
            .or_else(|| non_empty(card.student_id.as_deref()))
            .ok_or(PersistenceError::MissingField("student_id"))?;

        Ok(Self::new(
            full_name,
            student_id,
            timestamp_override.unwrap_or(card.captured_at),
        ))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// File-backed table of records
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles from this process
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored rows. A missing file is an empty table.
    pub fn load(&self) -> Result<Vec<Record>, PersistenceError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|source| PersistenceError::Csv {
            path: self.path.clone(),
            source,
        })?;
        reader
            .deserialize()
            .collect::<Result<Vec<Record>, _>>()
            .map_err(|source| PersistenceError::Csv {
                path: self.path.clone(),
                source,
            })
    }

    /// Overwrite the row with the same student ID, or append a new one
    pub fn upsert(&self, record: Record) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock();

        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.student_id == record.student_id) {
            Some(existing) => {
                debug!("Overwriting record for {}", record.student_id);
                *existing = record.clone();
            }
            None => records.push(record.clone()),
        }

        self.write_all(&records)?;
        info!(
            "Saved record for {} ({} row(s) in {:?})",
            record.student_id,
            records.len(),
            self.path
        );
        Ok(())
    }

    fn write_all(&self, records: &[Record]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let csv_err = |source: csv::Error| PersistenceError::Csv {
            path: temp.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&temp).map_err(csv_err)?;
        for record in records {
            writer.serialize(record).map_err(csv_err)?;
        }
        writer.flush().map_err(io_error(&temp))?;
        drop(writer);

        fs::rename(&temp, &self.path).map_err(io_error(&self.path))
    }
}
