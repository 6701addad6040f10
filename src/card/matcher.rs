//! Positional field matcher
//!
//! Groups unordered OCR word boxes into printed rows, splits each row into
//! field segments, and assigns segments to the expected layout in order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::field::{Confidence, Field, FieldSpec};
use super::geometry::{horizontal_gap, vertical_offset, vertical_overlap, within, BoundingBox};
use crate::error::UncertainMatchError;
use crate::vision::OcrWord;

/// Spacing tolerances, tuned per capture distance and angle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Largest horizontal gap (px) between two words of the same field
    pub horizontal_tolerance: f64,
    /// Smallest centre distance (px) that starts a new row
    pub vertical_min: f64,
    /// Largest centre distance (px) to the next row; anything further ends the text block
    pub vertical_max: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            horizontal_tolerance: 27.0,
            vertical_min: 20.0,
            vertical_max: 140.0,
        }
    }
}

/// A horizontal cluster of words
#[derive(Debug)]
struct Row<'a> {
    /// Box of the most recently added word
    anchor: BoundingBox,
    words: Vec<&'a OcrWord>,
}

/// Consecutive words of one row that form a single value
#[derive(Debug)]
struct Segment {
    value: String,
    bounds: BoundingBox,
    confidence: Confidence,
}

/// Maps OCR words onto a fixed, top-to-bottom field layout
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    schema: Vec<FieldSpec>,
    config: MatcherConfig,
}

impl FieldMatcher {
    pub fn new(mut schema: Vec<FieldSpec>, config: MatcherConfig) -> Self {
        schema.sort_by_key(|spec| spec.expected_order);
        Self { schema, config }
    }

    pub fn schema(&self) -> &[FieldSpec] {
        &self.schema
    }

    /// Assign words to fields.
    ///
    /// The Nth segment discovered top-to-bottom, left-to-right is given the
    /// Nth field spec. Rows beyond the layout are dropped. A word that cannot
    /// be placed without guessing fails the whole match.
    pub fn match_words(&self, words: &[OcrWord]) -> Result<Vec<Field>, UncertainMatchError> {
        let rows = self.group_rows(words)?;
        let mut specs = self.schema.iter();
        let mut fields = Vec::with_capacity(self.schema.len());

        'rows: for (index, row) in rows.iter().enumerate() {
            for segment in self.segment_row(row, index)? {
                let Some(spec) = specs.next() else {
                    debug!(
                        "Layout exhausted at row {}; ignoring '{}' and {} later row(s)",
                        index + 1,
                        segment.value,
                        rows.len() - index - 1
                    );
                    break 'rows;
                };
                fields.push(Field {
                    field_type: spec.field_type,
                    value: segment.value,
                    bounds: segment.bounds,
                    confidence: segment.confidence,
                });
            }
        }

        debug!(
            "Matched {} field(s) from {} word(s) in {} row(s)",
            fields.len(),
            words.len(),
            rows.len()
        );
        Ok(fields)
    }

    /// Cluster words into rows by vertical distance to a running anchor
    fn group_rows<'a>(&self, words: &'a [OcrWord]) -> Result<Vec<Row<'a>>, UncertainMatchError> {
        let mut ordered: Vec<&OcrWord> = words.iter().collect();
        // Doubled centre keeps the key integral
        ordered.sort_by_key(|w| (w.bounds.tl().y + w.bounds.br().y, w.bounds.tl().x));

        let mut rows: Vec<Row<'a>> = Vec::new();
        for (position, &word) in ordered.iter().enumerate() {
            let row_count = rows.len();
            let Some(row) = rows.last_mut() else {
                rows.push(Row {
                    anchor: word.bounds,
                    words: vec![word],
                });
                continue;
            };

            let dy = vertical_offset(&row.anchor, &word.bounds);
            if dy == self.config.vertical_min {
                return Err(UncertainMatchError {
                    word: word.text.clone(),
                    first: self.row_label(row_count - 1),
                    second: self.row_label(row_count),
                });
            }

            if dy < self.config.vertical_min {
                // Close centres but no common text line: two rows read as one
                let shorter = row.anchor.height().min(word.bounds.height());
                if vertical_overlap(&row.anchor, &word.bounds) * 2 <= shorter {
                    return Err(UncertainMatchError {
                        word: word.text.clone(),
                        first: self.row_label(row_count - 1),
                        second: self.row_label(row_count),
                    });
                }
                row.anchor = word.bounds;
                row.words.push(word);
            } else if within(
                &row.anchor,
                &word.bounds,
                f64::INFINITY,
                self.config.vertical_min,
                self.config.vertical_max,
            ) {
                rows.push(Row {
                    anchor: word.bounds,
                    words: vec![word],
                });
            } else {
                debug!(
                    "Text block ends {:.0}px below row {}; ignoring {} word(s)",
                    dy,
                    row_count,
                    ordered.len() - position
                );
                break;
            }
        }

        Ok(rows)
    }

    /// Split one row into left-to-right segments by horizontal gap
    fn segment_row(&self, row: &Row<'_>, index: usize) -> Result<Vec<Segment>, UncertainMatchError> {
        let mut words = row.words.clone();
        words.sort_by_key(|w| w.bounds.tl().x);

        let mut segments: Vec<Segment> = Vec::new();
        let mut previous: Option<&OcrWord> = None;

        for word in words {
            let Some(prev) = previous.replace(word) else {
                segments.push(Segment::start(word));
                continue;
            };

            let gap = horizontal_gap(&prev.bounds, &word.bounds) as f64;
            if gap < 0.0 {
                // Boxes stacked over each other: two printed lines merged into one row
                return Err(UncertainMatchError {
                    word: word.text.clone(),
                    first: self.row_label(index),
                    second: self.row_label(index + 1),
                });
            }

            if gap > self.config.horizontal_tolerance {
                segments.push(Segment::start(word));
                continue;
            }

            let segment = match segments.last_mut() {
                Some(segment) => segment,
                None => continue,
            };
            if gap == self.config.horizontal_tolerance {
                let ambiguity = UncertainMatchError {
                    word: word.text.clone(),
                    first: format!("{} (joined)", self.row_label(index)),
                    second: format!("{} (split)", self.row_label(index)),
                };
                warn!("{}; keeping the joined value as uncertain", ambiguity);
                segment.confidence = Confidence::Uncertain;
            }
            segment.extend(word);
        }

        Ok(segments)
    }

    /// Human-readable name of the field expected at a row position
    fn row_label(&self, index: usize) -> String {
        self.schema
            .get(index)
            .map(|spec| spec.field_type.to_string())
            .unwrap_or_else(|| format!("row {}", index + 1))
    }
}

impl Segment {
    fn start(word: &OcrWord) -> Self {
        Self {
            value: word.text.clone(),
            bounds: word.bounds,
            confidence: Confidence::Matched,
        }
    }

    fn extend(&mut self, word: &OcrWord) {
        self.value.push(' ');
        self.value.push_str(&word.text);
        self.bounds = self.bounds.union(&word.bounds);
    }
}
