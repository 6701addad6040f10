//! Card field schema and matched field values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::geometry::BoundingBox;

/// Kind of value printed on one line of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Card holder's full name
    Name,
    /// Fixed-length numeric student ID
    StudentId,
    /// Card expiry date
    Expiry,
    /// Any other printed line
    Text,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Name => "name",
            FieldType::StudentId => "student_id",
            FieldType::Expiry => "expiry",
            FieldType::Text => "text",
        }
    }

    /// Type-specific format predicate
    pub fn accepts(&self, value: &str, id_length: usize) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        match self {
            FieldType::Name => value.chars().any(char::is_alphabetic),
            FieldType::StudentId => {
                value.len() == id_length && value.chars().all(|c| c.is_ascii_digit())
            }
            FieldType::Expiry => ["%d/%m/%Y", "%d-%m-%Y"]
                .iter()
                .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
                || NaiveDate::parse_from_str(&format!("01/{value}"), "%d/%m/%y").is_ok(),
            FieldType::Text => true,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the expected card layout, top to bottom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub expected_order: u32,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(field_type: FieldType, expected_order: u32) -> Self {
        Self {
            field_type,
            expected_order,
            required: true,
        }
    }

    pub fn optional(field_type: FieldType, expected_order: u32) -> Self {
        Self {
            field_type,
            expected_order,
            required: false,
        }
    }
}

/// How cleanly a field was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Matched,
    /// Assigned although a word sat exactly on a tolerance boundary
    Uncertain,
}

/// A value read from the card and the region it was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub field_type: FieldType,
    pub value: String,
    pub bounds: BoundingBox,
    pub confidence: Confidence,
}

impl Field {
    pub fn is_matched(&self) -> bool {
        self.confidence == Confidence::Matched
    }
}
