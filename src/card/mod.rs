//! Card Model
//!
//! Geometry, the expected field layout, the positional field matcher and the
//! validator that decides whether a captured card can become a record.

pub mod field;
pub mod geometry;
pub mod matcher;
pub mod validator;

pub use field::{Confidence, Field, FieldSpec, FieldType};
pub use geometry::{BoundingBox, Point};
pub use matcher::{FieldMatcher, MatcherConfig};
pub use validator::CardValidator;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Fields read from one captured card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Matched fields in layout order
    pub fields: Vec<Field>,
    /// Value of the student ID field, if one was read
    pub student_id: Option<String>,
    /// When the frame was captured
    pub captured_at: DateTime<Local>,
}

impl Card {
    pub fn new(fields: Vec<Field>, captured_at: DateTime<Local>) -> Self {
        let student_id = fields
            .iter()
            .find(|f| f.field_type == FieldType::StudentId)
            .map(|f| f.value.clone());
        Self {
            fields,
            student_id,
            captured_at,
        }
    }

    /// First field of the given type
    pub fn field(&self, field_type: FieldType) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type == field_type)
    }

    /// Value of the first field of the given type
    pub fn value(&self, field_type: FieldType) -> Option<&str> {
        self.field(field_type).map(|f| f.value.as_str())
    }

    pub fn full_name(&self) -> Option<&str> {
        self.value(FieldType::Name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_picks_student_id() {
        let fields = vec![
            Field {
                field_type: FieldType::Name,
                value: "John Smith".to_string(),
                bounds: BoundingBox::from_xywh(0, 0, 100, 20).unwrap(),
                confidence: Confidence::Matched,
            },
            Field {
                field_type: FieldType::StudentId,
                value: "12345678".to_string(),
                bounds: BoundingBox::from_xywh(0, 60, 80, 20).unwrap(),
                confidence: Confidence::Matched,
            },
        ];
        let card = Card::new(fields, Local::now());
        assert_eq!(card.student_id.as_deref(), Some("12345678"));
        assert_eq!(card.full_name(), Some("John Smith"));
        assert!(card.value(FieldType::Expiry).is_none());
    }
}
