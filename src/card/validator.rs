//! Card validation against the expected layout

use super::field::{Field, FieldSpec};
use super::Card;

/// Decides whether a card carries every required, well-formed field
#[derive(Debug, Clone)]
pub struct CardValidator {
    schema: Vec<FieldSpec>,
    id_length: usize,
}

impl CardValidator {
    pub fn new(schema: Vec<FieldSpec>, id_length: usize) -> Self {
        Self { schema, id_length }
    }

    /// True iff every required spec has exactly one matched, well-formed field
    pub fn is_valid(&self, card: &Card) -> bool {
        self.schema.iter().filter(|spec| spec.required).all(|spec| {
            let mut candidates = card
                .fields
                .iter()
                .filter(|f| f.field_type == spec.field_type);
            match (candidates.next(), candidates.next()) {
                (Some(field), None) => self.is_well_formed(field),
                _ => false,
            }
        })
    }

    /// Fields that are matched and pass their format check
    pub fn get_valid_fields<'a>(&self, card: &'a Card) -> Vec<&'a Field> {
        card.fields
            .iter()
            .filter(|field| self.is_well_formed(field))
            .collect()
    }

    fn is_well_formed(&self, field: &Field) -> bool {
        field.is_matched() && field.field_type.accepts(&field.value, self.id_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{BoundingBox, Confidence, FieldType};
    use chrono::Local;

    fn field(field_type: FieldType, value: &str, y: i32, confidence: Confidence) -> Field {
        Field {
            field_type,
            value: value.to_string(),
            bounds: BoundingBox::from_xywh(10, y, 100, 16).unwrap(),
            confidence,
        }
    }

    fn validator() -> CardValidator {
        CardValidator::new(
            vec![
                FieldSpec::required(FieldType::Name, 0),
                FieldSpec::required(FieldType::StudentId, 1),
                FieldSpec::optional(FieldType::Expiry, 2),
            ],
            8,
        )
    }

    #[test]
    fn test_valid_card() {
        let card = Card::new(
            vec![
                field(FieldType::Name, "John Smith", 10, Confidence::Matched),
                field(FieldType::StudentId, "12345678", 80, Confidence::Matched),
            ],
            Local::now(),
        );
        assert!(validator().is_valid(&card));
        assert_eq!(validator().get_valid_fields(&card).len(), 2);
    }

    #[test]
    fn test_missing_required_field() {
        let card = Card::new(
            vec![field(FieldType::Name, "John Smith", 10, Confidence::Matched)],
            Local::now(),
        );
        assert!(!validator().is_valid(&card));
    }

    #[test]
    fn test_uncertain_field_is_not_valid() {
        let card = Card::new(
            vec![
                field(FieldType::Name, "John Smith", 10, Confidence::Uncertain),
                field(FieldType::StudentId, "12345678", 80, Confidence::Matched),
            ],
            Local::now(),
        );
        let v = validator();
        assert!(!v.is_valid(&card));
        let valid = v.get_valid_fields(&card);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].field_type, FieldType::StudentId);
    }

    #[test]
    fn test_malformed_student_id() {
        let card = Card::new(
            vec![
                field(FieldType::Name, "John Smith", 10, Confidence::Matched),
                field(FieldType::StudentId, "1234S678", 80, Confidence::Matched),
            ],
            Local::now(),
        );
        assert!(!validator().is_valid(&card));
    }

    #[test]
    fn test_duplicate_required_field() {
        let card = Card::new(
            vec![
                field(FieldType::Name, "John Smith", 10, Confidence::Matched),
                field(FieldType::StudentId, "12345678", 80, Confidence::Matched),
                field(FieldType::StudentId, "87654321", 120, Confidence::Matched),
            ],
            Local::now(),
        );
        assert!(!validator().is_valid(&card));
    }

    #[test]
    fn test_optional_field_not_needed() {
        let card = Card::new(
            vec![
                field(FieldType::Name, "John Smith", 10, Confidence::Matched),
                field(FieldType::StudentId, "12345678", 80, Confidence::Matched),
                field(FieldType::Expiry, "garbled", 120, Confidence::Matched),
            ],
            Local::now(),
        );
        let v = validator();
        assert!(v.is_valid(&card));
        assert_eq!(v.get_valid_fields(&card).len(), 2);
    }
}
