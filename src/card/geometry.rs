//! Pixel-space geometry shared by the locator, matcher and annotation

use serde::{Deserialize, Serialize};

use crate::error::BadBoundingError;

/// Integer pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    dx.hypot(dy)
}

/// Axis-aligned box with the top-left corner never past the bottom-right one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBox", into = "RawBox")]
pub struct BoundingBox {
    tl: Point,
    br: Point,
}

#[derive(Serialize, Deserialize)]
struct RawBox {
    tl: Point,
    br: Point,
}

impl TryFrom<RawBox> for BoundingBox {
    type Error = BadBoundingError;

    fn try_from(raw: RawBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.tl, raw.br)
    }
}

impl From<BoundingBox> for RawBox {
    fn from(b: BoundingBox) -> Self {
        RawBox { tl: b.tl, br: b.br }
    }
}

impl BoundingBox {
    /// Build a box from its corners; inverted or zero-area boxes are rejected
    pub fn new(tl: Point, br: Point) -> Result<Self, BadBoundingError> {
        if tl.x > br.x || tl.y > br.y {
            return Err(BadBoundingError::new(format!(
                "corners out of order: ({}, {}) / ({}, {})",
                tl.x, tl.y, br.x, br.y
            )));
        }
        if tl.x == br.x || tl.y == br.y {
            return Err(BadBoundingError::new(format!(
                "degenerate box at ({}, {})",
                tl.x, tl.y
            )));
        }
        Ok(Self { tl, br })
    }

    /// Build from (x, y, width, height)
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Result<Self, BadBoundingError> {
        Self::new(Point::new(x, y), Point::new(x + width, y + height))
    }

    /// Smallest box containing every vertex (OCR polygons, contours)
    pub fn from_vertices(vertices: &[Point]) -> Result<Self, BadBoundingError> {
        if vertices.is_empty() {
            return Err(BadBoundingError::new("no vertices"));
        }
        let min_x = vertices.iter().map(|p| p.x).min().unwrap_or_default();
        let min_y = vertices.iter().map(|p| p.y).min().unwrap_or_default();
        let max_x = vertices.iter().map(|p| p.x).max().unwrap_or_default();
        let max_y = vertices.iter().map(|p| p.y).max().unwrap_or_default();
        Self::new(Point::new(min_x, min_y), Point::new(max_x, max_y))
    }

    pub fn tl(&self) -> Point {
        self.tl
    }

    pub fn br(&self) -> Point {
        self.br
    }

    pub fn width(&self) -> i32 {
        self.br.x - self.tl.x
    }

    pub fn height(&self) -> i32 {
        self.br.y - self.tl.y
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Centre in sub-pixel precision
    pub fn center(&self) -> (f64, f64) {
        (
            (self.tl.x + self.br.x) as f64 / 2.0,
            (self.tl.y + self.br.y) as f64 / 2.0,
        )
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            tl: Point::new(self.tl.x.min(other.tl.x), self.tl.y.min(other.tl.y)),
            br: Point::new(self.br.x.max(other.br.x), self.br.y.max(other.br.y)),
        }
    }

    /// Whether the box lies entirely inside a `width` x `height` image
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.tl.x >= 0
            && self.tl.y >= 0
            && self.br.x as i64 <= width as i64
            && self.br.y as i64 <= height as i64
    }

    /// Largest corner displacement between two boxes
    pub fn displacement(&self, other: &BoundingBox) -> f64 {
        distance(self.tl, other.tl).max(distance(self.br, other.br))
    }
}

/// Horizontal gap between two boxes; negative when they overlap on x
pub fn horizontal_gap(a: &BoundingBox, b: &BoundingBox) -> i32 {
    a.tl.x.max(b.tl.x) - a.br.x.min(b.br.x)
}

/// Shared vertical extent of two boxes; negative when they are apart on y
pub fn vertical_overlap(a: &BoundingBox, b: &BoundingBox) -> i32 {
    a.br.y.min(b.br.y) - a.tl.y.max(b.tl.y)
}

/// Absolute vertical distance between box centres
pub fn vertical_offset(a: &BoundingBox, b: &BoundingBox) -> f64 {
    (a.center().1 - b.center().1).abs()
}

/// Whether `b` sits one line-step from `a`: horizontal gap at most
/// `horizontal_tolerance` and centre distance in `[vertical_min, vertical_max]`
pub fn within(
    a: &BoundingBox,
    b: &BoundingBox,
    horizontal_tolerance: f64,
    vertical_min: f64,
    vertical_max: f64,
) -> bool {
    let dy = vertical_offset(a, b);
    horizontal_gap(a, b) as f64 <= horizontal_tolerance && dy >= vertical_min && dy <= vertical_max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x: i32, y: i32, w: i32, h: i32) -> BoundingBox {
        BoundingBox::from_xywh(x, y, w, h).unwrap()
    }

    #[test]
    fn test_distance() {
        assert!((distance(Point::new(0, 0), Point::new(3, 4)) - 5.0).abs() < 1e-9);
        assert_eq!(distance(Point::new(7, 7), Point::new(7, 7)), 0.0);
    }

    #[test]
    fn test_inverted_box_rejected() {
        let result = BoundingBox::new(Point::new(10, 10), Point::new(5, 20));
        assert!(result.is_err());
        let result = BoundingBox::new(Point::new(10, 10), Point::new(20, 5));
        assert!(result.is_err());
    }

    #[test]
    fn test_degenerate_box_rejected() {
        assert!(BoundingBox::new(Point::new(3, 3), Point::new(3, 9)).is_err());
        assert!(BoundingBox::new(Point::new(3, 3), Point::new(9, 3)).is_err());
    }

    #[test]
    fn test_from_vertices() {
        let b = BoundingBox::from_vertices(&[
            Point::new(10, 5),
            Point::new(40, 6),
            Point::new(41, 20),
            Point::new(9, 19),
        ])
        .unwrap();
        assert_eq!(b.tl(), Point::new(9, 5));
        assert_eq!(b.br(), Point::new(41, 20));
        assert!(BoundingBox::from_vertices(&[]).is_err());
    }

    #[test]
    fn test_horizontal_gap() {
        assert_eq!(horizontal_gap(&bx(0, 0, 10, 10), &bx(15, 0, 10, 10)), 5);
        assert_eq!(horizontal_gap(&bx(15, 0, 10, 10), &bx(0, 0, 10, 10)), 5);
        assert!(horizontal_gap(&bx(0, 0, 10, 10), &bx(5, 0, 10, 10)) < 0);
    }

    #[test]
    fn test_vertical_overlap() {
        assert_eq!(vertical_overlap(&bx(0, 12, 10, 16), &bx(20, 2, 10, 16)), 6);
        assert_eq!(vertical_overlap(&bx(20, 2, 10, 16), &bx(0, 12, 10, 16)), 6);
        assert_eq!(vertical_overlap(&bx(0, 0, 10, 10), &bx(0, 30, 10, 10)), -20);
    }

    #[test]
    fn test_within_symmetric() {
        let boxes = [
            bx(0, 0, 50, 20),
            bx(60, 70, 80, 20),
            bx(10, 30, 30, 10),
            bx(200, 300, 10, 10),
            bx(30, 150, 40, 25),
        ];
        for a in &boxes {
            for b in &boxes {
                for (h, vmin, vmax) in [(27.0, 20.0, 140.0), (5.0, 0.0, 10.0), (100.0, 50.0, 60.0)] {
                    assert_eq!(within(a, b, h, vmin, vmax), within(b, a, h, vmin, vmax));
                }
            }
        }
    }

    #[test]
    fn test_within_line_step() {
        let name = bx(10, 10, 100, 20);
        let id = bx(10, 80, 80, 20);
        assert!(within(&name, &id, 27.0, 20.0, 140.0));
        // Same line is below the minimum step
        assert!(!within(&name, &bx(130, 12, 40, 20), 27.0, 20.0, 140.0));
    }

    #[test]
    fn test_serde_rejects_inverted() {
        let json = r#"{"tl":{"x":10,"y":10},"br":{"x":1,"y":1}}"#;
        assert!(serde_json::from_str::<BoundingBox>(json).is_err());

        let b = bx(1, 2, 3, 4);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(serde_json::from_str::<BoundingBox>(&json).unwrap(), b);
    }
}
