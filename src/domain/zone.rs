//! Zone polygons and point containment
//!
//! A zone keeps its canonical reference polygon forever and a current polygon
//! that is replaced whenever the owning store rescales. Containment is a
//! strict-interior test: points on an edge or vertex are outside.

use crate::domain::types::{Point, Resolution};
use thiserror::Error;

/// Minimum vertex count for a usable polygon
pub const MIN_POLYGON_POINTS: usize = 3;

/// Malformed zone geometry. Fatal to a load, never to a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("zone '{zone}' has {points} points, at least {} required", MIN_POLYGON_POINTS)]
    DegeneratePolygon { zone: String, points: usize },
    #[error("zone id '{0}' is defined more than once")]
    DuplicateZone(String),
    #[error("resolution {0} has a zero dimension")]
    InvalidResolution(Resolution),
}

/// Zone as read from a definition source, in reference-resolution coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDefinition {
    pub id: String,
    pub points: Vec<Point>,
}

impl ZoneDefinition {
    pub fn new(id: impl Into<String>, points: impl IntoIterator<Item = Point>) -> Self {
        Self { id: id.into(), points: points.into_iter().collect() }
    }
}

/// A named monitored polygon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    id: String,
    /// Canonical points at the store's original resolution
    reference: Vec<Point>,
    /// Points in the store's current coordinate space
    polygon: Vec<Point>,
}

impl Zone {
    /// Validate a definition and build a zone whose current polygon equals the reference
    pub fn from_definition(def: ZoneDefinition) -> Result<Self, ConfigError> {
        if def.points.len() < MIN_POLYGON_POINTS {
            return Err(ConfigError::DegeneratePolygon { zone: def.id, points: def.points.len() });
        }
        Ok(Self { id: def.id, polygon: def.points.clone(), reference: def.points })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn reference_points(&self) -> &[Point] {
        &self.reference
    }

    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.polygon
    }

    /// Replace the current polygon with the reference scaled from `from` to `to`.
    ///
    /// Always computed from the reference points, so repeated or round-trip
    /// rescales never accumulate rounding error.
    pub(crate) fn rescale(&mut self, from: Resolution, to: Resolution) {
        if from == to {
            self.polygon.clone_from(&self.reference);
            return;
        }
        self.polygon = self
            .reference
            .iter()
            .map(|p| {
                Point::new(
                    scale_coord(p.x, from.width, to.width),
                    scale_coord(p.y, from.height, to.height),
                )
            })
            .collect();
    }

    /// Strict-interior point-in-polygon test (even-odd rule, exact integer math)
    pub fn contains(&self, point: Point) -> bool {
        let pts = &self.polygon;
        let n = pts.len();
        if n < MIN_POLYGON_POINTS {
            return false;
        }

        let px = i64::from(point.x);
        let py = i64::from(point.y);
        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let (a, b) = (pts[i], pts[j]);
            if on_segment(point, a, b) {
                return false;
            }

            let (ax, ay) = (i64::from(a.x), i64::from(a.y));
            let (bx, by) = (i64::from(b.x), i64::from(b.y));

            if (ay > py) != (by > py) {
                // Edge straddles the horizontal ray; check the crossing lies right of the point
                let dy = by - ay;
                let lhs = (px - ax) * dy;
                let rhs = (py - ay) * (bx - ax);
                let crosses = if dy > 0 { lhs < rhs } else { lhs > rhs };
                if crosses {
                    inside = !inside;
                }
            }
            j = i;
        }

        inside
    }
}

/// `value * to / from` in exact integer math, truncated toward zero
fn scale_coord(value: i32, from: u32, to: u32) -> i32 {
    let scaled = i64::from(value) * i64::from(to) / i64::from(from);
    scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// True if `p` lies on the closed segment a-b
fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let (px, py) = (i64::from(p.x), i64::from(p.y));
    let (ax, ay) = (i64::from(a.x), i64::from(a.y));
    let (bx, by) = (i64::from(b.x), i64::from(b.y));

    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross == 0 && px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::from_definition(ZoneDefinition::new(
            "sq",
            [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)],
        ))
        .unwrap()
    }

    #[test]
    fn test_rejects_two_point_polygon() {
        let err = Zone::from_definition(ZoneDefinition::new(
            "line",
            [Point::new(0, 0), Point::new(5, 5)],
        ))
        .unwrap_err();
        assert_eq!(err, ConfigError::DegeneratePolygon { zone: "line".to_string(), points: 2 });
    }

    #[test]
    fn test_interior_and_exterior() {
        let zone = square();
        assert!(zone.contains(Point::new(5, 5)));
        assert!(zone.contains(Point::new(1, 9)));
        assert!(!zone.contains(Point::new(11, 5)));
        assert!(!zone.contains(Point::new(-1, 5)));
        assert!(!zone.contains(Point::new(5, 20)));
    }

    #[test]
    fn test_boundary_points_are_outside() {
        let zone = square();
        assert!(!zone.contains(Point::new(0, 0))); // vertex
        assert!(!zone.contains(Point::new(10, 5))); // vertical edge
        assert!(!zone.contains(Point::new(5, 0))); // horizontal edge
        assert!(!zone.contains(Point::new(5, 10)));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape, notch between x=4..6 from y=4 up to y=10
        let zone = Zone::from_definition(ZoneDefinition::new(
            "u",
            [
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(6, 10),
                Point::new(6, 4),
                Point::new(4, 4),
                Point::new(4, 10),
                Point::new(0, 10),
            ],
        ))
        .unwrap();
        assert!(zone.contains(Point::new(2, 8)));
        assert!(zone.contains(Point::new(8, 8)));
        assert!(zone.contains(Point::new(5, 2)));
        assert!(!zone.contains(Point::new(5, 8))); // inside the notch
    }

    #[test]
    fn test_rescale_truncates_toward_zero() {
        let mut zone = Zone::from_definition(ZoneDefinition::new(
            "tri",
            [Point::new(3, 3), Point::new(7, 3), Point::new(5, 9)],
        ))
        .unwrap();
        zone.rescale(Resolution::new(10, 10), Resolution::new(5, 5));
        assert_eq!(zone.points(), &[Point::new(1, 1), Point::new(3, 1), Point::new(2, 4)]);
        // Reference untouched
        assert_eq!(zone.reference_points()[0], Point::new(3, 3));
    }

    #[test]
    fn test_rescale_is_exact_at_frame_edge() {
        let mut zone = Zone::from_definition(ZoneDefinition::new(
            "edge",
            [Point::new(0, 0), Point::new(1920, 0), Point::new(1920, 1080), Point::new(-7, 1080)],
        ))
        .unwrap();
        zone.rescale(Resolution::new(1920, 1080), Resolution::new(333, 187));
        // 1920 * 333 / 1920 is exactly 333; float ratios land on 332
        assert_eq!(zone.points()[1], Point::new(333, 0));
        assert_eq!(zone.points()[2], Point::new(333, 187));
        // -7 * 333 / 1920 = -1.21, truncated toward zero
        assert_eq!(zone.points()[3], Point::new(-1, 187));
    }
}
