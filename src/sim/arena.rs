//! Arena geometry: WKT multipolygons, border sensors and crossing tests.
//!
//! The arena is a set of polygonal walls. Sensors cast equally spaced rays
//! and report an exponentially decaying activation for the nearest wall hit
//! within range; crossing tests detect whether the agent's last movement
//! segment intersected any wall.

use std::f64::consts::TAU;

use thiserror::Error;

/// Errors produced while reading arena geometry.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("malformed WKT multipolygon at byte {position}: expected {expected}")]
    Malformed {
        position: usize,
        expected: &'static str,
    },
}

/// A set of polygonal walls loaded from a WKT `MULTIPOLYGON`.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    /// Every ring of every polygon, as point lists.
    pub polygons: Vec<Vec<(f64, f64)>>,
    /// Wall segments derived from the rings.
    segments: Vec<(f64, f64, f64, f64)>,
}

impl Arena {
    /// An arena with no walls.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a WKT `MULTIPOLYGON` string.
    ///
    /// Accepts `MULTIPOLYGON EMPTY`, `MULTIPOLYGON()` and the usual nested
    /// ring syntax. All rings, exterior and interior alike, become walls;
    /// unclosed rings are closed implicitly.
    pub fn from_wkt(wkt: &str) -> Result<Self, ArenaError> {
        let mut parser = WktParser::new(wkt);
        parser.expect_keyword("MULTIPOLYGON")?;
        let mut arena = Self::empty();

        if parser.try_keyword("EMPTY") {
            return Ok(arena);
        }
        parser.expect('(')?;
        if parser.try_char(')') {
            return Ok(arena);
        }
        loop {
            parser.expect('(')?; // polygon
            loop {
                let ring = parser.ring()?;
                arena.add_ring(ring);
                if !parser.try_char(',') {
                    break;
                }
            }
            parser.expect(')')?;
            if !parser.try_char(',') {
                break;
            }
        }
        parser.expect(')')?;
        Ok(arena)
    }

    fn add_ring(&mut self, mut ring: Vec<(f64, f64)>) {
        if ring.len() > 1 && ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        for window in ring.windows(2) {
            let (ax, ay) = window[0];
            let (bx, by) = window[1];
            self.segments.push((ax, ay, bx, by));
        }
        self.polygons.push(ring);
    }

    /// Number of wall segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Fills `sensors` with border activations for equally spaced rays
    /// cast from (x, y): `2·exp(−5·d/range)` for the nearest hit within
    /// `range`, zero when nothing is hit.
    pub fn update_sensors(&self, x: f64, y: f64, range: f64, sensors: &mut [f32]) {
        let sensor_count = sensors.len();
        for (sensor, value) in sensors.iter_mut().enumerate() {
            let direction = sensor as f64 * TAU / sensor_count as f64;
            let end_x = x + range * direction.cos();
            let end_y = y + range * direction.sin();

            let mut closest: Option<f64> = None;
            for &(ax, ay, bx, by) in &self.segments {
                if let Some(t) = segment_intersection_t(x, y, end_x, end_y, ax, ay, bx, by) {
                    let distance = t * range;
                    if closest.is_none_or(|best| distance < best) {
                        closest = Some(distance);
                    }
                }
            }
            *value = match closest {
                Some(distance) => (2.0 * (-5.0 * distance / range).exp()) as f32,
                None => 0.0,
            };
        }
    }

    /// Whether the movement segment from (ax, ay) to (bx, by) crosses any
    /// wall.
    #[must_use]
    pub fn line_intersects(&self, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
        self.segments
            .iter()
            .any(|&(cx, cy, dx, dy)| segments_intersect(ax, ay, bx, by, cx, cy, dx, dy))
    }
}

/// Parameter along A→B of the intersection with segment C→D, if the two
/// proper segments cross.
fn segment_intersection_t(
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
    cx: f64,
    cy: f64,
    dx: f64,
    dy: f64,
) -> Option<f64> {
    let r = (bx - ax, by - ay);
    let s = (dx - cx, dy - cy);
    let denominator = r.0 * s.1 - r.1 * s.0;
    if denominator.abs() < 1e-12 {
        return None;
    }
    let qp = (cx - ax, cy - ay);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denominator;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denominator;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

fn orientation(ax: f64, ay: f64, bx: f64, by: f64, cx: f64, cy: f64) -> i32 {
    let cross = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
    if cross > 1e-12 {
        1
    } else if cross < -1e-12 {
        -1
    } else {
        0
    }
}

fn on_segment(ax: f64, ay: f64, bx: f64, by: f64, px: f64, py: f64) -> bool {
    px >= ax.min(bx) - 1e-12
        && px <= ax.max(bx) + 1e-12
        && py >= ay.min(by) - 1e-12
        && py <= ay.max(by) + 1e-12
}

/// Whether segments A→B and C→D intersect, collinear touches included.
fn segments_intersect(
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
    cx: f64,
    cy: f64,
    dx: f64,
    dy: f64,
) -> bool {
    let o1 = orientation(ax, ay, bx, by, cx, cy);
    let o2 = orientation(ax, ay, bx, by, dx, dy);
    let o3 = orientation(cx, cy, dx, dy, ax, ay);
    let o4 = orientation(cx, cy, dx, dy, bx, by);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(ax, ay, bx, by, cx, cy))
        || (o2 == 0 && on_segment(ax, ay, bx, by, dx, dy))
        || (o3 == 0 && on_segment(cx, cy, dx, dy, ax, ay))
        || (o4 == 0 && on_segment(cx, cy, dx, dy, bx, by))
}

/// Character-level cursor over a WKT string.
struct WktParser<'a> {
    text: &'a str,
    position: usize,
}

impl<'a> WktParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, position: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self
            .text
            .as_bytes()
            .get(self.position)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.position += 1;
        }
    }

    fn error(&self, expected: &'static str) -> ArenaError {
        ArenaError::Malformed {
            position: self.position,
            expected,
        }
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<(), ArenaError> {
        self.skip_whitespace();
        if self.text[self.position..].starts_with(keyword) {
            self.position += keyword.len();
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.text[self.position..].starts_with(keyword) {
            self.position += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), ArenaError> {
        self.skip_whitespace();
        if self.text[self.position..].starts_with(wanted) {
            self.position += wanted.len_utf8();
            Ok(())
        } else {
            Err(self.error(match wanted {
                '(' => "'('",
                ')' => "')'",
                _ => "punctuation",
            }))
        }
    }

    fn try_char(&mut self, wanted: char) -> bool {
        self.skip_whitespace();
        if self.text[self.position..].starts_with(wanted) {
            self.position += wanted.len_utf8();
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<f64, ArenaError> {
        self.skip_whitespace();
        let start = self.position;
        let bytes = self.text.as_bytes();
        while bytes.get(self.position).is_some_and(|&b| {
            b.is_ascii_digit() || b == b'-' || b == b'+' || b == b'.' || b == b'e' || b == b'E'
        }) {
            self.position += 1;
        }
        self.text[start..self.position]
            .parse()
            .map_err(|_| self.error("number"))
    }

    fn ring(&mut self) -> Result<Vec<(f64, f64)>, ArenaError> {
        self.expect('(')?;
        let mut points = Vec::new();
        loop {
            let x = self.number()?;
            let y = self.number()?;
            points.push((x, y));
            if !self.try_char(',') {
                break;
            }
        }
        self.expect(')')?;
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOX_WKT: &str = "MULTIPOLYGON(((10 -10, 10 10, 12 10, 12 -10, 10 -10)))";

    #[test]
    fn test_empty_arena_forms() {
        assert_eq!(Arena::from_wkt("MULTIPOLYGON()").unwrap().segment_count(), 0);
        assert_eq!(
            Arena::from_wkt("MULTIPOLYGON EMPTY").unwrap().segment_count(),
            0
        );
    }

    #[test]
    fn test_box_parses_into_segments() {
        let arena = Arena::from_wkt(BOX_WKT).unwrap();
        assert_eq!(arena.polygons.len(), 1);
        assert_eq!(arena.segment_count(), 4);
    }

    #[test]
    fn test_unclosed_ring_is_closed() {
        let arena = Arena::from_wkt("MULTIPOLYGON(((0 0, 1 0, 1 1)))").unwrap();
        assert_eq!(arena.segment_count(), 3);
        assert_eq!(arena.polygons[0].first(), arena.polygons[0].last());
    }

    #[test]
    fn test_multiple_polygons_and_holes() {
        let wkt = "MULTIPOLYGON(((0 0, 4 0, 4 4, 0 4, 0 0), (1 1, 2 1, 2 2, 1 2, 1 1)), \
                   ((10 10, 11 10, 11 11, 10 10)))";
        let arena = Arena::from_wkt(wkt).unwrap();
        assert_eq!(arena.polygons.len(), 3);
        assert_eq!(arena.segment_count(), 4 + 4 + 3);
    }

    #[test]
    fn test_malformed_wkt_is_rejected() {
        assert!(Arena::from_wkt("POLYGON((0 0))").is_err());
        assert!(Arena::from_wkt("MULTIPOLYGON(((0 0, 1)))").is_err());
        assert!(Arena::from_wkt("MULTIPOLYGON(((0 0, 1 1))").is_err());
    }

    #[test]
    fn test_sensor_sees_wall_to_the_east() {
        let arena = Arena::from_wkt(BOX_WKT).unwrap();
        let mut sensors = vec![0.0_f32; 72];
        arena.update_sensors(0.0, 0.0, 25.0, &mut sensors);

        // Direction 0 hits the wall at x = 10: 2·exp(−5·10/25).
        let expected = 2.0 * (-2.0_f64).exp();
        assert!((f64::from(sensors[0]) - expected).abs() < 1e-4);
        // Away from the wall nothing is in range.
        assert_eq!(sensors[36], 0.0);
        // Nearby directions still see the wall, farther away.
        assert!(sensors[1] > 0.0);
        assert!(sensors[1] < sensors[0]);
    }

    #[test]
    fn test_sensor_out_of_range_is_silent() {
        let arena = Arena::from_wkt(BOX_WKT).unwrap();
        let mut sensors = vec![0.0_f32; 8];
        arena.update_sensors(-100.0, 0.0, 25.0, &mut sensors);
        assert!(sensors.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_line_intersects_wall() {
        let arena = Arena::from_wkt(BOX_WKT).unwrap();
        assert!(arena.line_intersects(9.0, 0.0, 11.0, 0.0));
        assert!(!arena.line_intersects(0.0, 0.0, 9.0, 0.0));
        assert!(!arena.line_intersects(0.0, 20.0, 20.0, 20.0));
    }

    #[test]
    fn test_empty_arena_never_intersects() {
        let arena = Arena::empty();
        assert!(!arena.line_intersects(-100.0, -100.0, 100.0, 100.0));
        let mut sensors = vec![1.0_f32; 4];
        arena.update_sensors(0.0, 0.0, 25.0, &mut sensors);
        assert!(sensors.iter().all(|&s| s == 0.0));
    }
}
