//! Plane geometry used by the collision checks.
//!
//! Everything here is a pure function of its inputs. Angles are radians,
//! counter-clockwise from +x.

use std::f64::consts::{PI, TAU};

use glam::DVec2;
use serde::{Deserialize, Serialize};

// =============================================================================
// Angles
// =============================================================================

/// Normalises an angle into `[0, 2π)`.
#[must_use]
pub fn normal_absolute_angle(angle: f64) -> f64 {
    let a = angle % TAU;
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}

/// Normalises an angle into `[-π, π)`.
#[must_use]
pub fn normal_relative_angle(angle: f64) -> f64 {
    let a = normal_absolute_angle(angle);
    if a >= PI {
        a - TAU
    } else {
        a
    }
}

/// Unit vector for a heading.
#[must_use]
pub fn heading_vector(heading: f64) -> DVec2 {
    DVec2::new(heading.cos(), heading.sin())
}

/// Absolute bearing from `from` to `to`.
#[must_use]
pub fn bearing(from: DVec2, to: DVec2) -> f64 {
    let d = to - from;
    normal_absolute_angle(d.y.atan2(d.x))
}

// =============================================================================
// Bounding boxes
// =============================================================================

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Lower-left corner
    pub min: DVec2,
    /// Upper-right corner
    pub max: DVec2,
}

impl BoundingBox {
    /// Creates a box from its corners.
    #[must_use]
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Creates a square box of the given side centred on `center`.
    #[must_use]
    pub fn centered(center: DVec2, size: f64) -> Self {
        let half = DVec2::splat(size / 2.0);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Centre of the box.
    #[must_use]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Returns true if the point lies inside or on the border.
    #[must_use]
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Returns true if the interiors of the two boxes overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Corners in counter-clockwise order starting at `min`.
    #[must_use]
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }

    /// The four edges as segments.
    #[must_use]
    pub fn edges(&self) -> [(DVec2, DVec2); 4] {
        let c = self.corners();
        [(c[0], c[1]), (c[1], c[2]), (c[2], c[3]), (c[3], c[0])]
    }

    /// Returns true if the segment `a → b` touches the box.
    #[must_use]
    pub fn intersects_segment(&self, a: DVec2, b: DVec2) -> bool {
        self.clip_segment(a, b).is_some()
    }

    /// First point of the segment `a → b` that lies in the box.
    #[must_use]
    pub fn segment_entry(&self, a: DVec2, b: DVec2) -> Option<DVec2> {
        self.clip_segment(a, b).map(|(t0, _)| a + (b - a) * t0)
    }

    /// Clips the segment `a → b` against the four slabs.
    ///
    /// Returns the parameter range `[t0, t1]` inside the box, so a segment
    /// that passes straight through a thin box is still reported.
    #[must_use]
    pub fn clip_segment(&self, a: DVec2, b: DVec2) -> Option<(f64, f64)> {
        let d = b - a;
        let mut t0 = 0.0_f64;
        let mut t1 = 1.0_f64;
        let checks = [
            (-d.x, a.x - self.min.x),
            (d.x, self.max.x - a.x),
            (-d.y, a.y - self.min.y),
            (d.y, self.max.y - a.y),
        ];
        for (p, q) in checks {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else {
                let r = q / p;
                if p < 0.0 {
                    t0 = t0.max(r);
                } else {
                    t1 = t1.min(r);
                }
                if t0 > t1 {
                    return None;
                }
            }
        }
        Some((t0, t1))
    }
}

// =============================================================================
// Segments
// =============================================================================

/// Intersects two segments with the two-parameter `ua`/`ub` solve.
///
/// Parallel and collinear segments never intersect; the denominator is
/// checked once instead of iterating on degenerate input.
///
/// # Returns
///
/// The intersection point, if both parameters lie in `[0, 1]`.
#[must_use]
pub fn segment_intersection(p1: DVec2, p2: DVec2, p3: DVec2, p4: DVec2) -> Option<DVec2> {
    let d13 = p1 - p3;
    let d21 = p2 - p1;
    let d43 = p4 - p3;
    let denom = d43.y * d21.x - d43.x * d21.y;
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let ua = (d43.x * d13.y - d43.y * d13.x) / denom;
    let ub = (d21.x * d13.y - d21.y * d13.x) / denom;
    if (0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub) {
        Some(p1 + d21 * ua)
    } else {
        None
    }
}

fn segment_circle_hits(a: DVec2, b: DVec2, center: DVec2, radius: f64) -> [Option<DVec2>; 2] {
    let d = b - a;
    let f = a - center;
    let qa = d.dot(d);
    if qa == 0.0 {
        return [None, None];
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.dot(f) - radius * radius;
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return [None, None];
    }
    let root = disc.sqrt();
    let pick = |t: f64| (0.0..=1.0).contains(&t).then(|| a + d * t);
    [pick((-qb - root) / (2.0 * qa)), pick((-qb + root) / (2.0 * qa))]
}

// =============================================================================
// Scan arcs
// =============================================================================

/// A pie-slice swept by a radar in one turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanArc {
    /// Apex of the slice
    pub center: DVec2,
    /// Radius of the slice
    pub radius: f64,
    /// Absolute start angle
    pub start: f64,
    /// Signed sweep, positive counter-clockwise
    pub sweep: f64,
}

impl ScanArc {
    /// Builds the arc swept from `from` to `to`, taking the short way round.
    #[must_use]
    pub fn swept(center: DVec2, radius: f64, from: f64, to: f64) -> Self {
        Self {
            center,
            radius,
            start: normal_absolute_angle(from),
            sweep: normal_relative_angle(to - from),
        }
    }

    fn covers_angle(&self, angle: f64) -> bool {
        if self.sweep >= 0.0 {
            normal_absolute_angle(angle - self.start) <= self.sweep
        } else {
            normal_absolute_angle(self.start - angle) <= -self.sweep
        }
    }

    /// Returns true if the point lies inside the slice.
    #[must_use]
    pub fn contains(&self, p: DVec2) -> bool {
        let d = p - self.center;
        if d.length() > self.radius {
            return false;
        }
        if d == DVec2::ZERO {
            return true;
        }
        self.covers_angle(d.y.atan2(d.x))
    }

    /// Returns true if the slice overlaps the box.
    #[must_use]
    pub fn intersects_box(&self, bb: &BoundingBox) -> bool {
        if bb.contains(self.center) {
            return true;
        }
        if bb.corners().iter().any(|&c| self.contains(c)) {
            return true;
        }
        let start_edge = self.center + heading_vector(self.start) * self.radius;
        let end_edge = self.center + heading_vector(self.start + self.sweep) * self.radius;
        if bb.intersects_segment(self.center, start_edge)
            || bb.intersects_segment(self.center, end_edge)
        {
            return true;
        }
        if self.sweep == 0.0 {
            return false;
        }
        bb.edges().iter().any(|&(a, b)| {
            segment_circle_hits(a, b, self.center, self.radius)
                .iter()
                .flatten()
                .any(|&p| self.contains(p))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod angle_tests {
        use super::*;

        #[test]
        fn absolute_wraps_into_range() {
            assert!((normal_absolute_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
            assert!((normal_absolute_angle(5.0 * PI) - PI).abs() < 1e-12);
            assert_eq!(normal_absolute_angle(0.0), 0.0);
        }

        #[test]
        fn relative_wraps_into_range() {
            assert!((normal_relative_angle(1.5 * PI) + PI / 2.0).abs() < 1e-12);
            assert!((normal_relative_angle(-1.5 * PI) - PI / 2.0).abs() < 1e-12);
        }

        #[test]
        fn bearing_is_counter_clockwise_from_x() {
            let o = DVec2::ZERO;
            assert!((bearing(o, DVec2::new(0.0, 1.0)) - PI / 2.0).abs() < 1e-12);
            assert!((bearing(o, DVec2::new(-1.0, 0.0)) - PI).abs() < 1e-12);
        }
    }

    mod box_tests {
        use super::*;

        #[test]
        fn touching_boxes_do_not_intersect() {
            let a = BoundingBox::centered(DVec2::new(0.0, 0.0), 36.0);
            let b = BoundingBox::centered(DVec2::new(36.0, 0.0), 36.0);
            let c = BoundingBox::centered(DVec2::new(35.0, 0.0), 36.0);
            assert!(!a.intersects(&b));
            assert!(a.intersects(&c));
        }

        #[test]
        fn segment_through_box() {
            let bb = BoundingBox::centered(DVec2::new(50.0, 50.0), 10.0);
            assert!(bb.intersects_segment(DVec2::new(0.0, 50.0), DVec2::new(100.0, 50.0)));
            assert!(!bb.intersects_segment(DVec2::new(0.0, 0.0), DVec2::new(100.0, 0.0)));
            assert!(!bb.intersects_segment(DVec2::new(0.0, 50.0), DVec2::new(40.0, 50.0)));
        }

        #[test]
        fn entry_point_is_on_the_near_face() {
            let bb = BoundingBox::centered(DVec2::new(50.0, 50.0), 10.0);
            let entry = bb.segment_entry(DVec2::new(0.0, 50.0), DVec2::new(100.0, 50.0));
            assert_eq!(entry, Some(DVec2::new(45.0, 50.0)));
            let inside = bb.segment_entry(DVec2::new(50.0, 50.0), DVec2::new(100.0, 50.0));
            assert_eq!(inside, Some(DVec2::new(50.0, 50.0)));
        }

        #[test]
        fn degenerate_segment_is_a_point() {
            let bb = BoundingBox::centered(DVec2::ZERO, 10.0);
            assert!(bb.intersects_segment(DVec2::ZERO, DVec2::ZERO));
            assert!(!bb.intersects_segment(DVec2::splat(20.0), DVec2::splat(20.0)));
        }
    }

    mod segment_tests {
        use super::*;

        #[test]
        fn crossing_segments() {
            let p = segment_intersection(
                DVec2::new(0.0, 0.0),
                DVec2::new(10.0, 10.0),
                DVec2::new(0.0, 10.0),
                DVec2::new(10.0, 0.0),
            );
            assert_eq!(p, Some(DVec2::new(5.0, 5.0)));
        }

        #[test]
        fn parallel_and_collinear_never_intersect() {
            let a = DVec2::new(0.0, 0.0);
            let b = DVec2::new(10.0, 0.0);
            assert!(segment_intersection(a, b, DVec2::new(0.0, 1.0), DVec2::new(10.0, 1.0)).is_none());
            assert!(segment_intersection(a, b, DVec2::new(5.0, 0.0), DVec2::new(15.0, 0.0)).is_none());
            assert!(segment_intersection(a, a, a, a).is_none());
        }

        #[test]
        fn short_segments_miss() {
            let p = segment_intersection(
                DVec2::new(0.0, 0.0),
                DVec2::new(1.0, 1.0),
                DVec2::new(0.0, 10.0),
                DVec2::new(10.0, 0.0),
            );
            assert!(p.is_none());
        }
    }

    mod arc_tests {
        use super::*;

        #[test]
        fn quarter_sweep_sees_box_inside() {
            let arc = ScanArc::swept(DVec2::ZERO, 100.0, 0.0, PI / 2.0);
            let inside = BoundingBox::centered(DVec2::new(40.0, 40.0), 10.0);
            let behind = BoundingBox::centered(DVec2::new(-40.0, -40.0), 10.0);
            assert!(arc.intersects_box(&inside));
            assert!(!arc.intersects_box(&behind));
        }

        #[test]
        fn zero_sweep_acts_as_ray() {
            let arc = ScanArc::swept(DVec2::ZERO, 100.0, 0.0, 0.0);
            let on_ray = BoundingBox::centered(DVec2::new(50.0, 0.0), 10.0);
            let off_ray = BoundingBox::centered(DVec2::new(50.0, 30.0), 10.0);
            assert!(arc.intersects_box(&on_ray));
            assert!(!arc.intersects_box(&off_ray));
        }

        #[test]
        fn box_beyond_radius_is_missed() {
            let arc = ScanArc::swept(DVec2::ZERO, 100.0, -0.5, 0.5);
            let far = BoundingBox::centered(DVec2::new(130.0, 0.0), 10.0);
            assert!(!arc.intersects_box(&far));
        }

        #[test]
        fn arc_edge_clips_box_corner_free() {
            // Box straddles the arc boundary with every corner outside the slice.
            let arc = ScanArc::swept(DVec2::ZERO, 100.0, -0.05, 0.05);
            let straddle = BoundingBox::new(DVec2::new(98.0, -50.0), DVec2::new(150.0, 50.0));
            assert!(arc.intersects_box(&straddle));
        }

        #[test]
        fn clockwise_sweep() {
            let arc = ScanArc::swept(DVec2::ZERO, 100.0, PI / 2.0, 0.0);
            assert!(arc.sweep < 0.0);
            assert!(arc.contains(DVec2::new(30.0, 30.0)));
            assert!(!arc.contains(DVec2::new(-30.0, 30.0)));
        }
    }
}
