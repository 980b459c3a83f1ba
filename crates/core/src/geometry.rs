//! 2D geometry primitives
//!
//! Points live in image pixel space unless stated otherwise. Areas are built in
//! device space (after an [`AffineTransform`] has been applied) so that hit
//! tolerances can be expressed in screen pixels.

use serde::{Deserialize, Serialize};

/// Point in image (or device) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Return this point moved by the given offsets
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned rectangle
///
/// Intersection and containment are closed (edges count), so degenerate
/// rectangles produced by a single point still participate in queries.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle from origin and size
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two arbitrary corners
    pub fn from_corners(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self::new(min_x, min_y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    /// Smallest rectangle containing every point, or `None` for an empty slice
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in points.iter().skip(1) {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Corners in clockwise order starting at the origin
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }

    /// Overlapping part of two rectangles
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        let min_x = self.min_x().max(other.min_x());
        let min_y = self.min_y().max(other.min_y());
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow the rectangle by `amount` on every side
    pub fn grown(&self, amount: f64) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + 2.0 * amount,
            self.height + 2.0 * amount,
        )
    }
}

/// 2D affine transform (image space to device space)
///
/// Matrix layout follows the usual column convention:
///
/// ```text
/// [ m00 m01 m02 ]
/// [ m10 m11 m12 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
    pub m02: f64,
    pub m12: f64,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self { m00: 1.0, m10: 0.0, m01: 0.0, m11: 1.0, m02: 0.0, m12: 0.0 }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { m00: sx, m10: 0.0, m01: 0.0, m11: sy, m02: 0.0, m12: 0.0 }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self { m00: 1.0, m10: 0.0, m01: 0.0, m11: 1.0, m02: tx, m12: ty }
    }

    /// Transform that applies `self` first and then `next`
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            m00: next.m00 * self.m00 + next.m01 * self.m10,
            m10: next.m10 * self.m00 + next.m11 * self.m10,
            m01: next.m00 * self.m01 + next.m01 * self.m11,
            m11: next.m10 * self.m01 + next.m11 * self.m11,
            m02: next.m00 * self.m02 + next.m01 * self.m12 + next.m02,
            m12: next.m10 * self.m02 + next.m11 * self.m12 + next.m12,
        }
    }

    pub fn apply(&self, point: &Point) -> Point {
        Point::new(
            self.m00 * point.x + self.m01 * point.y + self.m02,
            self.m10 * point.x + self.m11 * point.y + self.m12,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Inverse transform, `None` when the matrix is singular
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON {
            return None;
        }
        Some(AffineTransform {
            m00: self.m11 / det,
            m10: -self.m10 / det,
            m01: -self.m01 / det,
            m11: self.m00 / det,
            m02: (self.m01 * self.m12 - self.m11 * self.m02) / det,
            m12: (self.m10 * self.m02 - self.m00 * self.m12) / det,
        })
    }

    /// Average linear scale factor, used to convert device pixel sizes to image space
    pub fn scale_factor(&self) -> f64 {
        let det = self.determinant().abs().sqrt();
        if det > 0.0 {
            det
        } else {
            1.0
        }
    }

    /// Bounds of a transformed rectangle
    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|corner| self.apply(&corner));
        // Four corners, never empty
        Rect::bounding(&corners).unwrap_or(*rect)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Union of simple polygons
///
/// Every polygon is tested with the even-odd rule on its own; a point belongs
/// to the area when any polygon contains it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Area {
    polygons: Vec<Vec<Point>>,
}

impl Area {
    pub fn new() -> Self {
        Self { polygons: Vec::new() }
    }

    pub fn from_polygon(polygon: Vec<Point>) -> Self {
        let mut area = Self::new();
        area.push(polygon);
        area
    }

    pub fn from_rect(rect: &Rect) -> Self {
        Self::from_polygon(rect.corners().to_vec())
    }

    /// Add a polygon; polygons with fewer than three vertices are ignored
    pub fn push(&mut self, polygon: Vec<Point>) {
        if polygon.len() >= 3 {
            self.polygons.push(polygon);
        }
    }

    /// Merge another area into this one
    pub fn add(&mut self, other: &Area) {
        self.polygons.extend(other.polygons.iter().cloned());
    }

    pub fn polygons(&self) -> &[Vec<Point>] {
        &self.polygons
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.polygons
            .iter()
            .filter_map(|polygon| Rect::bounding(polygon))
            .reduce(|acc, rect| acc.union(&rect))
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.polygons.iter().any(|polygon| polygon_contains_point(polygon, point))
    }

    pub fn transformed(&self, transform: &AffineTransform) -> Area {
        Area {
            polygons: self
                .polygons
                .iter()
                .map(|polygon| polygon.iter().map(|p| transform.apply(p)).collect())
                .collect(),
        }
    }

    /// Check whether the area and the rectangle share at least one point
    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        let corners = rect.corners();
        self.polygons.iter().any(|polygon| {
            if polygon.iter().any(|p| rect.contains(p)) {
                return true;
            }
            if corners.iter().any(|c| polygon_contains_point(polygon, c)) {
                return true;
            }
            polygon_edges(polygon).any(|(a, b)| {
                (0..4).any(|i| segments_intersect(a, b, &corners[i], &corners[(i + 1) % 4]))
            })
        })
    }

    /// Check whether the part of `rect` covered by this area is not entirely
    /// covered by `excluded`
    ///
    /// The window is cut into vertical slabs at every vertex and every edge
    /// crossing, so no edge starts, ends or crosses another inside a slab.
    /// Each cell between two consecutive edges of a slab is then uniformly
    /// inside or outside every polygon, and testing its centre is exact.
    pub fn intersects_rect_excluding(&self, rect: &Rect, excluded: &[Area]) -> bool {
        if excluded.is_empty() {
            return self.intersects_rect(rect);
        }
        let Some(window) = self.bounds().and_then(|bounds| bounds.intersection(rect)) else {
            return false;
        };

        let edges: Vec<(Point, Point)> = self
            .polygons
            .iter()
            .chain(excluded.iter().flat_map(|area| area.polygons.iter()))
            .filter(|polygon| Rect::bounding(polygon).is_some_and(|bounds| bounds.intersects(&window)))
            .flat_map(|polygon| polygon_edges(polygon).map(|(a, b)| (*a, *b)))
            .filter(|(a, b)| Rect::from_corners(*a, *b).intersects(&window))
            .collect();

        let mut stops = vec![window.min_x(), window.max_x()];
        for (i, (a, b)) in edges.iter().enumerate() {
            stops.extend([a.x, b.x]);
            for (c, d) in &edges[i + 1..] {
                if let Some(x) = crossing_x(a, b, c, d) {
                    stops.push(x);
                }
            }
        }
        let xs = cell_centres(stops, window.min_x(), window.max_x());

        let uncovered = |sample: &Point| {
            self.contains(sample) && !excluded.iter().any(|area| area.contains(sample))
        };
        xs.into_iter().any(|x| {
            let mut stops = vec![window.min_y(), window.max_y()];
            stops.extend(edges.iter().filter_map(|(a, b)| {
                let spans = (a.x < x && x < b.x) || (b.x < x && x < a.x);
                spans.then(|| a.y + (x - a.x) * (b.y - a.y) / (b.x - a.x))
            }));
            cell_centres(stops, window.min_y(), window.max_y())
                .into_iter()
                .any(|y| uncovered(&Point::new(x, y)))
        })
    }
}

/// Midpoints between consecutive distinct stops within `[min, max]`
///
/// A zero-length range yields its single coordinate.
fn cell_centres(mut stops: Vec<f64>, min: f64, max: f64) -> Vec<f64> {
    if max - min <= f64::EPSILON {
        return vec![min];
    }
    stops.retain(|value| value.is_finite() && *value >= min && *value <= max);
    stops.sort_by(f64::total_cmp);
    stops.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON);
    stops.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0).collect()
}

/// X coordinate where two segments cross at an interior point of both
fn crossing_x(a: &Point, b: &Point, c: &Point, d: &Point) -> Option<f64> {
    if !segments_cross(a, b, c, d) {
        return None;
    }
    let denominator = (b.x - a.x) * (d.y - c.y) - (b.y - a.y) * (d.x - c.x);
    if denominator == 0.0 {
        return None;
    }
    let t = ((c.x - a.x) * (d.y - c.y) - (c.y - a.y) * (d.x - c.x)) / denominator;
    Some(a.x + t * (b.x - a.x))
}

/// Iterate the closing edges of a polygon
pub fn polygon_edges(polygon: &[Point]) -> impl Iterator<Item = (&Point, &Point)> {
    let n = polygon.len();
    (0..n).map(move |i| (&polygon[i], &polygon[(i + 1) % n]))
}

/// Even-odd point-in-polygon test
pub fn polygon_contains_point(polygon: &[Point], point: &Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = &polygon[i];
        let pj = &polygon[j];
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn orientation(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Segment intersection, touching endpoints included
pub fn segments_intersect(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(c, d, a))
        || (d2 == 0.0 && on_segment(c, d, b))
        || (d3 == 0.0 && on_segment(a, b, c))
        || (d4 == 0.0 && on_segment(a, b, d))
}

/// Segments cross each other at an interior point of both
fn segments_cross(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Closed polygon-in-polygon test
///
/// `inner` is a vertex path; when `inner_closed` is set its closing edge is
/// checked too. Every vertex must lie inside `outer` and no edge of `inner`
/// may cross an edge of `outer`.
pub fn polygon_contains_path(outer: &[Point], inner: &[Point], inner_closed: bool) -> bool {
    if outer.len() < 3 || inner.is_empty() {
        return false;
    }
    if !inner.iter().all(|p| polygon_contains_point(outer, p)) {
        return false;
    }
    let edge_count = if inner_closed { inner.len() } else { inner.len().saturating_sub(1) };
    (0..edge_count).all(|i| {
        let a = &inner[i];
        let b = &inner[(i + 1) % inner.len()];
        polygon_edges(outer).all(|(c, d)| !segments_cross(a, b, c, d))
    })
}

/// Rectangle outline around a segment, `half_width` on each side
pub fn stroke_segment(a: &Point, b: &Point, half_width: f64) -> Vec<Point> {
    let length = a.distance_to(b);
    if length < 1e-9 {
        return Rect::new(a.x - half_width, a.y - half_width, 2.0 * half_width, 2.0 * half_width)
            .corners()
            .to_vec();
    }
    let nx = -(b.y - a.y) / length * half_width;
    let ny = (b.x - a.x) / length * half_width;
    let ex = (b.x - a.x) / length * half_width;
    let ey = (b.y - a.y) / length * half_width;
    vec![
        Point::new(a.x + nx - ex, a.y + ny - ey),
        Point::new(b.x + nx + ex, b.y + ny + ey),
        Point::new(b.x - nx + ex, b.y - ny + ey),
        Point::new(a.x - nx - ex, a.y - ny - ey),
    ]
}

/// Polygonal approximation of an ellipse
pub fn ellipse_polygon(center: Point, radius_x: f64, radius_y: f64, segments: usize) -> Vec<Point> {
    let segments = segments.max(8);
    (0..segments)
        .map(|i| {
            let t = 2.0 * std::f64::consts::PI * i as f64 / segments as f64;
            Point::new(center.x + radius_x * t.cos(), center.y + radius_y * t.sin())
        })
        .collect()
}

/// Circle through three points, `None` when they are collinear
pub fn circle_through(a: &Point, b: &Point, c: &Point) -> Option<(Point, f64)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-9 {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Point::new(ux, uy);
    Some((center, center.distance_to(a)))
}
