//! Measurement values for graphic labels
//!
//! Values are computed from the shape points in pixel space and converted
//! with a [`Calibration`]. Angles need no conversion.

use serde::{Deserialize, Serialize};

use crate::geometry::{circle_through, Point};
use crate::graphic::Shape;

/// Pixel spacing and unit used to convert pixel measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub spacing_x: f64,
    pub spacing_y: f64,
    pub unit: String,
}

impl Calibration {
    pub fn new(spacing_x: f64, spacing_y: f64, unit: impl Into<String>) -> Self {
        Self { spacing_x, spacing_y, unit: unit.into() }
    }

    /// Uncalibrated pixel measurements
    pub fn pixel() -> Self {
        Self::new(1.0, 1.0, "pix")
    }

    fn distance(&self, a: &Point, b: &Point) -> f64 {
        let dx = (a.x - b.x) * self.spacing_x;
        let dy = (a.y - b.y) * self.spacing_y;
        (dx * dx + dy * dy).sqrt()
    }

    fn area_unit(&self) -> String {
        format!("{}2", self.unit)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::pixel()
    }
}

/// A single computed measurement
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureItem {
    pub name: &'static str,
    pub value: f64,
    pub unit: String,
}

impl MeasureItem {
    fn new(name: &'static str, value: f64, unit: impl Into<String>) -> Self {
        Self { name, value, unit: unit.into() }
    }

    /// Label line, e.g. `Length: 12.34 cm`
    pub fn label(&self) -> String {
        format!("{}: {:.2} {}", self.name, self.value, self.unit)
    }
}

/// Compute the measurements shown for a shape
///
/// Returns nothing while the shape does not have enough points.
pub fn measure(shape: Shape, points: &[Point], calibration: &Calibration) -> Vec<MeasureItem> {
    let unit = calibration.unit.as_str();
    match shape {
        Shape::Point => points
            .first()
            .map(|p| {
                vec![
                    MeasureItem::new("X", p.x * calibration.spacing_x, unit),
                    MeasureItem::new("Y", p.y * calibration.spacing_y, unit),
                ]
            })
            .unwrap_or_default(),
        Shape::Line | Shape::LineWithGap | Shape::PerpendicularLine | Shape::ParallelLine => {
            match points {
                [a, b, ..] => vec![MeasureItem::new("Length", calibration.distance(a, b), unit)],
                _ => Vec::new(),
            }
        }
        Shape::Polyline => {
            if points.len() < 2 {
                return Vec::new();
            }
            vec![MeasureItem::new("Length", path_length(points, calibration, false), unit)]
        }
        Shape::Polygon | Shape::Rectangle => {
            if points.len() < 3 {
                return Vec::new();
            }
            vec![
                MeasureItem::new("Area", polygon_area(points, calibration), calibration.area_unit()),
                MeasureItem::new("Perimeter", path_length(points, calibration, true), unit),
            ]
        }
        Shape::Ellipse => match points {
            [a, b, ..] => {
                let radius_x = (a.x - b.x).abs() / 2.0 * calibration.spacing_x;
                let radius_y = (a.y - b.y).abs() / 2.0 * calibration.spacing_y;
                vec![MeasureItem::new(
                    "Area",
                    std::f64::consts::PI * radius_x * radius_y,
                    calibration.area_unit(),
                )]
            }
            _ => Vec::new(),
        },
        Shape::ThreePointsCircle => match points {
            [a, b, c, ..] => match circle_through(a, b, c) {
                Some((_, radius)) => {
                    let radius_x = radius * calibration.spacing_x;
                    let radius_y = radius * calibration.spacing_y;
                    vec![
                        MeasureItem::new("Diameter", radius_x + radius_y, unit),
                        MeasureItem::new(
                            "Area",
                            std::f64::consts::PI * radius_x * radius_y,
                            calibration.area_unit(),
                        ),
                    ]
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        },
        Shape::Angle => match points {
            // Vertex is the middle point
            [a, vertex, c, ..] => {
                vec![MeasureItem::new("Angle", angle_between(vertex, a, vertex, c, calibration), "deg")]
            }
            _ => Vec::new(),
        },
        Shape::OpenAngle | Shape::CobbAngle | Shape::FourPointsAngle => match points {
            [a, b, c, d, ..] => {
                let angle = angle_between(a, b, c, d, calibration);
                // Lines have no direction, report the acute angle
                let acute = if angle > 90.0 { 180.0 - angle } else { angle };
                vec![MeasureItem::new("Angle", acute, "deg")]
            }
            _ => Vec::new(),
        },
        Shape::Annotation | Shape::PixelInfo | Shape::SelectRectangle => Vec::new(),
    }
}

fn path_length(points: &[Point], calibration: &Calibration, closed: bool) -> f64 {
    let open: f64 = points.windows(2).map(|w| calibration.distance(&w[0], &w[1])).sum();
    match (closed, points.first(), points.last()) {
        (true, Some(first), Some(last)) if points.len() > 2 => {
            open + calibration.distance(last, first)
        }
        _ => open,
    }
}

/// Shoelace formula
fn polygon_area(points: &[Point], calibration: &Calibration) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    (area / 2.0).abs() * calibration.spacing_x * calibration.spacing_y
}

/// Angle in degrees between vector `a -> b` and vector `c -> d`
fn angle_between(a: &Point, b: &Point, c: &Point, d: &Point, calibration: &Calibration) -> f64 {
    let (ux, uy) = ((b.x - a.x) * calibration.spacing_x, (b.y - a.y) * calibration.spacing_y);
    let (vx, vy) = ((d.x - c.x) * calibration.spacing_x, (d.y - c.y) * calibration.spacing_y);
    let norm = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    ((ux * vx + uy * vy) / norm).clamp(-1.0, 1.0).acos().to_degrees()
}
