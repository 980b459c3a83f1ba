//! Ultrasound regions and region-to-region coordinate mapping
//!
//! A multi-region ultrasound frame is split into rectangular sub-images, each
//! with its own physical scale. Regions are read-only input supplied by the
//! image source for the frame being drawn.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};
use crate::measure::Calibration;

/// Physical unit of a region axis (DICOM Physical Units X/Y Direction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionUnit {
    None,
    Percent,
    Decibel,
    Centimeter,
    Seconds,
    Hertz,
    DecibelPerSecond,
    CentimeterPerSecond,
    SquareCentimeter,
    SquareCentimeterPerSecond,
    CubicCentimeter,
    CubicCentimeterPerSecond,
    Degree,
}

impl RegionUnit {
    /// Decode the DICOM code value
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0 => RegionUnit::None,
            0x1 => RegionUnit::Percent,
            0x2 => RegionUnit::Decibel,
            0x3 => RegionUnit::Centimeter,
            0x4 => RegionUnit::Seconds,
            0x5 => RegionUnit::Hertz,
            0x6 => RegionUnit::DecibelPerSecond,
            0x7 => RegionUnit::CentimeterPerSecond,
            0x8 => RegionUnit::SquareCentimeter,
            0x9 => RegionUnit::SquareCentimeterPerSecond,
            0xA => RegionUnit::CubicCentimeter,
            0xB => RegionUnit::CubicCentimeterPerSecond,
            0xC => RegionUnit::Degree,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        match self {
            RegionUnit::None => 0x0,
            RegionUnit::Percent => 0x1,
            RegionUnit::Decibel => 0x2,
            RegionUnit::Centimeter => 0x3,
            RegionUnit::Seconds => 0x4,
            RegionUnit::Hertz => 0x5,
            RegionUnit::DecibelPerSecond => 0x6,
            RegionUnit::CentimeterPerSecond => 0x7,
            RegionUnit::SquareCentimeter => 0x8,
            RegionUnit::SquareCentimeterPerSecond => 0x9,
            RegionUnit::CubicCentimeter => 0xA,
            RegionUnit::CubicCentimeterPerSecond => 0xB,
            RegionUnit::Degree => 0xC,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RegionUnit::None => "pix",
            RegionUnit::Percent => "%",
            RegionUnit::Decibel => "dB",
            RegionUnit::Centimeter => "cm",
            RegionUnit::Seconds => "s",
            RegionUnit::Hertz => "Hz",
            RegionUnit::DecibelPerSecond => "dB/s",
            RegionUnit::CentimeterPerSecond => "cm/s",
            RegionUnit::SquareCentimeter => "cm2",
            RegionUnit::SquareCentimeterPerSecond => "cm2/s",
            RegionUnit::CubicCentimeter => "cm3",
            RegionUnit::CubicCentimeterPerSecond => "cm3/s",
            RegionUnit::Degree => "deg",
        }
    }
}

/// Rectangular sub-area of a frame with its own pixel-to-physical scale
///
/// Bounds are inclusive pixel coordinates (`x0..=x1`, `y0..=y1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UltrasoundRegion {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
    /// Physical distance per pixel along x
    pub physical_delta_x: f64,
    /// Physical distance per pixel along y
    pub physical_delta_y: f64,
    pub units: RegionUnit,
}

impl UltrasoundRegion {
    /// Region with a 1:1 centimetre scale
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            physical_delta_x: 1.0,
            physical_delta_y: 1.0,
            units: RegionUnit::Centimeter,
        }
    }

    pub fn with_scale(mut self, delta_x: f64, delta_y: f64) -> Self {
        self.physical_delta_x = delta_x;
        self.physical_delta_y = delta_y;
        self
    }

    pub fn with_units(mut self, units: RegionUnit) -> Self {
        self.units = units;
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x0 as f64,
            self.y0 as f64,
            (self.x1 - self.x0) as f64,
            (self.y1 - self.y0) as f64,
        )
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x0 as f64
            && point.x <= self.x1 as f64
            && point.y >= self.y0 as f64
            && point.y <= self.y1 as f64
    }

    /// Every point lies inside the region; an empty point set lies nowhere
    pub fn contains_all(&self, points: &[Point]) -> bool {
        !points.is_empty() && points.iter().all(|p| self.contains(p))
    }

    /// Calibration used to label measurements drawn in this region
    pub fn calibration(&self) -> Calibration {
        Calibration::new(
            usable_scale(self.physical_delta_x),
            usable_scale(self.physical_delta_y),
            self.units.symbol(),
        )
    }
}

/// Zero or non-finite scales map 1:1
fn usable_scale(delta: f64) -> f64 {
    if delta.is_finite() && delta != 0.0 {
        delta
    } else {
        1.0
    }
}

/// Index of the first region containing every point
pub fn find_containing_region(regions: &[UltrasoundRegion], points: &[Point]) -> Option<usize> {
    regions.iter().position(|region| region.contains_all(points))
}

/// Map points from `source` region pixel space into `dest` region pixel space
///
/// The physical offset from the region origin is preserved, so a point keeps
/// its real-world position when the two regions differ in pixel density.
pub fn transform_points(
    source: &UltrasoundRegion,
    dest: &UltrasoundRegion,
    points: &[Point],
) -> Vec<Point> {
    let ratio_x = usable_scale(source.physical_delta_x) / usable_scale(dest.physical_delta_x);
    let ratio_y = usable_scale(source.physical_delta_y) / usable_scale(dest.physical_delta_y);
    points
        .iter()
        .map(|p| {
            Point::new(
                dest.x0 as f64 + (p.x - source.x0 as f64) * ratio_x,
                dest.y0 as f64 + (p.y - source.y0 as f64) * ratio_y,
            )
        })
        .collect()
}

/// DICOM identity of the displayed image
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    pub study_uid: String,
    pub series_uid: String,
    pub instance_uid: String,
}

/// Image collaborator supplying the regions of the displayed frame
pub trait RegionSource {
    /// Regions of the current frame in acquisition order, empty for single-region images
    fn regions(&self) -> Vec<UltrasoundRegion>;

    fn identity(&self) -> InstanceIdentity;

    /// Zero-based frame index
    fn frame_index(&self) -> usize;
}

/// Fixed region set, as decoded from a frame's metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRegions {
    #[serde(default)]
    pub identity: InstanceIdentity,
    #[serde(default)]
    pub frame_index: usize,
    #[serde(default)]
    pub regions: Vec<UltrasoundRegion>,
}

impl FrameRegions {
    pub fn new(regions: Vec<UltrasoundRegion>) -> Self {
        Self { regions, ..Self::default() }
    }
}

impl RegionSource for FrameRegions {
    fn regions(&self) -> Vec<UltrasoundRegion> {
        self.regions.clone()
    }

    fn identity(&self) -> InstanceIdentity {
        self.identity.clone()
    }

    fn frame_index(&self) -> usize {
        self.frame_index
    }
}
