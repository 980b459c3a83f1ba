//! Graphic data model
//!
//! A graphic is a user-drawn shape: an ordered point list plus style, label and
//! selection state. Shapes form a closed set ([`Shape`]); the ones that act as
//! draggable measurements carry a [`DragState`], which is the capability the
//! region replication engine works with.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::{
    circle_through, ellipse_polygon, polygon_contains_path, stroke_segment, AffineTransform, Area,
    Point, Rect,
};
use crate::layer::{LayerHandle, LayerType};
use crate::measure::{measure, Calibration};

/// Unique identifier for a graphic
///
/// Assigned at creation, stable in saved documents.
pub type GraphicId = uuid::Uuid;

/// Handle size in device pixels
pub const HANDLE_SIZE: f64 = 6.0;

/// Minimum half-width of the hit area around open paths, in device pixels
pub const HIT_TOLERANCE: f64 = 3.0;

const LABEL_CHAR_WIDTH: f64 = 7.0;
const LABEL_LINE_HEIGHT: f64 = 14.0;
const LABEL_PADDING: f64 = 3.0;
const CURVE_SEGMENTS: usize = 48;

/// Identifier shared by a graphic and all of its cross-region replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionGroupId(uuid::Uuid);

impl RegionGroupId {
    /// Generate a new random group identifier
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for RegionGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    Point,
    Line,
    LineWithGap,
    PerpendicularLine,
    ParallelLine,
    Polyline,
    Polygon,
    /// Oblique rectangle defined by its four corners
    Rectangle,
    /// Ellipse inscribed in the box spanned by two points
    Ellipse,
    ThreePointsCircle,
    /// Angle with the vertex as the middle point
    Angle,
    OpenAngle,
    CobbAngle,
    FourPointsAngle,
    /// Text annotation anchored on the first point
    Annotation,
    PixelInfo,
    SelectRectangle,
}

impl Shape {
    pub fn name(self) -> &'static str {
        match self {
            Shape::Point => "point",
            Shape::Line => "line",
            Shape::LineWithGap => "lineWithGap",
            Shape::PerpendicularLine => "perpendicularLine",
            Shape::ParallelLine => "parallelLine",
            Shape::Polyline => "polyline",
            Shape::Polygon => "polygon",
            Shape::Rectangle => "rectangle",
            Shape::Ellipse => "ellipse",
            Shape::ThreePointsCircle => "threePointsCircle",
            Shape::Angle => "angle",
            Shape::OpenAngle => "openAngle",
            Shape::CobbAngle => "cobbAngle",
            Shape::FourPointsAngle => "fourPointsAngle",
            Shape::Annotation => "annotation",
            Shape::PixelInfo => "pixelInfo",
            Shape::SelectRectangle => "selectRectangle",
        }
    }

    /// Shapes enclosing an area
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            Shape::Polygon
                | Shape::Rectangle
                | Shape::Ellipse
                | Shape::ThreePointsCircle
                | Shape::SelectRectangle
        )
    }

    /// Shapes carrying the draggable-measurement capability
    pub fn is_draggable_measurement(self) -> bool {
        !matches!(self, Shape::Annotation | Shape::PixelInfo | Shape::SelectRectangle)
    }

    pub fn default_layer_type(self) -> LayerType {
        match self {
            Shape::Annotation => LayerType::Annotation,
            Shape::PixelInfo | Shape::SelectRectangle => LayerType::Temp,
            _ => LayerType::Measure,
        }
    }

    /// Shapes made of independent point pairs rather than a connected path
    fn is_segment_pairs(self) -> bool {
        matches!(
            self,
            Shape::PerpendicularLine
                | Shape::ParallelLine
                | Shape::OpenAngle
                | Shape::CobbAngle
                | Shape::FourPointsAngle
        )
    }
}

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |i: usize| {
            digits.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok())
        };
        match digits.len() {
            6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Color::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Common graphic colors
impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
}

/// Visual attributes of a graphic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicStyle {
    pub paint: Color,
    pub filled: bool,
    /// Stroke width in device pixels
    pub line_thickness: f32,
}

impl Default for GraphicStyle {
    fn default() -> Self {
        Self { paint: Color::YELLOW, filled: false, line_thickness: 1.0 }
    }
}

/// Text label attached to a graphic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicLabel {
    pub lines: Vec<String>,
    /// Image-space anchor of the top-left corner of the label box
    pub anchor: Point,
}

impl GraphicLabel {
    pub fn new(lines: Vec<String>, anchor: Point) -> Self {
        Self { lines, anchor }
    }

    /// Label box in device space
    pub fn bounds(&self, transform: &AffineTransform) -> Option<Rect> {
        if self.lines.is_empty() {
            return None;
        }
        let origin = transform.apply(&self.anchor);
        let widest = self.lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
        Some(Rect::new(
            origin.x + HANDLE_SIZE,
            origin.y,
            widest as f64 * LABEL_CHAR_WIDTH + 2.0 * LABEL_PADDING,
            self.lines.len() as f64 * LABEL_LINE_HEIGHT + 2.0 * LABEL_PADDING,
        ))
    }
}

/// Draggable-measurement capability
///
/// `handled_for_regions` and `resizing_or_moving` are transient and never saved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragState {
    #[serde(default)]
    complete: bool,
    #[serde(skip)]
    resizing_or_moving: bool,
    #[serde(skip)]
    handled_for_regions: bool,
    #[serde(default)]
    region_group: Option<RegionGroupId>,
    #[serde(default)]
    points_file: Option<PathBuf>,
}

impl DragState {
    /// Drawing finished
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    pub fn is_resizing_or_moving(&self) -> bool {
        self.resizing_or_moving
    }

    pub fn set_resizing_or_moving(&mut self, resizing_or_moving: bool) {
        self.resizing_or_moving = resizing_or_moving;
    }

    pub fn is_handled_for_regions(&self) -> bool {
        self.handled_for_regions
    }

    pub fn set_handled_for_regions(&mut self, handled: bool) {
        self.handled_for_regions = handled;
    }

    pub fn region_group(&self) -> Option<RegionGroupId> {
        self.region_group
    }

    pub fn set_region_group(&mut self, group: Option<RegionGroupId>) {
        self.region_group = group;
    }

    /// Location of the persisted point log, when one was written
    pub fn points_file(&self) -> Option<&Path> {
        self.points_file.as_deref()
    }

    pub fn set_points_file(&mut self, path: Option<PathBuf>) {
        self.points_file = path;
    }
}

fn default_true() -> bool {
    true
}

/// A single annotation or measurement shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graphic {
    id: GraphicId,
    shape: Shape,
    #[serde(default)]
    points: Vec<Point>,
    layer_type: LayerType,
    #[serde(default)]
    style: GraphicStyle,
    #[serde(default)]
    label: Option<GraphicLabel>,
    #[serde(default = "default_true")]
    label_visible: bool,
    #[serde(skip)]
    selected: bool,
    #[serde(default)]
    drag: Option<DragState>,
    /// Owning layer, set by the model on insertion
    #[serde(skip)]
    layer: Option<LayerHandle>,
}

impl Graphic {
    /// Create a new graphic with generated ID and the shape's default layer type
    pub fn new(shape: Shape, points: Vec<Point>) -> Self {
        Self {
            id: GraphicId::new_v4(),
            shape,
            points,
            layer_type: shape.default_layer_type(),
            style: GraphicStyle::default(),
            label: None,
            label_visible: true,
            selected: false,
            drag: shape.is_draggable_measurement().then(DragState::default),
            layer: None,
        }
    }

    /// Create a draggable measurement whose drawing is already finished
    pub fn completed(shape: Shape, points: Vec<Point>) -> Self {
        let mut graphic = Self::new(shape, points);
        if let Some(drag) = graphic.drag_mut() {
            drag.set_complete(true);
        }
        graphic
    }

    pub fn with_style(mut self, style: GraphicStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_layer_type(mut self, layer_type: LayerType) -> Self {
        self.layer_type = layer_type;
        self
    }

    pub fn with_label(mut self, lines: Vec<String>) -> Self {
        let anchor = self.default_label_anchor();
        self.label = Some(GraphicLabel::new(lines, anchor));
        self
    }

    pub fn id(&self) -> GraphicId {
        self.id
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
    }

    /// Move every point by the given offsets
    pub fn translate(&mut self, dx: f64, dy: f64) {
        for point in &mut self.points {
            *point = point.translated(dx, dy);
        }
        if let Some(label) = &mut self.label {
            label.anchor = label.anchor.translated(dx, dy);
        }
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    /// Layer the graphic belongs to while it is in a model
    pub fn layer(&self) -> Option<LayerHandle> {
        self.layer
    }

    pub(crate) fn set_layer(&mut self, layer: Option<LayerHandle>) {
        self.layer = layer;
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn style(&self) -> &GraphicStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: GraphicStyle) {
        self.style = style;
    }

    pub fn set_paint(&mut self, paint: Color) {
        self.style.paint = paint;
    }

    pub fn set_filled(&mut self, filled: bool) {
        self.style.filled = filled;
    }

    pub fn set_line_thickness(&mut self, thickness: f32) {
        self.style.line_thickness = thickness;
    }

    pub fn label(&self) -> Option<&GraphicLabel> {
        self.label.as_ref()
    }

    pub fn set_label(&mut self, label: Option<GraphicLabel>) {
        self.label = label;
    }

    pub fn is_label_visible(&self) -> bool {
        self.label_visible
    }

    pub fn set_label_visible(&mut self, visible: bool) {
        self.label_visible = visible;
    }

    /// Draggable-measurement capability, if this shape has it
    pub fn drag(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn drag_mut(&mut self) -> Option<&mut DragState> {
        self.drag.as_mut()
    }

    pub fn is_drag_measurement(&self) -> bool {
        self.drag.is_some()
    }

    pub fn region_group(&self) -> Option<RegionGroupId> {
        self.drag.as_ref().and_then(DragState::region_group)
    }

    /// Make the capability match the shape after deserialization
    pub(crate) fn normalize_capability(&mut self) {
        match (self.shape.is_draggable_measurement(), self.drag.is_some()) {
            (true, false) => self.drag = Some(DragState::default()),
            (false, true) => self.drag = None,
            _ => {}
        }
    }

    /// Copy with a fresh identifier
    ///
    /// Selection, layer membership, region group and point log are not carried over.
    pub fn copy(&self) -> Graphic {
        let mut copy = self.clone();
        copy.id = GraphicId::new_v4();
        copy.selected = false;
        copy.layer = None;
        if let Some(drag) = &mut copy.drag {
            *drag = DragState { complete: drag.complete, ..DragState::default() };
        }
        copy
    }

    /// Exact point-set equality
    pub fn same_points(&self, other: &Graphic) -> bool {
        self.points == other.points
    }

    /// Shape outline in image space
    ///
    /// Curved shapes are flattened to polygons.
    pub fn outline(&self) -> Vec<Point> {
        match (self.shape, self.points.as_slice()) {
            (Shape::Ellipse, [a, b, ..]) => {
                let bounds = Rect::from_corners(*a, *b);
                ellipse_polygon(
                    bounds.center(),
                    bounds.width / 2.0,
                    bounds.height / 2.0,
                    CURVE_SEGMENTS,
                )
            }
            (Shape::ThreePointsCircle, [a, b, c, ..]) => match circle_through(a, b, c) {
                Some((center, radius)) => ellipse_polygon(center, radius, radius, CURVE_SEGMENTS),
                None => self.points.clone(),
            },
            (Shape::SelectRectangle, [a, b, ..]) => Rect::from_corners(*a, *b).corners().to_vec(),
            _ => self.points.clone(),
        }
    }

    /// Bounds in image space
    pub fn bounds(&self) -> Option<Rect> {
        Rect::bounding(&self.outline())
    }

    /// Bounds in image space, grown to cover handles and stroke at the given zoom
    pub fn repaint_bounds(&self, transform: &AffineTransform) -> Option<Rect> {
        let margin = (HANDLE_SIZE + self.style.line_thickness as f64) / transform.scale_factor();
        self.bounds().map(|bounds| bounds.grown(margin))
    }

    /// Precise hit area in device space
    pub fn area(&self, transform: &AffineTransform) -> Area {
        let outline: Vec<Point> = self.outline().iter().map(|p| transform.apply(p)).collect();
        let half_width = (self.style.line_thickness as f64 / 2.0).max(HIT_TOLERANCE);

        if self.shape.is_closed() && outline.len() >= 3 {
            return Area::from_polygon(outline);
        }

        let mut area = Area::new();
        match outline.as_slice() {
            [] => {}
            [single] => area.push(stroke_segment(single, single, half_width)),
            _ if self.shape.is_segment_pairs() => {
                for pair in outline.chunks(2) {
                    let end = pair.get(1).unwrap_or(&pair[0]);
                    area.push(stroke_segment(&pair[0], end, half_width));
                }
            }
            [a, b, ..] if matches!(self.shape, Shape::Line | Shape::LineWithGap) => {
                area.push(stroke_segment(a, b, half_width));
            }
            _ => {
                for window in outline.windows(2) {
                    area.push(stroke_segment(&window[0], &window[1], half_width));
                }
            }
        }
        area
    }

    /// Index of the handle under a device-space point
    pub fn handle_at(&self, device_point: &Point, transform: &AffineTransform) -> Option<usize> {
        self.points
            .iter()
            .position(|p| transform.apply(p).distance_to(device_point) <= HANDLE_SIZE / 2.0 + 1.0)
    }

    /// Whether the label takes part in hit-testing and painting
    pub fn has_visible_label(&self) -> bool {
        self.label_visible && self.label.as_ref().is_some_and(|label| !label.lines.is_empty())
    }

    /// Label area in device space
    pub fn label_area(&self, transform: &AffineTransform) -> Option<Area> {
        if !self.has_visible_label() {
            return None;
        }
        self.label
            .as_ref()
            .and_then(|label| label.bounds(transform))
            .map(|bounds| Area::from_rect(&bounds))
    }

    /// Closed polygon-in-polygon containment of another graphic's shape
    pub fn contains_graphic(&self, other: &Graphic) -> bool {
        if !self.shape.is_closed() {
            return false;
        }
        polygon_contains_path(&self.outline(), &other.outline(), other.shape.is_closed())
    }

    /// Recompute the measurement label against a calibration
    pub fn rebuild_shape(&mut self, calibration: &Calibration) {
        if !self.is_drag_measurement() {
            return;
        }
        let lines: Vec<String> =
            measure(self.shape, &self.points, calibration).iter().map(|item| item.label()).collect();
        if lines.is_empty() {
            return;
        }
        let anchor = self.default_label_anchor();
        self.label = Some(GraphicLabel::new(lines, anchor));
    }

    fn default_label_anchor(&self) -> Point {
        self.bounds().map(|b| Point::new(b.max_x(), b.min_y())).unwrap_or_default()
    }
}

impl fmt::Display for Graphic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.shape.name(), self.id)
    }
}
