//! Regionmark Core Library
//!
//! Graphic-annotation model for medical image viewers: measurement and
//! annotation shapes organized in layers, spatial hit-testing, selection, and
//! replication of measurements across the regions of multi-region ultrasound
//! frames.

pub mod arena;
pub mod document;
pub mod geometry;
pub mod graphic;
pub mod layer;
pub mod listener;
pub mod measure;
pub mod model;
pub mod query;
pub mod region;
pub mod render;
pub mod replication;

pub use arena::{Arena, Handle};
pub use document::{
    DocumentError, DocumentGraphic, DocumentResult, GraphicDocument, ReferencedImage,
    ReferencedSeries,
};
pub use geometry::{AffineTransform, Area, Point, Rect};
pub use graphic::{
    Color, DragState, Graphic, GraphicId, GraphicLabel, GraphicStyle, RegionGroupId, Shape,
};
pub use layer::{GraphicLayer, LayerHandle, LayerId, LayerType};
pub use listener::{
    GraphicChangeListener, GraphicModelChangeListener, GraphicProperty, GraphicSelectionListener,
    MeasurableLayer, PropertyChange,
};
pub use measure::{measure, Calibration, MeasureItem};
pub use model::{GraphicHandle, GraphicModel, ModelContext, ModelError, ModelResult};
pub use region::{
    find_containing_region, transform_points, FrameRegions, InstanceIdentity, RegionSource,
    RegionUnit, UltrasoundRegion,
};
pub use render::GraphicPainter;
pub use replication::{
    NullPointLog, PointLog, PointLogError, PointLogKey, PointRecord, RegionReplicator,
    ReplicationReport, CONTAINED_COLOR, CONTAINER_COLOR,
};
