//! Graphic layers
//!
//! A layer groups graphics of one [`LayerType`] and carries the flags shared by
//! all of them. The layer with no name is the default layer for its type.

use serde::{Deserialize, Serialize};

use crate::arena::Handle;

/// Unique identifier for a layer, stable in saved documents
pub type LayerId = uuid::Uuid;

/// Handle of a layer registered in a graphic model
pub type LayerHandle = Handle<GraphicLayer>;

/// Kind of content a layer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerType {
    /// Transient graphics (selection rectangle, pixel probes)
    Temp,
    ImageAnnotation,
    Annotation,
    Draw,
    /// Measurement graphics; the only layer type taking part in region replication
    Measure,
    Points,
    DicomSr,
    DicomPr,
    Acquire,
}

impl LayerType {
    /// Default paint level (higher is painted later)
    pub fn default_level(self) -> i32 {
        match self {
            LayerType::Temp => 90,
            LayerType::ImageAnnotation => 10,
            LayerType::Annotation => 40,
            LayerType::Draw => 50,
            LayerType::Measure => 60,
            LayerType::Points => 65,
            LayerType::DicomSr => 70,
            LayerType::DicomPr => 75,
            LayerType::Acquire => 80,
        }
    }

    /// Whether graphics of this type are written to saved documents by default
    pub fn default_serializable(self) -> bool {
        !matches!(self, LayerType::Temp | LayerType::ImageAnnotation)
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerType::Temp => "Temporary",
            LayerType::ImageAnnotation => "Image Annotations",
            LayerType::Annotation => "Annotations",
            LayerType::Draw => "Drawings",
            LayerType::Measure => "Measurements",
            LayerType::Points => "Points",
            LayerType::DicomSr => "DICOM SR",
            LayerType::DicomPr => "DICOM PR",
            LayerType::Acquire => "Acquisition",
        }
    }
}

/// Layer grouping graphics of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicLayer {
    id: LayerId,
    layer_type: LayerType,
    /// `None` marks the default layer of its type
    name: Option<String>,
    visible: bool,
    selectable: bool,
    serializable: bool,
    locked: bool,
    level: i32,
}

impl GraphicLayer {
    /// Create the default (unnamed) layer for a type
    pub fn new(layer_type: LayerType) -> Self {
        Self {
            id: LayerId::new_v4(),
            layer_type,
            name: None,
            visible: true,
            selectable: true,
            serializable: layer_type.default_serializable(),
            locked: false,
            level: layer_type.default_level(),
        }
    }

    /// Create a named layer
    pub fn named(layer_type: LayerType, name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::new(layer_type) }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Label shown to the user
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.layer_type.name())
    }

    /// Default layers have no name
    pub fn is_default(&self) -> bool {
        self.name.is_none()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    pub fn set_selectable(&mut self, selectable: bool) {
        self.selectable = selectable;
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    pub fn set_serializable(&mut self, serializable: bool) {
        self.serializable = serializable;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn set_level(&mut self, level: i32) {
        self.level = level;
    }
}
