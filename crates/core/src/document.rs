//! Serializable document view of a graphic model
//!
//! The document lists the referenced series, the layers and the graphics in
//! z-order, each graphic tagged with the id of its layer. Only graphics on
//! serializable layers are saved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graphic::Graphic;
use crate::layer::{GraphicLayer, LayerId};
use crate::model::{GraphicModel, ModelContext};

/// Errors that can occur while reading or writing documents
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("graphic {graphic} references unknown layer {layer}")]
    MissingLayer { graphic: String, layer: LayerId },
}

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Image of a referenced series and the frames annotated on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedImage {
    pub uid: String,
    /// One-based frame numbers, empty for single-frame images
    #[serde(default)]
    pub frames: Vec<usize>,
}

/// Source image series the annotations apply to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedSeries {
    pub uid: String,
    #[serde(default)]
    pub images: Vec<ReferencedImage>,
}

/// A saved graphic and the layer it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentGraphic {
    /// Layer id; `None` selects the default layer of the graphic's type
    #[serde(default)]
    pub layer: Option<LayerId>,
    pub graphic: Graphic,
}

/// Saved form of a graphic model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicDocument {
    #[serde(default)]
    pub referenced_series: Vec<ReferencedSeries>,
    #[serde(default)]
    pub layers: Vec<GraphicLayer>,
    #[serde(default)]
    pub graphics: Vec<DocumentGraphic>,
}

impl GraphicDocument {
    pub fn from_json(json: &str) -> DocumentResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl GraphicModel {
    /// Build a model from a saved document
    pub fn from_document(document: GraphicDocument, context: ModelContext) -> DocumentResult<Self> {
        let model = GraphicModel::new(context);
        model.load_document(document)?;
        Ok(model)
    }

    /// Append the graphics of a saved document
    ///
    /// Measurements identical to one already present are skipped. Returns the
    /// number of graphics added.
    pub fn load_document(&self, document: GraphicDocument) -> DocumentResult<usize> {
        for entry in &document.graphics {
            if let Some(layer) = entry.layer {
                if !document.layers.iter().any(|known| known.id() == layer) {
                    return Err(DocumentError::MissingLayer {
                        graphic: entry.graphic.to_string(),
                        layer,
                    });
                }
            }
        }

        let mut added = 0;
        for entry in document.graphics {
            let mut graphic = entry.graphic;
            graphic.normalize_capability();
            let layer = entry
                .layer
                .and_then(|id| document.layers.iter().find(|known| known.id() == id))
                .cloned();
            if self.add_annotation(graphic, layer).is_some() {
                added += 1;
            }
        }

        if !document.referenced_series.is_empty() {
            let mut state = self.state.write();
            for series in document.referenced_series {
                if !state.referenced_series.contains(&series) {
                    state.referenced_series.push(series);
                }
            }
        }
        Ok(added)
    }

    /// Saved form of the graphics on serializable layers
    pub fn to_document(&self) -> GraphicDocument {
        let state = self.state.read();
        let mut document = GraphicDocument {
            referenced_series: state.referenced_series.clone(),
            ..GraphicDocument::default()
        };
        for (_, graphic) in state.iter_graphics() {
            let Some(layer) = state.layer_of(graphic).filter(|layer| layer.is_serializable()) else {
                continue;
            };
            if !document.layers.iter().any(|known| known.id() == layer.id()) {
                document.layers.push(layer.clone());
            }
            document.graphics.push(DocumentGraphic { layer: Some(layer.id()), graphic: graphic.clone() });
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::graphic::{RegionGroupId, Shape};
    use crate::layer::LayerType;
    use std::path::PathBuf;

    fn sample_model() -> GraphicModel {
        let model = GraphicModel::default();
        let mut line = Graphic::completed(Shape::Line, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let drag = line.drag_mut().unwrap();
        drag.set_region_group(Some(RegionGroupId::random()));
        drag.set_points_file(Some(PathBuf::from("/tmp/points.txt")));
        drag.set_handled_for_regions(true);
        model.add_graphic(line);
        model.add_graphic_to(
            Graphic::new(Shape::Annotation, vec![Point::new(5.0, 5.0)]).with_label(vec!["Note".into()]),
            GraphicLayer::named(LayerType::Annotation, "Notes"),
        );
        model.add_graphic(Graphic::new(Shape::SelectRectangle, vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]));
        model.set_referenced_series(vec![ReferencedSeries {
            uid: "1.2.3".into(),
            images: vec![ReferencedImage { uid: "1.2.3.4".into(), frames: vec![1] }],
        }]);
        model
    }

    #[test]
    fn test_document_skips_non_serializable_layers() {
        let document = sample_model().to_document();
        assert_eq!(document.graphics.len(), 2);
        assert_eq!(document.layers.len(), 2);
        assert_eq!(document.referenced_series.len(), 1);
    }

    #[test]
    fn test_document_round_trip_through_json() {
        let original = sample_model();
        let json = original.to_document().to_json().unwrap();
        let loaded = GraphicModel::from_document(GraphicDocument::from_json(&json).unwrap(), ModelContext::default())
            .unwrap();

        assert_eq!(loaded.graphic_count(), 2);
        assert_eq!(loaded.layer_count(), 2);
        assert_eq!(loaded.referenced_series(), original.referenced_series());

        let line = loaded
            .all_graphics()
            .into_iter()
            .find(|graphic| graphic.shape() == Shape::Line)
            .unwrap();
        let drag = line.drag().unwrap();
        assert!(drag.is_complete());
        assert!(drag.region_group().is_some());
        assert_eq!(drag.points_file(), Some(PathBuf::from("/tmp/points.txt").as_path()));
        // Transient state starts fresh
        assert!(!drag.is_handled_for_regions());

        let named = loaded.layers().into_iter().find(|(_, layer)| !layer.is_default()).unwrap().1;
        assert_eq!(named.name(), Some("Notes"));
    }

    #[test]
    fn test_reload_does_not_duplicate_measurements() {
        let model = sample_model();
        let mut document = model.to_document();
        // Same points, new identity
        for entry in &mut document.graphics {
            entry.graphic = entry.graphic.copy();
        }
        assert_eq!(model.load_document(document).unwrap(), 1);
        assert_eq!(model.graphic_count(), 4);
    }

    #[test]
    fn test_missing_layer_is_an_error() {
        let json = r#"{
            "graphics": [{
                "layer": "00000000-0000-0000-0000-000000000001",
                "graphic": {"id": "6c3a3f6e-8a3b-4f0e-9a57-3c0f5e1f2a10", "shape": "point", "layerType": "measure", "points": [{"x": 1.0, "y": 2.0}]}
            }]
        }"#;
        let document = GraphicDocument::from_json(json).unwrap();
        let error = GraphicModel::from_document(document, ModelContext::default()).unwrap_err();
        assert!(matches!(error, DocumentError::MissingLayer { .. }));
    }

    #[test]
    fn test_graphic_without_layer_uses_default() {
        let json = r#"{
            "graphics": [{
                "graphic": {"id": "6c3a3f6e-8a3b-4f0e-9a57-3c0f5e1f2a10", "shape": "point", "layerType": "measure", "points": [{"x": 1.0, "y": 2.0}]}
            }]
        }"#;
        let model = GraphicModel::from_document(GraphicDocument::from_json(json).unwrap(), ModelContext::default())
            .unwrap();
        assert!(model.find_layer_by_type(LayerType::Measure).is_some());
        // Drag capability restored for measurement shapes
        assert!(model.all_graphics()[0].drag().is_some());
    }
}
