//! Paint pass
//!
//! The model does not draw anything itself. A [`GraphicPainter`] supplied by
//! the rendering backend is called back for each graphic that needs painting.

use crate::geometry::{AffineTransform, Rect};
use crate::graphic::Graphic;
use crate::model::GraphicModel;
use crate::region::RegionSource;

/// Drawing backend
///
/// Called while the model read lock is held: implementations must not
/// mutate the model.
pub trait GraphicPainter {
    /// Paint a graphic's shape; `transform` maps image space to device space
    fn paint(&mut self, graphic: &Graphic, transform: &AffineTransform);

    /// Paint a graphic's label
    fn paint_label(&mut self, graphic: &Graphic, transform: &AffineTransform);
}

impl GraphicModel {
    /// Replicate pending measurements, then paint every visible graphic
    ///
    /// `clip` is in device space. Graphics whose repaint bounds miss the clip
    /// get only their label painted when the label itself intersects it.
    pub fn draw(
        &self,
        painter: &mut dyn GraphicPainter,
        transform: &AffineTransform,
        inverse: &AffineTransform,
        clip: Option<&Rect>,
        source: Option<&dyn RegionSource>,
    ) {
        if let Some(source) = source {
            self.replicate_regions(source);
        }

        let image_clip = clip.map(|clip| inverse.transform_rect(clip));
        let state = self.state.read();
        for (_, graphic) in state.iter_graphics() {
            if !state.is_on_visible_layer(graphic) {
                continue;
            }
            let (Some(clip), Some(image_clip)) = (clip, image_clip) else {
                painter.paint(graphic, transform);
                if graphic.has_visible_label() {
                    painter.paint_label(graphic, transform);
                }
                continue;
            };

            let shape_visible = graphic
                .repaint_bounds(transform)
                .is_some_and(|bounds| bounds.intersects(&image_clip));
            let label_visible = graphic.has_visible_label()
                && graphic
                    .label()
                    .and_then(|label| label.bounds(transform))
                    .is_some_and(|bounds| bounds.intersects(clip));
            if shape_visible {
                painter.paint(graphic, transform);
            }
            if label_visible {
                painter.paint_label(graphic, transform);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::graphic::{GraphicId, Shape};
    use crate::region::{FrameRegions, UltrasoundRegion};

    #[derive(Default)]
    struct Recorder {
        shapes: Vec<GraphicId>,
        labels: Vec<GraphicId>,
    }

    impl GraphicPainter for Recorder {
        fn paint(&mut self, graphic: &Graphic, _transform: &AffineTransform) {
            self.shapes.push(graphic.id());
        }

        fn paint_label(&mut self, graphic: &Graphic, _transform: &AffineTransform) {
            self.labels.push(graphic.id());
        }
    }

    fn point(x: f64, y: f64) -> Graphic {
        Graphic::completed(Shape::Point, vec![Point::new(x, y)])
    }

    #[test]
    fn test_draw_without_clip_paints_everything_visible() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(10.0, 10.0));
        let hidden = model.add_graphic(Graphic::new(Shape::Annotation, vec![Point::new(5.0, 5.0)]));
        let layer = model.graphic(hidden).unwrap().layer().unwrap();
        model.set_layer_visible(layer, false).unwrap();

        let mut painter = Recorder::default();
        let identity = AffineTransform::identity();
        model.draw(&mut painter, &identity, &identity, None, None);

        assert_eq!(painter.shapes, vec![model.graphic(a).unwrap().id()]);
        assert!(painter.labels.is_empty());
    }

    #[test]
    fn test_draw_filters_by_clip() {
        let model = GraphicModel::default();
        let inside = model.add_graphic(point(10.0, 10.0));
        model.add_graphic(point(500.0, 500.0));

        let mut painter = Recorder::default();
        let zoom = AffineTransform::scale(2.0, 2.0);
        let inverse = zoom.inverse().unwrap();
        let clip = Rect::new(0.0, 0.0, 100.0, 100.0);
        model.draw(&mut painter, &zoom, &inverse, Some(&clip), None);

        assert_eq!(painter.shapes, vec![model.graphic(inside).unwrap().id()]);
    }

    #[test]
    fn test_draw_runs_replication_first() {
        let model = GraphicModel::default();
        model.add_graphic(point(50.0, 50.0));
        let regions = FrameRegions::new(vec![
            UltrasoundRegion::new(0, 0, 99, 99),
            UltrasoundRegion::new(100, 0, 199, 99),
        ]);

        let mut painter = Recorder::default();
        let identity = AffineTransform::identity();
        model.draw(&mut painter, &identity, &identity, None, Some(&regions));

        assert_eq!(painter.shapes.len(), 2);
        // Replicated points carry a position label
        assert_eq!(painter.labels.len(), 2);
    }
}
