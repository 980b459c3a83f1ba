//! Spatial queries over a graphic model
//!
//! Graphics are visited from topmost to bottommost and only on visible,
//! selectable layers. Each candidate is first checked against its repaint
//! bounds, then against its precise area, then against its label.

use crate::geometry::{AffineTransform, Area, Point, Rect};
use crate::graphic::Graphic;
use crate::model::{GraphicHandle, GraphicModel};

/// Shape or label hit by a device-space rectangle
fn hits_rect(graphic: &Graphic, image_rect: &Rect, device_rect: &Rect, transform: &AffineTransform) -> bool {
    let shape_hit = graphic
        .repaint_bounds(transform)
        .is_some_and(|bounds| bounds.intersects(image_rect))
        && graphic.area(transform).intersects_rect(device_rect);
    shape_hit || graphic.label_area(transform).is_some_and(|label| label.intersects_rect(device_rect))
}

/// Shape or label hit by a point
fn hits_point(graphic: &Graphic, image_point: &Point, device_point: &Point, transform: &AffineTransform) -> bool {
    let shape_hit = graphic
        .repaint_bounds(transform)
        .is_some_and(|bounds| bounds.contains(image_point))
        && graphic.area(transform).contains(device_point);
    shape_hit || graphic.label_area(transform).is_some_and(|label| label.contains(device_point))
}

impl GraphicModel {
    /// Graphics intersecting an image-space rectangle, topmost first
    ///
    /// With `only_frontmost`, pixels already claimed by a graphic in front are
    /// not counted for the graphics behind it.
    pub fn selected_graphics_intersecting(
        &self,
        rect: &Rect,
        transform: &AffineTransform,
        only_frontmost: bool,
    ) -> Vec<GraphicHandle> {
        let device_rect = transform.transform_rect(rect);
        let state = self.state.read();
        let candidates = state
            .iter_graphics()
            .rev()
            .filter(|(_, graphic)| state.is_on_selectable_layer(graphic));

        if !only_frontmost {
            return candidates
                .filter(|(_, graphic)| hits_rect(graphic, rect, &device_rect, transform))
                .map(|(handle, _)| handle)
                .collect();
        }

        let mut claimed: Vec<Area> = Vec::new();
        let mut found = Vec::new();
        for (handle, graphic) in candidates {
            let near = graphic
                .repaint_bounds(transform)
                .is_some_and(|bounds| bounds.intersects(rect));
            let mut area = if near { graphic.area(transform) } else { Area::new() };
            if let Some(label) = graphic.label_area(transform) {
                area.add(&label);
            }
            if area.intersects_rect_excluding(&device_rect, &claimed) {
                found.push(handle);
                claimed.push(area);
            }
        }
        found
    }

    /// Graphic under an image-space point
    ///
    /// An already selected graphic wins; otherwise the topmost hit is returned.
    pub fn first_graphic_intersecting(&self, point: &Point, transform: &AffineTransform) -> Option<GraphicHandle> {
        let device_point = transform.apply(point);
        let state = self.state.read();
        let mut topmost = None;
        for (handle, graphic) in state.iter_graphics().rev() {
            if !state.is_on_selectable_layer(graphic) || !hits_point(graphic, point, &device_point, transform) {
                continue;
            }
            if graphic.is_selected() {
                return Some(handle);
            }
            if topmost.is_none() {
                topmost = Some(handle);
            }
        }
        topmost
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::{AffineTransform, Point, Rect};
    use crate::graphic::{Graphic, Shape};
    use crate::model::{GraphicHandle, GraphicModel};
    use proptest::prelude::*;

    fn square(x: f64, y: f64, size: f64) -> Graphic {
        Graphic::completed(Shape::Polygon, Rect::new(x, y, size, size).corners().to_vec())
    }

    #[test]
    fn test_topmost_graphic_wins() {
        let model = GraphicModel::default();
        let bottom = model.add_graphic(square(0.0, 0.0, 50.0));
        let top = model.add_graphic(square(25.0, 25.0, 50.0));
        let transform = AffineTransform::identity();

        assert_eq!(model.first_graphic_intersecting(&Point::new(30.0, 30.0), &transform), Some(top));
        assert_eq!(model.first_graphic_intersecting(&Point::new(10.0, 10.0), &transform), Some(bottom));
        assert_eq!(model.first_graphic_intersecting(&Point::new(90.0, 90.0), &transform), None);
    }

    #[test]
    fn test_selected_graphic_wins_over_topmost() {
        let model = GraphicModel::default();
        let bottom = model.add_graphic(square(0.0, 0.0, 50.0));
        model.add_graphic(square(25.0, 25.0, 50.0));
        model.set_selected_graphics(&[bottom]);

        let hit = model.first_graphic_intersecting(&Point::new(30.0, 30.0), &AffineTransform::identity());
        assert_eq!(hit, Some(bottom));
    }

    #[test]
    fn test_unselectable_layer_is_skipped() {
        let model = GraphicModel::default();
        let handle = model.add_graphic(square(0.0, 0.0, 50.0));
        let layer = model.graphic(handle).unwrap().layer().unwrap();
        model.set_layer_selectable(layer, false).unwrap();

        let transform = AffineTransform::identity();
        assert_eq!(model.first_graphic_intersecting(&Point::new(10.0, 10.0), &transform), None);
        assert!(model
            .selected_graphics_intersecting(&Rect::new(0.0, 0.0, 100.0, 100.0), &transform, false)
            .is_empty());
    }

    #[test]
    fn test_rect_query_returns_topmost_first() {
        let model = GraphicModel::default();
        let a = model.add_graphic(square(0.0, 0.0, 10.0));
        let b = model.add_graphic(square(20.0, 0.0, 10.0));
        model.add_graphic(square(200.0, 200.0, 10.0));

        let hits = model.selected_graphics_intersecting(
            &Rect::new(5.0, 5.0, 20.0, 2.0),
            &AffineTransform::identity(),
            false,
        );
        assert_eq!(hits, vec![b, a]);
    }

    #[test]
    fn test_frontmost_query_skips_covered_graphic() {
        let model = GraphicModel::default();
        model.add_graphic(square(0.0, 0.0, 100.0));
        let front = model.add_graphic(square(0.0, 0.0, 100.0));
        let transform = AffineTransform::identity();
        let inner = Rect::new(40.0, 40.0, 10.0, 10.0);

        assert_eq!(model.selected_graphics_intersecting(&inner, &transform, false).len(), 2);
        assert_eq!(model.selected_graphics_intersecting(&inner, &transform, true), vec![front]);
    }

    #[test]
    fn test_label_area_is_hit() {
        let model = GraphicModel::default();
        let mut line = Graphic::completed(Shape::Line, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        line.rebuild_shape(&Default::default());
        let handle = model.add_graphic(line);

        // Label box starts right of the shape's top-right corner
        let hit = model.first_graphic_intersecting(&Point::new(30.0, 8.0), &AffineTransform::identity());
        assert_eq!(hit, Some(handle));
    }

    #[test]
    fn test_zoomed_hit_test() {
        let model = GraphicModel::default();
        let handle = model.add_graphic(square(10.0, 10.0, 10.0));
        let zoom = AffineTransform::scale(4.0, 4.0);
        assert_eq!(model.first_graphic_intersecting(&Point::new(15.0, 15.0), &zoom), Some(handle));
        assert_eq!(model.first_graphic_intersecting(&Point::new(25.0, 15.0), &zoom), None);
    }

    proptest! {
        #[test]
        fn prop_latest_added_wins(count in 1usize..15) {
            let model = GraphicModel::default();
            let handles: Vec<GraphicHandle> = (0..count)
                .map(|i| model.add_graphic(square(i as f64, i as f64, 50.0)))
                .collect();
            let hit = model.first_graphic_intersecting(&Point::new(49.0, 49.0), &AffineTransform::identity());
            prop_assert_eq!(hit, handles.last().copied());
        }
    }
}
