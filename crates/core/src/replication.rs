//! Region replication
//!
//! On a multi-region ultrasound frame, a measurement drawn in one region is
//! copied into every other region with the same physical unit, keeping its
//! real-world position. The original and its copies share a [`RegionGroupId`];
//! editing any member of the group later moves all the others.
//!
//! Point sets are handed to a [`PointLog`] as an audit trail. The in-memory
//! graphics are authoritative, so log failures are reported and ignored.

use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::geometry::Point;
use crate::graphic::{Color, Graphic, RegionGroupId};
use crate::listener::GraphicProperty;
use crate::model::{Containers, GraphicHandle, GraphicModel, Pending};
use crate::region::{find_containing_region, transform_points, InstanceIdentity, RegionSource, UltrasoundRegion};

/// Paint of a closed measurement enclosing another one in the same region
pub const CONTAINER_COLOR: Color = Color { r: 0xE9, g: 0x77, b: 0xAF, a: 255 };

/// Paint of a measurement enclosed by another one in the same region
pub const CONTAINED_COLOR: Color = Color { r: 0xCC, g: 0xCC, b: 0x99, a: 255 };

/// Errors reported by point log sinks
#[derive(Debug, Error)]
pub enum PointLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid point log: {0}")]
    Format(String),
}

/// One logged point and the region it was placed in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Region index, `None` when the point lies in no region
    pub region: Option<usize>,
    pub point: Point,
}

impl PointRecord {
    pub fn new(region: Option<usize>, point: Point) -> Self {
        Self { region, point }
    }
}

/// Identifies the point log of one region group on one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointLogKey {
    pub identity: InstanceIdentity,
    /// One-based frame number
    pub frame: usize,
    pub group: RegionGroupId,
    /// Textual form of the graphic that wrote the log
    pub graphic: String,
}

/// Sink for replicated point sets
pub trait PointLog: Send + Sync {
    /// Replace the log for `key`; returns where it was stored, if anywhere
    fn write(&self, key: &PointLogKey, records: &[PointRecord]) -> Result<Option<PathBuf>, PointLogError>;

    /// Remove a log written earlier
    fn remove(&self, path: &Path) -> Result<(), PointLogError>;

    /// Keep a log but mark it as belonging to deleted graphics; a missing log is not an error
    fn mark_deleted(&self, path: &Path) -> Result<(), PointLogError>;
}

/// Point log that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPointLog;

impl PointLog for NullPointLog {
    fn write(&self, _key: &PointLogKey, _records: &[PointRecord]) -> Result<Option<PathBuf>, PointLogError> {
        Ok(None)
    }

    fn remove(&self, _path: &Path) -> Result<(), PointLogError> {
        Ok(())
    }

    fn mark_deleted(&self, _path: &Path) -> Result<(), PointLogError> {
        Ok(())
    }
}

/// Outcome of one replication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Graphics replicated for the first time
    pub replicated: usize,
    /// Copies added to the model
    pub replicas_created: usize,
    /// Region groups updated after an edit
    pub groups_updated: usize,
    /// Graphics marked handled without replication
    pub skipped: usize,
}

/// One replication pass over a model for the frame supplied by a region source
pub struct RegionReplicator<'a> {
    model: &'a GraphicModel,
    source: &'a dyn RegionSource,
}

impl<'a> RegionReplicator<'a> {
    pub fn new(model: &'a GraphicModel, source: &'a dyn RegionSource) -> Self {
        Self { model, source }
    }

    /// Process every completed, unhandled measurement in the measure layers
    ///
    /// Holds the model write lock for the whole pass; notifications are
    /// delivered after it is released.
    pub fn run(&self) -> ReplicationReport {
        let regions = self.source.regions();
        let mut report = ReplicationReport::default();
        let mut pending = Pending::default();
        {
            let mut state = self.model.state.write();
            for handle in state.drag_measure_handles() {
                let Some(drag) = state.graphics.get_mut(handle).and_then(Graphic::drag_mut) else {
                    continue;
                };
                if drag.is_resizing_or_moving() {
                    // Reprocess once the user lets go
                    drag.set_handled_for_regions(false);
                    continue;
                }
                if !drag.is_complete() || drag.is_handled_for_regions() {
                    continue;
                }
                if regions.is_empty() {
                    drag.set_handled_for_regions(true);
                    continue;
                }
                match drag.region_group() {
                    Some(group) => {
                        self.update_group(&mut state, handle, group, &regions, &mut pending);
                        report.groups_updated += 1;
                    }
                    None => self.replicate(&mut state, handle, &regions, &mut pending, &mut report),
                }
            }
        }
        self.model.deliver(pending);
        report
    }

    /// Move every replica of an edited graphic to match it
    fn update_group(
        &self,
        state: &mut Containers,
        handle: GraphicHandle,
        group: RegionGroupId,
        regions: &[UltrasoundRegion],
        pending: &mut Pending,
    ) {
        let Some(edited) = state.graphics.get(handle).cloned() else {
            return;
        };
        if let Some(old) = edited.drag().and_then(|drag| drag.points_file()) {
            if let Err(error) = self.model.context().point_log().remove(old) {
                warn!("Cannot remove point log {}: {error}", old.display());
            }
        }

        let source_points = edited.points().to_vec();
        let source_region = find_containing_region(regions, &source_points);
        let mut records = records_for(&source_points, source_region);

        let members = state.group_members(group);
        for member in &members {
            if *member == handle {
                continue;
            }
            let Some(replica) = state.graphics.get_mut(*member) else {
                continue;
            };
            let Some(from) = source_region else {
                debug!("{edited} lies in no region, {replica} left in place");
                continue;
            };
            let Some(to) = find_containing_region(regions, replica.points()) else {
                debug!("{replica} lies in no region, left in place");
                continue;
            };
            let moved = transform_points(&regions[from], &regions[to], &source_points);
            trace!("{replica} moved to {moved:?}");
            records.extend(records_for(&moved, Some(to)));
            replica.set_points(moved);
            replica.set_style(*edited.style());
            replica.rebuild_shape(&regions[to].calibration());
            state.note(pending, *member, GraphicProperty::Points);
        }

        let path = self.write_log(&edited, group, &records);
        for member in &members {
            if let Some(graphic) = state.graphics.get_mut(*member) {
                if let (true, Some(index)) = (*member == handle, source_region) {
                    graphic.rebuild_shape(&regions[index].calibration());
                }
                if let Some(drag) = graphic.drag_mut() {
                    drag.set_points_file(path.clone());
                    if *member == handle {
                        drag.set_handled_for_regions(true);
                    }
                }
            }
        }
        pending.model_changed = true;
    }

    /// First replication of a graphic into every compatible region
    fn replicate(
        &self,
        state: &mut Containers,
        handle: GraphicHandle,
        regions: &[UltrasoundRegion],
        pending: &mut Pending,
        report: &mut ReplicationReport,
    ) {
        let Some(graphic) = state.graphics.get(handle).cloned() else {
            return;
        };
        let points = graphic.points().to_vec();
        let Some(home) = find_containing_region(regions, &points) else {
            debug!("{graphic} is not inside a single region, not replicated");
            mark_handled(state, handle);
            report.skipped += 1;
            return;
        };
        let home_region = &regions[home];

        recolor_containment(state, handle, home_region, pending);

        let group = RegionGroupId::random();
        let mut records = records_for(&points, Some(home));
        let mut template = graphic.clone();
        if let Some(updated) = state.graphics.get(handle) {
            // Containment may have changed the paint
            template.set_style(*updated.style());
        }

        let mut replicas = Vec::new();
        for (index, region) in regions.iter().enumerate() {
            if index == home {
                continue;
            }
            if region.units != home_region.units {
                warn!(
                    "Region {index} measures {} but {graphic} was drawn in {}, not replicated there",
                    region.units.symbol(),
                    home_region.units.symbol()
                );
                continue;
            }
            let moved = transform_points(home_region, region, &points);
            trace!("{graphic} replicated into region {index} at {moved:?}");
            records.extend(records_for(&moved, Some(index)));

            let mut replica = template.copy();
            replica.set_points(moved);
            replica.rebuild_shape(&region.calibration());
            if let Some(drag) = replica.drag_mut() {
                drag.set_region_group(Some(group));
                drag.set_complete(true);
                drag.set_handled_for_regions(true);
            }
            replicas.push(replica);
        }

        let mut original = graphic;
        if let Some(drag) = original.drag_mut() {
            drag.set_region_group(Some(group));
        }
        let path = self.write_log(&original, group, &records);

        if let Some(stored) = state.graphics.get_mut(handle) {
            stored.rebuild_shape(&home_region.calibration());
            if let Some(drag) = stored.drag_mut() {
                drag.set_region_group(Some(group));
                drag.set_points_file(path.clone());
                drag.set_handled_for_regions(true);
            }
        }

        let layer = match original.layer().filter(|layer| state.layers.contains(*layer)) {
            Some(layer) => layer,
            None => state.default_layer(original.layer_type()),
        };
        for mut replica in replicas {
            if state.is_duplicate(&replica) {
                debug!("{replica} already present, not added");
                continue;
            }
            if let Some(drag) = replica.drag_mut() {
                drag.set_points_file(path.clone());
            }
            state.insert(replica, layer);
            report.replicas_created += 1;
        }

        report.replicated += 1;
        pending.model_changed = true;
    }

    fn write_log(&self, graphic: &Graphic, group: RegionGroupId, records: &[PointRecord]) -> Option<PathBuf> {
        let key = PointLogKey {
            identity: self.source.identity(),
            frame: self.source.frame_index() + 1,
            group,
            graphic: graphic.to_string(),
        };
        match self.model.context().point_log().write(&key, records) {
            Ok(path) => path,
            Err(error) => {
                warn!("Cannot write point log for {graphic}: {error}");
                None
            }
        }
    }
}

impl GraphicModel {
    /// Run one replication pass for the frame supplied by `source`
    pub fn replicate_regions(&self, source: &dyn RegionSource) -> ReplicationReport {
        RegionReplicator::new(self, source).run()
    }
}

fn records_for(points: &[Point], region: Option<usize>) -> Vec<PointRecord> {
    points.iter().map(|point| PointRecord::new(region, *point)).collect()
}

fn mark_handled(state: &mut Containers, handle: GraphicHandle) {
    if let Some(drag) = state.graphics.get_mut(handle).and_then(Graphic::drag_mut) {
        drag.set_handled_for_regions(true);
    }
}

/// Color a new measurement and any measurement it encloses or is enclosed by
///
/// Only measurements lying in the same region are compared. The other
/// graphic's new paint is spread to its whole region group.
fn recolor_containment(
    state: &mut Containers,
    handle: GraphicHandle,
    region: &UltrasoundRegion,
    pending: &mut Pending,
) {
    let Some(graphic) = state.graphics.get(handle).cloned() else {
        return;
    };
    let neighbours: Vec<GraphicHandle> = state
        .drag_measure_handles()
        .into_iter()
        .filter(|other| *other != handle)
        .filter(|other| {
            state
                .graphics
                .get(*other)
                .is_some_and(|other| region.contains_all(other.points()))
        })
        .collect();

    for other in neighbours {
        let Some(neighbour) = state.graphics.get(other) else {
            continue;
        };
        let (own, theirs) = if graphic.contains_graphic(neighbour) {
            (CONTAINER_COLOR, CONTAINED_COLOR)
        } else if neighbour.contains_graphic(&graphic) {
            (CONTAINED_COLOR, CONTAINER_COLOR)
        } else {
            continue;
        };
        let group = neighbour.region_group();

        paint(state, handle, own, pending);
        paint(state, other, theirs, pending);
        if let Some(group) = group {
            for member in state.group_members(group) {
                if member != other {
                    paint(state, member, theirs, pending);
                }
            }
        }
    }
}

fn paint(state: &mut Containers, handle: GraphicHandle, color: Color, pending: &mut Pending) {
    if let Some(graphic) = state.graphics.get_mut(handle) {
        if graphic.style().paint != color {
            graphic.set_paint(color);
            state.note(pending, handle, GraphicProperty::Paint);
        }
    }
}
