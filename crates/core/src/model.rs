//! Graphic model
//!
//! Owns the graphics and layers of one image view. Graphics live in a
//! generation-checked arena; the z-order is the insertion order (last is
//! topmost). All container access goes through one reader/writer lock so a
//! render thread can iterate while the UI thread mutates.
//!
//! Listener callbacks are never invoked while the lock is held: events are
//! collected during the mutation and delivered once the guard is released.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::arena::{Arena, Handle};
use crate::document::ReferencedSeries;
use crate::geometry::Point;
use crate::graphic::{Color, DragState, Graphic, GraphicId, GraphicLabel, RegionGroupId, Shape};
use crate::layer::{GraphicLayer, LayerHandle, LayerType};
use crate::listener::{
    GraphicChangeListener, GraphicModelChangeListener, GraphicProperty, GraphicSelectionListener,
    Listeners, MeasurableLayer, PropertyChange,
};
use crate::replication::{NullPointLog, PointLog};

/// Handle of a graphic registered in a model
pub type GraphicHandle = Handle<Graphic>;

/// Errors that can occur during model operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("layer {0:?} is not registered in this model")]
    UnknownLayer(LayerHandle),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Collaborators owned by the document or view the model belongs to
#[derive(Clone)]
pub struct ModelContext {
    point_log: Arc<dyn PointLog>,
}

impl ModelContext {
    pub fn new(point_log: Arc<dyn PointLog>) -> Self {
        Self { point_log }
    }

    /// Sink receiving replicated point sets
    pub fn point_log(&self) -> &dyn PointLog {
        self.point_log.as_ref()
    }
}

impl Default for ModelContext {
    fn default() -> Self {
        Self::new(Arc::new(NullPointLog))
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext").finish_non_exhaustive()
    }
}

/// Events collected under the lock, delivered after it is released
#[derive(Default)]
pub(crate) struct Pending {
    changes: Vec<(Vec<Arc<dyn GraphicChangeListener>>, PropertyChange)>,
    pub(crate) model_changed: bool,
}

/// Graphic and layer containers guarded by the model lock
pub(crate) struct Containers {
    pub(crate) graphics: Arena<Graphic>,
    pub(crate) order: Vec<GraphicHandle>,
    pub(crate) layers: Arena<GraphicLayer>,
    pub(crate) layer_order: Vec<LayerHandle>,
    attached: HashMap<GraphicHandle, Vec<Arc<dyn GraphicChangeListener>>>,
    handlers: Listeners<dyn GraphicChangeListener>,
    pub(crate) referenced_series: Vec<ReferencedSeries>,
}

impl Containers {
    fn new() -> Self {
        Self {
            graphics: Arena::new(),
            order: Vec::new(),
            layers: Arena::new(),
            layer_order: Vec::new(),
            attached: HashMap::new(),
            handlers: Listeners::new(),
            referenced_series: Vec::new(),
        }
    }

    pub(crate) fn layer_of(&self, graphic: &Graphic) -> Option<&GraphicLayer> {
        graphic.layer().and_then(|layer| self.layers.get(layer))
    }

    pub(crate) fn is_on_visible_layer(&self, graphic: &Graphic) -> bool {
        self.layer_of(graphic).is_some_and(GraphicLayer::is_visible)
    }

    pub(crate) fn is_on_selectable_layer(&self, graphic: &Graphic) -> bool {
        self.layer_of(graphic).is_some_and(|layer| layer.is_visible() && layer.is_selectable())
    }

    /// Graphics in z-order, bottommost first
    pub(crate) fn iter_graphics(&self) -> impl DoubleEndedIterator<Item = (GraphicHandle, &Graphic)> {
        self.order
            .iter()
            .filter_map(|handle| self.graphics.get(*handle).map(|graphic| (*handle, graphic)))
    }

    pub(crate) fn find_layer_by_type(&self, layer_type: LayerType) -> Option<LayerHandle> {
        self.layer_order.iter().copied().find(|handle| {
            self.layers
                .get(*handle)
                .is_some_and(|layer| layer.layer_type() == layer_type && layer.is_default())
        })
    }

    fn insert_layer(&mut self, layer: GraphicLayer) -> LayerHandle {
        let handle = self.layers.insert(layer);
        self.layer_order.push(handle);
        handle
    }

    fn remove_layer(&mut self, layer: LayerHandle) {
        self.layers.remove(layer);
        self.layer_order.retain(|handle| *handle != layer);
    }

    fn layer_in_use(&self, layer: LayerHandle) -> bool {
        self.iter_graphics().any(|(_, graphic)| graphic.layer() == Some(layer))
    }

    /// Existing layer with the same identifier, or a newly registered one
    ///
    /// An unnamed layer resolves to the default layer of its type, so there is
    /// never more than one per type.
    fn register_layer(&mut self, layer: GraphicLayer) -> LayerHandle {
        let existing = self
            .layer_order
            .iter()
            .copied()
            .find(|handle| self.layers.get(*handle).is_some_and(|known| known.id() == layer.id()));
        if let Some(handle) = existing {
            return handle;
        }
        if layer.is_default() {
            if let Some(handle) = self.find_layer_by_type(layer.layer_type()) {
                return handle;
            }
        }
        self.insert_layer(layer)
    }

    /// Remove every graphic matching a predicate
    fn remove_where(&mut self, predicate: impl Fn(&Containers, &Graphic) -> bool) -> usize {
        let targets: Vec<GraphicHandle> = self
            .iter_graphics()
            .filter(|(_, graphic)| predicate(self, graphic))
            .map(|(handle, _)| handle)
            .collect();
        targets.into_iter().filter(|handle| self.remove(*handle).is_some()).count()
    }

    /// Default layer of a type, created on first use
    pub(crate) fn default_layer(&mut self, layer_type: LayerType) -> LayerHandle {
        match self.find_layer_by_type(layer_type) {
            Some(handle) => handle,
            None => self.insert_layer(GraphicLayer::new(layer_type)),
        }
    }

    /// Append a graphic on top of the z-order; `layer` must be registered
    pub(crate) fn insert(&mut self, mut graphic: Graphic, layer: LayerHandle) -> GraphicHandle {
        graphic.set_layer(Some(layer));
        let handle = self.graphics.insert(graphic);
        self.order.push(handle);
        let handlers = self.handlers.snapshot();
        if !handlers.is_empty() {
            self.attached.insert(handle, handlers);
        }
        handle
    }

    /// Remove a graphic, detach its listeners and drop its layer once unreferenced
    pub(crate) fn remove(&mut self, handle: GraphicHandle) -> Option<Graphic> {
        let mut graphic = self.graphics.remove(handle)?;
        self.order.retain(|known| *known != handle);
        self.attached.remove(&handle);
        if let Some(layer) = graphic.layer() {
            if !self.layer_in_use(layer) {
                self.remove_layer(layer);
            }
        }
        graphic.set_layer(None);
        Some(graphic)
    }

    fn remove_all(&mut self) {
        self.graphics.clear();
        self.order.clear();
        self.layers.clear();
        self.layer_order.clear();
        self.attached.clear();
    }

    /// Queue a property change for the graphic's attached listeners
    pub(crate) fn note(&self, pending: &mut Pending, handle: GraphicHandle, property: GraphicProperty) {
        let Some(graphic) = self.graphics.get(handle) else {
            return;
        };
        if let Some(listeners) = self.attached.get(&handle).filter(|list| !list.is_empty()) {
            pending
                .changes
                .push((listeners.clone(), PropertyChange { graphic: graphic.id(), property }));
        }
    }

    /// Draggable measurements in measure layers, z-order
    pub(crate) fn drag_measure_handles(&self) -> Vec<GraphicHandle> {
        self.iter_graphics()
            .filter(|(_, graphic)| {
                graphic.is_drag_measurement()
                    && self
                        .layer_of(graphic)
                        .is_some_and(|layer| layer.layer_type() == LayerType::Measure)
            })
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Graphics carrying the given region group, z-order
    pub(crate) fn group_members(&self, group: RegionGroupId) -> Vec<GraphicHandle> {
        self.iter_graphics()
            .filter(|(_, graphic)| graphic.region_group() == Some(group))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// A draggable measurement with the same non-empty points is already in a measure layer
    pub(crate) fn is_duplicate(&self, graphic: &Graphic) -> bool {
        if !graphic.is_drag_measurement() || graphic.points().is_empty() {
            return false;
        }
        self.drag_measure_handles()
            .into_iter()
            .filter_map(|handle| self.graphics.get(handle))
            .any(|existing| existing.id() != graphic.id() && existing.same_points(graphic))
    }

    /// Selected graphics plus every graphic sharing a region group with one of them
    fn selection_closure(&self) -> Vec<GraphicHandle> {
        let groups: HashSet<RegionGroupId> = self
            .iter_graphics()
            .filter(|(_, graphic)| graphic.is_selected())
            .filter_map(|(_, graphic)| graphic.region_group())
            .collect();
        self.iter_graphics()
            .filter(|(_, graphic)| {
                graphic.is_selected()
                    || graphic.region_group().is_some_and(|group| groups.contains(&group))
            })
            .map(|(handle, _)| handle)
            .collect()
    }
}

/// In-memory store of the graphics drawn over one image
pub struct GraphicModel {
    id: Uuid,
    pub(crate) state: RwLock<Containers>,
    selection_listeners: Mutex<Listeners<dyn GraphicSelectionListener>>,
    model_listeners: Mutex<Listeners<dyn GraphicModelChangeListener>>,
    changes_suspended: AtomicBool,
    context: ModelContext,
}

impl GraphicModel {
    /// Create an empty model with its collaborators
    pub fn new(context: ModelContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RwLock::new(Containers::new()),
            selection_listeners: Mutex::new(Listeners::new()),
            model_listeners: Mutex::new(Listeners::new()),
            changes_suspended: AtomicBool::new(false),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    // ---- graphics ----

    /// Add a graphic to the default layer of its type
    pub fn add_graphic(&self, graphic: Graphic) -> GraphicHandle {
        let handle = {
            let mut state = self.state.write();
            let layer = state.default_layer(graphic.layer_type());
            state.insert(graphic, layer)
        };
        self.fire_changed();
        handle
    }

    /// Add a graphic to a given layer, registering the layer if it is new
    pub fn add_graphic_to(&self, graphic: Graphic, layer: GraphicLayer) -> GraphicHandle {
        let handle = {
            let mut state = self.state.write();
            let layer = state.register_layer(layer);
            state.insert(graphic, layer)
        };
        self.fire_changed();
        handle
    }

    /// Add a graphic to a layer already in this model
    pub fn add_graphic_in_layer(&self, graphic: Graphic, layer: LayerHandle) -> ModelResult<GraphicHandle> {
        let handle = {
            let mut state = self.state.write();
            if !state.layers.contains(layer) {
                return Err(ModelError::UnknownLayer(layer));
            }
            state.insert(graphic, layer)
        };
        self.fire_changed();
        Ok(handle)
    }

    /// Add a user annotation, unless an identical measurement is already present
    ///
    /// Returns `None` when the add was suppressed as a duplicate.
    pub fn add_annotation(&self, graphic: Graphic, layer: Option<GraphicLayer>) -> Option<GraphicHandle> {
        let handle = {
            let mut state = self.state.write();
            if state.is_duplicate(&graphic) {
                debug!("Skipping {graphic}: identical measurement already present");
                return None;
            }
            let layer = match layer {
                Some(layer) => state.register_layer(layer),
                None => state.default_layer(graphic.layer_type()),
            };
            state.insert(graphic, layer)
        };
        self.fire_changed();
        Some(handle)
    }

    /// Remove a graphic; its layer goes too once no graphic references it
    pub fn remove_graphic(&self, handle: GraphicHandle) -> Option<Graphic> {
        let removed = self.state.write().remove(handle);
        if removed.is_some() {
            self.fire_changed();
        }
        removed
    }

    pub fn graphic(&self, handle: GraphicHandle) -> Option<Graphic> {
        self.state.read().graphics.get(handle).cloned()
    }

    /// Run a closure against a graphic under the read lock
    pub fn with_graphic<R>(&self, handle: GraphicHandle, f: impl FnOnce(&Graphic) -> R) -> Option<R> {
        self.state.read().graphics.get(handle).map(f)
    }

    pub fn handle_of(&self, id: GraphicId) -> Option<GraphicHandle> {
        self.state
            .read()
            .iter_graphics()
            .find(|(_, graphic)| graphic.id() == id)
            .map(|(handle, _)| handle)
    }

    pub fn contains(&self, handle: GraphicHandle) -> bool {
        self.state.read().graphics.contains(handle)
    }

    /// Number of graphics, visible or not
    pub fn graphic_count(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphic_count() == 0
    }

    /// Every graphic handle in z-order, hidden layers included
    pub fn graphic_handles(&self) -> Vec<GraphicHandle> {
        self.state.read().order.clone()
    }

    /// Graphics on visible layers, in z-order
    pub fn all_graphics(&self) -> Vec<Graphic> {
        let state = self.state.read();
        state
            .iter_graphics()
            .filter(|(_, graphic)| state.is_on_visible_layer(graphic))
            .map(|(_, graphic)| graphic.clone())
            .collect()
    }

    /// Draggable measurements in measure layers, in z-order
    pub fn all_drag_measure_graphics(&self) -> Vec<GraphicHandle> {
        self.state.read().drag_measure_handles()
    }

    /// Graphics sharing a region group, in z-order
    pub fn region_group_members(&self, group: RegionGroupId) -> Vec<GraphicHandle> {
        self.state.read().group_members(group)
    }

    // ---- edits ----

    fn edit(&self, handle: GraphicHandle, property: GraphicProperty, f: impl FnOnce(&mut Graphic)) -> bool {
        let mut pending = Pending::default();
        {
            let mut state = self.state.write();
            let Some(graphic) = state.graphics.get_mut(handle) else {
                return false;
            };
            f(graphic);
            state.note(&mut pending, handle, property);
        }
        self.deliver(pending);
        true
    }

    pub fn set_points(&self, handle: GraphicHandle, points: Vec<Point>) -> bool {
        self.edit(handle, GraphicProperty::Points, |graphic| graphic.set_points(points))
    }

    pub fn translate(&self, handle: GraphicHandle, dx: f64, dy: f64) -> bool {
        self.edit(handle, GraphicProperty::Points, |graphic| graphic.translate(dx, dy))
    }

    pub fn set_paint(&self, handle: GraphicHandle, paint: Color) -> bool {
        self.edit(handle, GraphicProperty::Paint, |graphic| graphic.set_paint(paint))
    }

    pub fn set_label(&self, handle: GraphicHandle, label: Option<GraphicLabel>) -> bool {
        self.edit(handle, GraphicProperty::Label, |graphic| graphic.set_label(label))
    }

    /// Start a drag or resize; replication waits until [`Self::finish_adjusting`]
    pub fn begin_adjusting(&self, handle: GraphicHandle) -> bool {
        self.edit(handle, GraphicProperty::Points, |graphic| {
            if let Some(drag) = graphic.drag_mut() {
                drag.set_resizing_or_moving(true);
            }
        })
    }

    /// End a drag or resize and mark the drawing complete
    pub fn finish_adjusting(&self, handle: GraphicHandle) -> bool {
        self.edit(handle, GraphicProperty::Points, |graphic| {
            if let Some(drag) = graphic.drag_mut() {
                drag.set_resizing_or_moving(false);
                drag.set_complete(true);
            }
        })
    }

    // ---- selection ----

    pub fn selected_handles(&self) -> Vec<GraphicHandle> {
        self.state
            .read()
            .iter_graphics()
            .filter(|(_, graphic)| graphic.is_selected())
            .map(|(handle, _)| handle)
            .collect()
    }

    pub fn selected_graphics(&self) -> Vec<Graphic> {
        self.state
            .read()
            .iter_graphics()
            .filter(|(_, graphic)| graphic.is_selected())
            .map(|(_, graphic)| graphic.clone())
            .collect()
    }

    pub fn selected_drag_graphics(&self) -> Vec<Graphic> {
        self.state
            .read()
            .iter_graphics()
            .filter(|(_, graphic)| graphic.is_selected() && graphic.is_drag_measurement())
            .map(|(_, graphic)| graphic.clone())
            .collect()
    }

    /// First select-rectangle graphic, if one is being drawn
    pub fn select_graphic(&self) -> Option<GraphicHandle> {
        self.state
            .read()
            .iter_graphics()
            .find(|(_, graphic)| graphic.shape() == Shape::SelectRectangle)
            .map(|(handle, _)| handle)
    }

    /// Select exactly the given graphics; duplicates and stale handles are ignored
    pub fn set_selected_graphics(&self, handles: &[GraphicHandle]) {
        let wanted: HashSet<GraphicHandle> = handles.iter().copied().collect();
        self.update_selection(|handle, _| wanted.contains(&handle));
    }

    /// Select every graphic on a visible, selectable layer
    pub fn select_all(&self) {
        let selectable: HashSet<GraphicHandle> = {
            let state = self.state.read();
            state
                .iter_graphics()
                .filter(|(_, graphic)| state.is_on_selectable_layer(graphic))
                .map(|(handle, _)| handle)
                .collect()
        };
        self.update_selection(|handle, _| selectable.contains(&handle));
    }

    fn update_selection(&self, selected: impl Fn(GraphicHandle, &Graphic) -> bool) {
        let mut pending = Pending::default();
        {
            let mut state = self.state.write();
            let handles = state.order.clone();
            for handle in handles {
                let Some(graphic) = state.graphics.get_mut(handle) else {
                    continue;
                };
                let wanted = selected(handle, graphic);
                if graphic.is_selected() != wanted {
                    graphic.set_selected(wanted);
                    state.note(&mut pending, handle, GraphicProperty::Selected);
                }
            }
        }
        self.deliver(pending);
    }

    /// Delete the selection together with every replica of a selected graphic
    ///
    /// `confirm` receives the number of graphics about to be deleted and may
    /// cancel. Point logs of deleted graphics are marked deleted on a
    /// best-effort basis. Returns the number of graphics removed.
    pub fn delete_selected_graphics(&self, confirm: Option<&dyn Fn(usize) -> bool>) -> usize {
        let count = self.state.read().selection_closure().len();
        if count == 0 {
            return 0;
        }
        if let Some(confirm) = confirm {
            if !confirm(count) {
                return 0;
            }
        }

        let mut pending = Pending::default();
        let mut removed = 0;
        {
            let mut state = self.state.write();
            // Replicas may have joined a selected group while the lock was released
            let targets = state.selection_closure();
            let mut marked: HashSet<PathBuf> = HashSet::new();
            for handle in targets {
                let Some(graphic) = state.graphics.get(handle) else {
                    continue;
                };
                if let Some(path) = graphic.drag().and_then(DragState::points_file) {
                    if marked.insert(path.to_path_buf()) {
                        if let Err(error) = self.context.point_log().mark_deleted(path) {
                            debug!("Cannot mark point log {} as deleted: {error}", path.display());
                        }
                    }
                }
                state.note(&mut pending, handle, GraphicProperty::Removed);
                if state.remove(handle).is_some() {
                    removed += 1;
                }
            }
            pending.model_changed = removed > 0;
        }
        self.deliver(pending);
        removed
    }

    // ---- layers ----

    /// Default (unnamed) layer of a type
    pub fn find_layer_by_type(&self, layer_type: LayerType) -> Option<LayerHandle> {
        self.state.read().find_layer_by_type(layer_type)
    }

    pub fn layer(&self, handle: LayerHandle) -> Option<GraphicLayer> {
        self.state.read().layers.get(handle).cloned()
    }

    /// Layers in creation order
    pub fn layers(&self) -> Vec<(LayerHandle, GraphicLayer)> {
        let state = self.state.read();
        state
            .layer_order
            .iter()
            .filter_map(|handle| state.layers.get(*handle).map(|layer| (*handle, layer.clone())))
            .collect()
    }

    pub fn layer_count(&self) -> usize {
        self.state.read().layers.len()
    }

    pub fn group_layers_by_type(&self) -> HashMap<LayerType, Vec<GraphicLayer>> {
        let mut groups: HashMap<LayerType, Vec<GraphicLayer>> = HashMap::new();
        for (_, layer) in self.layers() {
            groups.entry(layer.layer_type()).or_default().push(layer);
        }
        groups
    }

    fn update_layer(&self, handle: LayerHandle, f: impl FnOnce(&mut GraphicLayer)) -> ModelResult<()> {
        {
            let mut state = self.state.write();
            let layer = state.layers.get_mut(handle).ok_or(ModelError::UnknownLayer(handle))?;
            f(layer);
        }
        self.fire_changed();
        Ok(())
    }

    pub fn set_layer_visible(&self, handle: LayerHandle, visible: bool) -> ModelResult<()> {
        self.update_layer(handle, |layer| layer.set_visible(visible))
    }

    pub fn set_layer_selectable(&self, handle: LayerHandle, selectable: bool) -> ModelResult<()> {
        self.update_layer(handle, |layer| layer.set_selectable(selectable))
    }

    pub fn set_layer_serializable(&self, handle: LayerHandle, serializable: bool) -> ModelResult<()> {
        self.update_layer(handle, |layer| layer.set_serializable(serializable))
    }

    /// Remove every graphic matching a predicate, then fire one model change
    fn delete_where(&self, predicate: impl Fn(&Containers, &Graphic) -> bool) -> usize {
        let removed = self.state.write().remove_where(predicate);
        if removed > 0 {
            self.fire_changed();
        }
        removed
    }

    /// Remove a layer and all of its graphics
    pub fn delete_by_layer(&self, layer: LayerHandle) -> ModelResult<usize> {
        let removed = {
            let mut state = self.state.write();
            if state.order.is_empty() {
                return Ok(0);
            }
            if !state.layers.contains(layer) {
                return Err(ModelError::UnknownLayer(layer));
            }
            let removed = state.remove_where(|_, graphic| graphic.layer() == Some(layer));
            state.remove_layer(layer);
            removed
        };
        if removed > 0 {
            self.fire_changed();
        }
        Ok(removed)
    }

    /// Remove every layer of a type and all of their graphics
    pub fn delete_by_layer_type(&self, layer_type: LayerType) -> usize {
        let removed = {
            let mut state = self.state.write();
            if state.order.is_empty() {
                return 0;
            }
            let removed = state.remove_where(|state, graphic| {
                state.layer_of(graphic).is_some_and(|layer| layer.layer_type() == layer_type)
            });
            let layers: Vec<LayerHandle> = state
                .layer_order
                .iter()
                .copied()
                .filter(|handle| state.layers.get(*handle).is_some_and(|l| l.layer_type() == layer_type))
                .collect();
            for layer in layers {
                state.remove_layer(layer);
            }
            removed
        };
        if removed > 0 {
            self.fire_changed();
        }
        removed
    }

    /// Remove graphics whose layer is not saved with the document
    pub fn delete_non_serializable_graphics(&self) -> usize {
        self.delete_where(|state, graphic| {
            !state.layer_of(graphic).is_some_and(GraphicLayer::is_serializable)
        })
    }

    pub fn has_serializable_graphics(&self) -> bool {
        let state = self.state.read();
        let found = state
            .iter_graphics()
            .any(|(_, graphic)| state.layer_of(graphic).is_some_and(GraphicLayer::is_serializable));
        found
    }

    // ---- lifecycle ----

    /// Remove every graphic and layer
    pub fn clear(&self) {
        let had_graphics = {
            let mut state = self.state.write();
            let had_graphics = !state.order.is_empty();
            state.remove_all();
            had_graphics
        };
        if had_graphics {
            self.fire_changed();
        }
    }

    /// Clear the model and drop every listener
    pub fn dispose(&self) {
        {
            let mut state = self.state.write();
            state.remove_all();
            state.handlers.clear();
            state.referenced_series.clear();
        }
        self.selection_listeners.lock().clear();
        self.model_listeners.lock().clear();
    }

    pub fn referenced_series(&self) -> Vec<ReferencedSeries> {
        self.state.read().referenced_series.clone()
    }

    pub fn set_referenced_series(&self, series: Vec<ReferencedSeries>) {
        self.state.write().referenced_series = series;
    }

    // ---- listeners ----

    pub fn add_selection_listener(&self, listener: Arc<dyn GraphicSelectionListener>) {
        self.selection_listeners.lock().add(listener);
    }

    pub fn remove_selection_listener(&self, listener: &Arc<dyn GraphicSelectionListener>) -> bool {
        self.selection_listeners.lock().remove(listener)
    }

    pub fn add_model_listener(&self, listener: Arc<dyn GraphicModelChangeListener>) {
        self.model_listeners.lock().add(listener);
    }

    pub fn remove_model_listener(&self, listener: &Arc<dyn GraphicModelChangeListener>) -> bool {
        self.model_listeners.lock().remove(listener)
    }

    /// Attach a handler to every graphic now in the model and to every graphic added later
    pub fn add_graphic_change_handler(&self, handler: Arc<dyn GraphicChangeListener>) {
        let mut state = self.state.write();
        if !state.handlers.add(Arc::clone(&handler)) {
            return;
        }
        let handles = state.order.clone();
        for handle in handles {
            attach(state.attached.entry(handle).or_default(), &handler);
        }
    }

    /// Detach a handler from every graphic
    pub fn remove_graphic_change_handler(&self, handler: &Arc<dyn GraphicChangeListener>) {
        let mut state = self.state.write();
        state.handlers.remove(handler);
        for listeners in state.attached.values_mut() {
            detach(listeners, handler);
        }
    }

    /// Attach a listener to one graphic
    pub fn add_graphic_listener(&self, handle: GraphicHandle, listener: Arc<dyn GraphicChangeListener>) -> bool {
        let mut state = self.state.write();
        if !state.graphics.contains(handle) {
            return false;
        }
        attach(state.attached.entry(handle).or_default(), &listener);
        true
    }

    pub fn remove_graphic_listener(&self, handle: GraphicHandle, listener: &Arc<dyn GraphicChangeListener>) -> bool {
        let mut state = self.state.write();
        state.attached.get_mut(&handle).is_some_and(|listeners| detach(listeners, listener))
    }

    /// Suspend or resume model-change notification
    pub fn set_changes_suspended(&self, suspended: bool) {
        self.changes_suspended.store(suspended, Ordering::SeqCst);
    }

    pub fn changes_suspended(&self) -> bool {
        self.changes_suspended.load(Ordering::SeqCst)
    }

    /// Notify model-change listeners unless notification is suspended
    pub fn fire_changed(&self) {
        if self.changes_suspended() {
            return;
        }
        let listeners = self.model_listeners.lock().snapshot();
        for listener in listeners {
            listener.model_changed(self);
        }
    }

    /// Notify selection listeners with the current selection
    pub fn fire_selection_changed(&self, layer: Option<&MeasurableLayer>) {
        let listeners = self.selection_listeners.lock().snapshot();
        if listeners.is_empty() {
            return;
        }
        let selected = self.selected_graphics();
        for listener in listeners {
            listener.selection_changed(&selected, layer);
        }
    }

    pub(crate) fn deliver(&self, pending: Pending) {
        for (listeners, change) in &pending.changes {
            for listener in listeners {
                listener.property_changed(change);
            }
        }
        if pending.model_changed {
            self.fire_changed();
        }
    }
}

impl Default for GraphicModel {
    fn default() -> Self {
        Self::new(ModelContext::default())
    }
}

impl fmt::Debug for GraphicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("GraphicModel")
            .field("id", &self.id)
            .field("graphics", &state.order.len())
            .field("layers", &state.layers.len())
            .finish()
    }
}

fn attach(listeners: &mut Vec<Arc<dyn GraphicChangeListener>>, listener: &Arc<dyn GraphicChangeListener>) {
    if !listeners.iter().any(|known| std::ptr::addr_eq(Arc::as_ptr(known), Arc::as_ptr(listener))) {
        listeners.push(Arc::clone(listener));
    }
}

fn detach(listeners: &mut Vec<Arc<dyn GraphicChangeListener>>, listener: &Arc<dyn GraphicChangeListener>) -> bool {
    let before = listeners.len();
    listeners.retain(|known| !std::ptr::addr_eq(Arc::as_ptr(known), Arc::as_ptr(listener)));
    listeners.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{PointLogError, PointLogKey, PointRecord};
    use proptest::prelude::*;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    fn point(x: f64, y: f64) -> Graphic {
        Graphic::completed(Shape::Point, vec![Point::new(x, y)])
    }

    #[derive(Default)]
    struct RecordingLog {
        deleted: Mutex<Vec<PathBuf>>,
    }

    impl PointLog for RecordingLog {
        fn write(&self, _key: &PointLogKey, _records: &[PointRecord]) -> Result<Option<PathBuf>, PointLogError> {
            Ok(None)
        }

        fn remove(&self, _path: &Path) -> Result<(), PointLogError> {
            Ok(())
        }

        fn mark_deleted(&self, path: &Path) -> Result<(), PointLogError> {
            self.deleted.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_add_graphic_creates_default_layer() {
        let model = GraphicModel::default();
        let handle = model.add_graphic(point(1.0, 1.0));

        let layer = model.find_layer_by_type(LayerType::Measure).unwrap();
        assert_eq!(model.graphic(handle).unwrap().layer(), Some(layer));
        assert_eq!(model.layer_count(), 1);

        model.add_graphic(point(2.0, 2.0));
        assert_eq!(model.layer_count(), 1);
    }

    #[test]
    fn test_layer_removed_with_last_graphic() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(1.0, 1.0));
        let b = model.add_graphic(point(2.0, 2.0));
        let note = model.add_graphic(Graphic::new(Shape::Annotation, vec![Point::new(0.0, 0.0)]));
        assert_eq!(model.layer_count(), 2);

        model.remove_graphic(a);
        assert!(model.find_layer_by_type(LayerType::Measure).is_some());
        model.remove_graphic(b);
        assert!(model.find_layer_by_type(LayerType::Measure).is_none());
        assert_eq!(model.layer_count(), 1);

        // Stale handle
        assert!(model.remove_graphic(a).is_none());
        assert!(model.contains(note));
    }

    #[test]
    fn test_named_layer_is_shared_by_id() {
        let model = GraphicModel::default();
        let cardiac = GraphicLayer::named(LayerType::Measure, "Cardiac");
        let a = model.add_graphic_to(point(1.0, 1.0), cardiac.clone());
        let b = model.add_graphic_to(point(2.0, 2.0), cardiac);
        model.add_graphic(point(3.0, 3.0));

        assert_eq!(model.graphic(a).unwrap().layer(), model.graphic(b).unwrap().layer());
        assert_eq!(model.layer_count(), 2);
        assert_eq!(model.group_layers_by_type()[&LayerType::Measure].len(), 2);
    }

    #[test]
    fn test_unnamed_layer_resolves_to_default() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(1.0, 1.0));
        let b = model.add_graphic_to(point(2.0, 2.0), GraphicLayer::new(LayerType::Measure));

        assert_eq!(model.graphic(a).unwrap().layer(), model.graphic(b).unwrap().layer());
        assert_eq!(model.layer_count(), 1);
    }

    #[test]
    fn test_loading_foreign_document_keeps_one_default_layer() {
        let model = GraphicModel::default();
        model.add_graphic(point(1.0, 1.0));
        let other = GraphicModel::default();
        other.add_graphic(point(2.0, 2.0));

        assert_eq!(model.load_document(other.to_document()).unwrap(), 1);

        let defaults = model
            .layers()
            .into_iter()
            .filter(|(_, layer)| layer.layer_type() == LayerType::Measure && layer.is_default())
            .count();
        assert_eq!(defaults, 1);
        assert_eq!(model.graphic_count(), 2);
    }

    #[test]
    fn test_hidden_layer_excluded_from_all_graphics() {
        let model = GraphicModel::default();
        model.add_graphic(point(1.0, 1.0));
        let note = model.add_graphic(Graphic::new(Shape::Annotation, vec![Point::new(0.0, 0.0)]));
        let layer = model.graphic(note).unwrap().layer().unwrap();

        model.set_layer_visible(layer, false).unwrap();
        let visible = model.all_graphics();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].shape(), Shape::Point);
        assert_eq!(model.graphic_count(), 2);
    }

    #[test]
    fn test_duplicate_measurement_suppressed() {
        let model = GraphicModel::default();
        assert!(model.add_annotation(point(5.0, 5.0), None).is_some());
        assert!(model.add_annotation(point(5.0, 5.0), None).is_none());
        assert!(model.add_annotation(point(5.0, 6.0), None).is_some());
        assert_eq!(model.graphic_count(), 2);

        // Empty point sets are never duplicates
        let empty = Graphic::new(Shape::Polyline, vec![]);
        assert!(model.add_annotation(empty.clone(), None).is_some());
        assert!(model.add_annotation(empty, None).is_some());
    }

    #[test]
    fn test_delete_selected_includes_region_group() {
        let log = Arc::new(RecordingLog::default());
        let model = GraphicModel::new(ModelContext::new(log.clone()));
        let group = RegionGroupId::random();
        let file = PathBuf::from("/points/group.txt");

        let mut original = point(10.0, 10.0);
        let mut replica = point(110.0, 10.0);
        for graphic in [&mut original, &mut replica] {
            let drag = graphic.drag_mut().unwrap();
            drag.set_region_group(Some(group));
            drag.set_points_file(Some(file.clone()));
        }
        let a = model.add_graphic(original);
        let b = model.add_graphic(replica);
        let other = model.add_graphic(point(50.0, 50.0));

        model.set_selected_graphics(&[a]);
        let removed = model.delete_selected_graphics(None);

        assert_eq!(removed, 2);
        assert!(!model.contains(a));
        assert!(!model.contains(b));
        assert!(model.contains(other));
        assert_eq!(*log.deleted.lock(), vec![file]);
    }

    #[test]
    fn test_delete_selected_includes_replica_added_during_confirm() {
        let model = GraphicModel::default();
        let group = RegionGroupId::random();
        let in_group = |x: f64| {
            let mut graphic = point(x, 10.0);
            graphic.drag_mut().unwrap().set_region_group(Some(group));
            graphic
        };
        let a = model.add_graphic(in_group(10.0));
        model.set_selected_graphics(&[a]);

        let late = Mutex::new(None);
        let confirm: &dyn Fn(usize) -> bool = &|count| {
            assert_eq!(count, 1);
            *late.lock() = Some(model.add_graphic(in_group(110.0)));
            true
        };

        assert_eq!(model.delete_selected_graphics(Some(confirm)), 2);
        let late = late.lock().unwrap();
        assert!(!model.contains(late));
        assert!(model.is_empty());
    }

    #[test]
    fn test_delete_selected_can_be_cancelled() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(1.0, 1.0));
        model.set_selected_graphics(&[a]);

        let seen = AtomicUsize::new(0);
        let refuse: &dyn Fn(usize) -> bool = &|count| {
            seen.store(count, Ordering::SeqCst);
            false
        };
        assert_eq!(model.delete_selected_graphics(Some(refuse)), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(model.contains(a));
    }

    #[test]
    fn test_delete_by_layer() {
        let model = GraphicModel::default();
        let elsewhere = GraphicModel::default();
        let foreign = elsewhere.graphic(elsewhere.add_graphic(point(0.0, 0.0))).unwrap().layer().unwrap();
        assert_eq!(model.delete_by_layer(foreign), Ok(0));

        let a = model.add_graphic(point(1.0, 1.0));
        model.add_graphic(point(2.0, 2.0));
        model.add_graphic(Graphic::new(Shape::Annotation, vec![Point::new(0.0, 0.0)]));
        let layer = model.graphic(a).unwrap().layer().unwrap();

        assert_eq!(model.delete_by_layer(layer), Ok(2));
        assert_eq!(model.delete_by_layer(layer), Err(ModelError::UnknownLayer(layer)));
        assert_eq!(model.graphic_count(), 1);
        assert_eq!(model.delete_by_layer_type(LayerType::Annotation), 1);
        assert_eq!(model.layer_count(), 0);
    }

    #[test]
    fn test_delete_non_serializable_graphics() {
        let model = GraphicModel::default();
        model.add_graphic(point(1.0, 1.0));
        model.add_graphic(Graphic::new(Shape::SelectRectangle, vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]));
        assert!(model.select_graphic().is_some());

        assert_eq!(model.delete_non_serializable_graphics(), 1);
        assert!(model.select_graphic().is_none());
        assert!(model.has_serializable_graphics());
    }

    #[test]
    fn test_property_listeners_follow_membership() {
        let model = GraphicModel::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handler: Arc<dyn GraphicChangeListener> =
            Arc::new(move |change: &PropertyChange| sink.lock().push(change.property));

        let before = model.add_graphic(point(1.0, 1.0));
        model.add_graphic_change_handler(Arc::clone(&handler));
        let after = model.add_graphic(point(2.0, 2.0));

        model.set_paint(before, Color::RED);
        model.set_points(after, vec![Point::new(3.0, 3.0)]);
        assert_eq!(*events.lock(), vec![GraphicProperty::Paint, GraphicProperty::Points]);

        model.set_selected_graphics(&[after]);
        model.delete_selected_graphics(None);
        assert_eq!(events.lock().last(), Some(&GraphicProperty::Removed));

        model.remove_graphic_change_handler(&handler);
        events.lock().clear();
        model.set_paint(before, Color::BLUE);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_model_listener_respects_suspend() {
        let model = GraphicModel::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        model.add_model_listener(Arc::new(move |_: &GraphicModel| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        model.add_graphic(point(1.0, 1.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        model.set_changes_suspended(true);
        model.add_graphic(point(2.0, 2.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        model.set_changes_suspended(false);
        model.fire_changed();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_selection_listener_receives_selection() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(1.0, 1.0));
        model.add_graphic(point(2.0, 2.0));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        model.add_selection_listener(Arc::new(
            move |selected: &[Graphic], layer: Option<&MeasurableLayer>| {
                sink.lock().push((selected.len(), layer.map(|l| l.frame_index)));
            },
        ));

        model.set_selected_graphics(&[a, a]);
        let layer = MeasurableLayer { calibration: Default::default(), frame_index: 3 };
        model.fire_selection_changed(Some(&layer));
        assert_eq!(*seen.lock(), vec![(1, Some(3))]);
    }

    #[test]
    fn test_adjusting_drives_drag_flags() {
        let model = GraphicModel::default();
        let handle = model.add_graphic(Graphic::new(Shape::Line, vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]));

        model.begin_adjusting(handle);
        let drag = model.with_graphic(handle, |g| g.drag().cloned()).flatten().unwrap();
        assert!(drag.is_resizing_or_moving());
        assert!(!drag.is_complete());

        model.finish_adjusting(handle);
        let drag = model.with_graphic(handle, |g| g.drag().cloned()).flatten().unwrap();
        assert!(!drag.is_resizing_or_moving());
        assert!(drag.is_complete());
    }

    #[test]
    fn test_clear_and_dispose() {
        let model = GraphicModel::default();
        let a = model.add_graphic(point(1.0, 1.0));
        model.clear();
        assert!(model.is_empty());
        assert_eq!(model.layer_count(), 0);
        assert!(!model.contains(a));

        model.add_graphic(point(1.0, 1.0));
        model.dispose();
        assert!(model.is_empty());
    }

    #[test]
    fn test_concurrent_reader_sees_consistent_layers() {
        let model = Arc::new(GraphicModel::default());
        let reader = {
            let model = Arc::clone(&model);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let state = model.state.read();
                    for (_, graphic) in state.iter_graphics() {
                        let layer = graphic.layer().unwrap();
                        assert!(state.layers.contains(layer));
                    }
                }
            })
        };
        for i in 0..200 {
            let handle = model.add_graphic(point(i as f64, 0.0));
            if i % 2 == 0 {
                model.remove_graphic(handle);
            }
        }
        reader.join().unwrap();
        assert_eq!(model.graphic_count(), 100);
    }

    #[test]
    fn test_layer_type_delete_races_with_adds() {
        let model = Arc::new(GraphicModel::default());
        let writer = {
            let model = Arc::clone(&model);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    model.add_graphic(Graphic::new(Shape::Annotation, vec![Point::new(i as f64, 0.0)]));
                }
            })
        };
        for _ in 0..2000 {
            model.delete_by_layer_type(LayerType::Annotation);
        }
        writer.join().unwrap();

        let state = model.state.read();
        let orphans = state
            .iter_graphics()
            .filter(|(_, graphic)| !graphic.layer().is_some_and(|layer| state.layers.contains(layer)))
            .count();
        assert_eq!(orphans, 0);
    }

    proptest! {
        #[test]
        fn prop_all_graphics_in_insertion_order(xs in prop::collection::vec(0.0f64..1000.0, 0..30)) {
            let model = GraphicModel::default();
            let ids: Vec<GraphicId> = xs
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    let graphic = point(*x, i as f64);
                    let id = graphic.id();
                    model.add_graphic(graphic);
                    id
                })
                .collect();
            let listed: Vec<GraphicId> = model.all_graphics().iter().map(Graphic::id).collect();
            prop_assert_eq!(listed, ids);
        }

        #[test]
        fn prop_selection_is_exact(count in 1usize..20, picks in prop::collection::vec(0usize..40, 0..30)) {
            let model = GraphicModel::default();
            let handles: Vec<GraphicHandle> =
                (0..count).map(|i| model.add_graphic(point(i as f64, 0.0))).collect();
            let chosen: Vec<GraphicHandle> =
                picks.iter().filter_map(|i| handles.get(*i).copied()).collect();

            model.set_selected_graphics(&chosen);

            let expected: HashSet<GraphicHandle> = chosen.into_iter().collect();
            let actual: HashSet<GraphicHandle> = model.selected_handles().into_iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
