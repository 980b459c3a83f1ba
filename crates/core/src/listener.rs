//! Change notification
//!
//! Three independent listener kinds: selection changes, structural model
//! changes and property changes on individual graphics. Closures implement the
//! listener traits directly.

use std::sync::Arc;

use crate::graphic::{Graphic, GraphicId};
use crate::measure::Calibration;
use crate::model::GraphicModel;

/// Graphic property that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicProperty {
    Selected,
    Points,
    Paint,
    Label,
    /// The graphic is about to leave the model
    Removed,
}

/// Property change event delivered to graphic listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChange {
    pub graphic: GraphicId,
    pub property: GraphicProperty,
}

/// Image layer context handed to selection listeners
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurableLayer {
    pub calibration: Calibration,
    /// Zero-based frame index of the displayed image
    pub frame_index: usize,
}

/// Listener attached to graphics while they are in a model
pub trait GraphicChangeListener: Send + Sync {
    fn property_changed(&self, change: &PropertyChange);
}

impl<F> GraphicChangeListener for F
where
    F: Fn(&PropertyChange) + Send + Sync,
{
    fn property_changed(&self, change: &PropertyChange) {
        self(change)
    }
}

/// Listener for selection changes
pub trait GraphicSelectionListener: Send + Sync {
    fn selection_changed(&self, selected: &[Graphic], layer: Option<&MeasurableLayer>);
}

impl<F> GraphicSelectionListener for F
where
    F: Fn(&[Graphic], Option<&MeasurableLayer>) + Send + Sync,
{
    fn selection_changed(&self, selected: &[Graphic], layer: Option<&MeasurableLayer>) {
        self(selected, layer)
    }
}

/// Listener for structural model changes
pub trait GraphicModelChangeListener: Send + Sync {
    fn model_changed(&self, model: &GraphicModel);
}

impl<F> GraphicModelChangeListener for F
where
    F: Fn(&GraphicModel) + Send + Sync,
{
    fn model_changed(&self, model: &GraphicModel) {
        self(model)
    }
}

/// Listener registry, deduplicated by allocation identity
pub(crate) struct Listeners<L: ?Sized> {
    entries: Vec<Arc<L>>,
}

impl<L: ?Sized> Listeners<L> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn position(&self, listener: &Arc<L>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| std::ptr::addr_eq(Arc::as_ptr(entry), Arc::as_ptr(listener)))
    }

    /// Returns false when the listener was already registered
    pub(crate) fn add(&mut self, listener: Arc<L>) -> bool {
        if self.position(&listener).is_some() {
            return false;
        }
        self.entries.push(listener);
        true
    }

    pub(crate) fn remove(&mut self, listener: &Arc<L>) -> bool {
        match self.position(listener) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self::new()
    }
}
