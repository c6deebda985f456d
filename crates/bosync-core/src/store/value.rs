use std::sync::Arc;

use super::meta::{HasMeta, ResourceMeta};
use super::remote::{RemoteCell, RemoteResource};

/// Snapshot of a [`ResourceValue`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValueState<V> {
    pub meta: ResourceMeta,
    /// Latest pushed value, replaced wholesale on each update.
    pub value: Option<V>,
}

impl<V> Default for ValueState<V> {
    fn default() -> Self {
        Self {
            meta: ResourceMeta::default(),
            value: None,
        }
    }
}

impl<V> HasMeta for ValueState<V> {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}

/// Unconditionally replace the value.
pub fn set_value<V>(state: &mut ValueState<V>, value: V) {
    state.value = Some(value);
}

/// A single server-pushed value.
pub struct ResourceValue<V: Clone + Send + Sync + 'static> {
    cell: Arc<RemoteCell<ValueState<V>>>,
}

impl<V: Clone + Send + Sync + 'static> ResourceValue<V> {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(RemoteCell::new(ValueState::default())),
        }
    }

    /// The last known value. Survives stream close and stream errors.
    pub fn value(&self) -> Option<V> {
        self.cell.state.borrow().value.clone()
    }

    pub fn state(&self) -> ValueState<V> {
        self.cell.state.borrow().clone()
    }

    /// Replace the value and mark the resource fresh.
    pub fn set_value(&self, value: V) {
        self.cell.state.send_modify(|state| {
            set_value(state, value);
            state.meta.touch();
        });
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ResourceValue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> RemoteResource for ResourceValue<V> {
    type State = ValueState<V>;

    fn remote(&self) -> &Arc<RemoteCell<ValueState<V>>> {
        &self.cell
    }
}
