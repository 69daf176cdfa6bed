use super::ids::ElementKey;
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A stored value together with its soft-delete flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<T> {
    value: T,
    is_deleted: bool,
}

impl<T> Element<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            is_deleted: false,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    /// Flags the element as deleted. Returns `false` if it already was.
    pub(crate) fn mark_deleted(&mut self) -> bool {
        !std::mem::replace(&mut self.is_deleted, true)
    }
}

/// Backing storage of a container.
///
/// Soft-deleted elements stay in `elements` until the owning container is
/// cleared or compacted, so they keep occupying slots and keep counting
/// toward growth of the slot map.
#[derive(Debug, Clone)]
pub(crate) struct Store<T> {
    pub(crate) elements: SlotMap<ElementKey, Element<T>>,
    pub(crate) deleted: usize,
}

impl<T> Store<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: SlotMap::with_capacity_and_key(capacity),
            deleted: 0,
        }
    }

    pub(crate) fn live(&self, key: ElementKey) -> Option<&Element<T>> {
        self.elements.get(key).filter(|element| element.is_live())
    }

    pub(crate) fn live_mut(&mut self, key: ElementKey) -> Option<&mut Element<T>> {
        self.elements.get_mut(key).filter(|element| element.is_live())
    }

    pub(crate) fn live_len(&self) -> usize {
        self.elements.len() - self.deleted
    }

    /// Drops every element, live or not.
    pub(crate) fn release(&mut self) {
        self.elements.clear();
        self.deleted = 0;
    }
}

pub(crate) type SharedStore<T> = Rc<RefCell<Store<T>>>;
