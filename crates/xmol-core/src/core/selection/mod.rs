//! # Selections
//!
//! A [`Selection`] is a non-owning, ordered, deduplicated view over elements
//! stored in one or more [`Container`](super::container::Container)s.
//!
//! ## Tracking
//!
//! Every selection is registered as an observer in the shared
//! [`Registry`] and subscribes to each container that contributes at least
//! one handle to it. When such a container is dropped, cleared or compacted,
//! the registry flips the selection to [`SelectionState::Dangling`]; from then
//! on value access and iteration fail with
//! [`SelectionError::StaleReference`] until the selection is cleared.
//!
//! Handles are generational, so growth of a container never disturbs a
//! selection. Soft-deleted elements stay in the selection and fail
//! individually with [`SelectionError::DanglingElement`].
//!
//! ## Capabilities
//!
//! The access parameter `A` is either [`ReadWrite`] or [`ReadOnly`]. Only
//! read-write selections hand out mutable borrows or can be passed to
//! `Container::erase`. Mixing capabilities in set algebra yields the more
//! restrictive one (see [`Meet`]).

use super::element::{Element, SharedStore};
use super::error::{Result, SelectionError};
use super::ids::{ContainerId, Handle, SelectionId};
use super::registry::{Registry, SelectionState};
use std::cell::{Ref, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tracing::trace;

mod access;
mod algebra;
mod range;

pub use access::{Access, CoercesTo, Meet, ReadOnly, ReadWrite};
pub use range::SelectionRange;

/// Registry identity, handle list and store links of a selection.
///
/// Kept apart from [`Selection`] so that the capability marker can be
/// swapped without running the unsubscribe-on-drop logic.
struct Tracking<T> {
    id: SelectionId,
    registry: Registry,
    handles: Vec<Handle>,
    sources: BTreeMap<ContainerId, SharedStore<T>>,
}

impl<T> Tracking<T> {
    fn new(registry: &Registry, state: SelectionState) -> Self {
        let id = registry.with_mut(|r| r.register_observer(state));
        Self {
            id,
            registry: registry.clone(),
            handles: Vec::new(),
            sources: BTreeMap::new(),
        }
    }
}

impl<T> Drop for Tracking<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.registry.with_mut(|r| r.retire_observer(id));
    }
}

pub struct Selection<T, A: Access = ReadWrite> {
    tracking: Tracking<T>,
    _access: PhantomData<A>,
}

impl<T, A: Access> Selection<T, A> {
    /// Creates an empty, valid selection that observes nothing.
    pub fn new(registry: &Registry) -> Self {
        Self::from_tracking(Tracking::new(registry, SelectionState::Ok))
    }

    fn from_tracking(tracking: Tracking<T>) -> Self {
        Self {
            tracking,
            _access: PhantomData,
        }
    }

    /// Selects every live element of a container's store.
    ///
    /// The selection subscribes to the container only when it is non-empty.
    pub(crate) fn from_store(
        registry: &Registry,
        container: ContainerId,
        store: &SharedStore<T>,
    ) -> Self {
        let mut tracking = Tracking::new(registry, SelectionState::Ok);
        tracking.handles = store
            .borrow()
            .elements
            .iter()
            .filter(|(_, element)| element.is_live())
            .map(|(key, _)| Handle::new(container, key))
            .collect();
        tracking.handles.sort_unstable();

        if !tracking.handles.is_empty() {
            tracking.sources.insert(container, Rc::clone(store));
            let id = tracking.id;
            registry.with_mut(|r| r.subscribe(container, id));
        }
        Self::from_tracking(tracking)
    }

    fn retag<B: Access>(self) -> Selection<T, B> {
        Selection {
            tracking: self.tracking,
            _access: PhantomData,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.tracking.registry
    }

    pub fn state(&self) -> SelectionState {
        let id = self.tracking.id;
        self.tracking.registry.with(|r| r.state(id))
    }

    /// `false` once any observed container has been destroyed, cleared or
    /// compacted.
    pub fn is_valid(&self) -> bool {
        self.state() == SelectionState::Ok
    }

    /// Number of handles. Does not check validity: a dangling selection
    /// reports its last-known size.
    pub fn len(&self) -> usize {
        self.tracking.handles.len()
    }

    /// Does not check validity, see [`Selection::len`].
    pub fn is_empty(&self) -> bool {
        self.tracking.handles.is_empty()
    }

    /// The handles in identity order.
    pub fn handles(&self) -> &[Handle] {
        &self.tracking.handles
    }

    /// Containers this selection currently observes.
    pub fn observed_containers(&self) -> impl Iterator<Item = ContainerId> + '_ {
        self.tracking.sources.keys().copied()
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.tracking.handles.binary_search(handle).is_ok()
    }

    /// Borrows the value at `index`. Negative indices count from the back.
    pub fn get(&self, index: isize) -> Result<Ref<'_, T>> {
        self.ensure_valid("get")?;
        let pos = self.resolve_index(index)?;
        self.value_at(pos)
    }

    /// Returns 1 if a live element equal to `value` is selected, 0 otherwise.
    pub fn count(&self, value: &T) -> Result<usize>
    where
        T: PartialEq,
    {
        self.ensure_valid("count")?;
        for pos in 0..self.len() {
            if self.live_value_at(pos)?.is_some_and(|v| *v == *value) {
                return Ok(1);
            }
        }
        Ok(0)
    }

    /// Cursor at the first handle, stepping forward.
    pub fn begin(&self) -> Result<SelectionRange<'_, T, A>> {
        self.ensure_valid("begin")?;
        Ok(SelectionRange::new(self, 0, self.len() as isize, 1))
    }

    /// Cursor one past the last handle.
    pub fn end(&self) -> Result<SelectionRange<'_, T, A>> {
        self.ensure_valid("end")?;
        let len = self.len() as isize;
        Ok(SelectionRange::new(self, len, len, 1))
    }

    pub fn iter(&self) -> Result<SelectionRange<'_, T, A>> {
        self.ensure_valid("iter")?;
        Ok(SelectionRange::new(self, 0, self.len() as isize, 1))
    }

    pub fn iter_rev(&self) -> Result<SelectionRange<'_, T, A>> {
        self.slice(None, None, -1)
    }

    /// Stepped cursor with slice semantics: negative bounds count from the
    /// back, out-of-range bounds are clamped, and a negative `step` walks
    /// backwards (with `start` defaulting to the last handle). A zero step,
    /// or `isize::MIN` which has no positive counterpart, is rejected.
    pub fn slice(
        &self,
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    ) -> Result<SelectionRange<'_, T, A>> {
        self.ensure_valid("slice")?;
        if step == 0 || step == isize::MIN {
            return Err(SelectionError::InvalidStep);
        }
        let len = self.len() as isize;
        let clamp = |index: isize, lower: isize, upper: isize| {
            let index = if index < 0 { index + len } else { index };
            index.clamp(lower, upper)
        };
        let (start, stop) = if step > 0 {
            (
                start.map_or(0, |i| clamp(i, 0, len)),
                stop.map_or(len, |i| clamp(i, 0, len)),
            )
        } else {
            (
                start.map_or(len - 1, |i| clamp(i, -1, len - 1)),
                stop.map_or(-1, |i| clamp(i, -1, len - 1)),
            )
        };
        Ok(SelectionRange::new(self, start, stop, step))
    }

    /// A new selection keeping the live elements that satisfy `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> Result<Self>
    where
        F: FnMut(&T) -> bool,
    {
        self.ensure_valid("filter")?;
        let mut kept: Vec<Handle> = Vec::new();
        for (pos, handle) in self.tracking.handles.iter().enumerate() {
            if self.live_value_at(pos)?.is_some_and(|v| predicate(&*v)) {
                kept.push(*handle);
            }
        }

        let mut result = self.clone();
        result.tracking.handles = kept;
        result.prune_redundant_observers();
        Ok(result)
    }

    /// Drops every handle and subscription and returns to the valid state.
    pub fn clear(&mut self) {
        self.tracking.handles.clear();
        self.tracking.sources.clear();
        let id = self.tracking.id;
        self.tracking.registry.with_mut(|r| {
            r.unsubscribe_all(id);
            r.set_state(id, SelectionState::Ok);
        });
        trace!(selection = ?id, "selection cleared");
    }

    /// Moves the contents into a new selection identity.
    ///
    /// Subscriptions and state are rebound to the returned selection; `self`
    /// is left empty, valid and unsubscribed.
    pub fn take(&mut self) -> Self {
        let registry = self.tracking.registry.clone();
        let mut taken = Tracking::new(&registry, SelectionState::Ok);
        registry.with_mut(|r| r.rebind(self.tracking.id, taken.id));
        taken.handles = std::mem::take(&mut self.tracking.handles);
        taken.sources = std::mem::take(&mut self.tracking.sources);
        Self::from_tracking(taken)
    }

    /// A read-only copy observing the same containers.
    pub fn to_read_only(&self) -> Selection<T, ReadOnly> {
        self.clone().retag()
    }

    fn ensure_valid(&self, operation: &'static str) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SelectionError::StaleReference { operation })
        }
    }

    fn resolve_index(&self, index: isize) -> Result<usize> {
        let len = self.len();
        let signed_len = len as isize;
        if index < -signed_len || index >= signed_len {
            return Err(SelectionError::OutOfRange { index, len });
        }
        Ok(if index < 0 {
            (signed_len + index) as usize
        } else {
            index as usize
        })
    }

    fn store_of(&self, pos: usize) -> Result<(Handle, &SharedStore<T>)> {
        let handle = *self
            .tracking
            .handles
            .get(pos)
            .ok_or(SelectionError::OutOfRange {
                index: pos as isize,
                len: self.len(),
            })?;
        let store = self
            .tracking
            .sources
            .get(&handle.container())
            .ok_or(SelectionError::DanglingElement { index: pos })?;
        Ok((handle, store))
    }

    /// Borrows the value behind the handle at `pos` without checking the
    /// selection state.
    fn value_at(&self, pos: usize) -> Result<Ref<'_, T>> {
        let (handle, store) = self.store_of(pos)?;
        let store = store
            .try_borrow()
            .map_err(|_| SelectionError::Borrowed { index: pos })?;
        Ref::filter_map(store, |s| s.live(handle.key()).map(Element::value))
            .map_err(|_| SelectionError::DanglingElement { index: pos })
    }

    /// Like [`value_at`](Self::value_at), but an erased element is `None`
    /// rather than an error.
    fn live_value_at(&self, pos: usize) -> Result<Option<Ref<'_, T>>> {
        match self.value_at(pos) {
            Ok(value) => Ok(Some(value)),
            Err(SelectionError::DanglingElement { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn assert_same_registry<B: Access>(&self, other: &Selection<T, B>) {
        assert!(
            self.tracking.registry.same_as(&other.tracking.registry),
            "selections from different registries cannot be combined"
        );
    }

    /// Unsubscribes from every observed container that no longer contributes
    /// a handle.
    fn prune_redundant_observers(&mut self) {
        let contributing: BTreeSet<ContainerId> =
            self.tracking.handles.iter().map(Handle::container).collect();
        let redundant: Vec<ContainerId> = self
            .tracking
            .sources
            .keys()
            .filter(|container| !contributing.contains(container))
            .copied()
            .collect();
        if redundant.is_empty() {
            return;
        }

        for container in &redundant {
            self.tracking.sources.remove(container);
        }
        let id = self.tracking.id;
        self.tracking.registry.with_mut(|r| {
            for &container in &redundant {
                r.unsubscribe(container, id);
            }
        });
        trace!(selection = ?id, pruned = redundant.len(), "redundant observers pruned");
    }
}

impl<T> Selection<T, ReadWrite> {
    /// Mutably borrows the value at `index`. Negative indices count from the
    /// back.
    pub fn get_mut(&self, index: isize) -> Result<RefMut<'_, T>> {
        self.ensure_valid("get_mut")?;
        let pos = self.resolve_index(index)?;
        self.value_at_mut(pos)
    }

    fn value_at_mut(&self, pos: usize) -> Result<RefMut<'_, T>> {
        let (handle, store) = self.store_of(pos)?;
        let store = store
            .try_borrow_mut()
            .map_err(|_| SelectionError::Borrowed { index: pos })?;
        RefMut::filter_map(store, |s| {
            s.live_mut(handle.key()).map(Element::value_mut)
        })
        .map_err(|_| SelectionError::DanglingElement { index: pos })
    }
}

impl<T, A: Access> Clone for Selection<T, A> {
    /// Copies the handles and the state and subscribes the copy to every
    /// container the original observes.
    fn clone(&self) -> Self {
        let registry = &self.tracking.registry;
        let mut tracking = Tracking::new(registry, self.state());
        tracking.handles = self.tracking.handles.clone();
        tracking.sources = self.tracking.sources.clone();

        let id = tracking.id;
        let containers: Vec<ContainerId> = tracking.sources.keys().copied().collect();
        registry.with_mut(|r| {
            for container in containers {
                r.subscribe(container, id);
            }
        });
        Self::from_tracking(tracking)
    }
}

impl<T> From<Selection<T, ReadWrite>> for Selection<T, ReadOnly> {
    fn from(selection: Selection<T, ReadWrite>) -> Self {
        selection.retag()
    }
}

impl<T, A: Access, B: Access> PartialEq<Selection<T, B>> for Selection<T, A> {
    /// Selections are equal when they hold the same handles.
    fn eq(&self, other: &Selection<T, B>) -> bool {
        self.tracking.handles == other.tracking.handles
    }
}

impl<T, A: Access> Eq for Selection<T, A> {}

impl<T, A: Access> fmt::Debug for Selection<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("id", &self.tracking.id)
            .field("access", &A::NAME)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}
