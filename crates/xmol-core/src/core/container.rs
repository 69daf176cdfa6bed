use super::config::{ContainerConfig, MAX_CAPACITY};
use super::element::{Element, SharedStore, Store};
use super::ids::{ContainerId, Handle};
use super::registry::Registry;
use super::selection::{ReadOnly, ReadWrite, Selection};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, instrument, trace};

/// Owning, growable element store that publishes its lifecycle to the
/// selections observing it.
///
/// Elements are addressed by generational [`Handle`]s, so growing the store
/// never disturbs existing selections. Erasing only flags elements; storage
/// is reclaimed by [`clear`](Self::clear) or [`compact`](Self::compact), both
/// of which continue under a fresh [`ContainerId`] and invalidate every
/// observer of the old one.
pub struct Container<T> {
    id: ContainerId,
    store: SharedStore<T>,
    registry: Registry,
    config: ContainerConfig,
}

impl<T> Container<T> {
    pub fn new(registry: &Registry) -> Self {
        Self::with_config(registry, ContainerConfig::default())
    }

    pub fn with_config(registry: &Registry, config: ContainerConfig) -> Self {
        let id = registry.with_mut(|r| r.register_subject());
        let capacity = config.initial_capacity.min(MAX_CAPACITY);
        trace!(container = ?id, capacity, label = ?config.label, "container created");
        Self {
            id,
            store: Rc::new(RefCell::new(Store::with_capacity(capacity))),
            registry: registry.clone(),
            config,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn label(&self) -> Option<&str> {
        self.config.label.as_deref()
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.store.borrow().live_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots currently reserved, including those held by erased elements.
    pub fn capacity(&self) -> usize {
        self.store.borrow().elements.capacity()
    }

    /// Erased elements still occupying storage.
    pub fn deleted_count(&self) -> usize {
        self.store.borrow().deleted
    }

    /// Selections currently subscribed to this container.
    pub fn observer_count(&self) -> usize {
        let id = self.id;
        self.registry.with(|r| r.observer_count(id))
    }

    /// Appends `value` and returns its handle.
    pub fn insert(&mut self, value: T) -> Handle {
        let key = self.store.borrow_mut().elements.insert(Element::new(value));
        trace!(container = ?self.id, ?key, "element inserted");
        Handle::new(self.id, key)
    }

    /// Appends a value built from `value`.
    pub fn emplace<V: Into<T>>(&mut self, value: V) -> Handle {
        self.insert(value.into())
    }

    /// Borrows the live element behind `handle`.
    ///
    /// Returns `None` for handles of other containers (including earlier
    /// identities of this one) and for erased elements.
    pub fn get(&self, handle: Handle) -> Option<Ref<'_, T>> {
        if handle.container() != self.id {
            return None;
        }
        Ref::filter_map(self.store.borrow(), |s| {
            s.live(handle.key()).map(Element::value)
        })
        .ok()
    }

    /// Soft-deletes every live element of this container that `selection`
    /// holds and returns how many were marked.
    ///
    /// Handles of other containers are ignored. Storage is not reclaimed and
    /// observers are not notified.
    ///
    /// # Panics
    ///
    /// If `selection` was created from a different registry, or if a value
    /// borrow into this container is outstanding.
    #[instrument(skip_all, fields(container = ?self.id, label = ?self.config.label))]
    pub fn erase(&mut self, selection: &Selection<T, ReadWrite>) -> usize {
        assert!(
            self.registry.same_as(selection.registry()),
            "cannot erase through a selection from a different registry"
        );
        let mut store = self.store.borrow_mut();
        let mut erased = 0;
        for handle in selection.handles().iter().filter(|h| h.container() == self.id) {
            if let Some(element) = store.elements.get_mut(handle.key()) {
                if element.mark_deleted() {
                    erased += 1;
                }
            }
        }
        store.deleted += erased;
        debug!(erased, remaining = store.live_len(), "elements erased");
        erased
    }

    /// Drops every element and continues under a fresh identity.
    ///
    /// Every observing selection becomes dangling.
    #[instrument(skip_all, fields(container = ?self.id, label = ?self.config.label))]
    pub fn clear(&mut self) {
        let capacity = self.config.initial_capacity.min(MAX_CAPACITY);
        let invalidated = self.replace_store(Store::with_capacity(capacity));
        debug!(invalidated, new_id = ?self.id, "container cleared");
    }

    /// Physically removes erased elements, keeping survivors in order under
    /// a fresh identity. Returns the number of removed elements.
    ///
    /// Does nothing (and invalidates nothing) when no element is erased.
    #[instrument(skip_all, fields(container = ?self.id, label = ?self.config.label))]
    pub fn compact(&mut self) -> usize {
        let removed = self.store.borrow().deleted;
        if removed == 0 {
            return 0;
        }

        let capacity = self.len().max(self.config.initial_capacity).min(MAX_CAPACITY);
        let mut compacted = Store::with_capacity(capacity);
        {
            let mut old = self.store.borrow_mut();
            let survivors = std::mem::take(&mut old.elements);
            old.deleted = 0;
            for (_, element) in survivors.into_iter().filter(|(_, e)| e.is_live()) {
                compacted.elements.insert(element);
            }
        }
        let invalidated = self.replace_store(compacted);
        debug!(removed, invalidated, new_id = ?self.id, "container compacted");
        removed
    }

    /// Selects every live element, in storage order.
    pub fn all(&mut self) -> Selection<T, ReadWrite> {
        Selection::from_store(&self.registry, self.id, &self.store)
    }

    /// Selects every live element without write access.
    pub fn all_read_only(&self) -> Selection<T, ReadOnly> {
        Selection::from_store(&self.registry, self.id, &self.store)
    }

    /// Moves the elements and the identity into the returned container.
    ///
    /// Observers follow the elements and stay valid. `self` is left as an
    /// empty container under a fresh identity.
    pub fn take(&mut self) -> Self {
        let fresh_id = self.registry.with_mut(|r| r.register_subject());
        let capacity = self.config.initial_capacity.min(MAX_CAPACITY);
        let fresh_store = Rc::new(RefCell::new(Store::with_capacity(capacity)));
        let taken = Self {
            id: std::mem::replace(&mut self.id, fresh_id),
            store: std::mem::replace(&mut self.store, fresh_store),
            registry: self.registry.clone(),
            config: self.config.clone(),
        };
        trace!(container = ?taken.id, left_behind = ?self.id, "container taken");
        taken
    }

    /// Swaps in `store` under a new identity, retiring the old identity and
    /// releasing the old elements. Returns the number of invalidated
    /// observers.
    fn replace_store(&mut self, store: Store<T>) -> usize {
        let new_id = self.registry.with_mut(|r| r.register_subject());
        let old_id = std::mem::replace(&mut self.id, new_id);
        let old_store = std::mem::replace(&mut self.store, Rc::new(RefCell::new(store)));

        let invalidated = self.registry.with_mut(|r| r.destroy_subject(old_id));
        release(&old_store);
        invalidated
    }
}

/// Drops the values of a retired store. Selections may still hold the shell;
/// they find it empty. A store borrowed elsewhere is left to its last owner.
fn release<T>(store: &SharedStore<T>) {
    if let Ok(mut store) = store.try_borrow_mut() {
        store.release();
    }
}

impl<T> Extend<T> for Container<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T: Clone> Clone for Container<T> {
    /// Deep-copies values and deletion flags under a new identity with no
    /// observers.
    fn clone(&self) -> Self {
        let id = self.registry.with_mut(|r| r.register_subject());
        Self {
            id,
            store: Rc::new(RefCell::new(self.store.borrow().clone())),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T> Drop for Container<T> {
    fn drop(&mut self) {
        let id = self.id;
        let invalidated = self.registry.with_mut(|r| r.destroy_subject(id));
        if invalidated > 0 {
            debug!(container = ?id, label = ?self.config.label, invalidated, "container dropped");
        }
        release(&self.store);
    }
}

impl<T> fmt::Debug for Container<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.try_borrow();
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("len", &store.as_ref().map(|s| s.live_len()).ok())
            .field("deleted", &store.as_ref().map(|s| s.deleted).ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SelectionError;

    fn container_with(registry: &Registry, values: std::ops::Range<i32>) -> Container<i32> {
        let mut container = Container::new(registry);
        container.extend(values);
        container
    }

    mod growth {
        use super::*;

        #[test]
        fn selection_survives_storage_growth() {
            let registry = Registry::new();
            let mut container: Container<String> = Container::new(&registry);
            container.emplace("v0");
            container.emplace("v1");
            container.emplace("v2");
            let selection = container.all();
            assert_eq!(selection.len(), 3);
            assert_eq!(*selection.get(0).unwrap(), "v0");
            let capacity_before = container.capacity();

            for i in 0..1000 {
                container.emplace(format!("extra{i}"));
            }

            assert!(container.capacity() > capacity_before);
            assert!(selection.is_valid());
            assert_eq!(selection.len(), 3);
            assert_eq!(*selection.get(0).unwrap(), "v0");
            assert_eq!(*selection.get(2).unwrap(), "v2");
        }

        #[test]
        fn with_config_reserves_initial_capacity() {
            let registry = Registry::new();
            let config = ContainerConfig::builder()
                .initial_capacity(128)
                .label("atoms")
                .build()
                .unwrap();

            let container: Container<u8> = Container::with_config(&registry, config);

            assert!(container.capacity() >= 128);
            assert_eq!(container.label(), Some("atoms"));
            assert!(container.is_empty());
        }

        #[test]
        fn get_looks_up_live_elements_by_handle() {
            let registry = Registry::new();
            let mut container = Container::new(&registry);
            let handle = container.insert(5);
            let other = container_with(&registry, 0..1).all_read_only().handles()[0];

            assert_eq!(*container.get(handle).unwrap(), 5);
            assert!(container.get(other).is_none());
        }
    }

    mod erasure {
        use super::*;

        #[test]
        fn erase_lowers_len_by_the_number_of_live_elements() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..10);
            let odd = container.all().filter(|v| v % 2 == 1).unwrap();

            assert_eq!(container.erase(&odd), 5);

            assert_eq!(container.len(), 5);
            assert_eq!(container.deleted_count(), 5);
            assert!(odd.is_valid());
            assert_eq!(
                odd.get(0).unwrap_err(),
                SelectionError::DanglingElement { index: 0 }
            );
        }

        #[test]
        fn erasing_twice_marks_each_element_once() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..3);
            let all = container.all();

            assert_eq!(container.erase(&all), 3);
            assert_eq!(container.erase(&all), 0);
            assert_eq!(container.len(), 0);
            assert_eq!(container.deleted_count(), 3);
        }

        #[test]
        fn erase_ignores_handles_of_other_containers() {
            let registry = Registry::new();
            let mut first = container_with(&registry, 0..2);
            let mut second = container_with(&registry, 0..3);
            let both = &first.all() + &second.all();

            assert_eq!(first.erase(&both), 2);
            assert_eq!(second.len(), 3);
        }

        #[test]
        fn erased_handles_no_longer_resolve() {
            let registry = Registry::new();
            let mut container = Container::new(&registry);
            let handle = container.insert(1);
            let all = container.all();

            container.erase(&all);

            assert!(container.get(handle).is_none());
        }

        #[test]
        #[should_panic(expected = "different registry")]
        fn erase_through_foreign_registry_panics() {
            let mut container = container_with(&Registry::new(), 0..1);
            let mut foreign = container_with(&Registry::new(), 0..1);
            let selection = foreign.all();
            container.erase(&selection);
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn drop_invalidates_every_observer() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..3);
            let first = container.all();
            let second = container.all_read_only();

            drop(container);

            assert!(!first.is_valid());
            assert!(!second.is_valid());
            assert_eq!(first.len(), 3);
            assert!(matches!(
                first.get(0),
                Err(SelectionError::StaleReference { .. })
            ));
        }

        #[test]
        fn clear_invalidates_and_continues_under_a_new_identity() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..3);
            let old_id = container.id();
            let selection = container.all();
            let stale_handle = selection.handles()[0];

            container.clear();

            assert!(!selection.is_valid());
            assert!(matches!(
                selection.iter(),
                Err(SelectionError::StaleReference { .. })
            ));
            assert_eq!(container.len(), 0);
            assert_eq!(container.deleted_count(), 0);
            assert_ne!(container.id(), old_id);
            assert_eq!(container.observer_count(), 0);

            container.extend(10..12);
            assert_eq!(container.len(), 2);
            assert!(container.get(stale_handle).is_none());
            assert_eq!(*container.all().get(0).unwrap(), 10);
        }

        #[test]
        fn compact_drops_erased_elements_and_keeps_order() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..6);
            let even = container.all().filter(|v| v % 2 == 0).unwrap();
            container.erase(&even);

            assert_eq!(container.compact(), 3);

            assert!(!even.is_valid());
            assert_eq!(container.len(), 3);
            assert_eq!(container.deleted_count(), 0);
            let survivors: Vec<i32> = container
                .all()
                .iter()
                .unwrap()
                .map(|v| *v.unwrap())
                .collect();
            assert_eq!(survivors, vec![1, 3, 5]);
        }

        #[test]
        fn compact_without_erasures_is_a_no_op() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..2);
            let id = container.id();
            let selection = container.all();

            assert_eq!(container.compact(), 0);

            assert!(selection.is_valid());
            assert_eq!(container.id(), id);
        }

        #[test]
        fn move_keeps_observers_valid() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..2);
            let selection = container.all();

            let moved = container;

            assert!(selection.is_valid());
            assert_eq!(moved.observer_count(), 1);
            assert_eq!(*selection.get(1).unwrap(), 1);
        }

        #[test]
        fn take_hands_identity_and_observers_to_the_result() {
            let registry = Registry::new();
            let mut source = container_with(&registry, 0..2);
            let id = source.id();
            let selection = source.all();

            let taken = source.take();

            assert_eq!(taken.id(), id);
            assert_ne!(source.id(), id);
            assert!(source.is_empty());
            assert_eq!(taken.len(), 2);
            assert_eq!(taken.observer_count(), 1);

            drop(source);
            assert!(selection.is_valid());
            drop(taken);
            assert!(!selection.is_valid());
        }

        #[test]
        fn clone_copies_values_and_flags_without_observers() {
            let registry = Registry::new();
            let mut original = container_with(&registry, 0..3);
            let first = original.all().filter(|v| *v == 0).unwrap();
            original.erase(&first);

            let copy = original.clone();

            assert_ne!(copy.id(), original.id());
            assert_eq!(copy.len(), 2);
            assert_eq!(copy.deleted_count(), 1);
            assert_eq!(copy.observer_count(), 0);
            drop(copy);
            assert!(first.is_valid());
        }

        #[test]
        #[should_panic]
        fn mutation_while_a_value_is_borrowed_panics() {
            let registry = Registry::new();
            let mut container = container_with(&registry, 0..1);
            let selection = container.all();
            let _value = selection.get(0).unwrap();
            container.insert(1);
        }
    }

    mod logging {
        use super::*;
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        #[test]
        fn structural_events_are_logged_with_the_label() {
            let captured = Captured::default();
            let writer = captured.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();

            tracing::subscriber::with_default(subscriber, || {
                let registry = Registry::new();
                let config = ContainerConfig::builder().label("frames").build().unwrap();
                let mut container = Container::with_config(&registry, config);
                container.extend(0..4);
                let selection = container.all();
                container.erase(&selection);
                container.clear();
            });

            let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
            assert!(output.contains("elements erased"));
            assert!(output.contains("container cleared"));
            assert!(output.contains("frames"));
        }
    }

    #[test]
    fn debug_output_reports_sizes() {
        let registry = Registry::new();
        let container = container_with(&registry, 0..2);
        let rendered = format!("{container:?}");
        assert!(rendered.contains("len: Some(2)"));
        assert!(rendered.contains("deleted: Some(0)"));
    }
}
