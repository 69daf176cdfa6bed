use super::ids::{ContainerId, SelectionId};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::trace;

/// Validity of a selection as seen by the containers it observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionState {
    /// Every observed container is alive.
    #[default]
    Ok,
    /// At least one observed container was destroyed, cleared or compacted.
    /// Only an explicit `clear()` of the selection leaves this state.
    Dangling,
}

#[derive(Debug, Default)]
struct SubjectEntry {
    observers: BTreeSet<SelectionId>,
}

#[derive(Debug, Default)]
struct ObserverEntry {
    state: SelectionState,
    subjects: BTreeSet<ContainerId>,
}

/// Bidirectional subscription bookkeeping between containers (subjects) and
/// selections (observers).
///
/// Both directions are indexed so that a container can reach every selection
/// that observes it, and a selection can enumerate the containers it is
/// subscribed to. The registry also owns the [`SelectionState`] of every
/// observer, which lets a container invalidate a selection without holding
/// any reference to it.
///
/// All operations are idempotent bookkeeping and cannot fail. Operations on a
/// retired id are no-ops.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    subjects: SlotMap<ContainerId, SubjectEntry>,
    observers: SlotMap<SelectionId, ObserverEntry>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh subject identity with no observers.
    pub(crate) fn register_subject(&mut self) -> ContainerId {
        self.subjects.insert(SubjectEntry::default())
    }

    /// Allocates a fresh observer identity in the given state.
    pub(crate) fn register_observer(&mut self, state: SelectionState) -> SelectionId {
        self.observers.insert(ObserverEntry {
            state,
            subjects: BTreeSet::new(),
        })
    }

    pub fn contains_subject(&self, subject: ContainerId) -> bool {
        self.subjects.contains_key(subject)
    }

    pub fn contains_observer(&self, observer: SelectionId) -> bool {
        self.observers.contains_key(observer)
    }

    /// Links `observer` to `subject`.
    ///
    /// Subscribing to a retired subject does nothing: there is nothing left
    /// that could ever notify the observer.
    pub(crate) fn subscribe(&mut self, subject: ContainerId, observer: SelectionId) {
        let (Some(subject_entry), Some(observer_entry)) = (
            self.subjects.get_mut(subject),
            self.observers.get_mut(observer),
        ) else {
            return;
        };
        if subject_entry.observers.insert(observer) {
            observer_entry.subjects.insert(subject);
            trace!(?subject, ?observer, "subscribed");
        }
    }

    /// Removes the link between `observer` and `subject`, if any.
    pub(crate) fn unsubscribe(&mut self, subject: ContainerId, observer: SelectionId) {
        if let Some(entry) = self.subjects.get_mut(subject) {
            entry.observers.remove(&observer);
        }
        if let Some(entry) = self.observers.get_mut(observer) {
            if entry.subjects.remove(&subject) {
                trace!(?subject, ?observer, "unsubscribed");
            }
        }
    }

    /// Removes every link of `observer`, leaving its state untouched.
    pub(crate) fn unsubscribe_all(&mut self, observer: SelectionId) {
        let Some(entry) = self.observers.get_mut(observer) else {
            return;
        };
        for subject in std::mem::take(&mut entry.subjects) {
            if let Some(subject_entry) = self.subjects.get_mut(subject) {
                subject_entry.observers.remove(&observer);
            }
        }
    }

    /// Moves every link and the state of `old` onto `new`.
    ///
    /// Afterwards `old` has no subscriptions and is back in
    /// [`SelectionState::Ok`]; `new` observes exactly what `old` observed.
    pub(crate) fn rebind(&mut self, old: SelectionId, new: SelectionId) {
        if old == new || !self.observers.contains_key(new) {
            return;
        }
        let Some(old_entry) = self.observers.get_mut(old) else {
            return;
        };
        let subjects = std::mem::take(&mut old_entry.subjects);
        let state = std::mem::take(&mut old_entry.state);

        for &subject in &subjects {
            if let Some(subject_entry) = self.subjects.get_mut(subject) {
                subject_entry.observers.remove(&old);
                subject_entry.observers.insert(new);
            }
        }
        if let Some(new_entry) = self.observers.get_mut(new) {
            new_entry.subjects.extend(subjects);
            new_entry.state = state;
        }
        trace!(?old, ?new, "observer rebound");
    }

    /// Invokes `handler` on every observer of `subject`.
    ///
    /// With `alive_only`, observers already in [`SelectionState::Dangling`]
    /// are skipped. Returns the number of observers the handler ran on.
    pub(crate) fn notify_all<F>(
        &mut self,
        subject: ContainerId,
        alive_only: bool,
        mut handler: F,
    ) -> usize
    where
        F: FnMut(SelectionId, &mut SelectionState),
    {
        let Some(subject_entry) = self.subjects.get(subject) else {
            return 0;
        };
        let mut notified = 0;
        for &observer in &subject_entry.observers {
            let Some(entry) = self.observers.get_mut(observer) else {
                continue;
            };
            if alive_only && entry.state == SelectionState::Dangling {
                continue;
            }
            handler(observer, &mut entry.state);
            notified += 1;
        }
        notified
    }

    /// Retires `subject`, marking every observer that still tracks it as
    /// dangling and dropping all of its links.
    ///
    /// Returns the number of observers that were linked to the subject.
    pub(crate) fn destroy_subject(&mut self, subject: ContainerId) -> usize {
        let linked = self.observer_count(subject);
        self.notify_all(subject, false, |_, state| *state = SelectionState::Dangling);

        if let Some(entry) = self.subjects.remove(subject) {
            for observer in entry.observers {
                if let Some(observer_entry) = self.observers.get_mut(observer) {
                    observer_entry.subjects.remove(&subject);
                }
            }
        }
        trace!(?subject, linked, "subject destroyed");
        linked
    }

    /// Unlinks and forgets `observer`.
    pub(crate) fn retire_observer(&mut self, observer: SelectionId) {
        self.unsubscribe_all(observer);
        self.observers.remove(observer);
    }

    /// The state of `observer`. Retired observers report `Ok`.
    pub fn state(&self, observer: SelectionId) -> SelectionState {
        self.observers
            .get(observer)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    pub(crate) fn set_state(&mut self, observer: SelectionId, state: SelectionState) {
        if let Some(entry) = self.observers.get_mut(observer) {
            entry.state = state;
        }
    }

    pub fn observer_count(&self, subject: ContainerId) -> usize {
        self.subjects
            .get(subject)
            .map_or(0, |entry| entry.observers.len())
    }

    pub fn observers_of(&self, subject: ContainerId) -> Vec<SelectionId> {
        self.subjects
            .get(subject)
            .map(|entry| entry.observers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn subjects_of(&self, observer: SelectionId) -> Vec<ContainerId> {
        self.observers
            .get(observer)
            .map(|entry| entry.subjects.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Shared handle to an [`ObserverRegistry`].
///
/// Containers and selections that interact must be created from clones of
/// the same `Registry`. Cloning is cheap and every clone refers to the same
/// bookkeeping.
///
/// Outside this crate the bookkeeping is read-only. Only a container or the
/// selection itself can change a selection's state:
///
/// ```compile_fail
/// use xmolpp::{Container, Registry, SelectionState};
///
/// let registry = Registry::new();
/// let mut atoms = Container::new(&registry);
/// atoms.insert("CA");
/// let selection = atoms.all();
/// let observers = registry.with(|r| r.observers_of(atoms.id()));
/// drop(atoms);
///
/// registry.with_mut(|r| r.set_state(observers[0], SelectionState::Ok));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Rc<RefCell<ObserverRegistry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `self` and `other` share the same bookkeeping.
    pub fn same_as(&self, other: &Registry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn with<R>(&self, f: impl FnOnce(&ObserverRegistry) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut ObserverRegistry) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(
        subjects: usize,
        observers: usize,
    ) -> (ObserverRegistry, Vec<ContainerId>, Vec<SelectionId>) {
        let mut registry = ObserverRegistry::new();
        let s = (0..subjects).map(|_| registry.register_subject()).collect();
        let o = (0..observers)
            .map(|_| registry.register_observer(SelectionState::Ok))
            .collect();
        (registry, s, o)
    }

    mod subscriptions {
        use super::*;

        #[test]
        fn subscribe_is_idempotent_and_bidirectional() {
            let (mut registry, s, o) = registry_with(1, 1);

            registry.subscribe(s[0], o[0]);
            registry.subscribe(s[0], o[0]);

            assert_eq!(registry.observer_count(s[0]), 1);
            assert_eq!(registry.subjects_of(o[0]), vec![s[0]]);
            assert_eq!(registry.observers_of(s[0]), vec![o[0]]);
        }

        #[test]
        fn unsubscribing_an_absent_pair_is_a_no_op() {
            let (mut registry, s, o) = registry_with(2, 1);
            registry.subscribe(s[0], o[0]);

            registry.unsubscribe(s[1], o[0]);

            assert_eq!(registry.subjects_of(o[0]), vec![s[0]]);
            assert_eq!(registry.observer_count(s[1]), 0);
        }

        #[test]
        fn subscribing_to_a_destroyed_subject_does_nothing() {
            let (mut registry, s, o) = registry_with(1, 1);
            registry.destroy_subject(s[0]);

            registry.subscribe(s[0], o[0]);

            assert!(registry.subjects_of(o[0]).is_empty());
            assert!(!registry.contains_subject(s[0]));
        }

        #[test]
        fn unsubscribe_all_keeps_state() {
            let (mut registry, s, o) = registry_with(2, 1);
            registry.subscribe(s[0], o[0]);
            registry.subscribe(s[1], o[0]);
            registry.set_state(o[0], SelectionState::Dangling);

            registry.unsubscribe_all(o[0]);

            assert!(registry.subjects_of(o[0]).is_empty());
            assert_eq!(registry.observer_count(s[0]), 0);
            assert_eq!(registry.state(o[0]), SelectionState::Dangling);
        }
    }

    mod notification {
        use super::*;

        #[test]
        fn notify_all_skips_dangling_observers_when_alive_only() {
            let (mut registry, s, o) = registry_with(1, 3);
            for &observer in &o {
                registry.subscribe(s[0], observer);
            }
            registry.set_state(o[1], SelectionState::Dangling);

            let mut seen = Vec::new();
            let count = registry.notify_all(s[0], true, |observer, _| seen.push(observer));

            assert_eq!(count, 2);
            assert!(!seen.contains(&o[1]));

            let count = registry.notify_all(s[0], false, |_, _| {});
            assert_eq!(count, 3);
        }

        #[test]
        fn destroy_subject_marks_observers_dangling_and_unlinks_them() {
            let (mut registry, s, o) = registry_with(2, 2);
            registry.subscribe(s[0], o[0]);
            registry.subscribe(s[1], o[0]);
            registry.subscribe(s[1], o[1]);

            let linked = registry.destroy_subject(s[0]);

            assert_eq!(linked, 1);
            assert_eq!(registry.state(o[0]), SelectionState::Dangling);
            assert_eq!(registry.state(o[1]), SelectionState::Ok);
            assert_eq!(registry.subjects_of(o[0]), vec![s[1]]);
        }

        #[test]
        fn notify_all_on_unknown_subject_reaches_nobody() {
            let (mut registry, s, _) = registry_with(1, 0);
            registry.destroy_subject(s[0]);
            assert_eq!(registry.notify_all(s[0], false, |_, _| {}), 0);
        }
    }

    mod rebinding {
        use super::*;

        #[test]
        fn rebind_moves_links_and_state_to_the_new_identity() {
            let (mut registry, s, o) = registry_with(2, 2);
            registry.subscribe(s[0], o[0]);
            registry.subscribe(s[1], o[0]);
            registry.set_state(o[0], SelectionState::Dangling);

            registry.rebind(o[0], o[1]);

            assert!(registry.subjects_of(o[0]).is_empty());
            assert_eq!(registry.state(o[0]), SelectionState::Ok);
            assert_eq!(registry.subjects_of(o[1]), vec![s[0], s[1]]);
            assert_eq!(registry.state(o[1]), SelectionState::Dangling);
            assert_eq!(registry.observers_of(s[0]), vec![o[1]]);
        }

        #[test]
        fn rebind_onto_itself_changes_nothing() {
            let (mut registry, s, o) = registry_with(1, 1);
            registry.subscribe(s[0], o[0]);

            registry.rebind(o[0], o[0]);

            assert_eq!(registry.subjects_of(o[0]), vec![s[0]]);
        }

        #[test]
        fn retired_observer_is_forgotten_by_its_subjects() {
            let (mut registry, s, o) = registry_with(1, 1);
            registry.subscribe(s[0], o[0]);

            registry.retire_observer(o[0]);

            assert!(!registry.contains_observer(o[0]));
            assert_eq!(registry.observer_count(s[0]), 0);
        }
    }

    #[test]
    fn registry_clones_share_bookkeeping() {
        let registry = Registry::new();
        let other = registry.clone();

        let subject = registry.with_mut(|r| r.register_subject());

        assert!(other.with(|r| r.contains_subject(subject)));
        assert!(registry.same_as(&other));
        assert!(!registry.same_as(&Registry::new()));
    }
}
