use super::{Access, CoercesTo, Meet, Selection};
use crate::core::ids::{ContainerId, Handle};
use crate::core::registry::SelectionState;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};
use std::rc::Rc;
use tracing::trace;

/// Sorted merge of two strictly sorted handle lists, without duplicates.
fn merge_union(lhs: &[Handle], rhs: &[Handle]) -> Vec<Handle> {
    let mut merged = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        match lhs[i].cmp(&rhs[j]) {
            Ordering::Less => {
                merged.push(lhs[i]);
                i += 1;
            }
            Ordering::Greater => {
                merged.push(rhs[j]);
                j += 1;
            }
            Ordering::Equal => {
                merged.push(lhs[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&lhs[i..]);
    merged.extend_from_slice(&rhs[j..]);
    merged.dedup();
    merged
}

/// Removes from `lhs` every handle present in `rhs` in one co-scan.
fn retain_difference(lhs: &mut Vec<Handle>, rhs: &[Handle]) {
    let mut write = 0;
    let mut j = 0;
    for read in 0..lhs.len() {
        let handle = lhs[read];
        while j < rhs.len() && rhs[j] < handle {
            j += 1;
        }
        if j < rhs.len() && rhs[j] == handle {
            j += 1;
            continue;
        }
        lhs[write] = handle;
        write += 1;
    }
    lhs.truncate(write);
}

/// Keeps in `lhs` only the handles also present in `rhs`.
fn retain_intersection(lhs: &mut Vec<Handle>, rhs: &[Handle]) {
    let mut write = 0;
    let mut j = 0;
    for read in 0..lhs.len() {
        let handle = lhs[read];
        while j < rhs.len() && rhs[j] < handle {
            j += 1;
        }
        if j < rhs.len() && rhs[j] == handle {
            lhs[write] = handle;
            write += 1;
            j += 1;
        }
    }
    lhs.truncate(write);
}

impl<T, A: Access> Selection<T, A> {
    /// In-place union. Subscribes to every container `rhs` contributes.
    pub fn unite<B: CoercesTo<A>>(&mut self, rhs: &Selection<T, B>) {
        self.unite_unchecked(rhs);
    }

    /// In-place difference by handle identity, followed by observer pruning.
    pub fn subtract<B: Access>(&mut self, rhs: &Selection<T, B>) {
        self.assert_same_registry(rhs);
        debug_assert!(self.tracking.handles.is_sorted());
        debug_assert!(rhs.tracking.handles.is_sorted());

        retain_difference(&mut self.tracking.handles, &rhs.tracking.handles);
        self.prune_redundant_observers();
        trace!(selection = ?self.tracking.id, len = self.len(), "difference applied");
    }

    /// In-place intersection by handle identity, followed by observer pruning.
    pub fn intersect<B: Access>(&mut self, rhs: &Selection<T, B>) {
        self.assert_same_registry(rhs);
        debug_assert!(self.tracking.handles.is_sorted());
        debug_assert!(rhs.tracking.handles.is_sorted());

        retain_intersection(&mut self.tracking.handles, &rhs.tracking.handles);
        self.prune_redundant_observers();
        trace!(selection = ?self.tracking.id, len = self.len(), "intersection applied");
    }

    fn unite_unchecked<B: Access>(&mut self, rhs: &Selection<T, B>) {
        self.assert_same_registry(rhs);
        debug_assert!(self.tracking.handles.is_sorted());
        debug_assert!(rhs.tracking.handles.is_sorted());

        self.tracking.handles = merge_union(&self.tracking.handles, &rhs.tracking.handles);

        let mut added: Vec<ContainerId> = Vec::new();
        for (&container, store) in &rhs.tracking.sources {
            if let Entry::Vacant(slot) = self.tracking.sources.entry(container) {
                slot.insert(Rc::clone(store));
                added.push(container);
            }
        }
        let id = self.tracking.id;
        let rhs_dangling = rhs.state() == SelectionState::Dangling;
        self.tracking.registry.with_mut(|r| {
            for &container in &added {
                r.subscribe(container, id);
            }
            // Absorbed handles may point into storage that is already gone.
            if rhs_dangling {
                r.set_state(id, SelectionState::Dangling);
            }
        });
        trace!(selection = ?id, len = self.len(), added = added.len(), "union applied");
    }
}

impl<T, A: Access, B: CoercesTo<A>> AddAssign<&Selection<T, B>> for Selection<T, A> {
    fn add_assign(&mut self, rhs: &Selection<T, B>) {
        self.unite(rhs);
    }
}

impl<T, A: Access, B: Access> SubAssign<&Selection<T, B>> for Selection<T, A> {
    fn sub_assign(&mut self, rhs: &Selection<T, B>) {
        self.subtract(rhs);
    }
}

impl<T, A: Access, B: Access> MulAssign<&Selection<T, B>> for Selection<T, A> {
    fn mul_assign(&mut self, rhs: &Selection<T, B>) {
        self.intersect(rhs);
    }
}

impl<T, A, B> Add<&Selection<T, B>> for &Selection<T, A>
where
    A: Meet<B>,
    B: Access,
{
    type Output = Selection<T, <A as Meet<B>>::Output>;

    fn add(self, rhs: &Selection<T, B>) -> Self::Output {
        let mut result: Self::Output = self.clone().retag();
        result.unite_unchecked(rhs);
        result
    }
}

impl<T, A, B> Sub<&Selection<T, B>> for &Selection<T, A>
where
    A: Meet<B>,
    B: Access,
{
    type Output = Selection<T, <A as Meet<B>>::Output>;

    fn sub(self, rhs: &Selection<T, B>) -> Self::Output {
        let mut result: Self::Output = self.clone().retag();
        result.subtract(rhs);
        result
    }
}

impl<T, A, B> Mul<&Selection<T, B>> for &Selection<T, A>
where
    A: Meet<B>,
    B: Access,
{
    type Output = Selection<T, <A as Meet<B>>::Output>;

    fn mul(self, rhs: &Selection<T, B>) -> Self::Output {
        let mut result: Self::Output = self.clone().retag();
        result.intersect(rhs);
        result
    }
}
