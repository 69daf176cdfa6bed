use super::{Access, ReadWrite, Selection};
use crate::core::error::{Result, SelectionError};
use std::cell::{Ref, RefMut};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Stepped cursor over the handles of a [`Selection`].
///
/// Cursors are only handed out by a valid selection, so dereferencing checks
/// the liveness of the current element but not the selection state. A
/// negative step walks backwards; [`has_next`](Self::has_next) compares
/// against the exclusive end in the direction of the step.
pub struct SelectionRange<'a, T, A: Access = ReadWrite> {
    selection: &'a Selection<T, A>,
    pos: isize,
    end: isize,
    step: isize,
}

impl<'a, T, A: Access> SelectionRange<'a, T, A> {
    pub(super) fn new(selection: &'a Selection<T, A>, pos: isize, end: isize, step: isize) -> Self {
        Self {
            selection,
            pos,
            end,
            step,
        }
    }

    pub fn position(&self) -> isize {
        self.pos
    }

    pub fn end(&self) -> isize {
        self.end
    }

    pub fn step(&self) -> isize {
        self.step
    }

    pub fn has_next(&self) -> bool {
        if self.step > 0 {
            self.pos < self.end
        } else {
            self.pos > self.end
        }
    }

    /// Borrows the current value.
    pub fn get(&self) -> Result<Ref<'a, T>> {
        let pos = self.checked_position()?;
        self.selection.value_at(pos)
    }

    pub fn advance(&mut self) -> &mut Self {
        self.pos = self.pos.saturating_add(self.step);
        self
    }

    pub fn retreat(&mut self) -> &mut Self {
        self.pos = self.pos.saturating_sub(self.step);
        self
    }

    fn checked_position(&self) -> Result<usize> {
        let len = self.selection.len();
        usize::try_from(self.pos)
            .ok()
            .filter(|&pos| pos < len)
            .ok_or(SelectionError::OutOfRange {
                index: self.pos,
                len,
            })
    }

    fn remaining(&self) -> usize {
        let distance = if self.step > 0 {
            self.end.saturating_sub(self.pos)
        } else {
            self.pos.saturating_sub(self.end)
        };
        usize::try_from(distance).map_or(0, |d| d.div_ceil(self.step.unsigned_abs()))
    }
}

impl<'a, T> SelectionRange<'a, T, ReadWrite> {
    /// Mutably borrows the current value.
    pub fn get_mut(&self) -> Result<RefMut<'a, T>> {
        let pos = self.checked_position()?;
        self.selection.value_at_mut(pos)
    }
}

impl<T, A: Access> Clone for SelectionRange<'_, T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, A: Access> Copy for SelectionRange<'_, T, A> {}

impl<T, A: Access> Add<isize> for SelectionRange<'_, T, A> {
    type Output = Self;

    fn add(mut self, n: isize) -> Self {
        self += n;
        self
    }
}

impl<T, A: Access> Sub<isize> for SelectionRange<'_, T, A> {
    type Output = Self;

    fn sub(mut self, n: isize) -> Self {
        self -= n;
        self
    }
}

impl<T, A: Access> AddAssign<isize> for SelectionRange<'_, T, A> {
    fn add_assign(&mut self, n: isize) {
        self.pos = self.pos.saturating_add(self.step.saturating_mul(n));
    }
}

impl<T, A: Access> SubAssign<isize> for SelectionRange<'_, T, A> {
    fn sub_assign(&mut self, n: isize) {
        self.pos = self.pos.saturating_sub(self.step.saturating_mul(n));
    }
}

impl<'a, T, A: Access> Iterator for SelectionRange<'a, T, A> {
    type Item = Result<Ref<'a, T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        let item = self.get();
        self.advance();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<T, A: Access> ExactSizeIterator for SelectionRange<'_, T, A> {}
