mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ReadWrite {}
    impl Sealed for super::ReadOnly {}
}

/// Element-access capability of a [`Selection`](super::Selection).
pub trait Access: sealed::Sealed + 'static {
    const NAME: &'static str;
}

/// Values may be read and modified through the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadWrite;

/// Values may only be read through the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadOnly;

impl Access for ReadWrite {
    const NAME: &'static str = "read-write";
}

impl Access for ReadOnly {
    const NAME: &'static str = "read-only";
}

/// The more restrictive of two capabilities, used as the result type of
/// non-mutating set algebra between mixed selections.
pub trait Meet<B: Access>: Access {
    type Output: Access;
}

impl Meet<ReadWrite> for ReadWrite {
    type Output = ReadWrite;
}

impl Meet<ReadOnly> for ReadWrite {
    type Output = ReadOnly;
}

impl Meet<ReadWrite> for ReadOnly {
    type Output = ReadOnly;
}

impl Meet<ReadOnly> for ReadOnly {
    type Output = ReadOnly;
}

/// `Self` handles may be absorbed into a selection with capability `A`.
///
/// A read-write selection never absorbs read-only handles.
pub trait CoercesTo<A: Access>: Access {}

impl CoercesTo<ReadWrite> for ReadWrite {}
impl CoercesTo<ReadOnly> for ReadWrite {}
impl CoercesTo<ReadOnly> for ReadOnly {}
