use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Selection has dangling references, refusing '{operation}'")]
    StaleReference { operation: &'static str },

    #[error("Element at position {index} has been deleted")]
    DanglingElement { index: usize },

    #[error("Element at position {index} is in a container that is already borrowed")]
    Borrowed { index: usize },

    #[error("Index {index} is out of range for a selection of {len} elements")]
    OutOfRange { index: isize, len: usize },

    #[error("Slice step must be non-zero and greater than isize::MIN")]
    InvalidStep,
}

pub type Result<T> = std::result::Result<T, SelectionError>;
