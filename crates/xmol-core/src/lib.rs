//! # XMOL++ Core Library
//!
//! Reference-stable containers and set-algebra selections, the storage layer
//! underneath atoms, residues, molecules and frames of a molecular data model.
//!
//! ## Architectural Philosophy
//!
//! Elements live in a [`Container`] and are addressed by generational
//! [`Handle`]s, so growth never moves an element out from under a view. A
//! [`Selection`] is a sorted list of handles that subscribes, through a shared
//! [`Registry`], to every container it draws from. Destroying, clearing or
//! compacting a container flips its observers to a dangling state, after which
//! value access fails with [`SelectionError::StaleReference`] instead of
//! reading freed or recycled storage.
//!
//! Everything is single-threaded: containers and selections share the
//! registry through `Rc<RefCell<..>>`.

pub mod core;

pub use crate::core::config::{ConfigError, ContainerConfig, ContainerConfigBuilder};
pub use crate::core::container::Container;
pub use crate::core::error::SelectionError;
pub use crate::core::ids::{ContainerId, ElementKey, Handle, SelectionId};
pub use crate::core::registry::{Registry, SelectionState};
pub use crate::core::selection::{ReadOnly, ReadWrite, Selection, SelectionRange};
