//! # Core Module
//!
//! Reference-stable element storage and the selections that view it.
//!
//! ## Overview
//!
//! Every structural entity of a molecular data model (atoms, residues,
//! molecules, frames) is stored in a [`container::Container`] and viewed
//! through [`selection::Selection`]s. Selections stay correct while the
//! container grows, and become detectably invalid when the container is
//! dropped, cleared or compacted.
//!
//! ## Key Components
//!
//! - [`ids`] - Generational identifiers for containers, selections and elements
//! - [`registry`] - Subscription bookkeeping between containers and selections
//! - [`element`] - Stored values with their soft-delete flag
//! - [`container`] - The owning element store
//! - [`selection`] - Ordered views, set algebra and stepped cursors
//! - [`config`] - Container construction settings, loadable from TOML
//! - [`error`] - Access errors reported by selections
//!
//! ## Usage
//!
//! ```
//! use xmolpp::core::{container::Container, registry::Registry};
//!
//! let registry = Registry::new();
//! let mut atoms = Container::new(&registry);
//! atoms.extend(["N", "CA", "C", "O"]);
//!
//! let backbone = atoms.all();
//! let carbons = backbone.filter(|name| name.starts_with('C')).unwrap();
//! assert_eq!(carbons.len(), 2);
//!
//! atoms.erase(&carbons);
//! assert_eq!(atoms.len(), 2);
//!
//! drop(atoms);
//! assert!(!backbone.is_valid());
//! ```

pub mod config;
pub mod container;
pub mod element;
pub mod error;
pub mod ids;
pub mod registry;
pub mod selection;
