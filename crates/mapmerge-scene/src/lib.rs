//! Scene document model for the merge engine.
//!
//! A scene is a flat list of named entities. Each entity holds key/value
//! attributes and an ordered list of child geometry nodes (brushes, patches).
//! Layer and selection-group membership is kept alongside as metadata.
//!
//! # Snapshots vs. the live tree
//!
//! - [`SceneSnapshot`] -- an immutable input to a merge (source, base, or target)
//! - [`SceneGraph`] -- the mutable live tree a merge is applied onto
//! - [`UndoSystem`] -- transactional journal around live-tree mutations
//!
//! [`SceneTree`] implements both live-tree traits in memory. [`Transaction`]
//! is the scoped guard: dropping it without committing rolls back every
//! mutation made through it.
//!
//! # Design Rules
//!
//! 1. Entity names are unique within a live tree; snapshots are checked by
//!    the identity resolver instead.
//! 2. Every live-tree mutation made inside a transaction is journaled with
//!    its inverse, so rollback restores the tree exactly.
//! 3. Committed transactions form the undo stack.

pub mod error;
pub mod memory;
pub mod model;
pub mod traits;
pub mod transaction;

pub use error::{SceneError, SceneResult};
pub use memory::SceneTree;
pub use model::{ChildNode, Entity, Membership, Removed, SceneMetadata, SceneSnapshot};
pub use traits::{SceneGraph, UndoSystem};
pub use transaction::{with_transaction, Transaction};
