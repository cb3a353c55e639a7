//! Foundation types for the scene merge engine.
//!
//! This crate provides the identity, fingerprint, and classification types
//! shared by the scene model, the diff engine, and the merge engine. Every
//! other `mapmerge` crate depends on `mapmerge-types`.
//!
//! # Key Types
//!
//! - [`EntityName`] -- Identity of an entity within a snapshot
//! - [`ContentHash`] -- Domain-separated BLAKE3 fingerprint of node content
//! - [`ChildKey`] -- Identity of a child node (fingerprint + occurrence)
//! - [`NodePath`] -- Logical tree location targeted by an action
//! - [`ActionType`] / [`ConflictType`] / [`ResolutionType`] -- Merge classifications

pub mod hash;
pub mod identity;
pub mod kind;

pub use hash::ContentHash;
pub use identity::{ChildKey, EntityName, NodePath};
pub use kind::{ActionType, ConflictType, ResolutionType};
