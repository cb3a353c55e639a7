//! Diff engine for the scene merge engine.
//!
//! Matches nodes across two snapshots by identity and turns the differences
//! into structured change sets for the conflict classifier.
//!
//! # Key Types
//!
//! - [`IdentityMap`] -- present-in-both / only-in-A / only-in-B buckets
//! - [`SceneDiff`] / [`EntityChange`] / [`EntityDelta`] -- entity-level diff
//! - [`KeyValueChange`] / [`ChildChange`] -- attribute and child-node diff
//! - [`MembershipChange`] -- layer and selection-group membership diff

pub mod entity_diff;
pub mod error;
pub mod identity;
pub mod scene_diff;

pub use entity_diff::{diff_children, diff_key_values, ChildChange, KeyValueChange};
pub use error::{DiffError, DiffResult};
pub use identity::{resolve_children, resolve_entities, resolve_key_values, IdentityMap};
pub use scene_diff::{diff_metadata, diff_scenes, EntityChange, EntityDelta, MembershipChange, SceneDiff};
