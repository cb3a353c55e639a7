//! Merge engine for scene documents.
//!
//! Reconciles two versions of a scene against their common ancestor and
//! produces a reviewable, selectively-applicable change set.
//!
//! # Pipeline
//!
//! 1. Identity resolution and diffing (`mapmerge-diff`): source vs. base and
//!    target vs. base.
//! 2. Classification ([`classifier`]): changes touched by only one side
//!    become plain actions; collisions become [`ConflictResolution`] actions.
//! 3. Review: callers toggle plain actions and resolve conflicts with
//!    [`MergeOperation::set_resolution`].
//! 4. Application: [`MergeOperation::apply_actions`] runs every active action
//!    inside one scene transaction, staging [`MergeActionNode`] decorations
//!    until [`finish`](MergeOperation::finish) or
//!    [`abort`](MergeOperation::abort).
//!
//! Everything runs on the caller's thread. A [`MergeOperation`] is not
//! `Sync`; observers registered with [`MergeOperation::subscribe`] are
//! called synchronously.

pub mod action;
pub mod action_node;
pub mod applier;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
mod merger;
pub mod operation;
mod resolution;
pub mod summary;

pub use action::{ActionId, ActionKind, ConflictResolution, KeyValueAction, MembershipAction, MergeAction};
pub use action_node::MergeActionNode;
pub use applier::{ApplyReport, MergeState};
pub use config::MergeOptions;
pub use error::{MergeError, MergeResult};
pub use event::{MergeEvent, SubscriptionId};
pub use operation::MergeOperation;
pub use summary::MergeSummary;

pub use mapmerge_types::{ActionType, ConflictType, ResolutionType};
