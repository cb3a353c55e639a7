//! Error types for the merge engine.

use mapmerge_diff::DiffError;
use mapmerge_scene::SceneError;
use mapmerge_types::{ActionType, EntityName, NodePath};

use crate::action::ActionId;
use crate::applier::MergeState;

/// Errors that can occur while building, resolving, or applying a merge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// The input snapshots could not be matched up.
    #[error("merge setup failed: {0}")]
    Setup(#[from] DiffError),

    /// An entity-part action ran before the entity it targets existed.
    #[error("ordering violation: {action} ({action_type}) targets entity {entity}, which is not in the scene")]
    OrderingViolation {
        action: ActionId,
        action_type: ActionType,
        entity: EntityName,
    },

    /// The operation was mutated while a transaction was in flight.
    #[error("merge operation is being applied; no changes allowed until the transaction closes")]
    ConcurrentMergeAccess,

    /// The live tree refused an action.
    #[error("failed to apply {action} ({action_type}) to {node}: {source}")]
    ApplyFailure {
        action: ActionId,
        action_type: ActionType,
        node: NodePath,
        source: SceneError,
    },

    /// No action with this id exists in the operation.
    #[error("unknown action {0}")]
    UnknownAction(ActionId),

    /// The action is not a conflict resolution.
    #[error("action {0} is not a conflict")]
    NotAConflict(ActionId),

    /// Conflicts and the actions they wrap are toggled through their resolution.
    #[error("action {0} is controlled by a conflict resolution")]
    ResolutionRequired(ActionId),

    /// The operation already holds actions from an earlier population.
    #[error("merge operation is already populated")]
    AlreadyPopulated,

    /// The operation was finished or aborted.
    #[error("merge operation is closed ({0})")]
    OperationClosed(MergeState),

    /// A live-tree call outside of a specific action failed.
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
