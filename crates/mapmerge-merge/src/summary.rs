//! Counts over a merge operation, for status lines and logs.

use serde::{Deserialize, Serialize};

use mapmerge_types::{ActionType, ResolutionType};

use crate::applier::MergeState;
use crate::operation::MergeOperation;

/// A snapshot of what a merge operation holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub state: MergeState,
    pub entities_added: usize,
    pub entities_removed: usize,
    pub key_values_added: usize,
    pub key_values_removed: usize,
    pub key_values_changed: usize,
    pub children_added: usize,
    pub children_removed: usize,
    pub conflicts: usize,
    pub unresolved: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub memberships: usize,
    /// Top-level actions that would run on the next apply pass or already ran.
    pub active: usize,
    /// Top-level actions applied so far.
    pub applied: usize,
    /// Nodes currently decorated in the live tree.
    pub staged_nodes: usize,
}

impl MergeSummary {
    /// Returns `true` if every conflict has a decision.
    pub fn is_resolved(&self) -> bool {
        self.unresolved == 0
    }
}

impl MergeOperation {
    pub fn summary(&self) -> MergeSummary {
        let mut summary = MergeSummary {
            state: self.state(),
            memberships: self.memberships.borrow().len(),
            applied: self.applied.borrow().len(),
            staged_nodes: self.staged.borrow().len(),
            ..MergeSummary::default()
        };

        self.foreach_action(|_, action| {
            if action.is_active() {
                summary.active += 1;
            }
            match action.action_type() {
                ActionType::AddEntity => summary.entities_added += 1,
                ActionType::RemoveEntity => summary.entities_removed += 1,
                ActionType::AddKeyValue => summary.key_values_added += 1,
                ActionType::RemoveKeyValue => summary.key_values_removed += 1,
                ActionType::ChangeKeyValue => summary.key_values_changed += 1,
                ActionType::AddChildNode => summary.children_added += 1,
                ActionType::RemoveChildNode => summary.children_removed += 1,
                ActionType::ConflictResolution => {
                    summary.conflicts += 1;
                    match action.conflict().map(|c| c.resolution()) {
                        Some(ResolutionType::ApplySourceChange) => summary.accepted += 1,
                        Some(ResolutionType::RejectSourceChange) => summary.rejected += 1,
                        _ => summary.unresolved += 1,
                    }
                }
                ActionType::NoAction => {}
            }
        });
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapmerge_types::ConflictType;

    use crate::action::MergeAction;

    #[test]
    fn counts_by_kind_and_resolution() {
        let op = MergeOperation::new("source.map", "base.map");
        op.add_action(MergeAction::add_key_value("e", "a", "1", None));
        op.add_action(MergeAction::remove_key_value("e", "b", Some("2".into())));
        let first = op.add_conflict(
            ConflictType::SettingKeyToDifferentValue,
            MergeAction::change_key_value("e", "c", "1", None),
            None,
            None,
            None,
        );
        op.add_conflict(
            ConflictType::RemovalOfModifiedKeyValue,
            MergeAction::remove_key_value("e", "d", None),
            None,
            None,
            None,
        );
        op.set_resolution(first, ResolutionType::ApplySourceChange).unwrap();

        let summary = op.summary();
        assert_eq!(summary.key_values_added, 1);
        assert_eq!(summary.key_values_removed, 1);
        assert_eq!(summary.conflicts, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.active, 3);
        assert!(!summary.is_resolved());
        assert_eq!(summary.state, MergeState::Idle);
    }
}
