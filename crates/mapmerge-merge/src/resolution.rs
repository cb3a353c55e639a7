//! Conflict resolution.
//!
//! A conflict's resolution is the only switch for the source action it
//! wraps: the conflict and its source action are active exactly when the
//! resolution is [`ResolutionType::ApplySourceChange`].

use tracing::debug;

use mapmerge_types::ResolutionType;

use crate::action::ActionId;
use crate::error::{MergeError, MergeResult};
use crate::event::MergeEvent;
use crate::operation::MergeOperation;

impl MergeOperation {
    /// Record a decision on a conflict.
    ///
    /// Setting the resolution it already has is a no-op apart from the
    /// change notification. Fails with [`MergeError::ConcurrentMergeAccess`]
    /// while an apply transaction is open.
    pub fn set_resolution(&self, id: ActionId, resolution: ResolutionType) -> MergeResult<()> {
        self.ensure_mutable()?;
        let active = resolution.applies_source();
        let affected = {
            let mut actions = self.actions.borrow_mut();
            let conflict = actions
                .get_mut(id.index())
                .ok_or(MergeError::UnknownAction(id))?
                .conflict_mut()
                .ok_or(MergeError::NotAConflict(id))?;
            conflict.set_resolution(resolution);
            let source = conflict.source_action();

            let action = &mut actions[id.index()];
            action.set_active(active);
            let affected = (action.affected_node().clone(), action.action_type());
            if let Some(action) = actions.get_mut(source.index()) {
                action.set_active(active);
            }
            affected
        };

        let mut staged = self.staged.borrow_mut();
        if !active {
            staged.unstage(id);
        } else if self.applied.borrow().contains(&id) {
            staged.stage(&affected.0, id, affected.1);
        }
        drop(staged);
        debug!(action = %id, %resolution, "conflict resolved");
        self.emit(MergeEvent::ActionChanged(id));
        Ok(())
    }

    /// The current resolution of a conflict.
    pub fn resolution(&self, id: ActionId) -> MergeResult<ResolutionType> {
        let actions = self.actions.borrow();
        let action = actions.get(id.index()).ok_or(MergeError::UnknownAction(id))?;
        action
            .conflict()
            .map(|c| c.resolution())
            .ok_or(MergeError::NotAConflict(id))
    }

    /// Conflicts still awaiting a decision, in application order.
    pub fn unresolved_conflicts(&self) -> Vec<ActionId> {
        let actions = self.actions.borrow();
        self.order
            .borrow()
            .iter()
            .copied()
            .filter(|id| {
                actions[id.index()]
                    .conflict()
                    .is_some_and(|c| c.resolution() == ResolutionType::Unresolved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use mapmerge_scene::{Entity, SceneSnapshot, SceneTree};
    use mapmerge_types::{ConflictType, NodePath};

    use crate::action::MergeAction;

    fn conflicted() -> (MergeOperation, ActionId) {
        let op = MergeOperation::new("source.map", "base.map");
        let id = op.add_conflict(
            ConflictType::SettingKeyToDifferentValue,
            MergeAction::change_key_value("light_1", "brightness", "2", Some("3".into())),
            Some(MergeAction::change_key_value("light_1", "brightness", "3", Some("1".into()))),
            None,
            None,
        );
        (op, id)
    }

    fn source_active(op: &MergeOperation, id: ActionId) -> bool {
        let source = op.action(id).unwrap().conflict().unwrap().source_action();
        op.action(source).unwrap().is_active()
    }

    #[test]
    fn accepting_activates_source() {
        let (op, id) = conflicted();
        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        assert!(op.action(id).unwrap().is_active());
        assert!(source_active(&op, id));
        assert_eq!(op.resolution(id).unwrap(), ResolutionType::ApplySourceChange);
        assert!(op.unresolved_conflicts().is_empty());
    }

    #[test]
    fn rejecting_keeps_source_inactive() {
        let (op, id) = conflicted();
        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        op.set_resolution(id, ResolutionType::RejectSourceChange).unwrap();
        assert!(!op.action(id).unwrap().is_active());
        assert!(!source_active(&op, id));
    }

    #[test]
    fn resolving_back_to_unresolved() {
        let (op, id) = conflicted();
        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        op.set_resolution(id, ResolutionType::Unresolved).unwrap();
        assert!(!source_active(&op, id));
        assert_eq!(op.unresolved_conflicts(), vec![id]);
    }

    #[test]
    fn repeated_resolution_is_idempotent() {
        let (op, id) = conflicted();
        let events = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&events);
        op.subscribe(move |e| {
            if matches!(e, MergeEvent::ActionChanged(_)) {
                *sink.borrow_mut() += 1;
            }
        });

        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        assert!(source_active(&op, id));
        assert_eq!(*events.borrow(), 2);
    }

    #[test]
    fn only_conflicts_take_resolutions() {
        let (op, id) = conflicted();
        let plain = op.add_action(MergeAction::add_key_value("e", "k", "v", None));
        assert_eq!(
            op.set_resolution(plain, ResolutionType::ApplySourceChange),
            Err(MergeError::NotAConflict(plain))
        );
        assert_eq!(op.resolution(plain), Err(MergeError::NotAConflict(plain)));

        let missing = ActionId::new(99);
        assert_eq!(
            op.set_resolution(missing, ResolutionType::ApplySourceChange),
            Err(MergeError::UnknownAction(missing))
        );
        assert_eq!(op.resolution(id).unwrap(), ResolutionType::Unresolved);
    }

    #[test]
    fn reaccepting_an_applied_conflict_restages_it() {
        let (op, id) = conflicted();
        let snapshot = SceneSnapshot::new("target.map")
            .with_entity(Entity::new("light_1").with_key_value("brightness", "3"));
        let mut scene = SceneTree::from_snapshot(&snapshot).unwrap();
        let node = NodePath::Entity("light_1".into());

        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        op.apply_actions(&mut scene).unwrap();
        assert!(op.action_node(&node).is_some());

        op.set_resolution(id, ResolutionType::RejectSourceChange).unwrap();
        assert!(op.action_node(&node).is_none());

        op.set_resolution(id, ResolutionType::ApplySourceChange).unwrap();
        let wrapper = op.action_node(&node).unwrap();
        assert_eq!(wrapper.action_ids().to_vec(), vec![id]);
    }
}
