//! The merge operation: an ordered, arena-backed set of merge actions.
//!
//! All methods take `&self`. The operation keeps its state behind
//! `Cell`/`RefCell` so observers and UI callbacks holding a shared handle
//! can query and resolve it between apply passes. No borrow is held while
//! observers run.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use mapmerge_diff::MembershipChange;
use mapmerge_scene::Entity;
use mapmerge_types::{ConflictType, NodePath};

use crate::action::{ActionId, ConflictResolution, MembershipAction, MergeAction};
use crate::action_node::{MergeActionNode, StagedNodes};
use crate::applier::{MergeState, Revert};
use crate::error::{MergeError, MergeResult};
use crate::event::{MergeEvent, Observers, SubscriptionId};

/// A reviewable set of merge actions between a source and a target scene.
pub struct MergeOperation {
    source_path: String,
    base_path: String,
    merge_selection_groups: Cell<bool>,
    merge_layers: Cell<bool>,
    populated: Cell<bool>,

    /// Every action, including those wrapped by conflicts.
    pub(crate) actions: RefCell<Vec<MergeAction>>,
    /// Top-level actions in application order.
    pub(crate) order: RefCell<Vec<ActionId>>,
    pub(crate) memberships: RefCell<Vec<MembershipAction>>,
    pub(crate) observers: Observers,

    pub(crate) state: Cell<MergeState>,
    /// Set while an apply or abort transaction is open.
    pub(crate) in_flight: Cell<bool>,
    pub(crate) applied: RefCell<BTreeSet<ActionId>>,
    pub(crate) applied_memberships: RefCell<BTreeSet<usize>>,
    /// Inverse steps for everything applied so far, oldest first.
    pub(crate) journal: RefCell<Vec<Revert>>,
    pub(crate) staged: RefCell<StagedNodes>,
}

impl MergeOperation {
    /// Create an empty operation.
    ///
    /// An empty `base_path` marks a two-way merge.
    pub fn new(source_path: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            base_path: base_path.into(),
            merge_selection_groups: Cell::new(true),
            merge_layers: Cell::new(true),
            populated: Cell::new(false),
            actions: RefCell::new(Vec::new()),
            order: RefCell::new(Vec::new()),
            memberships: RefCell::new(Vec::new()),
            observers: Observers::default(),
            state: Cell::new(MergeState::Idle),
            in_flight: Cell::new(false),
            applied: RefCell::new(BTreeSet::new()),
            applied_memberships: RefCell::new(BTreeSet::new()),
            journal: RefCell::new(Vec::new()),
            staged: RefCell::new(StagedNodes::default()),
        }
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Path of the common ancestor, empty for a two-way merge.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn is_three_way(&self) -> bool {
        !self.base_path.is_empty()
    }

    pub fn merge_selection_groups(&self) -> bool {
        self.merge_selection_groups.get()
    }

    pub fn merge_layers(&self) -> bool {
        self.merge_layers.get()
    }

    /// Has no effect once the operation has been populated.
    pub fn set_merge_selection_groups(&self, enabled: bool) {
        if self.populated.get() {
            debug!(enabled, "selection group flag ignored after population");
            return;
        }
        self.merge_selection_groups.set(enabled);
    }

    /// Has no effect once the operation has been populated.
    pub fn set_merge_layers(&self, enabled: bool) {
        if self.populated.get() {
            debug!(enabled, "layer flag ignored after population");
            return;
        }
        self.merge_layers.set(enabled);
    }

    pub(crate) fn mark_populated(&self) -> MergeResult<()> {
        if self.populated.replace(true) {
            return Err(MergeError::AlreadyPopulated);
        }
        Ok(())
    }

    /// Append a top-level action and notify observers.
    pub fn add_action(&self, action: MergeAction) -> ActionId {
        let id = {
            let mut actions = self.actions.borrow_mut();
            let id = ActionId::new(actions.len());
            actions.push(action);
            id
        };
        self.order.borrow_mut().push(id);
        self.observers.emit(MergeEvent::ActionAdded(id));
        id
    }

    /// Wrap a source change (and optionally the target change it collides
    /// with) in an unresolved conflict, appended as a top-level action.
    ///
    /// The wrapped actions are stored inactive and are never visited on
    /// their own.
    pub fn add_conflict(
        &self,
        conflict_type: ConflictType,
        source: MergeAction,
        target: Option<MergeAction>,
        source_entity: Option<Arc<Entity>>,
        target_entity: Option<Arc<Entity>>,
    ) -> ActionId {
        let affected = match conflict_type {
            ConflictType::ModificationOfRemovedEntity | ConflictType::RemovalOfModifiedEntity => {
                NodePath::Entity(source.entity().clone())
            }
            _ => source.affected_node().clone(),
        };

        let id = {
            let mut actions = self.actions.borrow_mut();
            let source_id = ActionId::new(actions.len());
            let target_id = target.as_ref().map(|_| ActionId::new(actions.len() + 1));
            let conflict_id = ActionId::new(actions.len() + 1 + target_id.is_some() as usize);

            for (mut wrapped, _) in std::iter::once((source, source_id))
                .chain(target.into_iter().zip(target_id))
            {
                wrapped.set_active(false);
                wrapped.owner = Some(conflict_id);
                actions.push(wrapped);
            }

            let conflict =
                ConflictResolution::new(conflict_type, source_id, target_id, source_entity, target_entity);
            actions.push(MergeAction::new_conflict(conflict, affected));
            conflict_id
        };
        debug!(action = %id, conflict = %conflict_type, "conflict recorded");
        self.order.borrow_mut().push(id);
        self.observers.emit(MergeEvent::ActionAdded(id));
        id
    }

    /// Queue a layer or selection-group change.
    pub fn add_membership_action(&self, change: MembershipChange) -> usize {
        let mut memberships = self.memberships.borrow_mut();
        memberships.push(MembershipAction::new(change));
        memberships.len() - 1
    }

    /// Returns `true` if the operation holds any entity or membership action.
    pub fn has_actions(&self) -> bool {
        !self.order.borrow().is_empty() || !self.memberships.borrow().is_empty()
    }

    /// Number of top-level actions.
    pub fn action_count(&self) -> usize {
        self.order.borrow().len()
    }

    /// Top-level action ids in application order.
    pub fn action_ids(&self) -> Vec<ActionId> {
        self.order.borrow().clone()
    }

    /// A copy of the action with this id, wrapped actions included.
    pub fn action(&self, id: ActionId) -> Option<MergeAction> {
        self.actions.borrow().get(id.index()).cloned()
    }

    /// Visit every top-level action in application order.
    ///
    /// The visitor receives a copy, so it may call back into the operation.
    pub fn foreach_action<F>(&self, mut visitor: F)
    where
        F: FnMut(ActionId, &MergeAction),
    {
        for id in self.action_ids() {
            let Some(action) = self.action(id) else {
                continue;
            };
            visitor(id, &action);
        }
    }

    /// Ids of all conflict actions.
    pub fn conflicts(&self) -> Vec<ActionId> {
        let actions = self.actions.borrow();
        self.order
            .borrow()
            .iter()
            .copied()
            .filter(|id| actions[id.index()].conflict().is_some())
            .collect()
    }

    pub fn membership_actions(&self) -> Vec<MembershipAction> {
        self.memberships.borrow().clone()
    }

    /// Include or exclude a membership action from the next apply pass.
    pub fn set_membership_active(&self, index: usize, active: bool) -> MergeResult<()> {
        self.ensure_mutable()?;
        match self.memberships.borrow_mut().get_mut(index) {
            Some(action) => {
                action.active = active;
                Ok(())
            }
            None => Err(MergeError::UnknownAction(ActionId::new(index))),
        }
    }

    /// Include a plain action in the next apply pass.
    pub fn activate(&self, id: ActionId) -> MergeResult<()> {
        self.set_active(id, true)
    }

    /// Exclude a plain action from the next apply pass.
    pub fn deactivate(&self, id: ActionId) -> MergeResult<()> {
        self.set_active(id, false)
    }

    fn set_active(&self, id: ActionId, active: bool) -> MergeResult<()> {
        self.ensure_mutable()?;
        let affected = {
            let mut actions = self.actions.borrow_mut();
            let action = actions
                .get_mut(id.index())
                .ok_or(MergeError::UnknownAction(id))?;
            if action.conflict().is_some() || action.is_wrapped() {
                return Err(MergeError::ResolutionRequired(id));
            }
            if action.is_active() == active {
                return Ok(());
            }
            action.set_active(active);
            (action.affected_node().clone(), action.action_type())
        };

        if self.applied.borrow().contains(&id) {
            let mut staged = self.staged.borrow_mut();
            if active {
                staged.stage(&affected.0, id, affected.1);
            } else {
                staged.unstage(id);
            }
        }
        self.observers.emit(MergeEvent::ActionChanged(id));
        Ok(())
    }

    /// Register an observer. It is called synchronously for every event.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: FnMut(&MergeEvent) + 'static,
    {
        self.observers.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.unsubscribe(id);
    }

    pub fn state(&self) -> MergeState {
        self.state.get()
    }

    /// Decorated nodes staged by applied actions, in path order.
    pub fn action_nodes(&self) -> Vec<MergeActionNode> {
        self.staged.borrow().nodes().cloned().collect()
    }

    /// The decorated node wrapping `path`, if any action affecting it is staged.
    pub fn action_node(&self, path: &NodePath) -> Option<MergeActionNode> {
        self.staged.borrow().get(path).cloned()
    }

    /// Fails unless the operation can take a review change right now.
    pub(crate) fn ensure_mutable(&self) -> MergeResult<()> {
        if self.in_flight.get() {
            return Err(MergeError::ConcurrentMergeAccess);
        }
        match self.state.get() {
            state @ (MergeState::Committed | MergeState::RolledBack) => Err(MergeError::OperationClosed(state)),
            _ => Ok(()),
        }
    }

    pub(crate) fn emit(&self, event: MergeEvent) {
        self.observers.emit(event);
    }
}

impl fmt::Debug for MergeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOperation")
            .field("source_path", &self.source_path)
            .field("base_path", &self.base_path)
            .field("actions", &self.action_count())
            .field("memberships", &self.memberships.borrow().len())
            .field("state", &self.state.get())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use mapmerge_types::{ActionType, ResolutionType};

    fn op() -> MergeOperation {
        MergeOperation::new("source.map", "base.map")
    }

    #[test]
    fn new_operation_is_empty() {
        let op = op();
        assert!(!op.has_actions());
        assert!(op.is_three_way());
        assert_eq!(op.state(), MergeState::Idle);
        assert!(!MergeOperation::new("source.map", "").is_three_way());
    }

    #[test]
    fn add_action_notifies_observers() {
        let op = op();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        op.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        let id = op.add_action(MergeAction::add_key_value("e", "k", "v", None));
        assert_eq!(*seen.borrow(), vec![MergeEvent::ActionAdded(id)]);
        assert_eq!(op.action_ids(), vec![id]);
        assert!(op.has_actions());
    }

    #[test]
    fn conflict_wraps_inactive_actions() {
        let op = op();
        let id = op.add_conflict(
            ConflictType::SettingKeyToDifferentValue,
            MergeAction::change_key_value("light_1", "brightness", "2", Some("3".into())),
            Some(MergeAction::change_key_value("light_1", "brightness", "3", Some("1".into()))),
            None,
            None,
        );

        assert_eq!(op.action_count(), 1);
        let conflict_action = op.action(id).unwrap();
        let conflict = conflict_action.conflict().unwrap();
        assert_eq!(conflict.resolution(), ResolutionType::Unresolved);
        assert!(!conflict_action.is_active());

        let source = op.action(conflict.source_action()).unwrap();
        assert!(!source.is_active());
        assert!(source.is_wrapped());
        let target = op.action(conflict.target_action().unwrap()).unwrap();
        assert_eq!(target.action_type(), ActionType::ChangeKeyValue);
        assert_eq!(op.conflicts(), vec![id]);
    }

    #[test]
    fn entity_conflicts_address_the_entity() {
        let op = op();
        let id = op.add_conflict(
            ConflictType::ModificationOfRemovedEntity,
            MergeAction::change_key_value("light_1", "brightness", "2", None),
            None,
            None,
            None,
        );
        assert_eq!(op.action(id).unwrap().affected_node(), &NodePath::Entity("light_1".into()));
    }

    #[test]
    fn toggling_plain_actions() {
        let op = op();
        let id = op.add_action(MergeAction::add_key_value("e", "k", "v", None));

        op.deactivate(id).unwrap();
        assert!(!op.action(id).unwrap().is_active());
        op.activate(id).unwrap();
        assert!(op.action(id).unwrap().is_active());
    }

    #[test]
    fn conflicts_cannot_be_toggled_directly() {
        let op = op();
        let id = op.add_conflict(
            ConflictType::RemovalOfModifiedKeyValue,
            MergeAction::remove_key_value("e", "k", None),
            None,
            None,
            None,
        );
        let source = op.action(id).unwrap().conflict().unwrap().source_action();

        assert_eq!(op.activate(id), Err(MergeError::ResolutionRequired(id)));
        assert_eq!(op.activate(source), Err(MergeError::ResolutionRequired(source)));
    }

    #[test]
    fn unknown_action_is_reported() {
        let op = op();
        let missing = ActionId::new(42);
        assert_eq!(op.activate(missing), Err(MergeError::UnknownAction(missing)));
        assert!(op.action(missing).is_none());
    }

    #[test]
    fn flags_freeze_after_population() {
        let op = op();
        op.set_merge_layers(false);
        assert!(!op.merge_layers());

        op.mark_populated().unwrap();
        op.set_merge_layers(true);
        op.set_merge_selection_groups(false);
        assert!(!op.merge_layers());
        assert!(op.merge_selection_groups());
        assert_eq!(op.mark_populated(), Err(MergeError::AlreadyPopulated));
    }

    #[test]
    fn foreach_visits_top_level_in_order() {
        let op = op();
        let a = op.add_action(MergeAction::add_key_value("e", "a", "1", None));
        let c = op.add_conflict(
            ConflictType::SettingKeyToDifferentValue,
            MergeAction::change_key_value("e", "b", "1", None),
            None,
            None,
            None,
        );
        let d = op.add_action(MergeAction::add_key_value("e", "d", "1", None));

        let mut visited = Vec::new();
        op.foreach_action(|id, _| visited.push(id));
        assert_eq!(visited, vec![a, c, d]);
    }
}
