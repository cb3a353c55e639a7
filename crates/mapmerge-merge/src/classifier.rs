//! Conflict classification.
//!
//! Walks the source-vs-base diff entity by entity and checks each change
//! against what the target did to the same entity, key, or child. Changes
//! the target did not touch become plain actions; collisions become
//! conflicts; identical changes on both sides are dropped.
//!
//! Per entity, with the source change first and the target change second:
//!
//! - added / added: dropped if semantically equal, else `SettingKeyToDifferentValue`
//! - removed / removed: dropped
//! - removed / modified: `RemovalOfModifiedEntity`
//! - modified / removed: `ModificationOfRemovedEntity`, one conflict for the
//!   whole entity
//! - modified / modified: classified per key and per child
//! - anything / untouched: plain actions
//!
//! Per key, within an entity modified on both sides:
//!
//! - removed / removed: dropped
//! - removed / changed or added: `RemovalOfModifiedKeyValue`
//! - changed or added / removed: `ModificationOfRemovedKeyValue`
//! - both set to the same value: a plain change (dropped for two additions)
//! - both set to different values: `SettingKeyToDifferentValue`
//!
//! Children have no conflicts: the same addition or removal on both sides is
//! dropped, anything else is plain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use mapmerge_diff::{ChildChange, EntityChange, EntityDelta, KeyValueChange, MembershipChange, SceneDiff};
use mapmerge_scene::{Entity, Membership, SceneSnapshot};
use mapmerge_types::{ChildKey, ConflictType, EntityName};

use crate::action::MergeAction;
use crate::operation::MergeOperation;

/// Classify a three-way merge into `op`.
///
/// `source` and `theirs` are the diffs of the source and the target against
/// the common base; `target` is the target snapshot itself.
pub fn classify_three_way(op: &MergeOperation, source: &SceneDiff, theirs: &SceneDiff, target: &SceneSnapshot) {
    let classifier = Classifier { op, target };
    let their_changes = theirs.by_name();

    for change in &source.changes {
        match their_changes.get(&change.name) {
            None => classifier.plain(change),
            Some(their) => classifier.entity(change, their),
        }
    }
    classifier.memberships(&source.memberships, &theirs.memberships);
}

/// Classify a two-way merge into `op`.
///
/// `diff` compares the source against the target directly. Every
/// difference is a plain action; nothing is a conflict.
pub fn classify_two_way(op: &MergeOperation, diff: &SceneDiff, target: &SceneSnapshot) {
    let classifier = Classifier { op, target };
    for change in &diff.changes {
        classifier.plain(change);
    }
    classifier.memberships(&diff.memberships, &[]);
}

struct Classifier<'a> {
    op: &'a MergeOperation,
    target: &'a SceneSnapshot,
}

impl Classifier<'_> {
    /// The target's value for a key, used as an action's unchanged value.
    fn target_value(&self, entity: &EntityName, key: &str) -> Option<String> {
        self.target
            .entity(entity.as_str())
            .and_then(|e| e.key_value(key))
            .map(str::to_owned)
    }

    fn source_key_value(&self, entity: &EntityName, change: &KeyValueChange) -> MergeAction {
        let unchanged = self.target_value(entity, change.key());
        key_value_action(entity, change, unchanged)
    }

    fn plain(&self, change: &EntityChange) {
        match &change.delta {
            EntityDelta::Added(entity) => {
                self.op.add_action(MergeAction::add_entity(Arc::clone(entity)));
            }
            EntityDelta::Removed(entity) => {
                let last_seen = self.target.entity(change.name.as_str()).unwrap_or(entity);
                self.op.add_action(MergeAction::remove_entity(Arc::clone(last_seen)));
            }
            EntityDelta::Modified {
                key_values, children, ..
            } => {
                for kv in key_values {
                    self.op.add_action(self.source_key_value(&change.name, kv));
                }
                for child in children {
                    self.op.add_action(child_action(&change.name, child));
                }
            }
        }
    }

    fn entity(&self, ours: &EntityChange, theirs: &EntityChange) {
        let name = &ours.name;
        match (&ours.delta, &theirs.delta) {
            (EntityDelta::Added(mine), EntityDelta::Added(their)) => {
                if mine.semantically_equal(their) {
                    debug!(entity = %name, "same entity added on both sides");
                    return;
                }
                self.op.add_conflict(
                    ConflictType::SettingKeyToDifferentValue,
                    MergeAction::add_entity(Arc::clone(mine)),
                    Some(MergeAction::add_entity(Arc::clone(their))),
                    Some(Arc::clone(mine)),
                    Some(Arc::clone(their)),
                );
            }
            (EntityDelta::Removed(_), EntityDelta::Removed(_)) => {
                debug!(entity = %name, "entity removed on both sides");
            }
            (
                EntityDelta::Removed(_),
                EntityDelta::Modified {
                    current,
                    key_values,
                    children,
                    ..
                },
            ) => {
                let target_action = first_change(name, key_values, children, base_value);
                self.op.add_conflict(
                    ConflictType::RemovalOfModifiedEntity,
                    MergeAction::remove_entity(Arc::clone(current)),
                    target_action,
                    None,
                    Some(Arc::clone(current)),
                );
            }
            (
                EntityDelta::Modified {
                    current,
                    key_values,
                    children,
                    ..
                },
                EntityDelta::Removed(base),
            ) => {
                // The rest of the source's changes to this entity travel with
                // the re-inserted entity; they get no actions of their own.
                let Some(source_action) = first_change(name, key_values, children, |kv| {
                    self.target_value(name, kv.key())
                }) else {
                    return;
                };
                self.op.add_conflict(
                    ConflictType::ModificationOfRemovedEntity,
                    source_action,
                    Some(MergeAction::remove_entity(Arc::clone(base))),
                    Some(Arc::clone(current)),
                    None,
                );
            }
            (
                EntityDelta::Modified {
                    current: mine,
                    key_values: my_kvs,
                    children: my_children,
                    ..
                },
                EntityDelta::Modified {
                    current: their,
                    key_values: their_kvs,
                    children: their_children,
                    ..
                },
            ) => {
                self.key_values(name, my_kvs, their_kvs, mine, their);
                self.children(name, my_children, their_children);
            }
            _ => {
                warn!(entity = %name, "entity changes do not share a base; keeping the source change");
                self.plain(ours);
            }
        }
    }

    fn key_values(
        &self,
        name: &EntityName,
        ours: &[KeyValueChange],
        theirs: &[KeyValueChange],
        mine: &Arc<Entity>,
        their: &Arc<Entity>,
    ) {
        let their_by_key: HashMap<&str, &KeyValueChange> = theirs.iter().map(|c| (c.key(), c)).collect();

        for change in ours {
            let Some(their_change) = their_by_key.get(change.key()) else {
                self.op.add_action(self.source_key_value(name, change));
                continue;
            };

            let conflict_type = match (change, their_change) {
                (KeyValueChange::Removed { .. }, KeyValueChange::Removed { .. }) => {
                    debug!(entity = %name, key = change.key(), "key removed on both sides");
                    continue;
                }
                (KeyValueChange::Removed { .. }, _) => ConflictType::RemovalOfModifiedKeyValue,
                (_, KeyValueChange::Removed { .. }) => ConflictType::ModificationOfRemovedKeyValue,
                _ if change.new_value() == their_change.new_value() => {
                    if matches!(change, KeyValueChange::Changed { .. }) {
                        self.op.add_action(self.source_key_value(name, change));
                    } else {
                        debug!(entity = %name, key = change.key(), "same key added on both sides");
                    }
                    continue;
                }
                _ => ConflictType::SettingKeyToDifferentValue,
            };

            self.op.add_conflict(
                conflict_type,
                self.source_key_value(name, change),
                Some(key_value_action(name, their_change, base_value(their_change))),
                Some(Arc::clone(mine)),
                Some(Arc::clone(their)),
            );
        }
    }

    fn children(&self, name: &EntityName, ours: &[ChildChange], theirs: &[ChildChange]) {
        let their_by_key: HashMap<&ChildKey, &ChildChange> = theirs.iter().map(|c| (c.key(), c)).collect();

        for change in ours {
            let same_on_both_sides = match (change, their_by_key.get(change.key())) {
                (ChildChange::Added { .. }, Some(ChildChange::Added { .. })) => true,
                (ChildChange::Removed { .. }, Some(ChildChange::Removed { .. })) => true,
                _ => false,
            };
            if same_on_both_sides {
                debug!(entity = %name, child = %change.key(), "same child change on both sides");
                continue;
            }
            self.op.add_action(child_action(name, change));
        }
    }

    fn memberships(&self, ours: &[MembershipChange], theirs: &[MembershipChange]) {
        let layers = self.op.merge_layers();
        let groups = self.op.merge_selection_groups();
        let their_set: HashSet<&MembershipChange> = theirs.iter().collect();

        for change in ours {
            let wanted = match change.membership {
                Membership::Layer(_) => layers,
                Membership::SelectionGroup(_) => groups,
            };
            if wanted && !their_set.contains(change) {
                self.op.add_membership_action(change.clone());
            }
        }
    }
}

/// The value a key had in the base, as seen from one side's change.
fn base_value(change: &KeyValueChange) -> Option<String> {
    match change {
        KeyValueChange::Added { .. } => None,
        KeyValueChange::Removed { value, .. } => Some(value.clone()),
        KeyValueChange::Changed { old, .. } => Some(old.clone()),
    }
}

fn key_value_action(entity: &EntityName, change: &KeyValueChange, unchanged: Option<String>) -> MergeAction {
    match change {
        KeyValueChange::Added { key, value } => {
            MergeAction::add_key_value(entity.clone(), key.clone(), value.clone(), unchanged)
        }
        KeyValueChange::Changed { key, new, .. } => {
            MergeAction::change_key_value(entity.clone(), key.clone(), new.clone(), unchanged)
        }
        KeyValueChange::Removed { key, .. } => MergeAction::remove_key_value(entity.clone(), key.clone(), unchanged),
    }
}

fn child_action(entity: &EntityName, change: &ChildChange) -> MergeAction {
    match change {
        ChildChange::Added { key, node } => MergeAction::add_child(entity.clone(), *key, node.clone()),
        ChildChange::Removed { key, node } => MergeAction::remove_child(entity.clone(), *key, node.clone()),
    }
}

/// The first change of an entity modification, key/values before children.
fn first_change<F>(
    entity: &EntityName,
    key_values: &[KeyValueChange],
    children: &[ChildChange],
    unchanged: F,
) -> Option<MergeAction>
where
    F: Fn(&KeyValueChange) -> Option<String>,
{
    if let Some(kv) = key_values.first() {
        return Some(key_value_action(entity, kv, unchanged(kv)));
    }
    children.first().map(|child| child_action(entity, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapmerge_diff::diff_scenes;
    use mapmerge_scene::{ChildNode, SceneMetadata};
    use mapmerge_types::ActionType;

    fn light(brightness: &str) -> Entity {
        Entity::new("light_1")
            .with_key_value("classname", "light")
            .with_key_value("brightness", brightness)
    }

    fn scene(path: &str, entities: Vec<Entity>) -> SceneSnapshot {
        entities
            .into_iter()
            .fold(SceneSnapshot::new(path), |s, e| s.with_entity(e))
    }

    fn classify(source: &SceneSnapshot, base: &SceneSnapshot, target: &SceneSnapshot) -> MergeOperation {
        let op = MergeOperation::new(source.path.clone(), base.path.clone());
        let ours = diff_scenes(base, source).unwrap();
        let theirs = diff_scenes(base, target).unwrap();
        classify_three_way(&op, &ours, &theirs, target);
        op
    }

    fn types(op: &MergeOperation) -> Vec<ActionType> {
        let mut out = Vec::new();
        op.foreach_action(|_, a| out.push(a.action_type()));
        out
    }

    fn conflict_types(op: &MergeOperation) -> Vec<ConflictType> {
        op.conflicts()
            .into_iter()
            .map(|id| op.action(id).unwrap().conflict().unwrap().conflict_type())
            .collect()
    }

    #[test]
    fn untouched_target_gives_plain_actions() {
        let base = scene("base", vec![light("1")]);
        let source = scene("source", vec![light("2"), Entity::new("func_door_2")]);
        let target = scene("target", vec![light("1")]);

        let op = classify(&source, &base, &target);
        assert_eq!(types(&op), vec![ActionType::ChangeKeyValue, ActionType::AddEntity]);
        assert!(op.conflicts().is_empty());

        let id = op.action_ids()[0];
        let edit = op.action(id).unwrap().key_value().cloned().unwrap();
        assert_eq!(edit.unchanged_value.as_deref(), Some("1"));
        assert_eq!(edit.value.as_deref(), Some("2"));
    }

    #[test]
    fn different_values_conflict() {
        let base = scene("base", vec![light("1")]);
        let source = scene("source", vec![light("2")]);
        let target = scene("target", vec![light("3")]);

        let op = classify(&source, &base, &target);
        assert_eq!(conflict_types(&op), vec![ConflictType::SettingKeyToDifferentValue]);

        let conflict = op.action(op.conflicts()[0]).unwrap();
        let conflict = conflict.conflict().unwrap();
        let source_edit = op.action(conflict.source_action()).unwrap();
        let source_edit = source_edit.key_value().unwrap();
        assert_eq!(source_edit.value.as_deref(), Some("2"));
        assert_eq!(source_edit.unchanged_value.as_deref(), Some("3"));
        let target_edit = op.action(conflict.target_action().unwrap()).unwrap();
        assert_eq!(target_edit.key_value().unwrap().value.as_deref(), Some("3"));
    }

    #[test]
    fn same_value_on_both_sides_is_plain() {
        let base = scene("base", vec![light("1")]);
        let source = scene("source", vec![light("2")]);
        let target = scene("target", vec![light("2")]);

        let op = classify(&source, &base, &target);
        assert_eq!(types(&op), vec![ActionType::ChangeKeyValue]);
        assert!(op.conflicts().is_empty());
    }

    #[test]
    fn key_removal_conflicts() {
        let base = scene("base", vec![light("1").with_key_value("target", "t1")]);
        let source = scene("source", vec![light("1")]);
        let target = scene("target", vec![light("1").with_key_value("target", "t2")]);
        let op = classify(&source, &base, &target);
        assert_eq!(conflict_types(&op), vec![ConflictType::RemovalOfModifiedKeyValue]);

        let op = classify(&target, &base, &source);
        assert_eq!(conflict_types(&op), vec![ConflictType::ModificationOfRemovedKeyValue]);
    }

    #[test]
    fn both_removed_is_dropped() {
        let base = scene("base", vec![light("1").with_key_value("target", "t1"), Entity::new("gone")]);
        let both = scene("both", vec![light("1")]);

        let op = classify(&both, &base, &both.clone());
        assert!(!op.has_actions());
    }

    #[test]
    fn modification_of_removed_entity_suppresses_the_rest() {
        let base = scene("base", vec![light("1")]);
        let source = scene(
            "source",
            vec![light("2")
                .with_key_value("colour", "1 0 0")
                .with_child(ChildNode::new("brush", "b"))],
        );
        let target = scene("target", vec![]);

        let op = classify(&source, &base, &target);
        assert_eq!(op.action_count(), 1);
        assert_eq!(conflict_types(&op), vec![ConflictType::ModificationOfRemovedEntity]);

        let action = op.action(op.conflicts()[0]).unwrap();
        let conflict = action.conflict().unwrap();
        assert_eq!(conflict.source_entity().unwrap().key_value("colour"), Some("1 0 0"));
        assert!(conflict.target_entity().is_none());
        let target_action = op.action(conflict.target_action().unwrap()).unwrap();
        assert_eq!(target_action.action_type(), ActionType::RemoveEntity);
    }

    #[test]
    fn removal_of_modified_entity() {
        let base = scene("base", vec![light("1")]);
        let source = scene("source", vec![]);
        let target = scene("target", vec![light("5")]);

        let op = classify(&source, &base, &target);
        assert_eq!(conflict_types(&op), vec![ConflictType::RemovalOfModifiedEntity]);
        let action = op.action(op.conflicts()[0]).unwrap();
        let conflict = action.conflict().unwrap();
        let source_action = op.action(conflict.source_action()).unwrap();
        assert_eq!(source_action.action_type(), ActionType::RemoveEntity);
        let target_action = op.action(conflict.target_action().unwrap()).unwrap();
        assert_eq!(target_action.key_value().unwrap().unchanged_value.as_deref(), Some("1"));
    }

    #[test]
    fn entity_added_on_both_sides() {
        let base = scene("base", vec![]);
        let same = scene("a", vec![light("1")]);
        let op = classify(&same, &base, &same.clone());
        assert!(!op.has_actions());

        let other = scene("b", vec![light("2")]);
        let op = classify(&same, &base, &other);
        assert_eq!(conflict_types(&op), vec![ConflictType::SettingKeyToDifferentValue]);
        assert_eq!(op.action(op.conflicts()[0]).unwrap().affected_node().to_string(), "light_1");
    }

    #[test]
    fn child_changes_on_both_sides() {
        let brush = |c: &str| ChildNode::new("brush", c);
        let base = scene("base", vec![Entity::new("worldspawn").with_child(brush("a"))]);
        let source = scene(
            "source",
            vec![Entity::new("worldspawn").with_child(brush("b")).with_child(brush("c"))],
        );
        let target = scene("target", vec![Entity::new("worldspawn").with_child(brush("c"))]);

        let op = classify(&source, &base, &target);
        // "a" removed on both sides and "c" added on both sides; only "b" is new.
        assert_eq!(types(&op), vec![ActionType::AddChildNode]);
    }

    #[test]
    fn two_way_has_no_conflicts() {
        let target = scene("target", vec![light("1"), Entity::new("only_target")]);
        let source = scene("source", vec![light("2"), Entity::new("only_source")]);
        let op = MergeOperation::new("source", "");
        classify_two_way(&op, &diff_scenes(&target, &source).unwrap(), &target);

        assert!(op.conflicts().is_empty());
        assert_eq!(
            types(&op),
            vec![ActionType::ChangeKeyValue, ActionType::RemoveEntity, ActionType::AddEntity]
        );
    }

    #[test]
    fn membership_flags_filter_changes() {
        let base = scene("base", vec![light("1")]);
        let source = scene("source", vec![light("1")]).with_metadata(
            SceneMetadata::new()
                .with_layer_member("lights", "light_1")
                .with_group_member(7, "light_1"),
        );
        let target = scene("target", vec![light("1")]);

        let op = classify(&source, &base, &target);
        assert_eq!(op.membership_actions().len(), 2);

        let op = MergeOperation::new("source", "base");
        op.set_merge_layers(false);
        classify_three_way(
            &op,
            &diff_scenes(&base, &source).unwrap(),
            &diff_scenes(&base, &target).unwrap(),
            &target,
        );
        let actions = op.membership_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].change.membership, Membership::SelectionGroup(7));
    }

    #[test]
    fn shared_membership_change_is_dropped() {
        let base = scene("base", vec![light("1")]);
        let both = scene("both", vec![light("1")])
            .with_metadata(SceneMetadata::new().with_layer_member("lights", "light_1"));
        let op = classify(&both, &base, &both.clone());
        assert!(op.membership_actions().is_empty());
    }
}
