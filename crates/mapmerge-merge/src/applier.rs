//! Applying a merge operation to a live scene.
//!
//! An apply pass runs every active, not yet applied action inside a single
//! scene transaction, in operation order, followed by the membership
//! actions. Any failure rolls the transaction back and leaves both the scene
//! and the operation exactly as they were before the pass.
//!
//! Each mutation also records its inverse in the operation's journal, so an
//! [`abort`](MergeOperation::abort) can revert the merge after the passes
//! have been committed.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mapmerge_scene::{with_transaction, ChildNode, Entity, Membership, SceneError, SceneGraph, SceneResult, Transaction, UndoSystem};
use mapmerge_types::{ActionType, ConflictType, ContentHash, EntityName, NodePath};

use crate::action::{ActionId, ActionKind, ConflictResolution, MergeAction};
use crate::error::{MergeError, MergeResult};
use crate::event::MergeEvent;
use crate::operation::MergeOperation;

/// Lifecycle of a merge operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    /// Nothing applied yet.
    #[default]
    Idle,
    /// At least one apply pass committed; staged nodes are decorated.
    Previewing,
    /// Finished: applied changes are kept and staging is cleared.
    Committed,
    /// Aborted: applied changes were reverted.
    RolledBack,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Previewing => write!(f, "previewing"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Outcome of one apply pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Top-level actions applied by this pass, in order.
    pub applied: Vec<ActionId>,
    /// Membership actions applied by this pass.
    pub memberships: usize,
    /// Inactive actions, unresolved conflicts, and rejected conflicts.
    pub skipped: usize,
}

/// Inverse of one live-tree mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Revert {
    RemoveEntity(EntityName),
    RestoreEntity {
        index: usize,
        entity: Entity,
        memberships: Vec<Membership>,
    },
    RestoreKeyValue {
        entity: EntityName,
        key: String,
        value: Option<String>,
    },
    RemoveChild {
        entity: EntityName,
        fingerprint: ContentHash,
    },
    RestoreChild {
        entity: EntityName,
        index: usize,
        node: ChildNode,
    },
    RestoreMembership {
        membership: Membership,
        entity: EntityName,
        member: bool,
    },
}

impl Revert {
    fn run<S: SceneGraph + ?Sized>(self, scene: &mut S) -> SceneResult<()> {
        match self {
            Self::RemoveEntity(name) => scene.remove_entity(name.as_str()).map(drop),
            Self::RestoreEntity {
                index,
                entity,
                memberships,
            } => {
                let index = index.min(scene.entity_count());
                let name = entity.name.clone();
                scene.insert_entity_at(index, entity)?;
                for membership in &memberships {
                    scene.set_member(membership, name.as_str(), true)?;
                }
                Ok(())
            }
            Self::RestoreKeyValue { entity, key, value } => match value {
                Some(value) => scene.set_key_value(entity.as_str(), &key, &value).map(drop),
                None => {
                    let present = scene
                        .entity(entity.as_str())
                        .is_some_and(|e| e.key_value(&key).is_some());
                    if present {
                        scene.remove_key_value(entity.as_str(), &key)?;
                    }
                    Ok(())
                }
            },
            Self::RemoveChild { entity, fingerprint } => scene.remove_child(entity.as_str(), &fingerprint).map(drop),
            Self::RestoreChild { entity, index, node } => {
                let len = scene
                    .entity(entity.as_str())
                    .map(|e| e.children.len())
                    .ok_or_else(|| SceneError::EntityNotFound(entity.clone()))?;
                scene.insert_child_at(entity.as_str(), index.min(len), node)
            }
            Self::RestoreMembership {
                membership,
                entity,
                member,
            } => scene.set_member(&membership, entity.as_str(), member).map(drop),
        }
    }
}

/// Everything one pass changed, merged into the operation only on commit.
#[derive(Default)]
struct Pass {
    applied: Vec<ActionId>,
    memberships: Vec<usize>,
    reverts: Vec<Revert>,
    staged: Vec<(NodePath, ActionId, ActionType)>,
    unchanged: Vec<(ActionId, Option<String>)>,
    skipped: usize,
}

/// Marks the operation busy for the lifetime of the guard.
struct InFlight<'a>(&'a Cell<bool>);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a Cell<bool>) -> MergeResult<Self> {
        if flag.replace(true) {
            return Err(MergeError::ConcurrentMergeAccess);
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl MergeOperation {
    /// Apply every active action not applied by an earlier pass.
    ///
    /// The pass is atomic: on error the scene transaction is rolled back and
    /// the operation keeps the state it had before the call. While the pass
    /// runs, review changes from observers fail with
    /// [`MergeError::ConcurrentMergeAccess`].
    pub fn apply_actions<S>(&self, scene: &mut S) -> MergeResult<ApplyReport>
    where
        S: SceneGraph + UndoSystem + ?Sized,
    {
        self.ensure_mutable()?;
        let guard = InFlight::enter(&self.in_flight)?;

        let label = format!("Merge {}", self.source_path());
        let mut tx = Transaction::begin(scene, &label)?;
        let mut pass = Pass::default();
        match self.run_pass(&mut *tx, &mut pass) {
            Ok(()) => tx.commit()?,
            Err(err) => {
                warn!(source = self.source_path(), error = %err, "merge apply failed, rolling back");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback of failed merge apply failed");
                }
                return Err(err);
            }
        }

        let report = ApplyReport {
            applied: pass.applied.clone(),
            memberships: pass.memberships.len(),
            skipped: pass.skipped,
        };
        self.absorb(pass);
        self.state.set(MergeState::Previewing);
        drop(guard);

        info!(
            source = self.source_path(),
            actions = report.applied.len(),
            memberships = report.memberships,
            skipped = report.skipped,
            "merge actions applied"
        );
        self.emit(MergeEvent::Applied {
            actions: report.applied.len(),
            memberships: report.memberships,
        });
        Ok(report)
    }

    /// Keep the applied changes and clear the staging decorations.
    pub fn finish(&self) -> MergeResult<()> {
        self.ensure_mutable()?;
        self.staged.borrow_mut().clear();
        self.journal.borrow_mut().clear();
        self.state.set(MergeState::Committed);
        info!(
            source = self.source_path(),
            applied = self.applied.borrow().len(),
            "merge finished"
        );
        self.emit(MergeEvent::Finished);
        Ok(())
    }

    /// Revert everything applied so far, as one scene transaction.
    pub fn abort<S>(&self, scene: &mut S) -> MergeResult<()>
    where
        S: SceneGraph + UndoSystem + ?Sized,
    {
        self.ensure_mutable()?;
        let guard = InFlight::enter(&self.in_flight)?;

        let journal = self.journal.borrow().clone();
        let steps = journal.len();
        if !journal.is_empty() {
            let label = format!("Abort merge {}", self.source_path());
            with_transaction(scene, &label, |scene| -> MergeResult<()> {
                for step in journal.into_iter().rev() {
                    step.run(scene)?;
                }
                Ok(())
            })?;
        }

        self.journal.borrow_mut().clear();
        self.staged.borrow_mut().clear();
        self.applied.borrow_mut().clear();
        self.applied_memberships.borrow_mut().clear();
        self.state.set(MergeState::RolledBack);
        drop(guard);

        info!(source = self.source_path(), reverted = steps, "merge aborted");
        self.emit(MergeEvent::Aborted);
        Ok(())
    }

    fn run_pass<S: SceneGraph + ?Sized>(&self, scene: &mut S, pass: &mut Pass) -> MergeResult<()> {
        for id in self.action_ids() {
            if self.applied.borrow().contains(&id) {
                continue;
            }
            let Some(action) = self.action(id) else {
                continue;
            };
            if !action.is_active() {
                pass.skipped += 1;
                continue;
            }

            match action.kind() {
                ActionKind::ConflictResolution(conflict) => self.apply_conflict(scene, id, &action, conflict, pass)?,
                _ => apply_plain(scene, id, &action, pass)?,
            }
            pass.applied.push(id);
            pass.staged
                .push((action.affected_node().clone(), id, action.action_type()));
            self.emit(MergeEvent::ActionApplied(id));
        }

        for (index, membership) in self.membership_actions().into_iter().enumerate() {
            if !membership.active || self.applied_memberships.borrow().contains(&index) {
                continue;
            }
            let change = membership.change;
            if !scene.contains_entity(change.entity.as_str()) {
                debug!(entity = %change.entity, membership = %change.membership, "membership target not in scene, skipped");
                continue;
            }
            let previous = scene.set_member(&change.membership, change.entity.as_str(), change.member)?;
            if previous != change.member {
                pass.reverts.push(Revert::RestoreMembership {
                    membership: change.membership,
                    entity: change.entity,
                    member: previous,
                });
            }
            pass.memberships.push(index);
        }
        Ok(())
    }

    fn apply_conflict<S: SceneGraph + ?Sized>(
        &self,
        scene: &mut S,
        id: ActionId,
        action: &MergeAction,
        conflict: &ConflictResolution,
        pass: &mut Pass,
    ) -> MergeResult<()> {
        let source_id = conflict.source_action();
        let source = self.action(source_id).ok_or(MergeError::UnknownAction(source_id))?;
        let fail = |err: SceneError| apply_failure(id, action, err);

        match (conflict.conflict_type(), source.kind()) {
            (ConflictType::ModificationOfRemovedEntity, _) if !scene.contains_entity(source.entity().as_str()) => {
                // The source's whole version of the entity comes back,
                // carrying every change the source made to it.
                let Some(entity) = conflict.source_entity() else {
                    return apply_plain(scene, source_id, &source, pass);
                };
                scene.insert_entity(Entity::clone(entity)).map_err(fail)?;
                pass.reverts.push(Revert::RemoveEntity(entity.name.clone()));
                Ok(())
            }
            (ConflictType::SettingKeyToDifferentValue, ActionKind::AddEntity { entity }) => {
                // Both sides created the entity; the source's version wins
                // and stays in the target's layers and groups.
                let name = entity.name.as_str();
                let (index, memberships) = if scene.contains_entity(name) {
                    let memberships = scene.memberships(name);
                    let index = remove_entity(scene, name, pass).map_err(fail)?;
                    (index, memberships)
                } else {
                    (scene.entity_count(), Vec::new())
                };
                scene.insert_entity_at(index, Entity::clone(entity)).map_err(fail)?;
                pass.reverts.push(Revert::RemoveEntity(entity.name.clone()));
                for membership in memberships {
                    scene.set_member(&membership, name, true).map_err(fail)?;
                    pass.reverts.push(Revert::RestoreMembership {
                        membership,
                        entity: entity.name.clone(),
                        member: false,
                    });
                }
                Ok(())
            }
            _ => apply_plain(scene, source_id, &source, pass),
        }
    }

    /// Fold a committed pass into the operation.
    fn absorb(&self, pass: Pass) {
        self.applied.borrow_mut().extend(pass.applied);
        self.applied_memberships.borrow_mut().extend(pass.memberships);
        self.journal.borrow_mut().extend(pass.reverts);

        let mut staged = self.staged.borrow_mut();
        for (path, id, action_type) in &pass.staged {
            staged.stage(path, *id, *action_type);
        }

        let mut actions = self.actions.borrow_mut();
        for (id, previous) in pass.unchanged {
            if let Some(edit) = actions.get_mut(id.index()).and_then(MergeAction::key_value_mut) {
                edit.unchanged_value = previous;
            }
        }
    }
}

fn apply_failure(id: ActionId, action: &MergeAction, source: SceneError) -> MergeError {
    MergeError::ApplyFailure {
        action: id,
        action_type: action.action_type(),
        node: action.affected_node().clone(),
        source,
    }
}

/// Remove an entity, journaling it together with the memberships the
/// removal strips. Returns its former index.
fn remove_entity<S: SceneGraph + ?Sized>(scene: &mut S, name: &str, pass: &mut Pass) -> SceneResult<usize> {
    let memberships = scene.memberships(name);
    let removed = scene.remove_entity(name)?;
    pass.reverts.push(Revert::RestoreEntity {
        index: removed.index,
        entity: removed.item,
        memberships,
    });
    Ok(removed.index)
}

fn apply_plain<S: SceneGraph + ?Sized>(
    scene: &mut S,
    id: ActionId,
    action: &MergeAction,
    pass: &mut Pass,
) -> MergeResult<()> {
    let action_type = action.action_type();
    if action_type.targets_entity_part() && !scene.contains_entity(action.entity().as_str()) {
        return Err(MergeError::OrderingViolation {
            action: id,
            action_type,
            entity: action.entity().clone(),
        });
    }
    let fail = |err: SceneError| apply_failure(id, action, err);

    match action.kind() {
        ActionKind::NoAction | ActionKind::ConflictResolution(_) => {}
        ActionKind::AddEntity { entity } => {
            scene.insert_entity(Entity::clone(entity)).map_err(fail)?;
            pass.reverts.push(Revert::RemoveEntity(entity.name.clone()));
        }
        ActionKind::RemoveEntity { entity } => {
            remove_entity(scene, entity.name.as_str(), pass).map_err(fail)?;
        }
        ActionKind::AddKeyValue(edit) | ActionKind::ChangeKeyValue(edit) => {
            let value = edit.value.as_deref().unwrap_or_default();
            let previous = scene
                .set_key_value(edit.entity.as_str(), &edit.key, value)
                .map_err(fail)?;
            pass.unchanged.push((id, previous.clone()));
            pass.reverts.push(Revert::RestoreKeyValue {
                entity: edit.entity.clone(),
                key: edit.key.clone(),
                value: previous,
            });
        }
        ActionKind::RemoveKeyValue(edit) => {
            let previous = scene
                .remove_key_value(edit.entity.as_str(), &edit.key)
                .map_err(fail)?;
            pass.unchanged.push((id, Some(previous.clone())));
            pass.reverts.push(Revert::RestoreKeyValue {
                entity: edit.entity.clone(),
                key: edit.key.clone(),
                value: Some(previous),
            });
        }
        ActionKind::AddChildNode { entity, node, .. } => {
            scene.insert_child(entity.as_str(), node.clone()).map_err(fail)?;
            pass.reverts.push(Revert::RemoveChild {
                entity: entity.clone(),
                fingerprint: node.fingerprint(),
            });
        }
        ActionKind::RemoveChildNode { entity, node, .. } => {
            let removed = scene
                .remove_child(entity.as_str(), &node.fingerprint())
                .map_err(fail)?;
            pass.reverts.push(Revert::RestoreChild {
                entity: entity.clone(),
                index: removed.index,
                node: removed.item,
            });
        }
    }
    debug!(action = %id, %action_type, node = %action.affected_node(), "merge action applied");
    Ok(())
}
