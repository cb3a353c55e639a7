//! Merge actions: the atomic, individually toggleable steps of a merge.
//!
//! Actions live in an arena owned by [`MergeOperation`](crate::MergeOperation)
//! and are addressed by [`ActionId`]. A [`ConflictResolution`] refers to its
//! wrapped source and target actions by id, so no action is ever shared by
//! reference.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use mapmerge_diff::MembershipChange;
use mapmerge_scene::{ChildNode, Entity};
use mapmerge_types::{ActionType, ChildKey, ConflictType, EntityName, NodePath, ResolutionType};

/// Handle to an action inside a merge operation's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(usize);

impl ActionId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the action in its operation's arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload of a key/value action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueAction {
    pub entity: EntityName,
    pub key: String,
    /// Value to write, `None` for a removal.
    pub value: Option<String>,
    /// The value the target held before the action ran, `None` if the key
    /// was absent. Refreshed from the live tree when the action is applied.
    pub unchanged_value: Option<String>,
}

/// A conflict between a source change and a target change.
///
/// The wrapped source action runs only when the resolution is
/// [`ResolutionType::ApplySourceChange`]; the target action is informational
/// and never runs, because the target already contains its effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictResolution {
    conflict_type: ConflictType,
    source_action: ActionId,
    target_action: Option<ActionId>,
    source_entity: Option<Arc<Entity>>,
    target_entity: Option<Arc<Entity>>,
    resolution: ResolutionType,
}

impl ConflictResolution {
    pub(crate) fn new(
        conflict_type: ConflictType,
        source_action: ActionId,
        target_action: Option<ActionId>,
        source_entity: Option<Arc<Entity>>,
        target_entity: Option<Arc<Entity>>,
    ) -> Self {
        Self {
            conflict_type,
            source_action,
            target_action,
            source_entity,
            target_entity,
            resolution: ResolutionType::Unresolved,
        }
    }

    pub fn conflict_type(&self) -> ConflictType {
        self.conflict_type
    }

    /// The source-side change this conflict gates.
    pub fn source_action(&self) -> ActionId {
        self.source_action
    }

    /// The target-side change the source collides with, if it can be expressed
    /// as a single action.
    pub fn target_action(&self) -> Option<ActionId> {
        self.target_action
    }

    /// The conflicting entity as it appears in the source snapshot.
    pub fn source_entity(&self) -> Option<&Arc<Entity>> {
        self.source_entity.as_ref()
    }

    /// The conflicting entity as it appears in the target snapshot.
    pub fn target_entity(&self) -> Option<&Arc<Entity>> {
        self.target_entity.as_ref()
    }

    pub fn resolution(&self) -> ResolutionType {
        self.resolution
    }

    pub(crate) fn set_resolution(&mut self, resolution: ResolutionType) {
        self.resolution = resolution;
    }
}

/// What an action does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Placeholder that changes nothing.
    NoAction,
    /// Insert a whole entity, including its key/values and children.
    AddEntity { entity: Arc<Entity> },
    /// Remove an entity. Carries the entity as last seen so the removal can
    /// be shown and reverted.
    RemoveEntity { entity: Arc<Entity> },
    AddKeyValue(KeyValueAction),
    RemoveKeyValue(KeyValueAction),
    ChangeKeyValue(KeyValueAction),
    /// Append a child node to an existing entity.
    AddChildNode {
        entity: EntityName,
        key: ChildKey,
        node: ChildNode,
    },
    /// Remove a child node, matched by fingerprint.
    RemoveChildNode {
        entity: EntityName,
        key: ChildKey,
        node: ChildNode,
    },
    ConflictResolution(ConflictResolution),
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::NoAction => ActionType::NoAction,
            Self::AddEntity { .. } => ActionType::AddEntity,
            Self::RemoveEntity { .. } => ActionType::RemoveEntity,
            Self::AddKeyValue(_) => ActionType::AddKeyValue,
            Self::RemoveKeyValue(_) => ActionType::RemoveKeyValue,
            Self::ChangeKeyValue(_) => ActionType::ChangeKeyValue,
            Self::AddChildNode { .. } => ActionType::AddChildNode,
            Self::RemoveChildNode { .. } => ActionType::RemoveChildNode,
            Self::ConflictResolution(_) => ActionType::ConflictResolution,
        }
    }
}

/// One step of a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeAction {
    kind: ActionKind,
    affected_node: NodePath,
    active: bool,
    /// The conflict wrapping this action, if any.
    pub(crate) owner: Option<ActionId>,
}

impl MergeAction {
    fn new(kind: ActionKind, affected_node: NodePath) -> Self {
        Self {
            kind,
            affected_node,
            active: true,
            owner: None,
        }
    }

    /// An action that does nothing, anchored at `entity`.
    pub fn no_action(entity: impl Into<EntityName>) -> Self {
        Self::new(ActionKind::NoAction, NodePath::Entity(entity.into()))
    }

    pub fn add_entity(entity: Arc<Entity>) -> Self {
        let path = NodePath::Entity(entity.name.clone());
        Self::new(ActionKind::AddEntity { entity }, path)
    }

    pub fn remove_entity(entity: Arc<Entity>) -> Self {
        let path = NodePath::Entity(entity.name.clone());
        Self::new(ActionKind::RemoveEntity { entity }, path)
    }

    pub fn add_key_value(
        entity: impl Into<EntityName>,
        key: impl Into<String>,
        value: impl Into<String>,
        unchanged_value: Option<String>,
    ) -> Self {
        let edit = KeyValueAction {
            entity: entity.into(),
            key: key.into(),
            value: Some(value.into()),
            unchanged_value,
        };
        let path = key_value_path(&edit);
        Self::new(ActionKind::AddKeyValue(edit), path)
    }

    pub fn change_key_value(
        entity: impl Into<EntityName>,
        key: impl Into<String>,
        value: impl Into<String>,
        unchanged_value: Option<String>,
    ) -> Self {
        let edit = KeyValueAction {
            entity: entity.into(),
            key: key.into(),
            value: Some(value.into()),
            unchanged_value,
        };
        let path = key_value_path(&edit);
        Self::new(ActionKind::ChangeKeyValue(edit), path)
    }

    pub fn remove_key_value(
        entity: impl Into<EntityName>,
        key: impl Into<String>,
        unchanged_value: Option<String>,
    ) -> Self {
        let edit = KeyValueAction {
            entity: entity.into(),
            key: key.into(),
            value: None,
            unchanged_value,
        };
        let path = key_value_path(&edit);
        Self::new(ActionKind::RemoveKeyValue(edit), path)
    }

    pub fn add_child(entity: impl Into<EntityName>, key: ChildKey, node: ChildNode) -> Self {
        let entity = entity.into();
        let path = NodePath::Child {
            entity: entity.clone(),
            key,
        };
        Self::new(ActionKind::AddChildNode { entity, key, node }, path)
    }

    pub fn remove_child(entity: impl Into<EntityName>, key: ChildKey, node: ChildNode) -> Self {
        let entity = entity.into();
        let path = NodePath::Child {
            entity: entity.clone(),
            key,
        };
        Self::new(ActionKind::RemoveChildNode { entity, key, node }, path)
    }

    /// Conflicts start inactive: nothing runs until a resolution is chosen.
    pub(crate) fn new_conflict(conflict: ConflictResolution, affected_node: NodePath) -> Self {
        let mut action = Self::new(ActionKind::ConflictResolution(conflict), affected_node);
        action.active = false;
        action
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    /// The tree location this action targets.
    pub fn affected_node(&self) -> &NodePath {
        &self.affected_node
    }

    /// The entity this action targets.
    pub fn entity(&self) -> &EntityName {
        self.affected_node.entity()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Returns `true` if this action is wrapped by a conflict.
    pub fn is_wrapped(&self) -> bool {
        self.owner.is_some()
    }

    /// The key/value payload, for key/value actions.
    pub fn key_value(&self) -> Option<&KeyValueAction> {
        match &self.kind {
            ActionKind::AddKeyValue(edit)
            | ActionKind::RemoveKeyValue(edit)
            | ActionKind::ChangeKeyValue(edit) => Some(edit),
            _ => None,
        }
    }

    pub(crate) fn key_value_mut(&mut self) -> Option<&mut KeyValueAction> {
        match &mut self.kind {
            ActionKind::AddKeyValue(edit)
            | ActionKind::RemoveKeyValue(edit)
            | ActionKind::ChangeKeyValue(edit) => Some(edit),
            _ => None,
        }
    }

    /// The conflict payload, for conflict actions.
    pub fn conflict(&self) -> Option<&ConflictResolution> {
        match &self.kind {
            ActionKind::ConflictResolution(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub(crate) fn conflict_mut(&mut self) -> Option<&mut ConflictResolution> {
        match &mut self.kind {
            ActionKind::ConflictResolution(conflict) => Some(conflict),
            _ => None,
        }
    }
}

fn key_value_path(edit: &KeyValueAction) -> NodePath {
    NodePath::KeyValue {
        entity: edit.entity.clone(),
        key: edit.key.clone(),
    }
}

/// A layer or selection-group membership change proposed by the source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAction {
    pub change: MembershipChange,
    pub active: bool,
}

impl MembershipAction {
    pub fn new(change: MembershipChange) -> Self {
        Self {
            change,
            active: true,
        }
    }
}
