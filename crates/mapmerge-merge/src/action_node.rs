//! Preview decorations for nodes touched by applied actions.
//!
//! Entities and child nodes are the nodes of a scene; key/values are not.
//! Actions on a key/value are therefore staged on the wrapper of their
//! entity, and each node has at most one wrapper.

use std::collections::BTreeMap;

use mapmerge_types::{ActionType, NodePath};

use crate::action::{ActionId, MergeAction};
use crate::operation::MergeOperation;

/// A staged node in the live tree, holding the actions that affect it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeActionNode {
    affected_node: NodePath,
    action_type: ActionType,
    actions: Vec<ActionId>,
}

impl MergeActionNode {
    fn new(affected_node: NodePath, action_type: ActionType) -> Self {
        Self {
            affected_node,
            action_type,
            actions: Vec::new(),
        }
    }

    /// The wrapped node.
    pub fn affected_node(&self) -> &NodePath {
        &self.affected_node
    }

    /// Type of the first action staged on this node.
    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn merge_action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn action_ids(&self) -> &[ActionId] {
        &self.actions
    }

    /// Returns `true` if any staged action is still active in `operation`.
    pub fn has_active_actions(&self, operation: &MergeOperation) -> bool {
        self.actions
            .iter()
            .filter_map(|id| operation.action(*id))
            .any(|action| action.is_active())
    }

    /// Visit every staged action.
    pub fn foreach_merge_action<F>(&self, operation: &MergeOperation, mut visitor: F)
    where
        F: FnMut(ActionId, &MergeAction),
    {
        for id in &self.actions {
            if let Some(action) = operation.action(*id) {
                visitor(*id, &action);
            }
        }
    }
}

/// The node a path is staged on.
fn wrapped_node(path: &NodePath) -> NodePath {
    match path {
        NodePath::KeyValue { entity, .. } => NodePath::Entity(entity.clone()),
        other => other.clone(),
    }
}

/// At most one wrapper per node, keyed by the wrapped node's path.
#[derive(Clone, Debug, Default)]
pub(crate) struct StagedNodes {
    nodes: BTreeMap<NodePath, MergeActionNode>,
}

impl StagedNodes {
    pub(crate) fn stage(&mut self, path: &NodePath, id: ActionId, action_type: ActionType) {
        let node = wrapped_node(path);
        let wrapper = self
            .nodes
            .entry(node.clone())
            .or_insert_with(|| MergeActionNode::new(node, action_type));
        if !wrapper.actions.contains(&id) {
            wrapper.actions.push(id);
        }
    }

    /// Drop `id` from its wrapper; a wrapper left with no actions is removed.
    pub(crate) fn unstage(&mut self, id: ActionId) {
        for wrapper in self.nodes.values_mut() {
            wrapper.actions.retain(|a| *a != id);
        }
        self.nodes.retain(|_, wrapper| !wrapper.actions.is_empty());
    }

    pub(crate) fn get(&self, path: &NodePath) -> Option<&MergeActionNode> {
        self.nodes.get(&wrapped_node(path))
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &MergeActionNode> {
        self.nodes.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}
