//! Scene-level diff: compare a snapshot against a base snapshot.
//!
//! Entities are joined by name. An entity present on both sides with
//! different key/values or children is `Modified`; entities never carry a
//! change of their own beyond that.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mapmerge_scene::{Entity, Membership, SceneMetadata, SceneSnapshot};
use mapmerge_types::EntityName;

use crate::entity_diff::{diff_children, diff_key_values, ChildChange, KeyValueChange};
use crate::error::DiffResult;
use crate::identity::resolve_entities;

/// The result of comparing a snapshot against its base.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneDiff {
    /// Entity changes: base order for modified/removed, then additions in
    /// the compared snapshot's order.
    pub changes: Vec<EntityChange>,
    /// Layer and selection-group membership changes.
    pub memberships: Vec<MembershipChange>,
}

impl SceneDiff {
    /// Create an empty scene diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no entity or membership changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.memberships.is_empty()
    }

    /// Number of entity changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Index the entity changes by entity name.
    pub fn by_name(&self) -> HashMap<&EntityName, &EntityChange> {
        self.changes.iter().map(|c| (&c.name, c)).collect()
    }

    /// Number of added entities.
    pub fn additions(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.delta, EntityDelta::Added(_)))
            .count()
    }

    /// Number of removed entities.
    pub fn removals(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.delta, EntityDelta::Removed(_)))
            .count()
    }

    /// Number of modified entities.
    pub fn modifications(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.delta, EntityDelta::Modified { .. }))
            .count()
    }
}

/// A change to one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityChange {
    pub name: EntityName,
    pub delta: EntityDelta,
}

/// What happened to an entity relative to the base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityDelta {
    /// The entity does not exist in the base.
    Added(Arc<Entity>),
    /// The entity exists only in the base.
    Removed(Arc<Entity>),
    /// The entity exists on both sides with different content.
    Modified {
        base: Arc<Entity>,
        current: Arc<Entity>,
        key_values: Vec<KeyValueChange>,
        children: Vec<ChildChange>,
    },
}

/// A change to layer or selection-group membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipChange {
    pub membership: Membership,
    pub entity: EntityName,
    /// `true` if the entity joined, `false` if it left.
    pub member: bool,
}

/// Compare `other` against `base` and produce a diff.
///
/// Fails if either snapshot has ambiguous entity identities.
pub fn diff_scenes(base: &SceneSnapshot, other: &SceneSnapshot) -> DiffResult<SceneDiff> {
    let resolved = resolve_entities(base, other)?;
    let mut changes = Vec::new();

    let mut removed = resolved.only_a.into_iter().peekable();
    let mut order: HashMap<EntityName, usize> = HashMap::new();
    for (i, entity) in base.entities.iter().enumerate() {
        order.insert(entity.name.clone(), i);
    }

    // Walk matched entities, interleaving removals in base order.
    for (name, base_entity, current) in resolved.both {
        let position = order.get(&name).copied().unwrap_or(usize::MAX);
        while let Some((_, gone)) = removed.next_if(|(n, _)| order.get(n).copied().unwrap_or(0) < position) {
            changes.push(EntityChange {
                name: gone.name.clone(),
                delta: EntityDelta::Removed(gone),
            });
        }

        let key_values = diff_key_values(&base_entity, &current);
        let children = diff_children(&base_entity, &current);
        if key_values.is_empty() && children.is_empty() {
            continue;
        }
        changes.push(EntityChange {
            name,
            delta: EntityDelta::Modified {
                base: base_entity,
                current,
                key_values,
                children,
            },
        });
    }
    for (name, gone) in removed {
        changes.push(EntityChange {
            name,
            delta: EntityDelta::Removed(gone),
        });
    }
    for (name, added) in resolved.only_b {
        changes.push(EntityChange {
            name,
            delta: EntityDelta::Added(added),
        });
    }

    let memberships = diff_metadata(&base.metadata, &other.metadata);
    debug!(
        base = %base.path,
        other = %other.path,
        entities = changes.len(),
        memberships = memberships.len(),
        "scene diff complete"
    );
    Ok(SceneDiff {
        changes,
        memberships,
    })
}

/// Compute membership changes turning `base` metadata into `other`.
pub fn diff_metadata(base: &SceneMetadata, other: &SceneMetadata) -> Vec<MembershipChange> {
    let before = base.memberships();
    let after = other.memberships();

    let left = before.difference(&after).map(|(membership, entity)| MembershipChange {
        membership: membership.clone(),
        entity: entity.clone(),
        member: false,
    });
    let joined = after.difference(&before).map(|(membership, entity)| MembershipChange {
        membership: membership.clone(),
        entity: entity.clone(),
        member: true,
    });
    left.chain(joined).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapmerge_scene::ChildNode;

    fn light(name: &str, brightness: &str) -> Entity {
        Entity::new(name).with_key_value("brightness", brightness)
    }

    #[test]
    fn identical_snapshots_no_changes() {
        let snapshot = SceneSnapshot::new("a.map")
            .with_entity(light("light_1", "1"))
            .with_entity(Entity::new("worldspawn").with_child(ChildNode::new("brush", "b")))
            .with_metadata(SceneMetadata::new().with_layer_member("lights", "light_1"));

        let diff = diff_scenes(&snapshot, &snapshot.clone()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn empty_to_populated_all_additions() {
        let base = SceneSnapshot::new("empty");
        let other = SceneSnapshot::new("full")
            .with_entity(light("a", "1"))
            .with_entity(light("b", "1"));

        let diff = diff_scenes(&base, &other).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.additions(), 2);
    }

    #[test]
    fn populated_to_empty_all_removals() {
        let base = SceneSnapshot::new("full")
            .with_entity(light("a", "1"))
            .with_entity(light("b", "1"));
        let other = SceneSnapshot::new("empty");

        let diff = diff_scenes(&base, &other).unwrap();
        assert_eq!(diff.removals(), 2);
        assert_eq!(diff.changes[0].name.as_str(), "a");
    }

    #[test]
    fn mixed_changes_keep_base_order() {
        let base = SceneSnapshot::new("base")
            .with_entity(light("gone", "1"))
            .with_entity(light("modify", "1"))
            .with_entity(light("keep", "1"));
        let other = SceneSnapshot::new("other")
            .with_entity(light("keep", "1"))
            .with_entity(light("modify", "2"))
            .with_entity(light("added", "1"));

        let diff = diff_scenes(&base, &other).unwrap();
        let names: Vec<&str> = diff.changes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gone", "modify", "added"]);
        assert_eq!(diff.removals(), 1);
        assert_eq!(diff.modifications(), 1);
        assert_eq!(diff.additions(), 1);

        match &diff.changes[1].delta {
            EntityDelta::Modified { key_values, children, .. } => {
                assert_eq!(key_values.len(), 1);
                assert!(children.is_empty());
            }
            other => panic!("expected Modified, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_identity_fails() {
        let base = SceneSnapshot::new("base")
            .with_entity(light("a", "1"))
            .with_entity(light("a", "2"));
        let other = SceneSnapshot::new("other");
        assert!(diff_scenes(&base, &other).is_err());
    }

    #[test]
    fn metadata_changes_are_reported() {
        let base = SceneMetadata::new()
            .with_layer_member("old", "a")
            .with_group_member(1, "a");
        let other = SceneMetadata::new()
            .with_layer_member("new", "a")
            .with_group_member(1, "a");

        let changes = diff_metadata(&base, &other);
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&MembershipChange {
            membership: Membership::Layer("old".into()),
            entity: "a".into(),
            member: false,
        }));
        assert!(changes.contains(&MembershipChange {
            membership: Membership::Layer("new".into()),
            entity: "a".into(),
            member: true,
        }));
    }
}
