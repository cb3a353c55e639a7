use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use mapmerge_types::{ChildKey, ContentHash, EntityName};

// ---------------------------------------------------------------------------
// ChildNode
// ---------------------------------------------------------------------------

/// A child geometry node of an entity (brush, patch, ...).
///
/// The merge engine never interprets `content`; it only fingerprints it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildNode {
    /// Primitive kind tag, e.g. `"brush"` or `"patch"`.
    pub kind: String,
    /// Serialized primitive content as supplied by the document provider.
    pub content: String,
}

impl ChildNode {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }

    /// Content fingerprint used as this node's identity across snapshots.
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::of_child(&self.kind, &self.content)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A named scene entity with key/value attributes and child nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: EntityName,
    #[serde(default)]
    pub key_values: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ChildNode>,
}

impl Entity {
    /// Create an entity with no attributes and no children.
    pub fn new(name: impl Into<EntityName>) -> Self {
        Self {
            name: name.into(),
            key_values: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style key/value setter.
    pub fn with_key_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.key_values.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: ChildNode) -> Self {
        self.children.push(child);
        self
    }

    /// Look up a key's value.
    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    /// Identity keys for every child, in child order.
    ///
    /// The occurrence counter distinguishes children with identical content.
    pub fn child_keys(&self) -> Vec<ChildKey> {
        let mut seen: HashMap<ContentHash, u32> = HashMap::new();
        self.children
            .iter()
            .map(|child| {
                let fingerprint = child.fingerprint();
                let occurrence = seen.entry(fingerprint).or_insert(0);
                let key = ChildKey::new(fingerprint, *occurrence);
                *occurrence += 1;
                key
            })
            .collect()
    }

    /// Semantic equality: same key/value pairs and the same multiset of
    /// child fingerprints, regardless of child order.
    pub fn semantically_equal(&self, other: &Entity) -> bool {
        if self.name != other.name || self.key_values != other.key_values {
            return false;
        }
        if self.children.len() != other.children.len() {
            return false;
        }
        let mut mine: Vec<ContentHash> = self.children.iter().map(ChildNode::fingerprint).collect();
        let mut theirs: Vec<ContentHash> =
            other.children.iter().map(ChildNode::fingerprint).collect();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A structural grouping an entity can belong to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Named editor layer.
    Layer(String),
    /// Numbered selection group.
    SelectionGroup(u64),
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer(name) => write!(f, "layer '{name}'"),
            Self::SelectionGroup(id) => write!(f, "selection group {id}"),
        }
    }
}

/// Layer and selection-group membership of a scene.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    #[serde(default)]
    pub layers: BTreeMap<String, BTreeSet<EntityName>>,
    #[serde(default)]
    pub selection_groups: BTreeMap<u64, BTreeSet<EntityName>>,
}

impl SceneMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `entity` is a member of the given layer or group.
    pub fn is_member(&self, membership: &Membership, entity: &str) -> bool {
        match membership {
            Membership::Layer(name) => self
                .layers
                .get(name)
                .is_some_and(|members| members.contains(entity)),
            Membership::SelectionGroup(id) => self
                .selection_groups
                .get(id)
                .is_some_and(|members| members.contains(entity)),
        }
    }

    /// Add or remove `entity` from a layer or group. Returns the previous state.
    ///
    /// A layer or group exists only while it has members: the first member
    /// creates it and removing the last one drops it.
    pub fn set_member(&mut self, membership: &Membership, entity: &EntityName, member: bool) -> bool {
        match membership {
            Membership::Layer(name) => toggle(&mut self.layers, name.clone(), entity, member),
            Membership::SelectionGroup(id) => toggle(&mut self.selection_groups, *id, entity, member),
        }
    }

    /// Layers and groups `entity` belongs to.
    pub fn memberships_of(&self, entity: &str) -> Vec<Membership> {
        let layers = self
            .layers
            .iter()
            .filter(|(_, members)| members.contains(entity))
            .map(|(name, _)| Membership::Layer(name.clone()));
        let groups = self
            .selection_groups
            .iter()
            .filter(|(_, members)| members.contains(entity))
            .map(|(id, _)| Membership::SelectionGroup(*id));
        layers.chain(groups).collect()
    }

    /// Drop layers and groups without members.
    pub fn prune(&mut self) {
        self.layers.retain(|_, members| !members.is_empty());
        self.selection_groups.retain(|_, members| !members.is_empty());
    }

    /// Every (grouping, member) pair, sorted.
    pub fn memberships(&self) -> BTreeSet<(Membership, EntityName)> {
        let layers = self.layers.iter().flat_map(|(name, members)| {
            members
                .iter()
                .map(move |m| (Membership::Layer(name.clone()), m.clone()))
        });
        let groups = self.selection_groups.iter().flat_map(|(id, members)| {
            members
                .iter()
                .map(move |m| (Membership::SelectionGroup(*id), m.clone()))
        });
        layers.chain(groups).collect()
    }

    /// Builder-style layer membership.
    pub fn with_layer_member(mut self, layer: impl Into<String>, entity: impl Into<EntityName>) -> Self {
        self.set_member(&Membership::Layer(layer.into()), &entity.into(), true);
        self
    }

    /// Builder-style selection-group membership.
    pub fn with_group_member(mut self, group: u64, entity: impl Into<EntityName>) -> Self {
        self.set_member(&Membership::SelectionGroup(group), &entity.into(), true);
        self
    }
}

fn toggle<K: Ord>(
    groupings: &mut BTreeMap<K, BTreeSet<EntityName>>,
    key: K,
    entity: &EntityName,
    member: bool,
) -> bool {
    if member {
        return !groupings.entry(key).or_default().insert(entity.clone());
    }
    let Some(members) = groupings.get_mut(&key) else {
        return false;
    };
    let removed = members.remove(entity);
    if members.is_empty() {
        groupings.remove(&key);
    }
    removed
}

// ---------------------------------------------------------------------------
// SceneSnapshot
// ---------------------------------------------------------------------------

/// An immutable scene used as merge input.
///
/// Entities are shared via `Arc` so that merge actions and conflicts can
/// refer back to the snapshot entity without copying it. A snapshot is not
/// validated on construction; duplicate names are reported by the identity
/// resolver when the snapshot enters a merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Name or path of the document this snapshot was read from.
    pub path: String,
    #[serde(default)]
    pub entities: Vec<Arc<Entity>>,
    #[serde(default)]
    pub metadata: SceneMetadata,
}

impl SceneSnapshot {
    /// Create an empty snapshot.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entities: Vec::new(),
            metadata: SceneMetadata::new(),
        }
    }

    /// Builder-style entity append.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(Arc::new(entity));
        self
    }

    /// Builder-style metadata setter.
    pub fn with_metadata(mut self, metadata: SceneMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// First entity with the given name.
    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.iter().find(|e| e.name.as_str() == name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Removed
// ---------------------------------------------------------------------------

/// An item taken out of the live tree together with the position it had.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removed<T> {
    pub index: usize,
    pub item: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brush(content: &str) -> ChildNode {
        ChildNode::new("brush", content)
    }

    #[test]
    fn child_keys_count_occurrences() {
        let entity = Entity::new("worldspawn")
            .with_child(brush("a"))
            .with_child(brush("b"))
            .with_child(brush("a"));

        let keys = entity.child_keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].fingerprint, keys[2].fingerprint);
        assert_eq!(keys[0].occurrence, 0);
        assert_eq!(keys[2].occurrence, 1);
        assert_eq!(keys[1].occurrence, 0);
    }

    #[test]
    fn semantic_equality_ignores_child_order() {
        let a = Entity::new("e")
            .with_key_value("classname", "func_static")
            .with_child(brush("1"))
            .with_child(brush("2"));
        let b = Entity::new("e")
            .with_key_value("classname", "func_static")
            .with_child(brush("2"))
            .with_child(brush("1"));
        assert!(a.semantically_equal(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn semantic_equality_detects_value_difference() {
        let a = Entity::new("e").with_key_value("origin", "0 0 0");
        let b = Entity::new("e").with_key_value("origin", "0 0 8");
        assert!(!a.semantically_equal(&b));
    }

    #[test]
    fn metadata_membership_roundtrip() {
        let mut meta = SceneMetadata::new();
        let light: EntityName = "light_1".into();
        let layer = Membership::Layer("lights".into());

        assert!(!meta.set_member(&layer, &light, true));
        assert!(meta.is_member(&layer, "light_1"));
        assert!(meta.set_member(&layer, &light, true));
        assert!(meta.set_member(&layer, &light, false));
        assert!(!meta.is_member(&layer, "light_1"));
        assert!(meta.layers.is_empty());

        assert!(!meta.set_member(&layer, &light, false));
        assert!(meta.layers.is_empty());
    }

    #[test]
    fn memberships_cover_layers_and_groups() {
        let meta = SceneMetadata::new()
            .with_layer_member("lights", "light_1")
            .with_group_member(7, "light_1")
            .with_group_member(7, "door_1");
        let all = meta.memberships();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&(Membership::SelectionGroup(7), "door_1".into())));
        assert_eq!(
            meta.memberships_of("light_1"),
            vec![Membership::Layer("lights".into()), Membership::SelectionGroup(7)]
        );
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snapshot = SceneSnapshot::new("maps/test.map")
            .with_entity(Entity::new("light_1").with_key_value("brightness", "1"))
            .with_metadata(SceneMetadata::new().with_layer_member("lights", "light_1"));
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: SceneSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(
            parsed.entity("light_1").and_then(|e| e.key_value("brightness")),
            Some("1")
        );
    }
}
