//! Cross-snapshot identity resolution.
//!
//! Each snapshot is a separate in-memory tree, so nodes are joined by a
//! logical identity rather than by reference: entities by name, key/values
//! by key within a matched entity pair, and child nodes by content
//! fingerprint.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use mapmerge_scene::{ChildNode, Entity, SceneSnapshot};
use mapmerge_types::{ChildKey, ContentHash, EntityName};

use crate::error::{DiffError, DiffResult};

/// Nodes of two trees bucketed by identity.
///
/// `both` and `only_a` follow the order of tree A; `only_b` follows tree B.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityMap<K, V> {
    pub both: Vec<(K, V, V)>,
    pub only_a: Vec<(K, V)>,
    pub only_b: Vec<(K, V)>,
}

impl<K, V> IdentityMap<K, V> {
    fn new() -> Self {
        Self {
            both: Vec::new(),
            only_a: Vec::new(),
            only_b: Vec::new(),
        }
    }

    /// Returns `true` if every node of A has a partner in B and vice versa.
    pub fn is_bijective(&self) -> bool {
        self.only_a.is_empty() && self.only_b.is_empty()
    }
}

fn index_entities(snapshot: &SceneSnapshot) -> DiffResult<HashMap<&EntityName, &Arc<Entity>>> {
    let mut index = HashMap::with_capacity(snapshot.entities.len());
    for entity in &snapshot.entities {
        if index.insert(&entity.name, entity).is_some() {
            return Err(DiffError::DuplicateEntity {
                snapshot: snapshot.path.clone(),
                name: entity.name.clone(),
            });
        }
    }
    Ok(index)
}

/// Match the entities of two snapshots by name.
///
/// Fails with [`DiffError::DuplicateEntity`] if either snapshot names the
/// same entity twice.
pub fn resolve_entities(
    a: &SceneSnapshot,
    b: &SceneSnapshot,
) -> DiffResult<IdentityMap<EntityName, Arc<Entity>>> {
    let a_index = index_entities(a)?;
    let b_index = index_entities(b)?;

    let mut map = IdentityMap::new();
    for entity in &a.entities {
        match b_index.get(&entity.name) {
            Some(other) => map
                .both
                .push((entity.name.clone(), Arc::clone(entity), Arc::clone(other))),
            None => map.only_a.push((entity.name.clone(), Arc::clone(entity))),
        }
    }
    for entity in &b.entities {
        if !a_index.contains_key(&entity.name) {
            map.only_b.push((entity.name.clone(), Arc::clone(entity)));
        }
    }
    Ok(map)
}

/// Match the key/values of an already-matched entity pair by key.
pub fn resolve_key_values(
    a: &BTreeMap<String, String>,
    b: &BTreeMap<String, String>,
) -> IdentityMap<String, String> {
    let mut map = IdentityMap::new();
    for (key, value) in a {
        match b.get(key) {
            Some(other) => map.both.push((key.clone(), value.clone(), other.clone())),
            None => map.only_a.push((key.clone(), value.clone())),
        }
    }
    for (key, value) in b {
        if !a.contains_key(key) {
            map.only_b.push((key.clone(), value.clone()));
        }
    }
    map
}

/// Match the child nodes of an already-matched entity pair.
///
/// Children at the same index with equal content are paired first; the
/// remainder are paired by fingerprint, so reordering alone produces no
/// unmatched nodes. Keys come from A's numbering; children only in B are
/// numbered after A's occurrences of the same fingerprint so their keys
/// never collide with A's.
pub fn resolve_children(a: &Entity, b: &Entity) -> IdentityMap<ChildKey, ChildNode> {
    let a_keys = a.child_keys();
    let a_prints: Vec<ContentHash> = a_keys.iter().map(|k| k.fingerprint).collect();
    let b_prints: Vec<ContentHash> = b.children.iter().map(ChildNode::fingerprint).collect();

    let mut partner: Vec<Option<usize>> = vec![None; a.children.len()];
    let mut b_taken: HashSet<usize> = HashSet::new();

    // Positional pass.
    for (i, print) in a_prints.iter().enumerate() {
        if b_prints.get(i) == Some(print) {
            partner[i] = Some(i);
            b_taken.insert(i);
        }
    }

    // Content pass over whatever the positional pass left behind.
    let mut free_b: HashMap<ContentHash, Vec<usize>> = HashMap::new();
    for (j, print) in b_prints.iter().enumerate().rev() {
        if !b_taken.contains(&j) {
            free_b.entry(*print).or_default().push(j);
        }
    }
    for (i, print) in a_prints.iter().enumerate() {
        if partner[i].is_some() {
            continue;
        }
        if let Some(j) = free_b.get_mut(print).and_then(Vec::pop) {
            partner[i] = Some(j);
            b_taken.insert(j);
        }
    }

    let mut map = IdentityMap::new();
    for (i, key) in a_keys.iter().enumerate() {
        match partner[i] {
            Some(j) => map
                .both
                .push((*key, a.children[i].clone(), b.children[j].clone())),
            None => map.only_a.push((*key, a.children[i].clone())),
        }
    }

    let mut next_occurrence: HashMap<ContentHash, u32> = HashMap::new();
    for key in &a_keys {
        *next_occurrence.entry(key.fingerprint).or_insert(0) += 1;
    }
    for (j, print) in b_prints.iter().enumerate() {
        if b_taken.contains(&j) {
            continue;
        }
        let occurrence = next_occurrence.entry(*print).or_insert(0);
        map.only_b
            .push((ChildKey::new(*print, *occurrence), b.children[j].clone()));
        *occurrence += 1;
    }
    map
}
