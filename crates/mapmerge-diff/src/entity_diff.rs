//! Entity-level diff: key/value attributes and child nodes of one entity.
//!
//! Key/values can be added, removed, or changed. Child nodes have no
//! generic "change": a modified primitive has a new fingerprint and shows
//! up as one removal plus one addition.

use serde::{Deserialize, Serialize};

use mapmerge_scene::{ChildNode, Entity};
use mapmerge_types::ChildKey;

use crate::identity::{resolve_children, resolve_key_values};

/// A single change to an entity's key/values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum KeyValueChange {
    /// A key was introduced.
    Added { key: String, value: String },
    /// A key was removed.
    Removed { key: String, value: String },
    /// A key's value was changed.
    Changed { key: String, old: String, new: String },
}

impl KeyValueChange {
    /// The key this change touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Changed { key, .. } => key,
        }
    }

    /// The value the key has after the change, `None` for a removal.
    pub fn new_value(&self) -> Option<&str> {
        match self {
            Self::Added { value, .. } => Some(value),
            Self::Changed { new, .. } => Some(new),
            Self::Removed { .. } => None,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

/// A single change to an entity's child nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChildChange {
    Added { key: ChildKey, node: ChildNode },
    Removed { key: ChildKey, node: ChildNode },
}

impl ChildChange {
    /// The identity of the child this change touches.
    pub fn key(&self) -> &ChildKey {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } => key,
        }
    }
}

/// Compute the key/value changes turning `base` into `other`.
///
/// Keys of `base` come first (changed or removed, in key order), then keys
/// introduced by `other`.
pub fn diff_key_values(base: &Entity, other: &Entity) -> Vec<KeyValueChange> {
    let resolved = resolve_key_values(&base.key_values, &other.key_values);
    let mut changes = Vec::new();

    for (key, old, new) in resolved.both {
        if old != new {
            changes.push(KeyValueChange::Changed { key, old, new });
        }
    }
    for (key, value) in resolved.only_a {
        changes.push(KeyValueChange::Removed { key, value });
    }
    for (key, value) in resolved.only_b {
        changes.push(KeyValueChange::Added { key, value });
    }

    changes.sort_by(|a, b| {
        let rank = |c: &KeyValueChange| matches!(c, KeyValueChange::Added { .. }) as u8;
        rank(a).cmp(&rank(b)).then_with(|| a.key().cmp(b.key()))
    });
    changes
}

/// Compute the child node changes turning `base` into `other`.
///
/// Removals come first in `base` order, then additions in `other` order.
pub fn diff_children(base: &Entity, other: &Entity) -> Vec<ChildChange> {
    let resolved = resolve_children(base, other);
    resolved
        .only_a
        .into_iter()
        .map(|(key, node)| ChildChange::Removed { key, node })
        .chain(
            resolved
                .only_b
                .into_iter()
                .map(|(key, node)| ChildChange::Added { key, node }),
        )
        .collect()
}
