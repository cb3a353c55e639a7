use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Identity of an entity: its name, unique within one snapshot.
///
/// The name is the join key across the source, base, and target snapshots.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityName(String);

impl EntityName {
    /// Create a new entity name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityName({})", self.0)
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EntityName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of a child node within its owning entity.
///
/// Child nodes are matched by content: the fingerprint of the node plus the
/// zero-based occurrence of that fingerprint within the entity, so that two
/// identical brushes in one entity remain distinguishable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildKey {
    pub fingerprint: ContentHash,
    pub occurrence: u32,
}

impl ChildKey {
    pub fn new(fingerprint: ContentHash, occurrence: u32) -> Self {
        Self {
            fingerprint,
            occurrence,
        }
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildKey({}#{})", self.fingerprint.short_hex(), self.occurrence)
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.fingerprint, self.occurrence)
    }
}

/// The logical tree location an action targets.
///
/// Used to group actions onto a single decorated node during preview and to
/// check at apply time that the owning entity exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodePath {
    /// The entity itself.
    Entity(EntityName),
    /// One key/value attribute of an entity.
    KeyValue { entity: EntityName, key: String },
    /// One child node of an entity.
    Child { entity: EntityName, key: ChildKey },
}

impl NodePath {
    /// The entity that owns this location.
    pub fn entity(&self) -> &EntityName {
        match self {
            Self::Entity(name) => name,
            Self::KeyValue { entity, .. } | Self::Child { entity, .. } => entity,
        }
    }

    /// Returns `true` if this path addresses an entity rather than one of its parts.
    pub fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(name) => write!(f, "{name}"),
            Self::KeyValue { entity, key } => write!(f, "{entity}[\"{key}\"]"),
            Self::Child { entity, key } => write!(f, "{entity}/{key}"),
        }
    }
}
