//! In-memory live scene with an undo journal.
//!
//! [`SceneTree`] stores entities in a `Vec` (scene order is preserved) and
//! implements both [`SceneGraph`] and [`UndoSystem`]. While a transaction is
//! open, every mutation records its inverse; rollback and undo replay those
//! inverses in reverse order through the same mutation paths, which in turn
//! yields the journal used for redo.

use tracing::debug;

use mapmerge_types::{ContentHash, EntityName};

use crate::error::{SceneError, SceneResult};
use crate::model::{ChildNode, Entity, Membership, Removed, SceneMetadata, SceneSnapshot};
use crate::traits::{SceneGraph, UndoSystem};

/// Inverse information for one journaled mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
enum UndoEntry {
    InsertedEntity {
        name: EntityName,
    },
    RemovedEntity {
        index: usize,
        entity: Entity,
    },
    KeyValue {
        entity: EntityName,
        key: String,
        previous: Option<String>,
    },
    InsertedChild {
        entity: EntityName,
        index: usize,
    },
    RemovedChild {
        entity: EntityName,
        index: usize,
        child: ChildNode,
    },
    Membership {
        membership: Membership,
        entity: EntityName,
        previous: bool,
    },
}

#[derive(Clone, Debug)]
struct Journal {
    label: String,
    entries: Vec<UndoEntry>,
}

impl Journal {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }
}

/// In-memory live scene tree.
///
/// Equality compares scene content only (entities and metadata), never the
/// undo history.
#[derive(Clone, Debug, Default)]
pub struct SceneTree {
    entities: Vec<Entity>,
    metadata: SceneMetadata,
    open: Option<Journal>,
    undo_stack: Vec<Journal>,
    redo_stack: Vec<Journal>,
}

impl SceneTree {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live tree from a snapshot, rejecting duplicate entity names.
    pub fn from_snapshot(snapshot: &SceneSnapshot) -> SceneResult<Self> {
        let mut tree = Self::new();
        for entity in &snapshot.entities {
            if tree.position(entity.name.as_str()).is_some() {
                return Err(SceneError::DuplicateEntity {
                    path: snapshot.path.clone(),
                    name: entity.name.clone(),
                });
            }
            tree.entities.push(Entity::clone(entity));
        }
        tree.metadata = snapshot.metadata.clone();
        tree.metadata.prune();
        Ok(tree)
    }

    /// Capture the current content as an immutable snapshot.
    pub fn to_snapshot(&self, path: impl Into<String>) -> SceneSnapshot {
        let mut snapshot = SceneSnapshot::new(path).with_metadata(self.metadata.clone());
        for entity in &self.entities {
            snapshot = snapshot.with_entity(entity.clone());
        }
        snapshot
    }

    /// All entities in scene order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Layer and selection-group membership.
    pub fn metadata(&self) -> &SceneMetadata {
        &self.metadata
    }

    /// Number of committed transactions that can be undone.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of undone transactions that can be redone.
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.name.as_str() == name)
    }

    fn entity_mut(&mut self, name: &str) -> SceneResult<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.name.as_str() == name)
            .ok_or_else(|| SceneError::EntityNotFound(name.into()))
    }

    fn record(&mut self, entry: UndoEntry) {
        if let Some(journal) = self.open.as_mut() {
            journal.entries.push(entry);
        }
    }

    fn remove_child_at(&mut self, entity: &str, index: usize) -> SceneResult<ChildNode> {
        let target = self.entity_mut(entity)?;
        let len = target.children.len();
        if index >= len {
            return Err(SceneError::IndexOutOfRange { index, len });
        }
        let child = target.children.remove(index);
        self.record(UndoEntry::RemovedChild {
            entity: entity.into(),
            index,
            child: child.clone(),
        });
        Ok(child)
    }

    fn apply_inverse(&mut self, entry: UndoEntry) -> SceneResult<()> {
        match entry {
            UndoEntry::InsertedEntity { name } => self.remove_entity(name.as_str()).map(drop),
            UndoEntry::RemovedEntity { index, entity } => self.insert_entity_at(index, entity),
            UndoEntry::KeyValue {
                entity,
                key,
                previous,
            } => match previous {
                Some(value) => self.set_key_value(entity.as_str(), &key, &value).map(drop),
                None => self.remove_key_value(entity.as_str(), &key).map(drop),
            },
            UndoEntry::InsertedChild { entity, index } => {
                self.remove_child_at(entity.as_str(), index).map(drop)
            }
            UndoEntry::RemovedChild {
                entity,
                index,
                child,
            } => self.insert_child_at(entity.as_str(), index, child),
            UndoEntry::Membership {
                membership,
                entity,
                previous,
            } => self.set_member(&membership, entity.as_str(), previous).map(drop),
        }
    }

    /// Replay a journal's inverses newest-first, returning the journal of
    /// the replay itself (which reverts the replay).
    fn replay_inverse(&mut self, journal: Journal) -> SceneResult<Journal> {
        let outer = self.open.replace(Journal::new(journal.label.clone()));
        let result = journal
            .entries
            .into_iter()
            .rev()
            .try_for_each(|entry| self.apply_inverse(entry));
        let replayed = std::mem::replace(&mut self.open, outer);
        result?;
        Ok(replayed.unwrap_or_else(|| Journal::new(journal.label)))
    }
}

impl PartialEq for SceneTree {
    fn eq(&self, other: &Self) -> bool {
        self.entities == other.entities && self.metadata == other.metadata
    }
}

impl Eq for SceneTree {}

impl SceneGraph for SceneTree {
    fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name.as_str() == name)
    }

    fn entity_names(&self) -> Vec<EntityName> {
        self.entities.iter().map(|e| e.name.clone()).collect()
    }

    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn insert_entity_at(&mut self, index: usize, entity: Entity) -> SceneResult<()> {
        if self.position(entity.name.as_str()).is_some() {
            return Err(SceneError::EntityExists(entity.name));
        }
        let len = self.entities.len();
        if index > len {
            return Err(SceneError::IndexOutOfRange { index, len });
        }
        let name = entity.name.clone();
        self.entities.insert(index, entity);
        self.record(UndoEntry::InsertedEntity { name });
        Ok(())
    }

    fn remove_entity(&mut self, name: &str) -> SceneResult<Removed<Entity>> {
        let index = self
            .position(name)
            .ok_or_else(|| SceneError::EntityNotFound(name.into()))?;
        // Memberships are journaled first so that undo re-inserts the
        // entity before re-joining it.
        let entity_name = EntityName::from(name);
        for membership in self.metadata.memberships_of(name) {
            self.metadata.set_member(&membership, &entity_name, false);
            self.record(UndoEntry::Membership {
                membership,
                entity: entity_name.clone(),
                previous: true,
            });
        }
        let entity = self.entities.remove(index);
        self.record(UndoEntry::RemovedEntity {
            index,
            entity: entity.clone(),
        });
        Ok(Removed {
            index,
            item: entity,
        })
    }

    fn set_key_value(&mut self, entity: &str, key: &str, value: &str) -> SceneResult<Option<String>> {
        let previous = self
            .entity_mut(entity)?
            .key_values
            .insert(key.to_string(), value.to_string());
        self.record(UndoEntry::KeyValue {
            entity: entity.into(),
            key: key.to_string(),
            previous: previous.clone(),
        });
        Ok(previous)
    }

    fn remove_key_value(&mut self, entity: &str, key: &str) -> SceneResult<String> {
        let value = self
            .entity_mut(entity)?
            .key_values
            .remove(key)
            .ok_or_else(|| SceneError::KeyNotFound {
                entity: entity.into(),
                key: key.to_string(),
            })?;
        self.record(UndoEntry::KeyValue {
            entity: entity.into(),
            key: key.to_string(),
            previous: Some(value.clone()),
        });
        Ok(value)
    }

    fn insert_child_at(&mut self, entity: &str, index: usize, child: ChildNode) -> SceneResult<()> {
        let target = self.entity_mut(entity)?;
        let len = target.children.len();
        if index > len {
            return Err(SceneError::IndexOutOfRange { index, len });
        }
        target.children.insert(index, child);
        self.record(UndoEntry::InsertedChild {
            entity: entity.into(),
            index,
        });
        Ok(())
    }

    fn remove_child(&mut self, entity: &str, fingerprint: &ContentHash) -> SceneResult<Removed<ChildNode>> {
        let index = self
            .entity_mut(entity)?
            .children
            .iter()
            .rposition(|c| c.fingerprint() == *fingerprint)
            .ok_or_else(|| SceneError::ChildNotFound {
                entity: entity.into(),
                fingerprint: *fingerprint,
            })?;
        let child = self.remove_child_at(entity, index)?;
        Ok(Removed { index, item: child })
    }

    fn is_member(&self, membership: &Membership, entity: &str) -> bool {
        self.metadata.is_member(membership, entity)
    }

    fn memberships(&self, entity: &str) -> Vec<Membership> {
        self.metadata.memberships_of(entity)
    }

    fn set_member(&mut self, membership: &Membership, entity: &str, member: bool) -> SceneResult<bool> {
        if self.position(entity).is_none() {
            return Err(SceneError::EntityNotFound(entity.into()));
        }
        let name = EntityName::from(entity);
        let previous = self.metadata.set_member(membership, &name, member);
        self.record(UndoEntry::Membership {
            membership: membership.clone(),
            entity: name,
            previous,
        });
        Ok(previous)
    }
}

impl UndoSystem for SceneTree {
    fn begin(&mut self, label: &str) -> SceneResult<()> {
        if let Some(open) = &self.open {
            return Err(SceneError::TransactionOpen(open.label.clone()));
        }
        debug!(label, "transaction begin");
        self.open = Some(Journal::new(label));
        Ok(())
    }

    fn commit(&mut self) -> SceneResult<()> {
        let journal = self.open.take().ok_or(SceneError::NoTransaction)?;
        debug!(label = %journal.label, mutations = journal.entries.len(), "transaction commit");
        if !journal.entries.is_empty() {
            self.undo_stack.push(journal);
            self.redo_stack.clear();
        }
        Ok(())
    }

    fn rollback(&mut self) -> SceneResult<()> {
        let journal = self.open.take().ok_or(SceneError::NoTransaction)?;
        debug!(label = %journal.label, mutations = journal.entries.len(), "transaction rollback");
        self.replay_inverse(journal).map(drop)
    }

    fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    fn undo(&mut self) -> SceneResult<bool> {
        if let Some(open) = &self.open {
            return Err(SceneError::TransactionOpen(open.label.clone()));
        }
        let Some(journal) = self.undo_stack.pop() else {
            return Ok(false);
        };
        debug!(label = %journal.label, "undo");
        let inverse = self.replay_inverse(journal)?;
        self.redo_stack.push(inverse);
        Ok(true)
    }

    fn redo(&mut self) -> SceneResult<bool> {
        if let Some(open) = &self.open {
            return Err(SceneError::TransactionOpen(open.label.clone()));
        }
        let Some(journal) = self.redo_stack.pop() else {
            return Ok(false);
        };
        debug!(label = %journal.label, "redo");
        let inverse = self.replay_inverse(journal)?;
        self.undo_stack.push(inverse);
        Ok(true)
    }
}
