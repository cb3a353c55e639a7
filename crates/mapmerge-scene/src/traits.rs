use mapmerge_types::{ContentHash, EntityName};

use crate::error::{SceneError, SceneResult};
use crate::model::{ChildNode, Entity, Membership, Removed};

/// The mutable live scene a merge is applied onto.
///
/// All implementations must satisfy these invariants:
/// - Entity names are unique; inserting an existing name fails with
///   [`SceneError::EntityExists`].
/// - Mutations addressing a missing entity fail with
///   [`SceneError::EntityNotFound`] and leave the scene untouched.
/// - A failed mutation has no partial effect.
/// - Removing an entity also removes it from every layer and group.
pub trait SceneGraph {
    /// Look up an entity by name.
    fn entity(&self, name: &str) -> Option<&Entity>;

    /// Names of all entities, in scene order.
    fn entity_names(&self) -> Vec<EntityName>;

    /// Number of entities in the scene.
    fn entity_count(&self) -> usize;

    /// Insert an entity at the given position.
    fn insert_entity_at(&mut self, index: usize, entity: Entity) -> SceneResult<()>;

    /// Remove an entity, returning it with its former position. The entity
    /// leaves every layer and group it belonged to.
    fn remove_entity(&mut self, name: &str) -> SceneResult<Removed<Entity>>;

    /// Set a key's value, returning the previous value if the key existed.
    fn set_key_value(&mut self, entity: &str, key: &str, value: &str) -> SceneResult<Option<String>>;

    /// Remove a key, returning its value. Fails if the key is absent.
    fn remove_key_value(&mut self, entity: &str, key: &str) -> SceneResult<String>;

    /// Insert a child node at the given position within its entity.
    fn insert_child_at(&mut self, entity: &str, index: usize, child: ChildNode) -> SceneResult<()>;

    /// Remove one child with the given fingerprint.
    ///
    /// Children with equal fingerprints are interchangeable; the last such
    /// child is removed.
    fn remove_child(&mut self, entity: &str, fingerprint: &ContentHash) -> SceneResult<Removed<ChildNode>>;

    /// Whether `entity` belongs to the given layer or group.
    fn is_member(&self, membership: &Membership, entity: &str) -> bool;

    /// Layers and groups `entity` belongs to.
    fn memberships(&self, entity: &str) -> Vec<Membership>;

    /// Add or remove layer/group membership. Returns the previous state.
    fn set_member(&mut self, membership: &Membership, entity: &str, member: bool) -> SceneResult<bool>;

    /// Returns `true` if an entity with this name exists.
    fn contains_entity(&self, name: &str) -> bool {
        self.entity(name).is_some()
    }

    /// Append an entity at the end of the scene.
    fn insert_entity(&mut self, entity: Entity) -> SceneResult<()> {
        let index = self.entity_count();
        self.insert_entity_at(index, entity)
    }

    /// Append a child node to an entity.
    fn insert_child(&mut self, entity: &str, child: ChildNode) -> SceneResult<()> {
        let index = self
            .entity(entity)
            .map(|e| e.children.len())
            .ok_or_else(|| SceneError::EntityNotFound(entity.into()))?;
        self.insert_child_at(entity, index, child)
    }
}

/// Transactional journal around live-scene mutations.
///
/// A transaction groups every mutation made between [`begin`] and
/// [`commit`] into one undoable step. [`rollback`] reverts the open
/// transaction so the scene is structurally identical to its state at
/// [`begin`]. Only one transaction may be open at a time.
///
/// [`begin`]: UndoSystem::begin
/// [`commit`]: UndoSystem::commit
/// [`rollback`]: UndoSystem::rollback
pub trait UndoSystem {
    /// Open a transaction. Fails if one is already open.
    fn begin(&mut self, label: &str) -> SceneResult<()>;

    /// Close the open transaction and push it onto the undo stack.
    fn commit(&mut self) -> SceneResult<()>;

    /// Revert and discard the open transaction.
    fn rollback(&mut self) -> SceneResult<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Revert the most recently committed transaction. Returns `false` if
    /// there was nothing to undo.
    fn undo(&mut self) -> SceneResult<bool>;

    /// Re-apply the most recently undone transaction. Returns `false` if
    /// there was nothing to redo.
    fn redo(&mut self) -> SceneResult<bool>;
}
