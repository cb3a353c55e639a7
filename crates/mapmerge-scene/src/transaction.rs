//! Scoped transactions over an [`UndoSystem`].

use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::error::SceneError;
use crate::traits::UndoSystem;

/// An open transaction on a scene.
///
/// The guard dereferences to the scene, so mutations go through it. It must
/// be closed with [`commit`](Transaction::commit); dropping it any other way
/// (early return, `?`, unwinding) rolls the transaction back.
pub struct Transaction<'a, S: UndoSystem + ?Sized> {
    scene: &'a mut S,
    closed: bool,
}

impl<'a, S: UndoSystem + ?Sized> Transaction<'a, S> {
    /// Open a transaction on `scene`.
    pub fn begin(scene: &'a mut S, label: &str) -> Result<Self, SceneError> {
        scene.begin(label)?;
        Ok(Self {
            scene,
            closed: false,
        })
    }

    /// Commit every mutation made through this guard as one undo step.
    pub fn commit(mut self) -> Result<(), SceneError> {
        self.closed = true;
        self.scene.commit()
    }

    /// Explicitly revert every mutation made through this guard.
    pub fn rollback(mut self) -> Result<(), SceneError> {
        self.closed = true;
        self.scene.rollback()
    }
}

impl<S: UndoSystem + ?Sized> Deref for Transaction<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.scene
    }
}

impl<S: UndoSystem + ?Sized> DerefMut for Transaction<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.scene
    }
}

impl<S: UndoSystem + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.scene.rollback() {
                warn!(error = %e, "failed to roll back abandoned transaction");
            }
        }
    }
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
pub fn with_transaction<S, T, E, F>(scene: &mut S, label: &str, f: F) -> Result<T, E>
where
    S: UndoSystem + ?Sized,
    E: From<SceneError>,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    let mut tx = Transaction::begin(scene, label)?;
    let value = f(&mut *tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SceneTree;
    use crate::model::Entity;
    use crate::traits::SceneGraph;

    #[test]
    fn dropped_guard_rolls_back() {
        let mut tree = SceneTree::new();
        {
            let mut tx = Transaction::begin(&mut tree, "abandoned").unwrap();
            tx.insert_entity(Entity::new("a")).unwrap();
            assert!(tx.contains_entity("a"));
        }
        assert!(!tree.contains_entity("a"));
        assert!(!tree.in_transaction());
    }

    #[test]
    fn committed_guard_keeps_changes() {
        let mut tree = SceneTree::new();
        let mut tx = Transaction::begin(&mut tree, "kept").unwrap();
        tx.insert_entity(Entity::new("a")).unwrap();
        tx.commit().unwrap();
        assert!(tree.contains_entity("a"));
        assert_eq!(tree.undo_depth(), 1);
    }

    #[test]
    fn with_transaction_rolls_back_on_error() {
        let mut tree = SceneTree::new();
        let result: Result<(), SceneError> = with_transaction(&mut tree, "failing", |scene| {
            scene.insert_entity(Entity::new("a"))?;
            scene.remove_entity("missing")?;
            Ok(())
        });
        assert_eq!(result.unwrap_err(), SceneError::EntityNotFound("missing".into()));
        assert!(!tree.contains_entity("a"));
    }

    #[test]
    fn with_transaction_commits_on_success() {
        let mut tree = SceneTree::new();
        let count = with_transaction(&mut tree, "ok", |scene| -> Result<usize, SceneError> {
            scene.insert_entity(Entity::new("a"))?;
            scene.insert_entity(Entity::new("b"))?;
            Ok(scene.entity_count())
        })
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(tree.undo_depth(), 1);
    }
}
