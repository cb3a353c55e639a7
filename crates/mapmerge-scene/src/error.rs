use mapmerge_types::{ContentHash, EntityName};

/// Errors from live scene operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// The named entity does not exist in the scene.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityName),

    /// An entity with this name already exists in the scene.
    #[error("entity already exists: {0}")]
    EntityExists(EntityName),

    /// A snapshot used to seed a live tree names the same entity twice.
    #[error("duplicate entity in snapshot '{path}': {name}")]
    DuplicateEntity { path: String, name: EntityName },

    /// The entity has no such key.
    #[error("key '{key}' not found on entity {entity}")]
    KeyNotFound { entity: EntityName, key: String },

    /// The entity has no child with this fingerprint.
    #[error("child {fingerprint:?} not found on entity {entity}")]
    ChildNotFound {
        entity: EntityName,
        fingerprint: ContentHash,
    },

    /// A positional insert or removal was out of bounds.
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// `begin` was called while a transaction is already open.
    #[error("a transaction is already open: {0}")]
    TransactionOpen(String),

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no transaction is open")]
    NoTransaction,

    /// The scene backend refused the mutation.
    #[error("scene backend rejected mutation: {0}")]
    Backend(String),
}

/// Result alias for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
