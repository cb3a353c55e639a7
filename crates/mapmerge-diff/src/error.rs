//! Error types for the diff crate.

use mapmerge_types::EntityName;

/// Errors that can occur while matching or diffing snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// Two entities in one snapshot share a name, so identity is ambiguous.
    #[error("ambiguous identity in snapshot '{snapshot}': entity {name} appears more than once")]
    DuplicateEntity { snapshot: String, name: EntityName },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
