use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of mutation a merge action performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NoAction,
    AddEntity,
    RemoveEntity,
    AddKeyValue,
    RemoveKeyValue,
    ChangeKeyValue,
    AddChildNode,
    RemoveChildNode,
    ConflictResolution,
}

impl ActionType {
    /// Returns `true` for actions that operate on a part of an existing entity.
    pub fn targets_entity_part(&self) -> bool {
        matches!(
            self,
            Self::AddKeyValue
                | Self::RemoveKeyValue
                | Self::ChangeKeyValue
                | Self::AddChildNode
                | Self::RemoveChildNode
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "no_action"),
            Self::AddEntity => write!(f, "add_entity"),
            Self::RemoveEntity => write!(f, "remove_entity"),
            Self::AddKeyValue => write!(f, "add_key_value"),
            Self::RemoveKeyValue => write!(f, "remove_key_value"),
            Self::ChangeKeyValue => write!(f, "change_key_value"),
            Self::AddChildNode => write!(f, "add_child_node"),
            Self::RemoveChildNode => write!(f, "remove_child_node"),
            Self::ConflictResolution => write!(f, "conflict_resolution"),
        }
    }
}

/// Categorisation of a collision between a source and a target change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Not a conflict.
    NoConflict,
    /// Entity has been removed in target, source tries to modify it.
    ModificationOfRemovedEntity,
    /// Entity has been modified in target, source tries to remove it.
    RemovalOfModifiedEntity,
    /// Key value has been removed in target, source tries to change it.
    ModificationOfRemovedKeyValue,
    /// Key value has been modified in target, source tries to remove it.
    RemovalOfModifiedKeyValue,
    /// Both sides try to set the same key (or create the same entity) differently.
    SettingKeyToDifferentValue,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConflict => write!(f, "no_conflict"),
            Self::ModificationOfRemovedEntity => write!(f, "modification_of_removed_entity"),
            Self::RemovalOfModifiedEntity => write!(f, "removal_of_modified_entity"),
            Self::ModificationOfRemovedKeyValue => write!(f, "modification_of_removed_key_value"),
            Self::RemovalOfModifiedKeyValue => write!(f, "removal_of_modified_key_value"),
            Self::SettingKeyToDifferentValue => write!(f, "setting_key_to_different_value"),
        }
    }
}

/// The decision taken on a conflict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// No decision yet. Unresolved conflicts are never applied.
    #[default]
    Unresolved,
    /// Keep the target as it is.
    RejectSourceChange,
    /// Apply the source side's change.
    ApplySourceChange,
}

impl ResolutionType {
    /// Whether the wrapped source action runs under this resolution.
    pub fn applies_source(&self) -> bool {
        matches!(self, Self::ApplySourceChange)
    }
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::RejectSourceChange => write!(f, "reject_source_change"),
            Self::ApplySourceChange => write!(f, "apply_source_change"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_part_actions() {
        assert!(ActionType::AddKeyValue.targets_entity_part());
        assert!(ActionType::RemoveChildNode.targets_entity_part());
        assert!(!ActionType::AddEntity.targets_entity_part());
        assert!(!ActionType::ConflictResolution.targets_entity_part());
    }

    #[test]
    fn only_apply_resolution_applies_source() {
        assert!(ResolutionType::ApplySourceChange.applies_source());
        assert!(!ResolutionType::RejectSourceChange.applies_source());
        assert!(!ResolutionType::Unresolved.applies_source());
        assert_eq!(ResolutionType::default(), ResolutionType::Unresolved);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ConflictType::ModificationOfRemovedEntity).unwrap();
        assert_eq!(json, "\"modification_of_removed_entity\"");
        let parsed: ResolutionType = serde_json::from_str("\"apply_source_change\"").unwrap();
        assert_eq!(parsed, ResolutionType::ApplySourceChange);
    }

    #[test]
    fn display_matches_serde_names() {
        assert_eq!(ActionType::ChangeKeyValue.to_string(), "change_key_value");
        assert_eq!(
            ConflictType::SettingKeyToDifferentValue.to_string(),
            "setting_key_to_different_value"
        );
    }
}
