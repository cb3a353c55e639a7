use serde::{Deserialize, Serialize};

/// Options controlling what a merge operation considers.
///
/// Metadata flags are read when the operation is populated; changing them
/// on the operation afterwards has no effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Whether selection-group membership participates in the merge.
    pub merge_selection_groups: bool,
    /// Whether layer membership participates in the merge.
    pub merge_layers: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            merge_selection_groups: true,
            merge_layers: true,
        }
    }
}

impl MergeOptions {
    /// Merge entities only; ignore layers and selection groups.
    pub fn without_metadata() -> Self {
        Self {
            merge_selection_groups: false,
            merge_layers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_merge_everything() {
        let options = MergeOptions::default();
        assert!(options.merge_layers);
        assert!(options.merge_selection_groups);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let options: MergeOptions = serde_json::from_str(r#"{"merge_layers": false}"#).unwrap();
        assert!(!options.merge_layers);
        assert!(options.merge_selection_groups);
    }
}
