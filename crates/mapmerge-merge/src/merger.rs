//! Building a merge operation from snapshots.

use tracing::info;

use mapmerge_diff::diff_scenes;
use mapmerge_scene::SceneSnapshot;

use crate::classifier::{classify_three_way, classify_two_way};
use crate::config::MergeOptions;
use crate::error::MergeResult;
use crate::operation::MergeOperation;

impl MergeOperation {
    /// Build the merge of `source` into `target`.
    ///
    /// With a `base`, changes are classified three-way against the common
    /// ancestor. Without one, every difference between source and target is
    /// a plain action.
    pub fn construct(
        source: &SceneSnapshot,
        base: Option<&SceneSnapshot>,
        target: &SceneSnapshot,
        options: &MergeOptions,
    ) -> MergeResult<Self> {
        let base_path = base.map(|b| b.path.clone()).unwrap_or_default();
        let op = Self::new(source.path.clone(), base_path);
        op.set_merge_layers(options.merge_layers);
        op.set_merge_selection_groups(options.merge_selection_groups);
        op.populate(source, base, target)?;
        Ok(op)
    }

    /// Fill an empty operation with the actions merging `source` into `target`.
    ///
    /// Fails with a setup error, leaving the operation empty, if any snapshot
    /// has ambiguous entity identities.
    pub fn populate(
        &self,
        source: &SceneSnapshot,
        base: Option<&SceneSnapshot>,
        target: &SceneSnapshot,
    ) -> MergeResult<()> {
        self.ensure_mutable()?;
        match base {
            Some(base) => {
                let ours = diff_scenes(base, source)?;
                let theirs = diff_scenes(base, target)?;
                self.mark_populated()?;
                classify_three_way(self, &ours, &theirs, target);
            }
            None => {
                let diff = diff_scenes(target, source)?;
                self.mark_populated()?;
                classify_two_way(self, &diff, target);
            }
        }

        info!(
            source = %source.path,
            base = base.map(|b| b.path.as_str()).unwrap_or(""),
            target = %target.path,
            actions = self.action_count(),
            conflicts = self.conflicts().len(),
            memberships = self.membership_actions().len(),
            "merge operation populated"
        );
        Ok(())
    }
}
