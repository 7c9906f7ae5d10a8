//! # Label Diff Engine
//!
//! Computes, from a repository's label configuration and its live label set,
//! the operations that bring the repository in line with the configuration.
//!
//! Every configured label `L` is classified against the live labels:
//!
//! - **Added**: `L` does not exist and none of its aliases are live.
//! - **Changed** in place: `L` exists but its color or description differs.
//! - **Changed** as a rename: `L` does not exist but an alias is live; the
//!   [rename origin](rename_origin) is renamed to `L`, which keeps the
//!   origin's issue associations.
//! - **Aliased**: every other live alias of `L`. Only one remote label can be
//!   renamed, so issues carrying these labels are re-tagged with `L` instead.
//!
//! Live labels that are neither configured nor claimed as an alias are
//! **Removed**. Each live label name lands in at most one of Changed,
//! Aliased and Removed; a configured label that matches is unchanged and
//! appears in no list.
//!
//! The engine is pure. It never remembers earlier runs, so a retry after a
//! partial apply recomputes the remaining work from live state.

use std::collections::{HashMap, HashSet};

use labelsync_config::RepoConfig;
use serde::Serialize;

use crate::types::Label;

/// A label whose color, description or name is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedLabel {
    pub name: String,
    pub old_name: String,
    pub color: String,
    pub old_color: String,
    pub description: Option<String>,
    pub old_description: Option<String>,
}

impl ChangedLabel {
    /// Whether this update also renames the label.
    #[must_use]
    pub fn is_rename(&self) -> bool {
        self.name != self.old_name
    }

    /// The label as it looks after the update.
    #[must_use]
    pub fn target(&self) -> Label {
        Label {
            name: self.name.clone(),
            color: self.color.clone(),
            description: self.description.clone(),
        }
    }
}

/// A legacy label whose issues are re-tagged with `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasedLabel {
    pub name: String,
    pub old_name: String,
}

/// Output of one [`diff`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelDiff {
    pub added: Vec<Label>,
    pub changed: Vec<ChangedLabel>,
    pub aliased: Vec<AliasedLabel>,
    pub removed: Vec<Label>,
}

impl LabelDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.aliased.is_empty()
            && self.removed.is_empty()
    }

    /// Configured labels that need no operation: `configured ∖ (changed ∪ added)`.
    #[must_use]
    pub fn unchanged<'a>(&self, config: &'a RepoConfig) -> Vec<&'a str> {
        config
            .labels
            .keys()
            .map(String::as_str)
            .filter(|name| {
                !self.added.iter().any(|label| label.name == *name)
                    && !self.changed.iter().any(|label| label.name == *name)
            })
            .collect()
    }
}

/// A live alias of a configured label.
///
/// `priority` is the alias's position in the configuration; lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasCandidate<'a> {
    pub name: &'a str,
    pub priority: usize,
}

/// Pick the alias that is renamed into its successor label.
///
/// The candidate with the lowest priority wins, so the first live alias in
/// configuration order always takes the rename slot regardless of the order
/// the remote store lists labels in.
#[must_use]
pub fn rename_origin<'a, 'b>(candidates: &'b [AliasCandidate<'a>]) -> Option<&'b AliasCandidate<'a>> {
    candidates.iter().min_by_key(|candidate| candidate.priority)
}

/// Compute the operations that turn `current` into the labels `config` describes.
///
/// Label names compare case-insensitively, as GitHub does. A live label
/// matching a configured one only up to case is renamed to the configured
/// spelling.
#[must_use]
pub fn diff(config: &RepoConfig, current: &[Label]) -> LabelDiff {
    let remote: HashMap<String, &Label> = current
        .iter()
        .map(|label| (label.name.to_ascii_lowercase(), label))
        .collect();
    let configured: HashSet<String> = config.labels.keys().map(|name| name.to_ascii_lowercase()).collect();
    // live names (lowercased) already classified; keeps the partition disjoint
    // even when a configuration slipped past validation
    let mut claimed: HashSet<String> = HashSet::new();
    let mut result = LabelDiff::default();

    for (name, desired) in &config.labels {
        let candidates: Vec<AliasCandidate<'_>> = desired
            .alias
            .iter()
            .enumerate()
            .filter_map(|(priority, alias)| {
                let key = alias.to_ascii_lowercase();
                if configured.contains(&key) || claimed.contains(&key) {
                    return None;
                }
                remote.get(&key).map(|label| AliasCandidate {
                    name: label.name.as_str(),
                    priority,
                })
            })
            .collect();
        let mut candidates = dedup_candidates(candidates);

        if let Some(existing) = remote.get(&name.to_ascii_lowercase()) {
            claimed.insert(existing.name.to_ascii_lowercase());
            if existing.name != *name
                || !existing.same_appearance(&desired.color, desired.description.as_deref())
            {
                result.changed.push(ChangedLabel {
                    name: name.clone(),
                    old_name: existing.name.clone(),
                    color: desired.color.clone(),
                    old_color: existing.color.clone(),
                    description: desired.description.clone(),
                    old_description: existing.description.clone(),
                });
            }
        } else if let Some((origin, origin_label)) = rename_origin(&candidates).and_then(|origin| {
            remote
                .get(&origin.name.to_ascii_lowercase())
                .map(|label| (*origin, *label))
        }) {
            claimed.insert(origin.name.to_ascii_lowercase());
            result.changed.push(ChangedLabel {
                name: name.clone(),
                old_name: origin_label.name.clone(),
                color: desired.color.clone(),
                old_color: origin_label.color.clone(),
                description: desired.description.clone(),
                old_description: origin_label.description.clone(),
            });
            candidates.retain(|candidate| candidate.name != origin.name);
        } else {
            result.added.push(Label::from_config(name, desired));
        }

        candidates.sort_by_key(|candidate| candidate.priority);
        for candidate in candidates {
            claimed.insert(candidate.name.to_ascii_lowercase());
            result.aliased.push(AliasedLabel {
                name: name.clone(),
                old_name: candidate.name.to_string(),
            });
        }
    }

    result.removed = current
        .iter()
        .filter(|label| {
            let key = label.name.to_ascii_lowercase();
            !claimed.contains(&key) && !configured.contains(&key)
        })
        .cloned()
        .collect();

    result
}

fn dedup_candidates(candidates: Vec<AliasCandidate<'_>>) -> Vec<AliasCandidate<'_>> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelsync_config::LabelConfig;
    use proptest::prelude::*;

    fn repo_config(labels: Vec<(&str, LabelConfig)>) -> RepoConfig {
        let mut config = RepoConfig::default();
        for (name, label) in labels {
            config.labels.insert(name.to_string(), label);
        }
        config
    }

    /// Apply a diff to a simulated remote label set the way the sync does.
    fn apply(current: &[Label], diff: &LabelDiff, strict: bool) -> Vec<Label> {
        let mut labels: Vec<Label> = current.to_vec();
        for change in &diff.changed {
            if let Some(label) = labels.iter_mut().find(|l| l.name == change.old_name) {
                *label = change.target();
            }
        }
        labels.extend(diff.added.iter().cloned());
        labels.retain(|label| !diff.aliased.iter().any(|a| a.old_name == label.name));
        if strict {
            labels.retain(|label| !diff.removed.iter().any(|r| r.name == label.name));
        }
        labels
    }

    #[test]
    fn test_color_update_is_changed_in_place() {
        let config = repo_config(vec![("update/color", LabelConfig::new("after"))]);
        let current = vec![Label::new("update/color", "before")];

        let diff = diff(&config, &current);

        assert_eq!(
            diff.changed,
            vec![ChangedLabel {
                name: "update/color".to_string(),
                old_name: "update/color".to_string(),
                color: "after".to_string(),
                old_color: "before".to_string(),
                description: None,
                old_description: None,
            }]
        );
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.aliased.is_empty());
    }

    #[test]
    fn test_description_update_is_changed() {
        let config = repo_config(vec![(
            "bug",
            LabelConfig::new("d73a4a").with_description("Broken"),
        )]);
        let current = vec![Label::new("bug", "d73a4a")];

        let diff = diff(&config, &current);

        assert_eq!(diff.changed.len(), 1);
        assert!(!diff.changed[0].is_rename());
    }

    #[test]
    fn test_empty_description_matches_missing_description() {
        let config = repo_config(vec![("bug", LabelConfig::new("D73A4A").with_description(""))]);
        let current = vec![Label::new("bug", "d73a4a")];

        assert!(diff(&config, &current).is_empty());
    }

    #[test]
    fn test_new_label_is_added() {
        let config = repo_config(vec![(
            "feature",
            LabelConfig::new("a2eeef").with_alias(["enhancement"]),
        )]);

        let diff = diff(&config, &[]);

        assert_eq!(diff.added, vec![Label::new("feature", "a2eeef")]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_unconfigured_label_is_removed() {
        let config = repo_config(vec![]);
        let current = vec![Label::new("orphan", "x")];

        let diff = diff(&config, &current);

        assert_eq!(diff.removed, vec![Label::new("orphan", "x")]);
        assert!(diff.added.is_empty() && diff.changed.is_empty() && diff.aliased.is_empty());
    }

    #[test]
    fn test_first_live_alias_wins_rename() {
        let config = repo_config(vec![(
            "new",
            LabelConfig::new("00ff00").with_alias(["old:1", "old:2"]),
        )]);
        // remote listing order must not matter
        let current = vec![Label::new("old:2", "0000ff"), Label::new("old:1", "ff0000")];

        let diff = diff(&config, &current);

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].old_name, "old:1");
        assert_eq!(diff.changed[0].name, "new");
        assert_eq!(diff.changed[0].old_color, "ff0000");
        assert_eq!(
            diff.aliased,
            vec![AliasedLabel {
                name: "new".to_string(),
                old_name: "old:2".to_string(),
            }]
        );
        assert!(diff.removed.is_empty());
        assert!(diff.added.is_empty());
    }

    #[test]
    fn test_skips_dead_aliases_when_picking_origin() {
        let config = repo_config(vec![(
            "new",
            LabelConfig::new("00ff00").with_alias(["gone", "old:2"]),
        )]);
        let current = vec![Label::new("old:2", "00ff00")];

        let diff = diff(&config, &current);

        assert_eq!(diff.changed[0].old_name, "old:2");
        assert!(diff.aliased.is_empty());
    }

    #[test]
    fn test_existing_label_merges_every_live_alias() {
        let config = repo_config(vec![(
            "bug",
            LabelConfig::new("d73a4a").with_alias(["defect", "kind/bug"]),
        )]);
        let current = vec![
            Label::new("bug", "d73a4a"),
            Label::new("defect", "000000"),
            Label::new("kind/bug", "000000"),
        ];

        let diff = diff(&config, &current);

        assert!(diff.changed.is_empty());
        let merged: Vec<&str> = diff.aliased.iter().map(|a| a.old_name.as_str()).collect();
        assert_eq!(merged, vec!["defect", "kind/bug"]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_rename_origin_prefers_lowest_priority() {
        let candidates = [
            AliasCandidate {
                name: "b",
                priority: 3,
            },
            AliasCandidate {
                name: "a",
                priority: 1,
            },
        ];

        assert_eq!(rename_origin(&candidates).map(|c| c.name), Some("a"));
        assert_eq!(rename_origin(&[]), None);
    }

    #[test]
    fn test_label_differing_only_in_case_is_renamed() {
        let config = repo_config(vec![("bug", LabelConfig::new("d73a4a"))]);
        let current = vec![Label::new("Bug", "d73a4a")];

        let first = diff(&config, &current);

        assert!(first.added.is_empty());
        assert!(first.removed.is_empty());
        assert_eq!(first.changed.len(), 1);
        assert_eq!(first.changed[0].old_name, "Bug");
        assert_eq!(first.changed[0].name, "bug");
        assert!(first.changed[0].is_rename());
        assert!(diff(&config, &apply(&current, &first, false)).is_empty());
    }

    #[test]
    fn test_alias_matches_live_label_regardless_of_case() {
        let config = repo_config(vec![(
            "bug",
            LabelConfig::new("d73a4a").with_alias(["defect", "kind/bug"]),
        )]);
        let current = vec![Label::new("Defect", "000000"), Label::new("KIND/BUG", "000000")];

        let diff = diff(&config, &current);

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].old_name, "Defect");
        assert_eq!(
            diff.aliased,
            vec![AliasedLabel {
                name: "bug".to_string(),
                old_name: "KIND/BUG".to_string(),
            }]
        );
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_unchanged_excludes_added_and_changed() {
        let config = repo_config(vec![
            ("bug", LabelConfig::new("d73a4a")),
            ("docs", LabelConfig::new("0075ca")),
            ("feature", LabelConfig::new("a2eeef")),
        ]);
        let current = vec![Label::new("bug", "d73a4a"), Label::new("docs", "ffffff")];

        let diff = diff(&config, &current);

        assert_eq!(diff.unchanged(&config), vec!["bug"]);
    }

    #[test]
    fn test_second_claim_on_alias_is_ignored() {
        // invalid configuration; validation rejects it, the engine stays disjoint anyway
        let config = repo_config(vec![
            ("a", LabelConfig::new("000000").with_alias(["legacy"])),
            ("b", LabelConfig::new("000000").with_alias(["legacy"])),
        ]);
        let current = vec![Label::new("legacy", "000000")];

        let diff = diff(&config, &current);

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].name, "a");
        assert_eq!(diff.added, vec![Label::new("b", "000000")]);
    }

    fn label_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d", "e", "f", "g", "h"]).prop_map(str::to_string)
    }

    fn color() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["000000", "ffffff", "d73a4a"]).prop_map(str::to_string)
    }

    fn remote_labels() -> impl Strategy<Value = Vec<Label>> {
        prop::collection::btree_map(label_name(), color(), 0..8).prop_map(|labels| {
            labels
                .into_iter()
                .map(|(name, color)| Label::new(name, color))
                .collect()
        })
    }

    /// Valid configurations: configured names and alias names are disjoint and
    /// every alias is claimed once.
    fn valid_config() -> impl Strategy<Value = RepoConfig> {
        prop::collection::vec((label_name(), color(), 0usize..3), 0..8).prop_map(|entries| {
            let mut config = RepoConfig::default();
            let mut used: HashSet<String> = HashSet::new();
            let configured: Vec<(String, String, usize)> = entries
                .into_iter()
                .filter(|(name, _, _)| used.insert(format!("cfg:{name}")))
                .collect();
            let mut claimed: HashSet<String> = HashSet::new();
            let pool = ["a", "b", "c", "d", "e", "f", "g", "h"];
            for (index, (name, color, alias_count)) in configured.iter().enumerate() {
                let alias: Vec<String> = pool
                    .iter()
                    .skip(index)
                    .filter(|alias| {
                        !configured.iter().any(|(n, _, _)| n == *alias)
                            && !claimed.contains(**alias)
                    })
                    .take(*alias_count)
                    .map(|alias| (*alias).to_string())
                    .collect();
                claimed.extend(alias.iter().cloned());
                config.labels.insert(
                    name.clone(),
                    LabelConfig::new(color.clone()).with_alias(alias),
                );
            }
            config
        })
    }

    proptest! {
        #[test]
        fn prop_every_live_label_is_classified_once(
            config in valid_config(),
            current in remote_labels(),
        ) {
            let diff = diff(&config, &current);
            for label in &current {
                let as_origin = diff
                    .changed
                    .iter()
                    .filter(|c| c.old_name == label.name && c.is_rename())
                    .count();
                let as_alias = diff.aliased.iter().filter(|a| a.old_name == label.name).count();
                let as_removed = diff.removed.iter().filter(|r| r.name == label.name).count();
                prop_assert!(as_origin + as_alias + as_removed <= 1);
                if !config.labels.contains_key(&label.name) {
                    prop_assert_eq!(as_origin + as_alias + as_removed, 1);
                }
            }
        }

        #[test]
        fn prop_applying_the_diff_converges(
            config in valid_config(),
            current in remote_labels(),
        ) {
            let first = diff(&config, &current);
            let after = apply(&current, &first, true);
            prop_assert!(diff(&config, &after).is_empty());
        }

        #[test]
        fn prop_non_strict_apply_only_leaves_unconfigured_labels(
            config in valid_config(),
            current in remote_labels(),
        ) {
            let first = diff(&config, &current);
            let after = apply(&current, &first, false);
            let second = diff(&config, &after);
            prop_assert!(second.added.is_empty());
            prop_assert!(second.changed.is_empty());
            prop_assert!(second.aliased.is_empty());
            prop_assert_eq!(second.removed, first.removed);
        }
    }
}
