//! Commit history index
//!
//! Turns the repository history into stable, user-facing labels of the form
//! `"{sequence}) {message}"`. The index is built once per session and never
//! mutated afterwards.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use super::{RawCommit, VcsQuery, SENTINEL_HASH};
use crate::config::Settings;
use crate::engine::WarningSink;

/// Bare alias for the uncommitted-changes pseudo-commit
pub const UNCOMMITTED_LABEL: &str = "Uncommitted changes";

/// Date given to the pseudo-commit so it sorts after every real commit
const FAR_FUTURE_DATE: &str = "9999-12-31T23:59:59+00:00";

/// A labelled commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    /// Display label, `"{sequence}) {message}"`
    pub label: String,
    /// Display sequence number (1 is the uncommitted-changes entry)
    pub sequence: u32,
    /// Full commit hash, or the sentinel
    pub hash: String,
    /// Commit timestamp (RFC 3339)
    pub date: String,
    /// Parent hashes, first parent first
    pub parents: Vec<String>,
    /// More than one parent
    pub is_merge: bool,
    /// First line of the commit message
    pub message: String,
}

impl Commit {
    /// Short hash (12 characters)
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }

    pub fn is_uncommitted(&self) -> bool {
        self.hash == SENTINEL_HASH
    }
}

/// Which commits receive a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingMode {
    /// Non-merge commits only
    SkipMerges,
    /// Every commit
    All,
    /// Merge commits only
    MergesOnly,
}

impl NumberingMode {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.test_merged_commits {
            NumberingMode::MergesOnly
        } else if settings.show_all_commits {
            NumberingMode::All
        } else {
            NumberingMode::SkipMerges
        }
    }

    fn labels(&self, is_merge: bool) -> bool {
        match self {
            NumberingMode::SkipMerges => !is_merge,
            NumberingMode::All => true,
            NumberingMode::MergesOnly => is_merge,
        }
    }
}

/// Hashes resolved from a label list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLabels {
    pub hashes: BTreeSet<String>,
    /// Labels that matched nothing in the index
    pub unknown: Vec<String>,
}

/// Label → commit mapping built once per session
#[derive(Debug, Clone)]
pub struct CommitHistoryIndex {
    commits: Vec<Commit>,
    by_label: HashMap<String, usize>,
    by_hash: HashMap<String, usize>,
    merges_ignored: usize,
}

impl CommitHistoryIndex {
    /// Build the index from the repository history.
    ///
    /// Never fails: if the history query fails or finds nothing, a single
    /// warning is raised and the index holds only the uncommitted entry.
    pub fn build(vcs: &dyn VcsQuery, settings: &Settings, warnings: &dyn WarningSink) -> Self {
        let raw = match vcs.history() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("History query failed: {}", e);
                Vec::new()
            }
        };
        if raw.is_empty() {
            warnings.warn("No git log found.");
        }
        Self::from_raw(raw, NumberingMode::from_settings(settings))
    }

    /// Build the index from commits listed newest first.
    pub fn from_raw(raw: Vec<RawCommit>, mode: NumberingMode) -> Self {
        let mut index = Self {
            commits: Vec::with_capacity(raw.len() + 1),
            by_label: HashMap::new(),
            by_hash: HashMap::new(),
            merges_ignored: 0,
        };

        index.push(
            RawCommit {
                hash: SENTINEL_HASH.to_string(),
                parents: Vec::new(),
                message: UNCOMMITTED_LABEL.to_string(),
                date: FAR_FUTURE_DATE.to_string(),
            },
            false,
        );

        for commit in raw {
            let is_merge = commit.parents.len() > 1;
            if mode.labels(is_merge) {
                index.push(commit, is_merge);
            } else if is_merge {
                index.merges_ignored += 1;
            }
        }

        if index.merges_ignored > 0 {
            info!(
                "{} merge commits removed from commit list (enable showAllCommits to keep them)",
                index.merges_ignored
            );
        }
        index
    }

    fn push(&mut self, commit: RawCommit, is_merge: bool) {
        let sequence = self.commits.len() as u32 + 1;
        let label = format!("{}) {}", sequence, commit.message);
        let slot = self.commits.len();
        self.by_label.insert(label.clone(), slot);
        self.by_hash.entry(commit.hash.clone()).or_insert(slot);
        self.commits.push(Commit {
            label,
            sequence,
            hash: commit.hash,
            date: commit.date,
            parents: commit.parents,
            is_merge,
            message: commit.message,
        });
    }

    /// Look up a commit by label (or the bare uncommitted alias)
    pub fn get(&self, label: &str) -> Option<&Commit> {
        if label == UNCOMMITTED_LABEL {
            return self.commits.first();
        }
        self.by_label.get(label).map(|&slot| &self.commits[slot])
    }

    /// Look up a labelled commit by hash
    pub fn by_hash(&self, hash: &str) -> Option<&Commit> {
        self.by_hash.get(hash).map(|&slot| &self.commits[slot])
    }

    /// The uncommitted-changes entry
    pub fn uncommitted(&self) -> &Commit {
        &self.commits[0]
    }

    /// Resolve labels to hashes. Unknown labels are logged and skipped.
    pub fn resolve<S: AsRef<str>>(&self, labels: &[S]) -> ResolvedLabels {
        let mut resolved = ResolvedLabels::default();
        for label in labels {
            let label = label.as_ref();
            match self.get(label) {
                Some(commit) => {
                    resolved.hashes.insert(commit.hash.clone());
                }
                None => {
                    debug!("No commit found for label {:?}", label);
                    resolved.unknown.push(label.to_string());
                }
            }
        }
        resolved
    }

    /// Labels of the indexed commits among `hashes`, in display order
    pub fn labels_for(&self, hashes: &[String]) -> Vec<String> {
        let wanted: BTreeSet<&str> = hashes.iter().map(String::as_str).collect();
        self.commits
            .iter()
            .filter(|c| wanted.contains(c.hash.as_str()))
            .map(|c| c.label.clone())
            .collect()
    }

    /// All labelled commits in display order
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// Label → date pairs in display order, for commit pickers
    pub fn commit_list(&self) -> Vec<(String, String)> {
        self.commits
            .iter()
            .map(|c| (c.label.clone(), c.date.clone()))
            .collect()
    }

    /// Number of labelled entries, including the uncommitted entry
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// True when no real commit was indexed
    pub fn is_empty(&self) -> bool {
        self.commits.len() <= 1
    }

    /// Merge commits that were left unlabelled
    pub fn merges_ignored(&self) -> usize {
        self.merges_ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeVcs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordWarnings(Mutex<Vec<String>>);

    impl WarningSink for RecordWarnings {
        fn warn(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    /// h3 (newest) is a merge of h2 and h4; h1 is the root.
    fn history_with_merge() -> Vec<RawCommit> {
        let (h1, h2, h3, h4) = (
            FakeVcs::hash(1),
            FakeVcs::hash(2),
            FakeVcs::hash(3),
            FakeVcs::hash(4),
        );
        vec![
            FakeVcs::commit(&h3, &[&h2, &h4], "Merge branch 'feature'"),
            FakeVcs::commit(&h4, &[&h1], "Feature work"),
            FakeVcs::commit(&h2, &[&h1], "Fix typo"),
            FakeVcs::commit(&h1, &[], "Initial commit"),
        ]
    }

    #[test]
    fn test_uncommitted_entry_is_first() {
        let index = CommitHistoryIndex::from_raw(history_with_merge(), NumberingMode::SkipMerges);
        let first = &index.commits()[0];
        assert_eq!(first.hash, SENTINEL_HASH);
        assert_eq!(first.sequence, 1);
        assert_eq!(first.label, "1) Uncommitted changes");
        assert!(first.date.starts_with("9999"));
        assert!(index.commits().iter().all(|c| c.sequence >= first.sequence));
        assert_eq!(index.get(UNCOMMITTED_LABEL), Some(first));
    }

    #[test]
    fn test_merges_skipped_by_default() {
        let index = CommitHistoryIndex::from_raw(history_with_merge(), NumberingMode::SkipMerges);
        let labels: Vec<&str> = index.commits().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "1) Uncommitted changes",
                "2) Feature work",
                "3) Fix typo",
                "4) Initial commit"
            ]
        );
        assert_eq!(index.merges_ignored(), 1);
        assert!(index.by_hash(&FakeVcs::hash(3)).is_none());

        let resolved = index.resolve(&["1) Merge branch 'feature'"]);
        assert!(resolved.hashes.is_empty());
        assert_eq!(resolved.unknown.len(), 1);
    }

    #[test]
    fn test_show_all_commits_labels_merges() {
        let index = CommitHistoryIndex::from_raw(history_with_merge(), NumberingMode::All);
        assert_eq!(index.len(), 5);
        let merge = index.get("2) Merge branch 'feature'").unwrap();
        assert!(merge.is_merge);
        assert_eq!(merge.parents.len(), 2);
        assert_eq!(index.merges_ignored(), 0);
    }

    #[test]
    fn test_merges_only_mode() {
        let index = CommitHistoryIndex::from_raw(history_with_merge(), NumberingMode::MergesOnly);
        let labels: Vec<&str> = index.commits().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["1) Uncommitted changes", "2) Merge branch 'feature'"]
        );
    }

    #[test]
    fn test_duplicate_messages_get_distinct_labels() {
        let (h1, h2) = (FakeVcs::hash(1), FakeVcs::hash(2));
        let raw = vec![
            FakeVcs::commit(&h2, &[&h1], "wip"),
            FakeVcs::commit(&h1, &[], "wip"),
        ];
        let index = CommitHistoryIndex::from_raw(raw, NumberingMode::SkipMerges);
        assert_eq!(index.get("2) wip").unwrap().hash, h2);
        assert_eq!(index.get("3) wip").unwrap().hash, h1);
    }

    #[test]
    fn test_resolve_mixed_labels() {
        let index = CommitHistoryIndex::from_raw(history_with_merge(), NumberingMode::SkipMerges);
        let resolved = index.resolve(&["3) Fix typo", UNCOMMITTED_LABEL, "99) nope"]);
        let expected: BTreeSet<String> = [FakeVcs::hash(2), SENTINEL_HASH.to_string()]
            .into_iter()
            .collect();
        assert_eq!(resolved.hashes, expected);
        assert_eq!(resolved.unknown, vec!["99) nope".to_string()]);
        assert!(index.resolve::<&str>(&[]).hashes.is_empty());
    }

    #[test]
    fn test_build_soft_fails_on_history_error() {
        let mut vcs = FakeVcs::new(PathBuf::from("/tmp/none"));
        vcs.history = None;
        let warnings = RecordWarnings::default();

        let index = CommitHistoryIndex::build(&vcs, &Settings::default(), &warnings);
        assert!(index.is_empty());
        assert_eq!(index.len(), 1);
        assert_eq!(index.uncommitted().hash, SENTINEL_HASH);
        assert_eq!(warnings.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_build_respects_settings() {
        let mut vcs = FakeVcs::new(PathBuf::from("/tmp/none"));
        vcs.history = Some(history_with_merge());
        let mut settings = Settings::default();
        settings.show_all_commits = true;

        let index = CommitHistoryIndex::build(&vcs, &settings, &RecordWarnings::default());
        assert_eq!(index.len(), 5);
        assert_eq!(
            index.labels_for(&[FakeVcs::hash(1), FakeVcs::hash(3)]),
            vec![
                "2) Merge branch 'feature'".to_string(),
                "5) Initial commit".to_string()
            ]
        );
        assert_eq!(index.commit_list()[0].0, "1) Uncommitted changes");
    }
}
