//! Changed-file resolution for watched commits
//!
//! Given watched hashes, determines which tracked files they touched. Paths
//! that are no longer tracked verbatim (renamed or moved since) are matched
//! to a tracked file by base name, but only when exactly one candidate
//! exists.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use super::{base_name, is_sentinel, VcsQuery, RENAME_SIMILARITY_THRESHOLD};

/// Resolves commit hashes to repository-relative paths.
pub struct ChangeSetResolver<'a> {
    vcs: &'a dyn VcsQuery,
    tracked: &'a BTreeSet<String>,
    by_base_name: HashMap<&'a str, Vec<&'a str>>,
    head: Option<&'a str>,
    find_renamed_files: bool,
}

impl<'a> ChangeSetResolver<'a> {
    /// # Arguments
    /// * `vcs` - Query interface
    /// * `tracked` - Tracked-file list captured at session start
    /// * `head` - Hash HEAD pointed at when the session started
    pub fn new(vcs: &'a dyn VcsQuery, tracked: &'a BTreeSet<String>, head: Option<&'a str>) -> Self {
        let mut by_base_name: HashMap<&str, Vec<&str>> = HashMap::new();
        for path in tracked {
            by_base_name
                .entry(base_name(path))
                .or_default()
                .push(path.as_str());
        }
        Self {
            vcs,
            tracked,
            by_base_name,
            head,
            find_renamed_files: false,
        }
    }

    /// Also diff each commit against HEAD with rename detection.
    pub fn with_renamed_files(mut self, enabled: bool) -> Self {
        self.find_renamed_files = enabled;
        self
    }

    /// Tracked paths touched by any of `hashes`.
    pub fn resolve(&self, hashes: &BTreeSet<String>) -> BTreeSet<String> {
        let mut resolved = BTreeSet::new();
        for hash in hashes {
            let changed = self.changes_for(hash);
            let accepted = self.filter_tracked(&changed);
            if accepted.is_empty() {
                debug!("Found 0 files with changes for commit {}", hash);
            }
            resolved.extend(accepted);
        }
        debug!(
            "{} potential files found for {} commits",
            resolved.len(),
            hashes.len()
        );
        resolved
    }

    /// Raw changed paths for one hash. Query failures yield nothing.
    pub fn changes_for(&self, hash: &str) -> Vec<String> {
        let result = if is_sentinel(hash) {
            self.vcs.worktree_changes(None)
        } else if self.head == Some(hash) {
            self.vcs.worktree_changes(Some(hash))
        } else {
            self.vcs.commit_changes(hash)
        };

        let mut changed = match result {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Error getting changed files for commit {}: {}", hash, e);
                return Vec::new();
            }
        };

        if self.find_renamed_files && !is_sentinel(hash) {
            match self.vcs.renamed_changes(hash, RENAME_SIMILARITY_THRESHOLD) {
                Ok(renamed) => changed.extend(renamed),
                Err(e) => warn!("Rename detection failed for commit {}: {}", hash, e),
            }
        }

        debug!("Changed paths for {}: {:?}", hash, changed);
        changed
    }

    /// Keep tracked paths; map untracked ones by unique base name.
    pub fn filter_tracked(&self, paths: &[String]) -> Vec<String> {
        let mut accepted = Vec::new();
        for path in paths {
            if let Some(tracked) = self.match_tracked(path) {
                if !accepted.contains(&tracked) {
                    accepted.push(tracked);
                }
            }
        }
        accepted
    }

    /// Tracked path for `path`: itself, or the single tracked file sharing its base name.
    pub fn match_tracked(&self, path: &str) -> Option<String> {
        if self.tracked.contains(path) {
            return Some(path.to_string());
        }
        match self.by_base_name.get(base_name(path)).map(Vec::as_slice) {
            Some([single]) => {
                debug!("Matched {} to tracked file {} by name", path, single);
                Some(single.to_string())
            }
            Some(candidates) => {
                debug!(
                    "Dropping {}: {} tracked files share its name",
                    path,
                    candidates.len()
                );
                None
            }
            None => {
                debug!("Dropping {}: no tracked file shares its name", path);
                None
            }
        }
    }
}
