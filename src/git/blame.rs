//! Line-level attribution via git blame
//!
//! Maps the lines of a file's current content to the watched commit set.
//! Failures never propagate: a file that cannot be blamed simply has no
//! attributed lines.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::{BlameLine, VcsQuery};

/// Attributes lines of single files to a set of watched hashes.
pub struct BlameAttributionEngine<'a> {
    vcs: &'a dyn VcsQuery,
}

impl<'a> BlameAttributionEngine<'a> {
    pub fn new(vcs: &'a dyn VcsQuery) -> Self {
        Self { vcs }
    }

    /// Zero-based indices of lines in `file` last touched by a watched commit.
    ///
    /// # Arguments
    /// * `file` - Repository-relative path
    /// * `watched` - Hashes to match (may include the sentinel)
    /// * `include_whitespace` - Whitespace-only changes count as authorship
    pub fn attribute(
        &self,
        file: &str,
        watched: &BTreeSet<String>,
        include_whitespace: bool,
    ) -> Vec<usize> {
        self.try_attribute(file, watched, include_whitespace)
            .unwrap_or_default()
    }

    /// Like [`attribute`](Self::attribute), but `None` when blame failed.
    pub fn try_attribute(
        &self,
        file: &str,
        watched: &BTreeSet<String>,
        include_whitespace: bool,
    ) -> Option<Vec<usize>> {
        if watched.is_empty() {
            return Some(Vec::new());
        }
        match self.vcs.blame(file, include_whitespace) {
            Ok(lines) => {
                let matched = matching_lines(&lines, watched);
                debug!("{} of {} lines attributed in {}", matched.len(), lines.len(), file);
                Some(matched)
            }
            Err(e) => {
                warn!("Error getting blame for file {}: {}", file, e);
                None
            }
        }
    }
}

/// Indices of blame lines whose hash is watched, ascending.
pub fn matching_lines(lines: &[BlameLine], watched: &BTreeSet<String>) -> Vec<usize> {
    let mut matched: Vec<usize> = lines
        .iter()
        .filter(|l| watched.contains(l.hash.as_str()))
        .map(|l| l.line)
        .collect();
    matched.sort_unstable();
    matched.dedup();
    matched
}

/// Attribute lines from textual `git blame -l` output.
///
/// Each output line starts with the full hash of the commit that last
/// touched it; boundary commits carry a leading `^`.
///
/// Library helper for hosts that already run the git CLI themselves. The
/// engine blames through [`VcsQuery::blame`] and never calls this.
pub fn parse_porcelain(output: &str, watched: &BTreeSet<String>) -> Vec<usize> {
    output
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let token = line.split_whitespace().next()?;
            let hash = token.trim_start_matches('^');
            watched.contains(hash).then_some(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeVcs;
    use crate::git::repository::test_support::TestRepo;
    use crate::git::{GitRepository, SENTINEL_HASH};
    use anyhow::Result;
    use std::path::PathBuf;

    fn watched(hashes: &[&str]) -> BTreeSet<String> {
        hashes.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_attribute_matches_watched_hashes() {
        let vcs = FakeVcs::new(PathBuf::from("/repo"));
        let (h1, h2) = (FakeVcs::hash(1), FakeVcs::hash(2));
        vcs.set_blame("a.txt", &[&h1, &h2, &h2, &h1, &h2]);

        let engine = BlameAttributionEngine::new(&vcs);
        assert_eq!(engine.attribute("a.txt", &watched(&[&h2]), false), vec![1, 2, 4]);
        assert_eq!(engine.attribute("a.txt", &watched(&[&h1, &h2]), false), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_attribute_is_idempotent() {
        let vcs = FakeVcs::new(PathBuf::from("/repo"));
        let h1 = FakeVcs::hash(1);
        vcs.set_blame("a.txt", &[&h1, SENTINEL_HASH, &h1]);

        let engine = BlameAttributionEngine::new(&vcs);
        let set = watched(&[&h1]);
        let first = engine.attribute("a.txt", &set, true);
        let second = engine.attribute("a.txt", &set, true);
        assert_eq!(first, second);
        assert_eq!(first, vec![0, 2]);
    }

    #[test]
    fn test_sentinel_only_matches_local_lines() {
        let vcs = FakeVcs::new(PathBuf::from("/repo"));
        let h1 = FakeVcs::hash(1);
        vcs.set_blame("a.txt", &[&h1, SENTINEL_HASH]);

        let engine = BlameAttributionEngine::new(&vcs);
        assert_eq!(engine.attribute("a.txt", &watched(&[SENTINEL_HASH]), true), vec![1]);
    }

    #[test]
    fn test_blame_failure_yields_empty() {
        let vcs = FakeVcs::new(PathBuf::from("/repo"));
        let engine = BlameAttributionEngine::new(&vcs);
        let set = watched(&[&FakeVcs::hash(1)]);
        assert!(engine.attribute("missing.txt", &set, true).is_empty());
        assert!(engine.try_attribute("missing.txt", &set, true).is_none());
    }

    #[test]
    fn test_parse_porcelain() {
        let h = "a".repeat(40);
        let other = "b".repeat(40);
        let output = format!(
            "^{h} (Test User 2024-01-01 1) first\n\
             {other} (Test User 2024-01-02 2) second\n\
             {h} (Test User 2024-01-01 3) third\n"
        );
        assert_eq!(parse_porcelain(&output, &watched(&[&h])), vec![0, 2]);
        assert!(parse_porcelain("", &watched(&[&h])).is_empty());
    }

    #[test]
    fn test_attribute_real_repository() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "one\ntwo\n")?;
        let c1 = t.commit("First", &["a.txt"])?;
        t.write("a.txt", "one\ntwo\nthree\nfour\n")?;
        let c2 = t.commit("Second", &["a.txt"])?;

        let repo = GitRepository::open(t.path())?;
        let engine = BlameAttributionEngine::new(&repo);
        assert_eq!(engine.attribute("a.txt", &watched(&[&c2]), true), vec![2, 3]);
        assert_eq!(engine.attribute("a.txt", &watched(&[&c1]), true), vec![0, 1]);
        Ok(())
    }
}
