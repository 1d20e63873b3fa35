//! libgit2-backed implementation of [`VcsQuery`]
//!
//! `git2::Repository` is not `Sync`, so every query opens its own handle on
//! the repository root. This keeps the type shareable across the
//! attribution pool without serializing the blame calls behind a lock.

use chrono::{TimeZone, Utc};
use git2::{
    Blame, BlameOptions, Diff, DiffFindOptions, DiffOptions, Oid, Patch, Repository, Sort,
    Status, Tree,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{BlameLine, GitError, GitResult, RawCommit, VcsQuery, SENTINEL_HASH};

/// Git repository accessed through libgit2.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    /// Open a git repository.
    ///
    /// # Arguments
    /// * `path` - Path to the repository (or any subdirectory)
    pub fn open(path: &Path) -> GitResult<Self> {
        let repo = Repository::discover(path)
            .map_err(|_| GitError::NotARepository(path.to_path_buf()))?;
        let root = repo.workdir().ok_or(GitError::BareRepository)?;
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        debug!("Opened git repository at {:?}", root);
        Ok(Self { root })
    }

    /// Check if a path is inside a git repository.
    pub fn is_git_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    /// Root of the working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo(&self) -> GitResult<Repository> {
        Ok(Repository::open(&self.root)?)
    }

    fn commit_tree<'r>(repo: &'r Repository, hash: &str) -> GitResult<Tree<'r>> {
        let commit = repo.find_commit(parse_oid(hash)?)?;
        Ok(commit.tree()?)
    }

    /// Tree of the first parent of `hash`, `None` for a root commit.
    fn first_parent_tree<'r>(repo: &'r Repository, hash: &str) -> GitResult<Option<Tree<'r>>> {
        let commit = repo.find_commit(parse_oid(hash)?)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        Ok(Some(commit.parent(0)?.tree()?))
    }

    fn head_tree(repo: &Repository) -> GitResult<Option<Tree<'_>>> {
        let tree = match repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e) if is_unborn(&e) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(tree)
    }

    /// Blame `content` against HEAD the way `git blame -w` does.
    ///
    /// Lines the whitespace-insensitive diff leaves untouched keep the
    /// committed blame; only lines inside real hunks get the sentinel.
    fn blame_worktree_ignoring_whitespace(
        repo: &Repository,
        committed: &Blame<'_>,
        path: &str,
        content: &[u8],
    ) -> GitResult<Vec<BlameLine>> {
        let head_blob = match Self::head_tree(repo)? {
            Some(tree) => Some(tree.get_path(Path::new(path))?.to_object(repo)?.peel_to_blob()?),
            None => None,
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_whitespace(true).context_lines(0);
        let patch = Patch::from_buffers(
            head_blob.as_ref().map_or(&[][..], |b| b.content()),
            Some(Path::new(path)),
            content,
            Some(Path::new(path)),
            Some(&mut diff_opts),
        )?;

        let origins = map_to_committed_lines(&patch, count_lines(content))?;
        Ok(origins
            .into_iter()
            .enumerate()
            .map(|(line, origin)| {
                let hash = origin
                    .and_then(|old| committed.get_line(old + 1))
                    .map(|hunk| hash_or_sentinel(hunk.final_commit_id()))
                    .unwrap_or_else(|| SENTINEL_HASH.to_string());
                BlameLine { line, hash }
            })
            .collect())
    }
}

impl VcsQuery for GitRepository {
    fn workdir(&self) -> PathBuf {
        self.root.clone()
    }

    fn history(&self) -> GitResult<Vec<RawCommit>> {
        let repo = self.repo()?;
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push_head()?;

        let mut commits = Vec::new();
        for oid_result in revwalk {
            let commit = repo.find_commit(oid_result?)?;
            commits.push(RawCommit {
                hash: commit.id().to_string(),
                parents: commit.parent_ids().map(|id| id.to_string()).collect(),
                message: commit.summary().unwrap_or("").to_string(),
                date: format_git_time(&commit.time()),
            });
        }
        Ok(commits)
    }

    fn root_commit(&self) -> GitResult<Option<String>> {
        let repo = self.repo()?;
        let mut revwalk = repo.revwalk()?;
        if let Err(e) = revwalk.push_head() {
            return if is_unborn(&e) { Ok(None) } else { Err(e.into()) };
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        for oid_result in revwalk {
            let commit = repo.find_commit(oid_result?)?;
            if commit.parent_count() == 0 {
                return Ok(Some(commit.id().to_string()));
            }
        }
        Ok(None)
    }

    fn head_commit(&self) -> GitResult<Option<String>> {
        let repo = self.repo()?;
        let head = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?.id().to_string()),
            Err(e) if is_unborn(&e) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(head)
    }

    fn tracked_files(&self) -> GitResult<BTreeSet<String>> {
        let repo = self.repo()?;
        let index = repo.index()?;
        Ok(index
            .iter()
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect())
    }

    fn commit_changes(&self, hash: &str) -> GitResult<Vec<String>> {
        let repo = self.repo()?;
        let tree = Self::commit_tree(&repo, hash)?;
        let parent_tree = Self::first_parent_tree(&repo, hash)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
        Ok(changed_paths(&diff))
    }

    fn worktree_changes(&self, base: Option<&str>) -> GitResult<Vec<String>> {
        let repo = self.repo()?;
        let base_tree = match base {
            Some(hash) => Self::first_parent_tree(&repo, hash)?,
            None => Self::head_tree(&repo)?,
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts.include_untracked(false);
        diff_opts.ignore_filemode(true);
        let diff = repo.diff_tree_to_workdir_with_index(base_tree.as_ref(), Some(&mut diff_opts))?;
        Ok(changed_paths(&diff))
    }

    fn renamed_changes(&self, hash: &str, threshold: u16) -> GitResult<Vec<String>> {
        let repo = self.repo()?;
        let parent_tree = Self::first_parent_tree(&repo, hash)?;
        let head_tree = Self::head_tree(&repo)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);
        let mut diff =
            repo.diff_tree_to_tree(parent_tree.as_ref(), head_tree.as_ref(), Some(&mut diff_opts))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true).rename_threshold(threshold);
        diff.find_similar(Some(&mut find_opts))?;
        Ok(changed_paths(&diff))
    }

    fn blame(&self, path: &str, include_whitespace: bool) -> GitResult<Vec<BlameLine>> {
        let repo = self.repo()?;
        let mut opts = BlameOptions::new();
        opts.ignore_whitespace(!include_whitespace);

        let committed = repo.blame_file(Path::new(path), Some(&mut opts))?;
        let content = std::fs::read(self.root.join(path))?;

        if !include_whitespace {
            return Self::blame_worktree_ignoring_whitespace(&repo, &committed, path, &content);
        }

        // Blame the working-tree content so local edits show up as the sentinel.
        let blame = committed.blame_buffer(&content)?;

        let mut lines = Vec::new();
        for hunk in blame.iter() {
            let hash = hash_or_sentinel(hunk.final_commit_id());
            let start = hunk.final_start_line().saturating_sub(1);
            for line in start..start + hunk.lines_in_hunk() {
                lines.push(BlameLine {
                    line,
                    hash: hash.clone(),
                });
            }
        }
        lines.sort_by_key(|l| l.line);
        Ok(lines)
    }

    fn is_ignored(&self, path: &str) -> GitResult<bool> {
        let repo = self.repo()?;
        // Ignore rules never apply to files already in the index.
        if repo.index()?.get_path(Path::new(path), 0).is_some() {
            return Ok(false);
        }
        Ok(repo.is_path_ignored(Path::new(path))?)
    }

    fn has_local_changes(&self, path: &str) -> GitResult<bool> {
        let repo = self.repo()?;
        let status = repo.status_file(Path::new(path))?;
        Ok(status.intersects(
            Status::WT_MODIFIED
                | Status::WT_DELETED
                | Status::WT_TYPECHANGE
                | Status::WT_RENAMED
                | Status::INDEX_NEW
                | Status::INDEX_MODIFIED
                | Status::INDEX_DELETED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE,
        ))
    }

    fn commits_between(&self, base: &str, tip: &str) -> GitResult<Vec<String>> {
        let repo = self.repo()?;
        let base_oid = repo
            .revparse_single(base)
            .map_err(|_| GitError::UnknownRevision(base.to_string()))?
            .peel_to_commit()?
            .id();
        let tip_oid = repo
            .revparse_single(tip)
            .map_err(|_| GitError::UnknownRevision(tip.to_string()))?
            .peel_to_commit()?
            .id();

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(tip_oid)?;
        revwalk.hide(base_oid)?;

        let mut hashes = Vec::new();
        for oid_result in revwalk {
            hashes.push(oid_result?.to_string());
        }
        Ok(hashes)
    }
}

fn hash_or_sentinel(id: Oid) -> String {
    if id.is_zero() {
        SENTINEL_HASH.to_string()
    } else {
        id.to_string()
    }
}

fn count_lines(content: &[u8]) -> usize {
    let newlines = content.iter().filter(|&&b| b == b'\n').count();
    match content.last() {
        Some(&b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

/// For each line of the new side of `patch`, the zero-based line of the old
/// side it is unchanged from, or `None` when a hunk adds or rewrites it.
///
/// Expects a patch generated without context lines.
fn map_to_committed_lines(patch: &Patch<'_>, new_len: usize) -> GitResult<Vec<Option<usize>>> {
    let mut origins: Vec<Option<usize>> = Vec::with_capacity(new_len);
    // First old and new line after the previous hunk
    let (mut old_next, mut new_next) = (0usize, 0usize);

    for hunk_idx in 0..patch.num_hunks() {
        let (hunk, _) = patch.hunk(hunk_idx)?;
        let (old_lines, new_lines) = (hunk.old_lines() as usize, hunk.new_lines() as usize);
        // An empty side starts after its `start` line, otherwise at it.
        let first_old = (hunk.old_start() as usize).saturating_sub(usize::from(old_lines > 0));
        let first_new = (hunk.new_start() as usize).saturating_sub(usize::from(new_lines > 0));

        fill_unchanged(&mut origins, first_new.min(new_len), first_old, first_new);
        for _ in 0..new_lines {
            if origins.len() < new_len {
                origins.push(None);
            }
        }
        old_next = first_old + old_lines;
        new_next = first_new + new_lines;
    }

    fill_unchanged(&mut origins, new_len, old_next, new_next);
    Ok(origins)
}

/// Extend `origins` up to `end` with lines aligned so that new line
/// `new_anchor` sits on old line `old_anchor`.
fn fill_unchanged(origins: &mut Vec<Option<usize>>, end: usize, old_anchor: usize, new_anchor: usize) {
    while origins.len() < end {
        let old = (origins.len() + old_anchor).checked_sub(new_anchor);
        origins.push(old);
    }
}

fn parse_oid(hash: &str) -> GitResult<Oid> {
    Oid::from_str(hash).map_err(|_| GitError::UnknownRevision(hash.to_string()))
}

fn is_unborn(e: &git2::Error) -> bool {
    matches!(
        e.code(),
        git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
    )
}

/// Paths touched by a diff, new side preferred (old side for deletions).
fn changed_paths(diff: &Diff<'_>) -> Vec<String> {
    let mut paths = Vec::new();
    for delta in diff.deltas() {
        let path = delta.new_file().path().or_else(|| delta.old_file().path());
        if let Some(path) = path {
            let path = path.to_string_lossy().replace('\\', "/");
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Format a git timestamp as ISO 8601.
fn format_git_time(time: &git2::Time) -> String {
    match Utc.timestamp_opt(time.seconds(), 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for building throwaway repositories in unit tests.

    use anyhow::Result;
    use git2::{Repository, Signature, Time};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    pub struct TestRepo {
        pub dir: TempDir,
        pub repo: Repository,
        tick: i64,
    }

    impl TestRepo {
        pub fn new() -> Result<Self> {
            let dir = tempfile::tempdir()?;
            let repo = Repository::init(dir.path())?;
            let mut config = repo.config()?;
            config.set_str("user.name", "Test User")?;
            config.set_str("user.email", "test@example.com")?;
            Ok(Self {
                dir,
                repo,
                tick: 1_700_000_000,
            })
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        pub fn write(&self, rel: &str, content: &str) -> Result<()> {
            let full = self.dir.path().join(rel);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full, content)?;
            Ok(())
        }

        /// Stage every listed path (removing missing ones) and commit on HEAD.
        pub fn commit(&mut self, message: &str, paths: &[&str]) -> Result<String> {
            let mut index = self.repo.index()?;
            for rel in paths {
                if self.dir.path().join(rel).exists() {
                    index.add_path(Path::new(rel))?;
                } else {
                    index.remove_path(Path::new(rel))?;
                }
            }
            index.write()?;
            let tree_id = index.write_tree()?;
            let tree = self.repo.find_tree(tree_id)?;

            // Distinct, increasing timestamps keep time-sorted history deterministic.
            self.tick += 60;
            let sig = Signature::new("Test User", "test@example.com", &Time::new(self.tick, 0))?;

            let parents = match self.repo.head() {
                Ok(head) => vec![head.peel_to_commit()?],
                Err(_) => vec![],
            };
            let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
            let oid = self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
            Ok(oid.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestRepo;
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_open_rejects_non_repo() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(GitRepository::open(dir.path()).is_err());
        assert!(!GitRepository::is_git_repo(dir.path()));
        Ok(())
    }

    #[test]
    fn test_history_newest_first() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "one\n")?;
        let first = t.commit("First", &["a.txt"])?;
        t.write("a.txt", "one\ntwo\n")?;
        let second = t.commit("Second", &["a.txt"])?;

        let repo = GitRepository::open(t.path())?;
        let history = repo.history()?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].hash, second);
        assert_eq!(history[0].parents, vec![first.clone()]);
        assert_eq!(history[1].message, "First");
        assert_eq!(repo.root_commit()?, Some(first));
        assert_eq!(repo.head_commit()?, Some(second));
        Ok(())
    }

    #[test]
    fn test_commit_and_worktree_changes() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "a\n")?;
        t.write("b.txt", "b\n")?;
        let root = t.commit("Root", &["a.txt", "b.txt"])?;
        t.write("b.txt", "b\nb2\n")?;
        let second = t.commit("Touch b", &["b.txt"])?;

        let repo = GitRepository::open(t.path())?;
        let mut root_changes = repo.commit_changes(&root)?;
        root_changes.sort();
        assert_eq!(root_changes, vec!["a.txt", "b.txt"]);
        assert_eq!(repo.commit_changes(&second)?, vec!["b.txt"]);

        assert!(repo.worktree_changes(None)?.is_empty());
        t.write("a.txt", "a\nlocal\n")?;
        assert_eq!(repo.worktree_changes(None)?, vec!["a.txt"]);
        assert!(repo.has_local_changes("a.txt")?);
        assert!(!repo.has_local_changes("b.txt")?);
        Ok(())
    }

    #[test]
    fn test_blame_marks_local_lines_with_sentinel() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "l1\nl2\n")?;
        let c1 = t.commit("Root", &["a.txt"])?;
        t.write("a.txt", "l1\nl2\nlocal\n")?;

        let repo = GitRepository::open(t.path())?;
        let lines = repo.blame("a.txt", true)?;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].hash, c1);
        assert_eq!(lines[1].hash, c1);
        assert_eq!(lines[2].hash, SENTINEL_HASH);
        assert_eq!(lines[2].line, 2);
        Ok(())
    }

    #[test]
    fn test_blame_untracked_file_fails() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "x\n")?;
        t.commit("Root", &["a.txt"])?;
        t.write("new.txt", "y\n")?;

        let repo = GitRepository::open(t.path())?;
        assert!(repo.blame("new.txt", true).is_err());
        Ok(())
    }

    #[test]
    fn test_tracked_files_and_ignore() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write(".gitignore", "*.log\n")?;
        t.write("src/main.rs", "fn main() {}\n")?;
        t.commit("Root", &[".gitignore", "src/main.rs"])?;

        let repo = GitRepository::open(t.path())?;
        let tracked = repo.tracked_files()?;
        assert!(tracked.contains("src/main.rs"));
        assert!(tracked.contains(".gitignore"));
        assert!(repo.is_ignored("debug.log")?);
        assert!(!repo.is_ignored("src/main.rs")?);
        Ok(())
    }

    #[test]
    fn test_tracked_file_matching_gitignore_is_not_ignored() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write(".gitignore", "*.log\n")?;
        t.write("keep.log", "kept\n")?;
        // add_path bypasses ignore rules, like `git add -f`
        t.commit("Add log", &[".gitignore", "keep.log"])?;
        t.write("other.log", "scratch\n")?;

        let repo = GitRepository::open(t.path())?;
        assert!(repo.tracked_files()?.contains("keep.log"));
        assert!(!repo.is_ignored("keep.log")?);
        assert!(repo.is_ignored("other.log")?);
        Ok(())
    }

    #[test]
    fn test_blame_ignores_whitespace_only_local_edits() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "l1\nl2\nl3\n")?;
        let c1 = t.commit("Root", &["a.txt"])?;
        t.write("a.txt", "l1  \nCHANGED\nl3\nnew\n")?;

        let repo = GitRepository::open(t.path())?;
        let hashes: Vec<String> = repo.blame("a.txt", false)?.into_iter().map(|l| l.hash).collect();
        assert_eq!(hashes, vec![c1.clone(), SENTINEL_HASH.to_string(), c1.clone(), SENTINEL_HASH.to_string()]);

        // Whitespace-sensitive blame reports the trailing spaces as a local edit
        let strict: Vec<String> = repo.blame("a.txt", true)?.into_iter().map(|l| l.hash).collect();
        assert_eq!(strict[0], SENTINEL_HASH);
        assert_eq!(strict[2], c1);
        Ok(())
    }

    #[test]
    fn test_blame_ignoring_whitespace_follows_deleted_lines() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "a\nb\n")?;
        let c1 = t.commit("Root", &["a.txt"])?;
        t.write("a.txt", "a\nb\nc\nd\n")?;
        let c2 = t.commit("Append", &["a.txt"])?;
        // Drop "b", indent "d", add a trailing line without newline
        t.write("a.txt", "a\nc\n  d\ne")?;

        let repo = GitRepository::open(t.path())?;
        let lines = repo.blame("a.txt", false)?;
        let hashes: Vec<&str> = lines.iter().map(|l| l.hash.as_str()).collect();
        assert_eq!(hashes, vec![c1.as_str(), c2.as_str(), c2.as_str(), SENTINEL_HASH]);
        assert_eq!(lines.iter().map(|l| l.line).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a\n"), 1);
        assert_eq!(count_lines(b"a\nb"), 2);
    }

    #[test]
    fn test_renamed_changes_follow_rename() -> Result<()> {
        let mut t = TestRepo::new()?;
        let body = "alpha\nbeta\ngamma\ndelta\nepsilon\n";
        t.write("old/name.txt", body)?;
        t.commit("Root", &["old/name.txt"])?;
        t.write("old/name.txt", &format!("{body}zeta\n"))?;
        let edit = t.commit("Edit", &["old/name.txt"])?;
        std::fs::create_dir_all(t.path().join("new"))?;
        std::fs::rename(t.path().join("old/name.txt"), t.path().join("new/name.txt"))?;
        t.commit("Move", &["old/name.txt", "new/name.txt"])?;

        let repo = GitRepository::open(t.path())?;
        assert_eq!(repo.commit_changes(&edit)?, vec!["old/name.txt"]);
        let renamed = repo.renamed_changes(&edit, 70)?;
        assert_eq!(renamed, vec!["new/name.txt"]);
        Ok(())
    }

    #[test]
    fn test_commits_between() -> Result<()> {
        let mut t = TestRepo::new()?;
        t.write("a.txt", "1\n")?;
        let base = t.commit("Base", &["a.txt"])?;
        t.write("a.txt", "1\n2\n")?;
        let tip = t.commit("Tip", &["a.txt"])?;

        let repo = GitRepository::open(t.path())?;
        assert_eq!(repo.commits_between(&base, "HEAD")?, vec![tip]);
        assert!(repo.commits_between("no-such-branch", "HEAD").is_err());
        Ok(())
    }
}
