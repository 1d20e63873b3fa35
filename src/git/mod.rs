//! Git access and history-derived attribution
//!
//! Everything the engine knows about a repository comes through the
//! [`VcsQuery`] trait. The production implementation is [`GitRepository`]
//! (libgit2 via the git2 crate); tests swap in an in-memory fake.
//!
//! # Features
//!
//! - Index commit history into stable, numbered labels
//! - Resolve the files a set of commits touched, including renames
//! - Attribute file lines to a watched set of commit hashes via blame
//!
//! # Example
//!
//! ```no_run
//! use commitlens::config::Settings;
//! use commitlens::engine::LogWarnings;
//! use commitlens::git::{CommitHistoryIndex, GitRepository};
//! use std::path::Path;
//!
//! let repo = GitRepository::open(Path::new("/path/to/repo")).unwrap();
//! let index = CommitHistoryIndex::build(&repo, &Settings::default(), &LogWarnings);
//! for commit in index.commits() {
//!     println!("{} {}", commit.short_hash(), commit.label);
//! }
//! ```

pub mod blame;
pub mod changeset;
pub mod history;
pub mod repository;

#[cfg(test)]
pub(crate) mod fake;

pub use blame::BlameAttributionEngine;
pub use changeset::ChangeSetResolver;
pub use history::{Commit, CommitHistoryIndex, UNCOMMITTED_LABEL};
pub use repository::GitRepository;

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Hash reported for lines and changes that only exist in the working tree.
pub const SENTINEL_HASH: &str = "0000000000000000000000000000000000000000";

/// Similarity (percent) above which a delete/add pair counts as a rename.
pub const RENAME_SIMILARITY_THRESHOLD: u16 = 70;

/// Errors raised by the version-control layer
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Repository has no working directory (bare repo?)")]
    BareRepository,

    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    #[error("git query failed: {0}")]
    Query(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GitResult<T> = Result<T, GitError>;

/// One commit as reported by the history query, before labelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    /// Full 40-character hash
    pub hash: String,
    /// Parent hashes, first parent first
    pub parents: Vec<String>,
    /// First line of the commit message
    pub message: String,
    /// Commit timestamp (RFC 3339)
    pub date: String,
}

/// Authorship of a single line in the current file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    /// Zero-based line index
    pub line: usize,
    /// Hash of the commit that last touched the line
    pub hash: String,
}

/// Narrow query interface over the version-control system.
///
/// Implementations must be shareable across the attribution worker pool.
pub trait VcsQuery: Send + Sync {
    /// Working directory root of the repository
    fn workdir(&self) -> PathBuf;

    /// Full history reachable from HEAD, newest first
    fn history(&self) -> GitResult<Vec<RawCommit>>;

    /// Earliest commit with no parent
    fn root_commit(&self) -> GitResult<Option<String>>;

    /// Commit HEAD currently points at
    fn head_commit(&self) -> GitResult<Option<String>>;

    /// All version-controlled paths (repository-relative, `/`-separated)
    fn tracked_files(&self) -> GitResult<BTreeSet<String>>;

    /// Paths changed by `hash` relative to its first parent
    fn commit_changes(&self, hash: &str) -> GitResult<Vec<String>>;

    /// Paths that differ between the working tree and either HEAD (`None`)
    /// or the first parent of `base` (empty tree for a root commit)
    fn worktree_changes(&self, base: Option<&str>) -> GitResult<Vec<String>>;

    /// Paths changed between the first parent of `hash` and HEAD, with
    /// rename detection at `threshold` percent similarity
    fn renamed_changes(&self, hash: &str, threshold: u16) -> GitResult<Vec<String>>;

    /// Per-line authorship of the working-tree content of `path`
    fn blame(&self, path: &str, include_whitespace: bool) -> GitResult<Vec<BlameLine>>;

    /// Whether VCS ignore rules exclude `path`
    fn is_ignored(&self, path: &str) -> GitResult<bool>;

    /// Whether `path` differs from what is committed at HEAD
    fn has_local_changes(&self, path: &str) -> GitResult<bool>;

    /// Hashes reachable from `tip` but not from `base`, newest first
    fn commits_between(&self, base: &str, tip: &str) -> GitResult<Vec<String>>;
}

/// Check if a hash is the uncommitted-changes sentinel.
pub fn is_sentinel(hash: &str) -> bool {
    hash == SENTINEL_HASH
}

/// Last path component of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
