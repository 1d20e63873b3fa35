//! Per-session repository facts captured once at startup

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::git::VcsQuery;

/// Repository root, query handle and the facts captured when the session
/// started (tracked files, HEAD, root commit).
pub struct RepositoryContext {
    root: PathBuf,
    vcs: Arc<dyn VcsQuery>,
    tracked: BTreeSet<String>,
    head: Option<String>,
    root_commit: Option<String>,
}

impl RepositoryContext {
    /// Query the repository once. Failures are logged and leave the
    /// corresponding fact empty.
    pub fn capture(vcs: Arc<dyn VcsQuery>) -> Self {
        let tracked = vcs.tracked_files().unwrap_or_else(|e| {
            warn!("Failed to list tracked files: {}", e);
            BTreeSet::new()
        });
        let head = vcs.head_commit().unwrap_or_else(|e| {
            warn!("Failed to resolve HEAD: {}", e);
            None
        });
        let root_commit = vcs.root_commit().unwrap_or_else(|e| {
            warn!("Failed to find root commit: {}", e);
            None
        });

        Self {
            root: vcs.workdir(),
            vcs,
            tracked,
            head,
            root_commit,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vcs(&self) -> &dyn VcsQuery {
        self.vcs.as_ref()
    }

    pub fn tracked_files(&self) -> &BTreeSet<String> {
        &self.tracked
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.tracked.contains(path)
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    pub fn root_commit(&self) -> Option<&str> {
        self.root_commit.as_deref()
    }

    /// Whether `path` (repository-relative) exists in the working tree
    pub fn exists(&self, path: &str) -> bool {
        self.root.join(path).is_file()
    }

    /// Repository-relative, `/`-separated form of `path`.
    ///
    /// Absolute paths must lie under the root; relative paths are taken as
    /// already relative to it. Returns `None` for anything outside.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    let canonical = path.canonicalize().ok()?;
                    canonical.strip_prefix(&self.root).ok()?.to_path_buf()
                }
            }
        } else {
            path.to_path_buf()
        };

        let parts = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}
