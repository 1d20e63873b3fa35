//! In-memory [`VcsQuery`] for tests that need exact control over git answers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};

use super::{BlameLine, GitError, GitResult, RawCommit, VcsQuery};

#[derive(Default)]
pub(crate) struct FakeVcs {
    pub workdir: PathBuf,
    pub history: Option<Vec<RawCommit>>,
    pub root: Option<String>,
    pub head: Option<String>,
    pub tracked: BTreeSet<String>,
    pub commit_changes: HashMap<String, Vec<String>>,
    pub worktree_changes: HashMap<Option<String>, Vec<String>>,
    pub renamed_changes: HashMap<String, Vec<String>>,
    pub blame: Mutex<HashMap<String, Vec<String>>>,
    pub ignored: HashSet<String>,
    pub local_changes: HashSet<String>,
    pub branch: HashMap<String, Vec<String>>,
    pub blame_calls: AtomicUsize,
    pub blame_latch: Option<Arc<BlameLatch>>,
}

/// Holds the first blame call until the test releases it.
pub(crate) struct BlameLatch {
    entered: Barrier,
    tripped: AtomicBool,
    released: Mutex<bool>,
    wakeup: Condvar,
}

impl BlameLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            tripped: AtomicBool::new(false),
            released: Mutex::new(false),
            wakeup: Condvar::new(),
        })
    }

    /// Block until the first blame call is in progress.
    pub fn wait_entered(&self) {
        self.entered.wait();
    }

    pub fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.wakeup.notify_all();
    }

    fn hold(&self) {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            self.entered.wait();
        }
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.wakeup.wait(released).unwrap();
        }
    }
}

impl FakeVcs {
    pub fn new(workdir: PathBuf) -> Self {
        Self {
            workdir,
            history: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Hash of the n-th fake commit, e.g. `hash(1)` = `"1111…"`.
    pub fn hash(n: u8) -> String {
        let c = char::from_digit(u32::from(n % 16), 16).unwrap_or('f');
        std::iter::repeat(c).take(40).collect()
    }

    pub fn commit(hash: &str, parents: &[&str], message: &str) -> RawCommit {
        RawCommit {
            hash: hash.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            message: message.to_string(),
            date: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    /// Set per-line hashes reported by blame for `path`.
    pub fn set_blame(&self, path: &str, hashes: &[&str]) {
        self.blame.lock().unwrap().insert(
            path.to_string(),
            hashes.iter().map(|h| h.to_string()).collect(),
        );
    }
}

impl VcsQuery for FakeVcs {
    fn workdir(&self) -> PathBuf {
        self.workdir.clone()
    }

    fn history(&self) -> GitResult<Vec<RawCommit>> {
        self.history
            .clone()
            .ok_or_else(|| GitError::UnknownRevision("HEAD".to_string()))
    }

    fn root_commit(&self) -> GitResult<Option<String>> {
        Ok(self.root.clone())
    }

    fn head_commit(&self) -> GitResult<Option<String>> {
        Ok(self.head.clone())
    }

    fn tracked_files(&self) -> GitResult<BTreeSet<String>> {
        Ok(self.tracked.clone())
    }

    fn commit_changes(&self, hash: &str) -> GitResult<Vec<String>> {
        self.commit_changes
            .get(hash)
            .cloned()
            .ok_or_else(|| GitError::UnknownRevision(hash.to_string()))
    }

    fn worktree_changes(&self, base: Option<&str>) -> GitResult<Vec<String>> {
        Ok(self
            .worktree_changes
            .get(&base.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    fn renamed_changes(&self, hash: &str, _threshold: u16) -> GitResult<Vec<String>> {
        Ok(self.renamed_changes.get(hash).cloned().unwrap_or_default())
    }

    fn blame(&self, path: &str, _include_whitespace: bool) -> GitResult<Vec<BlameLine>> {
        self.blame_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latch) = &self.blame_latch {
            latch.hold();
        }
        let blame = self.blame.lock().unwrap();
        let hashes = blame
            .get(path)
            .ok_or_else(|| GitError::UnknownRevision(path.to_string()))?;
        Ok(hashes
            .iter()
            .enumerate()
            .map(|(line, hash)| BlameLine {
                line,
                hash: hash.clone(),
            })
            .collect())
    }

    fn is_ignored(&self, path: &str) -> GitResult<bool> {
        Ok(self.ignored.contains(path))
    }

    fn has_local_changes(&self, path: &str) -> GitResult<bool> {
        Ok(self.local_changes.contains(path))
    }

    fn commits_between(&self, base: &str, _tip: &str) -> GitResult<Vec<String>> {
        self.branch
            .get(base)
            .cloned()
            .ok_or_else(|| GitError::UnknownRevision(base.to_string()))
    }
}
