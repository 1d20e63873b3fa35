//! Attribution coordinator
//!
//! Owns the watched label/hash/file sets and drives the pipeline:
//!
//! ```text
//! labels → CommitHistoryIndex → hashes → ChangeSetResolver → files
//!        → filters → confirmation gate → ConcurrencyScheduler(blame)
//!        → HighlightDataStore → listener
//! ```
//!
//! Full passes hold the pass lock exclusively; single-file updates from
//! saves hold it shared.

mod context;


pub use context::RepositoryContext;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::host::{
    AutoConfirm, ConfirmationGate, GateReason, GateRequest, HighlightListener, LogWarnings,
    NoProgress, NoopListener, ProgressSink, WarningSink,
};
use super::scheduler::{CancellationToken, ConcurrencyScheduler, SchedulerReport};
use super::store::HighlightDataStore;
use crate::config::{load_settings, IgnoreFilter, SettingKey, Settings};
use crate::git::{
    BlameAttributionEngine, ChangeSetResolver, CommitHistoryIndex, GitRepository, VcsQuery,
    SENTINEL_HASH, UNCOMMITTED_LABEL,
};

/// Where the coordinator is in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving,
    Attributing,
}

/// Result of a full attribution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// No watched commit remained, so there was nothing to attribute
    NothingWatched,
    /// The host declined the confirmation gate; state was cleared
    Declined,
    /// Attribution ran over `files` files
    Completed {
        files: usize,
        report: SchedulerReport,
    },
}

/// Host-side collaborators
#[derive(Clone)]
pub struct Hosts {
    pub gate: Arc<dyn ConfirmationGate>,
    pub listener: Arc<dyn HighlightListener>,
    pub warnings: Arc<dyn WarningSink>,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            gate: Arc::new(AutoConfirm),
            listener: Arc::new(NoopListener),
            warnings: Arc::new(LogWarnings),
        }
    }
}

#[derive(Debug, Default)]
struct WatchState {
    /// Watched labels in the order they were added
    labels: Vec<String>,
    hashes: BTreeSet<String>,
    files: BTreeSet<String>,
}

/// Drives attribution passes for one repository session.
pub struct AttributionCoordinator {
    context: RepositoryContext,
    history: CommitHistoryIndex,
    settings: RwLock<Settings>,
    filter: RwLock<IgnoreFilter>,
    state: RwLock<WatchState>,
    store: HighlightDataStore,
    phase: Mutex<Phase>,
    cancel: Mutex<CancellationToken>,
    pass_lock: RwLock<()>,
    hosts: Hosts,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AttributionCoordinator {
    /// Open the repository containing `path` with settings from its root.
    ///
    /// This is the only hard failure: `path` must be inside a git work tree.
    pub fn open(path: &Path, hosts: Hosts) -> Result<Self> {
        let repo = GitRepository::open(path)
            .with_context(|| format!("Failed to open repository at {}", path.display()))?;
        let settings = load_settings(repo.root());
        Ok(Self::new(Arc::new(repo), settings, hosts))
    }

    /// Capture the repository context and build the history index.
    pub fn new(vcs: Arc<dyn VcsQuery>, settings: Settings, hosts: Hosts) -> Self {
        let history = CommitHistoryIndex::build(vcs.as_ref(), &settings, hosts.warnings.as_ref());
        let context = RepositoryContext::capture(vcs);
        let filter = IgnoreFilter::new(&settings.ignore_patterns);
        info!(
            "Session started at {}: {} labelled commits, {} tracked files",
            context.root().display(),
            history.len(),
            context.tracked_files().len()
        );

        Self {
            context,
            history,
            settings: RwLock::new(settings),
            filter: RwLock::new(filter),
            state: RwLock::new(WatchState::default()),
            store: HighlightDataStore::new(),
            phase: Mutex::new(Phase::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            pass_lock: RwLock::new(()),
            hosts,
        }
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Watch additional commits by label and recompute highlights.
    pub fn add_commits<S: AsRef<str>>(&self, labels: &[S], progress: &dyn ProgressSink) -> PassOutcome {
        let _pass = write(&self.pass_lock);
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        self.run_pass(&labels, progress)
    }

    /// Stop watching `labels` and recompute from the remaining ones.
    pub fn remove_commits<S: AsRef<str>>(&self, labels: &[S], progress: &dyn ProgressSink) -> PassOutcome {
        let _pass = write(&self.pass_lock);
        let removed: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        let remaining: Vec<String> = read(&self.state)
            .labels
            .iter()
            .filter(|label| !removed.contains(label.as_str()))
            .cloned()
            .collect();
        debug!("Removing {} labels, {} remain", removed.len(), remaining.len());

        self.reset();
        self.run_pass(&remaining, progress)
    }

    /// Watch every labelled commit on the current branch that is not on the
    /// configured base branch.
    pub fn add_current_branch(&self, progress: &dyn ProgressSink) -> PassOutcome {
        let _pass = write(&self.pass_lock);
        let base = read(&self.settings).base_branch.clone();
        let head = match self.context.head() {
            Some(head) => head.to_string(),
            None => {
                self.hosts.warnings.warn("HEAD does not point at a commit.");
                return PassOutcome::NothingWatched;
            }
        };

        let hashes = match self.context.vcs().commits_between(&base, &head) {
            Ok(hashes) => hashes,
            Err(e) => {
                self.hosts
                    .warnings
                    .warn(&format!("Could not compare with base branch {}: {}", base, e));
                return PassOutcome::NothingWatched;
            }
        };

        let labels = self.history.labels_for(&hashes);
        info!(
            "{} commits on the current branch since {} ({} labelled)",
            hashes.len(),
            base,
            labels.len()
        );
        self.run_pass(&labels, progress)
    }

    /// Re-attribute a single saved file.
    ///
    /// Files already watched are always refreshed. Other tracked files are
    /// only picked up when uncommitted changes are shown and the file has
    /// local changes. Returns whether the highlights changed.
    pub fn on_file_saved(&self, path: &Path) -> bool {
        let _pass = read(&self.pass_lock);

        let Some(file) = self.context.relative_path(path) else {
            debug!("Ignoring save outside repository: {}", path.display());
            return false;
        };
        if !self.context.is_tracked(&file) {
            debug!("Ignoring save of untracked file {}", file);
            return false;
        }
        if read(&self.filter).matches(&file) {
            debug!("Ignoring save of ignored file {}", file);
            return false;
        }

        let (always_uncommitted, include_whitespace) = {
            let settings = read(&self.settings);
            (
                settings.always_show_uncommitted_changes,
                settings.include_whitespace_blame,
            )
        };
        let (already_watched, mut hashes) = {
            let state = read(&self.state);
            (
                state.files.contains(&file) || self.store.is_watched(&file),
                state.hashes.clone(),
            )
        };

        if !already_watched {
            let has_local_changes = always_uncommitted
                && self
                    .context
                    .vcs()
                    .has_local_changes(&file)
                    .unwrap_or_else(|e| {
                        warn!("Failed to check local changes for {}: {}", file, e);
                        false
                    });
            if !has_local_changes {
                return false;
            }
        }
        if always_uncommitted {
            hashes.insert(SENTINEL_HASH.to_string());
        }
        if hashes.is_empty() {
            return false;
        }

        self.update_file_highlights(&file, &hashes, include_whitespace);
        write(&self.state).files.insert(file);
        self.hosts.listener.highlights_changed();
        true
    }

    /// Reload settings from disk and apply the value for `key`.
    ///
    /// Returns the outcome of any pass the change triggered.
    pub fn on_config_changed(&self, key: SettingKey) -> Option<PassOutcome> {
        let fresh = load_settings(self.context.root());
        self.apply_setting(&fresh, key)
    }

    /// Apply the value for `key` from `fresh`.
    pub fn apply_setting(&self, fresh: &Settings, key: SettingKey) -> Option<PassOutcome> {
        write(&self.settings).apply(fresh, key);
        debug!("Setting {} changed", key);

        match key {
            SettingKey::AlwaysShowUncommittedChanges if fresh.always_show_uncommitted_changes => {
                Some(self.add_commits(&[UNCOMMITTED_LABEL], &NoProgress))
            }
            SettingKey::IgnorePatterns => {
                *write(&self.filter) = IgnoreFilter::new(&fresh.ignore_patterns);
                None
            }
            SettingKey::ShowAllCommits | SettingKey::TestMergedCommits => {
                info!("{} takes effect when the next session starts", key);
                None
            }
            _ => None,
        }
    }

    /// Forget every watched commit and all highlight data. The history
    /// index is kept.
    pub fn clear(&self) {
        let _pass = write(&self.pass_lock);
        self.reset();
        self.hosts.listener.highlights_changed();
    }

    /// Stop the running pass from starting further files.
    pub fn cancel_pass(&self) {
        lock(&self.cancel).cancel();
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn highlight_data(&self) -> BTreeMap<String, Vec<usize>> {
        self.store.highlight_data()
    }

    pub fn highlight_files(&self) -> BTreeMap<String, usize> {
        self.store.highlight_files()
    }

    pub fn is_file_watched(&self, file: &str) -> bool {
        self.store.is_watched(file)
    }

    pub fn watched_labels(&self) -> Vec<String> {
        read(&self.state).labels.clone()
    }

    pub fn watched_hashes(&self) -> BTreeSet<String> {
        read(&self.state).hashes.clone()
    }

    pub fn watched_files(&self) -> BTreeSet<String> {
        read(&self.state).files.clone()
    }

    /// Label → date pairs for commit pickers
    pub fn commit_list(&self) -> Vec<(String, String)> {
        self.history.commit_list()
    }

    pub fn history(&self) -> &CommitHistoryIndex {
        &self.history
    }

    pub fn context(&self) -> &RepositoryContext {
        &self.context
    }

    pub fn settings(&self) -> Settings {
        read(&self.settings).clone()
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    // ── Pass internals (pass lock held by caller) ───────────────────────

    fn set_phase(&self, phase: Phase) {
        *lock(&self.phase) = phase;
    }

    fn reset(&self) {
        *write(&self.state) = WatchState::default();
        self.store.clear();
    }

    fn run_pass(&self, new_labels: &[String], progress: &dyn ProgressSink) -> PassOutcome {
        let settings = read(&self.settings).clone();
        let cancel = {
            let mut current = lock(&self.cancel);
            *current = CancellationToken::new();
            current.clone()
        };

        self.set_phase(Phase::Resolving);
        let hashes = self.watch_labels(new_labels, &settings);
        if hashes.is_empty() {
            debug!("No watched commits, nothing to attribute");
            self.reset();
            self.set_phase(Phase::Idle);
            self.hosts.listener.highlights_changed();
            return PassOutcome::NothingWatched;
        }

        let files = self.changed_files(&hashes, &settings);

        if let Some(request) = gate_request(files.len(), settings.large_change_threshold) {
            if !self.hosts.gate.confirm(&request) {
                info!("Pass declined ({} files)", request.file_count);
                self.reset();
                self.set_phase(Phase::Idle);
                self.hosts.listener.highlights_changed();
                return PassOutcome::Declined;
            }
        }

        self.set_phase(Phase::Attributing);
        self.store.clear();
        write(&self.state).files = files.iter().cloned().collect();

        let engine = BlameAttributionEngine::new(self.context.vcs());
        let scheduler = ConcurrencyScheduler::from_settings(&settings);
        let include_whitespace = settings.include_whitespace_blame;
        let result = scheduler.run(
            &files,
            |file| match engine.try_attribute(file, &hashes, include_whitespace) {
                Some(lines) => {
                    self.store.update(file, lines);
                    true
                }
                None => false,
            },
            progress,
            &cancel,
        );

        let report = result.unwrap_or_else(|e| {
            warn!("Failed to start attribution workers: {}", e);
            SchedulerReport {
                failed: files.len(),
                ..SchedulerReport::default()
            }
        });
        info!(
            "Attributed {} files ({} skipped, {} failed), {} lines highlighted",
            report.completed,
            report.skipped,
            report.failed,
            self.store.total_lines()
        );

        self.set_phase(Phase::Idle);
        self.hosts.listener.highlights_changed();
        PassOutcome::Completed {
            files: files.len(),
            report,
        }
    }

    /// Record `new_labels` and return the full watched hash set.
    fn watch_labels(&self, new_labels: &[String], settings: &Settings) -> BTreeSet<String> {
        let resolved = self.history.resolve(new_labels);
        for label in &resolved.unknown {
            warn!("Unknown commit label: {}", label);
        }

        let mut added = resolved.hashes;
        if settings.link_merged_commits {
            let linked = self.linked_commits(&added);
            added.extend(linked);
        }
        if settings.always_show_uncommitted_changes {
            added.insert(SENTINEL_HASH.to_string());
        }

        let mut state = write(&self.state);
        for label in new_labels {
            if self.history.get(label).is_some() && !state.labels.contains(label) {
                state.labels.push(label.clone());
            }
        }
        state.hashes.extend(added);
        state.hashes.clone()
    }

    /// Commits brought in by any merge commit among `hashes`.
    fn linked_commits(&self, hashes: &BTreeSet<String>) -> BTreeSet<String> {
        let mut linked = BTreeSet::new();
        for hash in hashes {
            let Some(commit) = self.history.by_hash(hash) else {
                continue;
            };
            let (true, Some(first_parent)) = (commit.is_merge, commit.parents.first()) else {
                continue;
            };
            match self.context.vcs().commits_between(first_parent, hash) {
                Ok(merged) => {
                    debug!("Merge {} brought in {} commits", commit.short_hash(), merged.len());
                    linked.extend(merged);
                }
                Err(e) => warn!("Failed to list commits merged by {}: {}", hash, e),
            }
        }
        linked
    }

    /// Resolve, then drop ignored and deleted files.
    fn changed_files(&self, hashes: &BTreeSet<String>, settings: &Settings) -> Vec<String> {
        let resolver = ChangeSetResolver::new(
            self.context.vcs(),
            self.context.tracked_files(),
            self.context.head(),
        )
        .with_renamed_files(settings.find_renamed_files);
        let candidates = resolver.resolve(hashes);

        let filter = read(&self.filter);
        let vcs = self.context.vcs();
        let files: Vec<String> = candidates
            .into_iter()
            .filter(|file| {
                if filter.matches(file) {
                    debug!("{} excluded by ignorePatterns", file);
                    return false;
                }
                if vcs.is_ignored(file).unwrap_or(false) {
                    debug!("{} excluded by VCS ignore rules", file);
                    return false;
                }
                if !self.context.exists(file) {
                    debug!("{} no longer exists", file);
                    return false;
                }
                true
            })
            .collect();
        debug!("{} files to attribute", files.len());
        files
    }

    fn update_file_highlights(&self, file: &str, hashes: &BTreeSet<String>, include_whitespace: bool) {
        let engine = BlameAttributionEngine::new(self.context.vcs());
        match engine.try_attribute(file, hashes, include_whitespace) {
            Some(lines) => self.store.update(file, lines),
            None => {
                self.store.remove(file);
            }
        }
    }
}

/// Confirmation needed before attributing `file_count` files, if any.
fn gate_request(file_count: usize, threshold: usize) -> Option<GateRequest> {
    let reason = if file_count == 0 {
        GateReason::NoChanges
    } else if file_count > threshold {
        GateReason::LargeChangeSet { threshold }
    } else {
        return None;
    };
    Some(GateRequest { reason, file_count })
}
