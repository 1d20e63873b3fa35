//! Bounded-parallel execution of per-file attribution work
//!
//! Each pass runs on its own rayon pool sized to the configured ceiling, so
//! at most `concurrency` blame queries are in flight at once. `run` joins
//! every started worker before returning.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::ProgressSink;
use crate::config::{Settings, MAX_CONCURRENCY};

/// Default number of concurrent blame queries
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Shared flag that stops a pass from starting further files.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome counts for one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Worker ran and succeeded
    pub completed: usize,
    /// Never started (cancelled or past the deadline)
    pub skipped: usize,
    /// Worker ran and reported failure
    pub failed: usize,
}

impl SchedulerReport {
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

/// Runs a worker over many files with a fixed concurrency ceiling.
#[derive(Debug, Clone)]
pub struct ConcurrencyScheduler {
    concurrency: usize,
    deadline: Option<Duration>,
    slow_query: Duration,
}

impl Default for ConcurrencyScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrencyScheduler {
    /// Scheduler with `concurrency` workers, clamped to 1..=MAX_CONCURRENCY.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            deadline: None,
            slow_query: Duration::from_millis(5_000),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.effective_concurrency())
            .with_deadline(settings.pass_timeout_secs.map(Duration::from_secs))
            .with_slow_query(Duration::from_millis(settings.slow_query_millis))
    }

    /// Files not started within `deadline` of the pass start are skipped.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Queries slower than `threshold` are logged.
    pub fn with_slow_query(mut self, threshold: Duration) -> Self {
        self.slow_query = threshold;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` once per file.
    ///
    /// `worker` returns whether the file was processed successfully. Every
    /// file, including skipped ones, reports `1 / files.len()` progress.
    pub fn run<F>(
        &self,
        files: &[String],
        worker: F,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SchedulerReport, rayon::ThreadPoolBuildError>
    where
        F: Fn(&str) -> bool + Sync + Send,
    {
        if files.is_empty() {
            return Ok(SchedulerReport::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.min(files.len()))
            .build()?;

        let started = Instant::now();
        let increment = 1.0 / files.len() as f64;
        let completed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        pool.install(|| {
            files.par_iter().for_each(|file| {
                let expired = self
                    .deadline
                    .is_some_and(|deadline| started.elapsed() >= deadline);
                if cancel.is_cancelled() || expired {
                    skipped.fetch_add(1, Ordering::SeqCst);
                    progress.report(increment);
                    return;
                }

                let query_start = Instant::now();
                let ok = worker(file);
                let elapsed = query_start.elapsed();
                if elapsed >= self.slow_query {
                    warn!("Slow blame query for {} ({:.1}s)", file, elapsed.as_secs_f64());
                }

                if ok {
                    completed.fetch_add(1, Ordering::SeqCst);
                } else {
                    failed.fetch_add(1, Ordering::SeqCst);
                }
                progress.report(increment);
            })
        });

        let report = SchedulerReport {
            completed: completed.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
        };
        debug!(
            "Scheduler finished {} files in {:?}: {:?}",
            files.len(),
            started.elapsed(),
            report
        );
        Ok(report)
    }
}
