//! Interfaces the host environment implements
//!
//! The engine never talks to a UI directly. Confirmation prompts, progress
//! bars, warnings and repaint requests all go through these traits.

use tracing::warn;

/// Why the host is being asked to confirm a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    /// Resolution produced no files at all
    NoChanges,
    /// Resolution produced more files than the configured threshold
    LargeChangeSet { threshold: usize },
}

/// Confirmation request raised while resolving changed files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    pub reason: GateReason,
    /// Number of files that would be attributed
    pub file_count: usize,
}

impl GateRequest {
    /// Human-readable prompt for the request
    pub fn prompt(&self) -> String {
        match self.reason {
            GateReason::NoChanges => {
                "No changed files were found for the selected commits. Continue anyway?".to_string()
            }
            GateReason::LargeChangeSet { .. } => format!(
                "Detected a large number of changes: {} files found with changes. \
                 Are you sure you wish to process them?",
                self.file_count
            ),
        }
    }
}

/// Blocking yes/no decision before attribution starts
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, request: &GateRequest) -> bool;
}

/// Receives "highlights changed" notifications
pub trait HighlightListener: Send + Sync {
    fn highlights_changed(&self);
}

/// Receives fractional progress (all increments of a pass sum to 1.0)
pub trait ProgressSink: Send + Sync {
    fn report(&self, increment: f64);
}

/// Surfaces user-visible warnings
pub trait WarningSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Gate that accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _request: &GateRequest) -> bool {
        true
    }
}

/// Gate that declines everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecline;

impl ConfirmationGate for AutoDecline {
    fn confirm(&self, _request: &GateRequest) -> bool {
        false
    }
}

/// Listener that ignores notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl HighlightListener for NoopListener {
    fn highlights_changed(&self) {}
}

/// Progress sink that drops reports
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _increment: f64) {}
}

/// Warning sink that forwards to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWarnings;

impl WarningSink for LogWarnings {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}
