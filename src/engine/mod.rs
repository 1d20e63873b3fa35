//! Attribution engine
//!
//! Orchestration on top of the git layer: bounded-parallel blame passes,
//! the aggregate highlight store, and the coordinator that reacts to host
//! events.

pub mod coordinator;
pub mod host;
pub mod scheduler;
pub mod store;

pub use coordinator::{AttributionCoordinator, Hosts, PassOutcome, Phase, RepositoryContext};
pub use host::{
    AutoConfirm, AutoDecline, ConfirmationGate, GateReason, GateRequest, HighlightListener,
    LogWarnings, NoProgress, NoopListener, ProgressSink, WarningSink,
};
pub use scheduler::{CancellationToken, ConcurrencyScheduler, SchedulerReport, DEFAULT_CONCURRENCY};
pub use store::HighlightDataStore;
