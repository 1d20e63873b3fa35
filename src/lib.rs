//! commitlens - commit-to-line attribution engine
//!
//! Indexes repository history into numbered labels, resolves the files a
//! set of commits touched, and blames those files to find the lines the
//! commits (or uncommitted edits) are responsible for.
//!
//! The entry point is [`engine::AttributionCoordinator`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod git;
