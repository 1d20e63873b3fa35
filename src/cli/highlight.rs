//! `commitlens commits|highlight|uncommitted|branch` - one-shot passes

use anyhow::{bail, Result};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use commitlens::engine::{
    AttributionCoordinator, ConfirmationGate, GateRequest, Hosts, PassOutcome, ProgressSink,
};
use commitlens::git::UNCOMMITTED_LABEL;

use super::open_coordinator;

/// Resolution of the progress bar (positions per full pass)
const PROGRESS_STEPS: u64 = 1_000;

/// Asks on the terminal, or answers from `--yes`.
pub(super) struct TerminalGate {
    assume_yes: bool,
    bar: Option<ProgressBar>,
}

impl TerminalGate {
    pub(super) fn new(assume_yes: bool, bar: Option<ProgressBar>) -> Self {
        Self { assume_yes, bar }
    }

    fn ask(&self, request: &GateRequest) -> bool {
        let term = Term::stderr();
        if !term.is_term() {
            eprintln!("{} (declined: not a terminal, pass --yes to continue)", request.prompt());
            return false;
        }
        if term
            .write_str(&format!("{} {} ", style("?").yellow().bold(), request.prompt()))
            .is_err()
        {
            return false;
        }
        match term.read_line() {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

impl ConfirmationGate for TerminalGate {
    fn confirm(&self, request: &GateRequest) -> bool {
        if self.assume_yes {
            return true;
        }
        match &self.bar {
            Some(bar) => bar.suspend(|| self.ask(request)),
            None => self.ask(request),
        }
    }
}

/// Progress sink drawing an indicatif bar
pub(super) struct BarProgress {
    bar: ProgressBar,
    done: Mutex<f64>,
}

impl BarProgress {
    pub(super) fn new(message: &str) -> Self {
        let bar = ProgressBar::new(PROGRESS_STEPS);
        bar.set_style(create_bar_style());
        bar.set_message(message.to_string());
        Self {
            bar,
            done: Mutex::new(0.0),
        }
    }

    pub(super) fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    pub(super) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, increment: f64) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = (*done + increment).min(1.0);
        self.bar
            .set_position((*done * PROGRESS_STEPS as f64).round() as u64);
    }
}

/// Create bar progress style
fn create_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {percent}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

/// List labelled commits
pub fn run_commits(path: &Path, format: &str) -> Result<()> {
    let coordinator = AttributionCoordinator::open(path, Hosts::default())?;
    let history = coordinator.history();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(history.commits())?);
        return Ok(());
    }

    for commit in history.commits() {
        let hash = if commit.is_uncommitted() {
            style("working tree").dim().to_string()
        } else {
            style(commit.short_hash()).yellow().to_string()
        };
        let date = if commit.is_uncommitted() {
            String::new()
        } else {
            commit.date.clone()
        };
        println!("{:<40} {} {}", commit.label, hash, style(date).dim());
    }
    if history.merges_ignored() > 0 {
        eprintln!(
            "{}",
            style(format!(
                "{} merge commits hidden (set showAllCommits to list them)",
                history.merges_ignored()
            ))
            .dim()
        );
    }
    Ok(())
}

pub fn run_highlight(
    path: &Path,
    workers: Option<usize>,
    labels: &[String],
    format: &str,
    yes: bool,
) -> Result<()> {
    run_pass(path, workers, None, format, yes, |coordinator, progress| {
        coordinator.add_commits(labels, progress)
    })
}

pub fn run_uncommitted(path: &Path, workers: Option<usize>, format: &str, yes: bool) -> Result<()> {
    run_pass(path, workers, None, format, yes, |coordinator, progress| {
        coordinator.add_commits(&[UNCOMMITTED_LABEL], progress)
    })
}

pub fn run_branch(
    path: &Path,
    workers: Option<usize>,
    base: Option<String>,
    format: &str,
    yes: bool,
) -> Result<()> {
    run_pass(path, workers, base, format, yes, |coordinator, progress| {
        coordinator.add_current_branch(progress)
    })
}

fn run_pass<F>(
    path: &Path,
    workers: Option<usize>,
    base: Option<String>,
    format: &str,
    yes: bool,
    pass: F,
) -> Result<()>
where
    F: FnOnce(&AttributionCoordinator, &BarProgress) -> PassOutcome,
{
    let progress = BarProgress::new("Blaming files");
    let hosts = Hosts {
        gate: Arc::new(TerminalGate::new(yes, Some(progress.bar()))),
        ..Hosts::default()
    };
    let coordinator = open_coordinator(path, workers, base, hosts)?;

    let outcome = pass(&coordinator, &progress);
    progress.finish();

    match outcome {
        PassOutcome::Declined => bail!("Cancelled: nothing was highlighted"),
        PassOutcome::NothingWatched => {
            eprintln!("{}", style("No known commit selected; run `commitlens commits` for labels.").yellow());
        }
        PassOutcome::Completed { report, .. } if report.failed > 0 => {
            eprintln!(
                "{}",
                style(format!("{} files could not be blamed", report.failed)).yellow()
            );
        }
        PassOutcome::Completed { .. } => {}
    }

    print_highlights(&coordinator, format)
}

pub(super) fn print_highlights(coordinator: &AttributionCoordinator, format: &str) -> Result<()> {
    if format == "json" {
        let output = json!({
            "watched": coordinator.watched_labels(),
            "files": coordinator.highlight_data(),
            "counts": coordinator.highlight_files(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let files = coordinator.highlight_files();
    if files.is_empty() {
        println!("{}", style("No lines attributed.").dim());
        return Ok(());
    }

    let data = coordinator.highlight_data();
    for (file, count) in &files {
        let lines = data.get(file).map(Vec::as_slice).unwrap_or_default();
        println!(
            "{} {}",
            style(file).cyan().bold(),
            style(format!("({} lines)", count)).dim()
        );
        println!("  {}", format_ranges(lines));
    }
    let total: usize = files.values().sum();
    println!(
        "\n{} lines in {} files",
        style(total).bold(),
        style(files.len()).bold()
    );
    Ok(())
}

/// Render zero-based line indices as one-based ranges, e.g. `1-3, 7`.
pub(super) fn format_ranges(lines: &[usize]) -> String {
    let mut ranges: Vec<String> = Vec::new();
    let mut iter = lines.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            ranges.push(format!("{}", start + 1));
        } else {
            ranges.push(format!("{}-{}", start + 1, end + 1));
        }
    }
    ranges.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use commitlens::engine::GateReason;

    #[test]
    fn test_format_ranges() {
        assert_eq!(format_ranges(&[]), "");
        assert_eq!(format_ranges(&[0]), "1");
        assert_eq!(format_ranges(&[0, 1, 2, 6, 8, 9]), "1-3, 7, 9-10");
    }

    #[test]
    fn test_gate_with_yes_confirms() {
        let request = GateRequest {
            reason: GateReason::LargeChangeSet { threshold: 100 },
            file_count: 250,
        };
        assert!(TerminalGate::new(true, None).confirm(&request));
    }

    #[test]
    fn test_bar_progress_saturates() {
        let progress = BarProgress::new("test");
        for _ in 0..3 {
            progress.report(0.5);
        }
        assert_eq!(progress.bar().position(), PROGRESS_STEPS);
        progress.finish();
    }
}
