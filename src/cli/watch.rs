//! `commitlens watch` - keep highlights current while files are edited
//!
//! Runs an initial pass over the requested labels, then watches the work
//! tree. Saving a file re-blames just that file; editing the settings file
//! applies each changed key.

use anyhow::Result;
use console::style;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use commitlens::cache::WatchSession;
use commitlens::config::{load_settings, Settings, JSON_CONFIG_FILE, TOML_CONFIG_FILE};
use commitlens::engine::{AttributionCoordinator, Hosts, PassOutcome};

use super::highlight::{format_ranges, print_highlights, BarProgress, TerminalGate};
use super::open_coordinator;

pub fn run(
    path: &Path,
    workers: Option<usize>,
    labels: Vec<String>,
    resume: bool,
    yes: bool,
) -> Result<()> {
    let progress = BarProgress::new("Blaming files");
    let hosts = Hosts {
        gate: Arc::new(TerminalGate::new(yes, Some(progress.bar()))),
        ..Hosts::default()
    };
    let coordinator = open_coordinator(path, workers, None, hosts)?;
    let repo_path = coordinator.context().root().to_path_buf();

    let mut watched = if resume {
        WatchSession::load(&repo_path).labels
    } else {
        Vec::new()
    };
    for label in labels {
        if !watched.contains(&label) {
            watched.push(label);
        }
    }

    if !watched.is_empty() {
        let outcome = coordinator.add_commits(&watched, &progress);
        if outcome == PassOutcome::Declined {
            println!("{}", style("Initial pass declined; watching with no commits.").yellow());
        }
    }
    progress.finish();
    save_session(&coordinator, &repo_path);
    print_highlights(&coordinator, "text")?;

    println!(
        "\nWatching {} for changes...",
        style(repo_path.display()).cyan()
    );
    println!("  {} Save a file to refresh its highlights", style("→").dim());
    println!("  {} Press Ctrl+C to stop\n", style("→").dim());

    // Set up file watcher with debouncing
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(
        Duration::from_millis(500),
        None,
        move |result: DebounceEventResult| {
            if let Ok(events) = result {
                let _ = tx.send(events);
            }
        },
    )?;
    debouncer.watch(&repo_path, RecursiveMode::Recursive)?;

    let mut settings = coordinator.settings();
    while let Ok(events) = rx.recv() {
        let changed: HashSet<PathBuf> = events
            .iter()
            .flat_map(|event| event.paths.iter())
            .filter(|p| !is_ignored_path(p, &repo_path))
            .cloned()
            .collect();

        for file in &changed {
            if is_settings_file(file) {
                settings = apply_settings_change(&coordinator, &repo_path, &settings);
                save_session(&coordinator, &repo_path);
            } else if file.is_file() && coordinator.on_file_saved(file) {
                report_file(&coordinator, &repo_path, file);
            }
        }
    }
    Ok(())
}

/// Apply every key that differs between `previous` and the file on disk.
fn apply_settings_change(
    coordinator: &AttributionCoordinator,
    repo_path: &Path,
    previous: &Settings,
) -> Settings {
    let fresh = load_settings(repo_path);
    for key in previous.changed_keys(&fresh) {
        let time = chrono::Local::now().format("%H:%M:%S");
        println!(
            "{} {} {}",
            style(format!("[{}]", time)).dim(),
            style("setting changed:").yellow(),
            key
        );
        if let Some(outcome) = coordinator.on_config_changed(key) {
            debug!("Config change for {} ran a pass: {:?}", key, outcome);
        }
    }
    fresh
}

fn save_session(coordinator: &AttributionCoordinator, repo_path: &Path) {
    let mut session = WatchSession::new(coordinator.watched_labels());
    if let Err(e) = session.save(repo_path) {
        debug!("Failed to save watch session: {}", e);
    }
}

fn report_file(coordinator: &AttributionCoordinator, repo_path: &Path, file: &Path) {
    let rel_path = file.strip_prefix(repo_path).unwrap_or(file);
    let rel = coordinator
        .context()
        .relative_path(file)
        .unwrap_or_else(|| rel_path.to_string_lossy().into_owned());
    let lines = coordinator
        .highlight_data()
        .get(&rel)
        .cloned()
        .unwrap_or_default();

    let time = chrono::Local::now().format("%H:%M:%S");
    println!(
        "{} {} {} {}",
        style(format!("[{}]", time)).dim(),
        style(rel_path.display()).cyan().bold(),
        style(format!("({} lines)", lines.len())).dim(),
        format_ranges(&lines)
    );
}

fn is_settings_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name == TOML_CONFIG_FILE || name == JSON_CONFIG_FILE)
}

/// Check if path should be ignored (VCS internals, build output)
fn is_ignored_path(path: &Path, repo_path: &Path) -> bool {
    let rel = path.strip_prefix(repo_path).unwrap_or(path);
    let rel_str = rel.to_string_lossy();

    rel_str.starts_with(".git/")
        || rel_str == ".git"
        || rel_str.contains("/.git/")
        || rel_str.starts_with("target/")
        || rel_str.contains("node_modules/")
}
