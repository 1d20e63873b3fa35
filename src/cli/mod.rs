//! CLI command definitions and handlers

mod highlight;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use commitlens::config::{SettingKey, MAX_CONCURRENCY};
use commitlens::engine::{AttributionCoordinator, Hosts};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > MAX_CONCURRENCY {
        Err(format!("workers cannot exceed {}", MAX_CONCURRENCY))
    } else {
        Ok(n)
    }
}

/// commitlens - see which lines your commits wrote
#[derive(Parser, Debug)]
#[command(name = "commitlens")]
#[command(
    version,
    about = "Attribute the lines of a working tree to a chosen set of commits",
    long_about = "commitlens indexes the history of a git repository, finds the files a set \
of commits touched, and blames each of them to report which lines those commits \
(or your uncommitted edits) are responsible for.\n\n\
Commits are picked by label, as printed by `commitlens commits`, e.g. \"3) Fix parser\".",
    after_help = "\
Examples:
  commitlens commits                         List commit labels
  commitlens highlight \"3) Fix parser\"       Lines written by one commit
  commitlens uncommitted --format json       Lines changed in the working tree
  commitlens branch --base develop           Lines written on the current branch
  commitlens watch \"2) WIP\"                  Keep highlights fresh while editing"
)]
pub struct Cli {
    /// Path inside the repository (default: current directory)
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel blame workers (1-64), overrides maxConcurrency
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List labelled commits, newest first
    Commits {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Attribute lines to the given commits
    Highlight {
        /// Commit labels, e.g. "3) Fix parser"
        #[arg(required = true, value_name = "LABEL")]
        labels: Vec<String>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Answer yes to confirmation prompts
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Attribute lines changed in the working tree
    Uncommitted {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Answer yes to confirmation prompts
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Attribute lines written on the current branch
    Branch {
        /// Base branch (default: baseBranch setting)
        #[arg(long)]
        base: Option<String>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Answer yes to confirmation prompts
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Attribute lines, then keep them updated as files are saved
    Watch {
        /// Commit labels to watch
        #[arg(value_name = "LABEL")]
        labels: Vec<String>,

        /// Also watch the labels saved by the previous watch session
        #[arg(long)]
        resume: bool,

        /// Answer yes to confirmation prompts
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Commits { format } => highlight::run_commits(&cli.path, &format),

        Commands::Highlight {
            labels,
            format,
            yes,
        } => highlight::run_highlight(&cli.path, cli.workers, &labels, &format, yes),

        Commands::Uncommitted { format, yes } => {
            highlight::run_uncommitted(&cli.path, cli.workers, &format, yes)
        }

        Commands::Branch { base, format, yes } => {
            highlight::run_branch(&cli.path, cli.workers, base, &format, yes)
        }

        Commands::Watch {
            labels,
            resume,
            yes,
        } => watch::run(&cli.path, cli.workers, labels, resume, yes),
    }
}

/// Open the repository and apply command-line overrides to its settings.
fn open_coordinator(
    path: &Path,
    workers: Option<usize>,
    base: Option<String>,
    hosts: Hosts,
) -> Result<AttributionCoordinator> {
    let coordinator = AttributionCoordinator::open(path, hosts)?;
    let mut settings = coordinator.settings();
    let mut changed = Vec::new();
    if let Some(workers) = workers {
        settings.max_concurrency = workers;
        changed.push(SettingKey::MaxConcurrency);
    }
    if let Some(base) = base {
        settings.base_branch = base;
        changed.push(SettingKey::BaseBranch);
    }
    for key in changed {
        coordinator.apply_setting(&settings, key);
    }
    Ok(coordinator)
}
