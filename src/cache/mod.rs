//! Per-repository state kept between runs
//!
//! Only the watch session is persisted: the labels a `watch` run was
//! following, so `watch --resume` can pick them up again. Highlight data is
//! always recomputed.

pub mod paths;

pub use paths::{get_cache_dir, get_session_path};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Labels being watched, saved between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSession {
    pub version: u32,
    pub labels: Vec<String>,
    /// RFC 3339 time of the last save
    #[serde(default)]
    pub saved_at: Option<String>,
}

impl WatchSession {
    pub const VERSION: u32 = 1;

    pub fn new(labels: Vec<String>) -> Self {
        Self {
            version: Self::VERSION,
            labels,
            saved_at: None,
        }
    }

    /// Load the session for `repo_path`. Missing or unreadable files give an
    /// empty session.
    pub fn load(repo_path: &Path) -> Self {
        Self::load_from(&get_session_path(repo_path))
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(data) = std::fs::read_to_string(path) else {
            debug!("No watch session at {}", path.display());
            return Self::new(Vec::new());
        };
        match serde_json::from_str::<Self>(&data) {
            Ok(session) if session.version == Self::VERSION => session,
            Ok(session) => {
                warn!(
                    "Watch session version mismatch ({} vs {}), ignoring",
                    session.version,
                    Self::VERSION
                );
                Self::new(Vec::new())
            }
            Err(e) => {
                warn!("Corrupt watch session {}: {}", path.display(), e);
                Self::new(Vec::new())
            }
        }
    }

    /// Save the session for `repo_path`
    pub fn save(&mut self, repo_path: &Path) -> Result<()> {
        self.save_to(&get_session_path(repo_path))
    }

    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.saved_at = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Saved watch session to {}", path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
