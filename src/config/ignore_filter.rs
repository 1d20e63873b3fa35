//! Glob-based exclusion of candidate files

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

/// Compiled set of user ignore patterns.
///
/// `*` stays within one path segment; use `**` to cross directories.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnoreFilter {
    /// Compile `patterns`. Invalid globs are logged and skipped.
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut accepted = Vec::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                    accepted.push(pattern.clone());
                }
                Err(e) => warn!("Skipping invalid ignore pattern {:?}: {}", pattern, e),
            }
        }
        let set = builder.build().unwrap_or_else(|e| {
            warn!("Failed to compile ignore patterns: {}", e);
            GlobSet::empty()
        });
        debug!("Loaded ignore patterns: {}", accepted.join(", "));
        Self {
            patterns: accepted,
            set,
        }
    }

    /// Filter that excludes nothing
    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Patterns that compiled successfully, in configured order
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check if `path` is excluded by any pattern
    pub fn matches(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let matched = self.set.is_match(&normalized);
        if matched {
            debug!("File {} matches an ignore pattern", normalized);
        }
        matched
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::empty()
    }
}
