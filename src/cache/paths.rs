//! Cache path utilities - per-repository state lives under
//! ~/.cache/commitlens/<repo-hash>/ rather than inside the work tree.

use std::path::{Path, PathBuf};

/// Get the cache directory for a repository.
/// Uses ~/.cache/commitlens/<repo-hash>/ on Unix, %LOCALAPPDATA%/commitlens/<repo-hash>/ on Windows.
pub fn get_cache_dir(repo_path: &Path) -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("commitlens").join(hash_path(repo_path))
}

/// Get the watch session file path for a repository.
pub fn get_session_path(repo_path: &Path) -> PathBuf {
    get_cache_dir(repo_path).join("watch_session.json")
}

/// Deterministic directory name for a repository: `<name>-<hash>`.
fn hash_path(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let mut hasher = DefaultHasher::new();
    canonical.to_string_lossy().hash(&mut hasher);

    // file_name of the canonical path, so "." still gets a real name
    let repo_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(20)
        .collect::<String>();

    format!("{}-{:012x}", repo_name, hasher.finish())
}
