//! Cache directory management.
//!
//! Two roots: the repository cache (fetched recipe files) and the data cache
//! (per-recipe work directories). Unset roots default to
//! `<tmp parent>/FlexSrc/{repo,data}`.

use crate::core::error::{Error, Result};
use crate::core::types::CACHE_NAMESPACE;
use std::path::{Path, PathBuf};

/// Resolved cache roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoots {
    pub repo: PathBuf,
    pub data: PathBuf,
}

/// Process-default location for a cache root of the given kind.
///
/// Allocates a fresh temporary directory and uses its parent, so the
/// location follows `TMPDIR` the same way every other temp allocation does.
pub fn default_root(kind: &str) -> Result<PathBuf> {
    let probe = tempfile::tempdir()
        .map_err(|e| Error::io("cannot allocate temp dir in", &std::env::temp_dir(), e))?;
    let parent = probe
        .path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    Ok(parent.join(CACHE_NAMESPACE).join(kind))
}

/// Create a directory tree if absent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io("cannot create dir", path, e))
}

/// Ensure both roots exist, filling in defaults for unset ones. Idempotent.
pub fn ensure_roots(repo: Option<PathBuf>, data: Option<PathBuf>) -> Result<CacheRoots> {
    let repo = match repo {
        Some(p) => p,
        None => default_root("repo")?,
    };
    let data = match data {
        Some(p) => p,
        None => default_root("data")?,
    };
    ensure_dir(&repo)?;
    ensure_dir(&data)?;
    Ok(CacheRoots { repo, data })
}

/// Delete both roots recursively and recreate them empty.
pub fn purge(roots: &CacheRoots) -> Result<()> {
    for root in [&roots.repo, &roots.data] {
        if root.is_dir() {
            std::fs::remove_dir_all(root).map_err(|e| Error::io("cannot remove", root, e))?;
        }
        ensure_dir(root)?;
    }
    tracing::info!(repo = %roots.repo.display(), data = %roots.data.display(), "cache purged");
    Ok(())
}
