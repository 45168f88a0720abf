//! Repository-cache collaborator.
//!
//! Fetching and unpacking remote repositories lives outside this crate; the
//! resolver only needs to ask whether a cached copy of a path exists and to
//! obtain a local path for it. Both operations receive the repository-cache
//! root explicitly.

use super::hasher;
use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Source of cached recipe and entry-procedure files.
pub trait RepoCache {
    /// Whether a cached copy of `path` is present under `cache_dir`.
    fn exists(&self, cache_dir: &Path, path: &Path) -> bool;

    /// Local path of the cached copy of `path`, fetching it if needed.
    fn fetch(&self, cache_dir: &Path, path: &Path) -> Result<PathBuf>;
}

/// Never caches; `fetch` hands back the original path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepoCache;

impl RepoCache for NoRepoCache {
    fn exists(&self, _cache_dir: &Path, _path: &Path) -> bool {
        false
    }

    fn fetch(&self, _cache_dir: &Path, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// Mirrors fetched files into the repository-cache root.
///
/// Layout: `<cache_dir>/<mirror key of source path>/<file name>`. Once a
/// file is mirrored, later lookups prefer the mirror over the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorCache;

impl MirrorCache {
    /// Where `path` is mirrored under `cache_dir`.
    pub fn mirror_path(cache_dir: &Path, path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "file".into());
        cache_dir.join(hasher::mirror_key(path)).join(name)
    }
}

impl RepoCache for MirrorCache {
    fn exists(&self, cache_dir: &Path, path: &Path) -> bool {
        Self::mirror_path(cache_dir, path).is_file()
    }

    fn fetch(&self, cache_dir: &Path, path: &Path) -> Result<PathBuf> {
        let mirror = Self::mirror_path(cache_dir, path);
        if mirror.is_file() {
            return Ok(mirror);
        }
        if let Some(parent) = mirror.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Fetch {
                path: path.to_path_buf(),
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        std::fs::copy(path, &mirror).map_err(|e| Error::Fetch {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(source = %path.display(), mirror = %mirror.display(), "mirrored into repository cache");
        Ok(mirror)
    }
}
