//! Target location: find the recipe file for `<root>/<target>`.
//!
//! Lookup order, first hit wins:
//! 1. cached `<root>/<target>/__flexsrc__.yaml`
//! 2. cached `<root>/<target>.flexsrc.yaml`
//! 3. local `<root>/<target>/__flexsrc__.yaml`
//! 4. local `<root>/<target>.flexsrc.yaml`
//!
//! Cached copies are checked first so a previously fetched recipe is used in
//! preference to scanning the pristine (possibly remote-mounted) path.

use super::error::{Error, Result};
use super::types::{RECIPE_EXT, RECIPE_FILE};
use crate::cache::repo::RepoCache;
use std::path::{Path, PathBuf};

/// Where a target's recipe was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Readable recipe file (the cached copy for repositories)
    pub recipe_file: PathBuf,
    /// Recipe directory: `<root>/<target>` or `<root>`
    pub recipe_dir: PathBuf,
    /// Found through the repository cache
    pub cached: bool,
}

/// Candidate `(recipe file, recipe dir)` pairs in lookup order.
fn candidates(root_dir: &Path, target: &str) -> [(PathBuf, PathBuf); 2] {
    let dir = root_dir.join(target);
    [
        (dir.join(RECIPE_FILE), dir),
        (
            root_dir.join(format!("{}{}", target, RECIPE_EXT)),
            root_dir.to_path_buf(),
        ),
    ]
}

/// Locate the recipe for `target` under `root_dir`.
pub fn locate(
    repo: &dyn RepoCache,
    repo_root: &Path,
    root_dir: &Path,
    target: &str,
) -> Result<Located> {
    let candidates = candidates(root_dir, target);

    for (recipe, recipe_dir) in &candidates {
        if repo.exists(repo_root, recipe) {
            tracing::debug!(recipe = %recipe.display(), "recipe found in repository cache");
            return Ok(Located {
                recipe_file: repo.fetch(repo_root, recipe)?,
                recipe_dir: recipe_dir.clone(),
                cached: true,
            });
        }
    }

    for (recipe, recipe_dir) in candidates {
        if recipe.is_file() {
            tracing::debug!(recipe = %recipe.display(), "recipe found locally");
            return Ok(Located {
                recipe_file: recipe,
                recipe_dir,
                cached: false,
            });
        }
    }

    Err(Error::InvalidTarget {
        target: target.to_string(),
        root: root_dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::repo::{MirrorCache, NoRepoCache};

    #[test]
    fn test_locator_directory_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("foo")).unwrap();
        std::fs::write(dir.path().join("foo/__flexsrc__.yaml"), "{}").unwrap();

        let found = locate(&NoRepoCache, Path::new("/unused"), dir.path(), "foo").unwrap();
        assert_eq!(found.recipe_dir, dir.path().join("foo"));
        assert_eq!(found.recipe_file, dir.path().join("foo/__flexsrc__.yaml"));
        assert!(!found.cached);
    }

    #[test]
    fn test_locator_suffix_file_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.flexsrc.yaml"), "{}").unwrap();

        let found = locate(&NoRepoCache, Path::new("/unused"), dir.path(), "foo").unwrap();
        assert_eq!(found.recipe_dir, dir.path());
        assert_eq!(found.recipe_file, dir.path().join("foo.flexsrc.yaml"));
    }

    #[test]
    fn test_locator_directory_wins_over_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("foo")).unwrap();
        std::fs::write(dir.path().join("foo/__flexsrc__.yaml"), "{}").unwrap();
        std::fs::write(dir.path().join("foo.flexsrc.yaml"), "{}").unwrap();

        let found = locate(&NoRepoCache, Path::new("/unused"), dir.path(), "foo").unwrap();
        assert_eq!(found.recipe_dir, dir.path().join("foo"));
    }

    #[test]
    fn test_locator_directory_without_recipe_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("foo")).unwrap();
        std::fs::write(dir.path().join("foo.flexsrc.yaml"), "{}").unwrap();

        let found = locate(&NoRepoCache, Path::new("/unused"), dir.path(), "foo").unwrap();
        assert_eq!(found.recipe_dir, dir.path());
    }

    #[test]
    fn test_locator_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate(&NoRepoCache, Path::new("/unused"), dir.path(), "ghost").unwrap_err();
        match err {
            Error::InvalidTarget { target, root } => {
                assert_eq!(target, "ghost");
                assert_eq!(root, dir.path());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_locator_prefers_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().join("repo");
        let recipe = dir.path().join("foo.flexsrc.yaml");
        std::fs::write(&recipe, "info: v1\n").unwrap();
        MirrorCache.fetch(&repo_root, &recipe).unwrap();

        let found = locate(&MirrorCache, &repo_root, dir.path(), "foo").unwrap();
        assert!(found.cached);
        assert!(found.recipe_file.starts_with(&repo_root));
        assert_eq!(found.recipe_dir, dir.path());
    }

    #[test]
    fn test_locator_cached_copy_survives_source_removal() {
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().join("repo");
        std::fs::create_dir(dir.path().join("foo")).unwrap();
        let recipe = dir.path().join("foo/__flexsrc__.yaml");
        std::fs::write(&recipe, "{}").unwrap();
        MirrorCache.fetch(&repo_root, &recipe).unwrap();
        std::fs::remove_file(&recipe).unwrap();

        let found = locate(&MirrorCache, &repo_root, dir.path(), "foo").unwrap();
        assert!(found.cached);
        assert_eq!(found.recipe_dir, dir.path().join("foo"));
    }
}
