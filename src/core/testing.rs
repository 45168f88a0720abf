//! Test fixtures: an isolated home, project, and cache layout per test.

use super::config::Environment;
use super::procedure::Registry;
use super::scope::Scope;
use crate::cache::repo::RepoCache;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub home: PathBuf,
    pub project: PathBuf,
}

impl Fixture {
    /// Empty home and project; project `flexsrc.conf` pins both cache roots
    /// inside the fixture.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let project = dir.path().join("project");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&project).unwrap();
        let fx = Self { dir, home, project };
        let mut conf = serde_yaml_ng::Mapping::new();
        conf.insert(
            "repo_cache_dir".into(),
            fx.repo_root().to_string_lossy().into_owned().into(),
        );
        conf.insert(
            "data_cache_dir".into(),
            fx.data_root().to_string_lossy().into_owned().into(),
        );
        fx.write("flexsrc.conf", &serde_yaml_ng::to_string(&conf).unwrap());
        fx
    }

    pub fn repo_root(&self) -> PathBuf {
        self.dir.path().join("cache/repo")
    }

    pub fn data_root(&self) -> PathBuf {
        self.dir.path().join("cache/data")
    }

    fn write_under(base: &Path, rel: &str, content: &str) -> PathBuf {
        let path = base.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write a file relative to the project directory.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        Self::write_under(&self.project, rel, content)
    }

    pub fn write_home(&self, rel: &str, content: &str) -> PathBuf {
        Self::write_under(&self.home, rel, content)
    }

    /// Append to a project file.
    pub fn append(&self, rel: &str, content: &str) {
        let path = self.project.join(rel);
        let mut existing = std::fs::read_to_string(&path).unwrap_or_default();
        existing.push_str(content);
        std::fs::write(&path, existing).unwrap();
    }

    pub fn env(&self) -> Environment {
        Environment::new(Some(self.home.clone()), self.project.clone())
    }

    pub fn scope(&self, registry: Registry) -> Scope {
        Scope::builder(registry).environment(self.env()).build()
    }

    pub fn scope_with_cache(&self, registry: Registry, repo: impl RepoCache + 'static) -> Scope {
        Scope::builder(registry)
            .environment(self.env())
            .repo_cache(repo)
            .build()
    }
}

/// Shared call counter for entry procedures.
pub(crate) fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

pub(crate) fn s(v: &str) -> serde_yaml_ng::Value {
    serde_yaml_ng::Value::String(v.to_string())
}
