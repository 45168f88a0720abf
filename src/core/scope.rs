//! Resolution scope: everything a new node inherits from where it is built.
//!
//! A top-level scope is rooted at the project directory. While a node's
//! entry procedure runs, children it constructs get a scope rooted at that
//! node's recipe directory and remembering the node as their parent, which
//! is how relative targets and bound procedures find their recipe.

use super::config::Environment;
use super::node::{Leaf, Node, NodeKind};
use super::params::Params;
use super::procedure::Registry;
use super::types::{ParamMap, Target};
use crate::cache::repo::{NoRepoCache, RepoCache};
use std::path::{Path, PathBuf};
use std::rc::Rc;

struct Shared {
    registry: Registry,
    repo: Box<dyn RepoCache>,
    env: Environment,
}

/// The enclosing resolution of a child scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Parent {
    /// Display name of the enclosing node
    pub name: String,
    /// Root the enclosing node's recipe was located from
    pub root_dir: PathBuf,
    /// Target string the enclosing node's recipe was located with
    pub target: String,
}

/// Construction context for nodes; cheap to clone.
#[derive(Clone)]
pub struct Scope {
    shared: Rc<Shared>,
    root_dir: PathBuf,
    parent: Option<Rc<Parent>>,
}

impl Scope {
    pub fn builder(registry: Registry) -> ScopeBuilder {
        ScopeBuilder {
            registry,
            repo: None,
            env: None,
            root_dir: None,
        }
    }

    /// Directory relative targets are looked up in.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn node(&self, target: impl Into<Target>, params: ParamMap) -> Node {
        Node::new(self.clone(), target.into(), Params::new(params), NodeKind::Branch)
    }

    pub fn leaf(&self, target: impl Into<Target>, params: ParamMap) -> Leaf {
        Leaf::from_node(Node::new(
            self.clone(),
            target.into(),
            Params::new(params),
            NodeKind::Leaf,
        ))
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub(crate) fn repo(&self) -> &dyn RepoCache {
        self.shared.repo.as_ref()
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.shared.env
    }

    pub(crate) fn parent(&self) -> Option<&Parent> {
        self.parent.as_deref()
    }

    /// Scope for children of a node being resolved.
    pub(crate) fn enter(&self, recipe_dir: &Path, parent: Parent) -> Scope {
        Scope {
            shared: Rc::clone(&self.shared),
            root_dir: recipe_dir.to_path_buf(),
            parent: Some(Rc::new(parent)),
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("root_dir", &self.root_dir)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Builder for a top-level [`Scope`].
pub struct ScopeBuilder {
    registry: Registry,
    repo: Option<Box<dyn RepoCache>>,
    env: Option<Environment>,
    root_dir: Option<PathBuf>,
}

impl ScopeBuilder {
    /// Defaults to [`Environment::from_process`].
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Defaults to [`NoRepoCache`].
    pub fn repo_cache(mut self, repo: impl RepoCache + 'static) -> Self {
        self.repo = Some(Box::new(repo));
        self
    }

    /// Defaults to the environment's project directory.
    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    pub fn build(self) -> Scope {
        let env = self.env.unwrap_or_else(Environment::from_process);
        let root_dir = self.root_dir.unwrap_or_else(|| env.project_dir.clone());
        Scope {
            shared: Rc::new(Shared {
                registry: self.registry,
                repo: self
                    .repo
                    .unwrap_or_else(|| Box::new(NoRepoCache) as Box<dyn RepoCache>),
                env,
            }),
            root_dir,
            parent: None,
        }
    }
}
