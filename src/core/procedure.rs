//! Entry procedures and the context they run with.
//!
//! A target's recipe names an entry-procedure file (`object_loader`) and an
//! entry point inside it (`objects_func`). In-process procedures are
//! registered per file name in a [`Registry`]; a file name with no
//! registered [`Loader`] falls back to running the file as a script (see
//! [`crate::transport::local::ScriptProcedure`]).

use super::node::{Leaf, Node};
use super::object::Object;
use super::scope::Scope;
use super::types::{Config, ParamMap, Target};
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::collections::HashMap;
use std::path::Path;

/// Scratch mapping kept per node across reloads.
pub type Storage = IndexMap<String, Value>;

/// Produces a node's contents.
pub trait Procedure {
    fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<Object>;
}

impl<F> Procedure for F
where
    F: Fn(&mut Context<'_>) -> anyhow::Result<Object>,
{
    fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<Object> {
        self(ctx)
    }
}

/// Entry points of one entry-procedure file.
#[derive(Default)]
pub struct Loader {
    entries: IndexMap<String, Box<dyn Procedure>>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a closure entry point.
    pub fn entry<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> anyhow::Result<Object> + 'static,
    {
        self.procedure(name, f)
    }

    /// Add any [`Procedure`] as an entry point.
    pub fn procedure(mut self, name: &str, procedure: impl Procedure + 'static) -> Self {
        self.entries.insert(name.to_string(), Box::new(procedure));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Procedure> {
        self.entries.get(name).map(|p| p.as_ref())
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// In-process loaders keyed by entry-procedure file name.
#[derive(Debug, Default)]
pub struct Registry {
    loaders: HashMap<String, Loader>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object_loader: &str, loader: Loader) {
        self.loaders.insert(object_loader.to_string(), loader);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, object_loader: &str, loader: Loader) -> Self {
        self.register(object_loader, loader);
        self
    }

    pub fn get(&self, object_loader: &str) -> Option<&Loader> {
        self.loaders.get(object_loader)
    }
}

/// What an entry procedure sees while it runs.
pub struct Context<'a> {
    /// Entry point being invoked
    pub entry: &'a str,
    /// Effective params: recipe defaults overlaid by overrides
    pub params: &'a ParamMap,
    /// The node's effective config
    pub configs: &'a Config,
    /// Keys still pending past this node in a compound lookup
    pub tail: &'a [String],
    /// Scratch mapping; survives reloads of the same node
    pub storage: &'a mut Storage,
    /// Created before the call; procedures put derived files here
    pub work_dir: &'a Path,
    scope: Scope,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        entry: &'a str,
        params: &'a ParamMap,
        configs: &'a Config,
        tail: &'a [String],
        storage: &'a mut Storage,
        scope: Scope,
    ) -> Self {
        Self {
            entry,
            params,
            configs,
            tail,
            storage,
            work_dir: &configs.work_dir,
            scope,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Scope for children of this node: rooted at the recipe directory.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Child node relative to this node's recipe directory.
    pub fn node(&self, target: impl Into<Target>, params: ParamMap) -> Node {
        self.scope.node(target, params)
    }

    pub fn leaf(&self, target: impl Into<Target>, params: ParamMap) -> Leaf {
        self.scope.leaf(target, params)
    }

    /// Child node running another entry point of this node's own file.
    pub fn bound(&self, name: &str, params: ParamMap) -> Node {
        self.scope.node(Target::Procedure(name.to_string()), params)
    }

    pub fn bound_leaf(&self, name: &str, params: ParamMap) -> Leaf {
        self.scope.leaf(Target::Procedure(name.to_string()), params)
    }
}
