//! Nodes: the resolvable unit.
//!
//! A [`Node`] pairs a target with params and resolves lazily. Every access
//! computes the params signature and re-runs the entry procedure only when
//! it differs from the signature of the last successful resolution.
//!
//! Resolution of one node:
//! 1. compute the signature (captures recipe defaults on first use)
//! 2. return on a memo hit
//! 3. resolve the config, record the signature
//! 4. create the work directory
//! 5. lend `storage` to the entry procedure; it is handed back on every
//!    exit path
//! 6. run the entry procedure with a child scope rooted at the recipe
//!    directory
//! 7. replace the contents with the result
//!
//! A failed resolution forgets the recorded signature, so the next access
//! runs the procedure again.

use super::config::{self, ConfigRequest};
use super::error::{Error, Result};
use super::object::{Object, Objects};
use super::params::Params;
use super::procedure::{Context, Procedure, Storage};
use super::scope::{Parent, Scope};
use super::types::{Config, ParamMap, Target};
use super::view::{self, Entry, View};
use crate::cache::dirs::{self as cache_dirs, CacheRoots};
use crate::transport::local::ScriptProcedure;
use serde_yaml_ng::Value;
use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// What a node's entry procedure must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// A mapping of named children
    Branch,
    /// Any single object
    Leaf,
}

impl NodeKind {
    fn label(self) -> &'static str {
        match self {
            Self::Branch => "Node",
            Self::Leaf => "Leaf",
        }
    }
}

struct NodeState {
    kind: NodeKind,
    target: Target,
    target_name: String,
    scope: Scope,
    params: Params,
    config: Option<Rc<Config>>,
    storage: Storage,
    contents: Option<Object>,
    signature: Option<String>,
    tail: Vec<String>,
    resolving: bool,
}

impl NodeState {
    /// Root, target string, and forced entry point used to locate the recipe.
    fn location(&self) -> Result<(PathBuf, String, Option<String>)> {
        match &self.target {
            Target::Path(target) => Ok((self.scope.root_dir().to_path_buf(), target.clone(), None)),
            Target::Procedure(name) => {
                let parent = self.scope.parent().ok_or_else(|| Error::UnboundProcedure {
                    name: name.clone(),
                })?;
                Ok((parent.root_dir.clone(), parent.target.clone(), Some(name.clone())))
            }
        }
    }
}

/// Shared handle to a lazily resolved target.
#[derive(Clone)]
pub struct Node {
    inner: Rc<RefCell<NodeState>>,
}

impl Node {
    pub(crate) fn new(scope: Scope, target: Target, params: Params, kind: NodeKind) -> Self {
        let target_name = match (&target, scope.parent()) {
            (Target::Path(t), _) => t.clone(),
            (Target::Procedure(name), Some(parent)) => format!("{}.{}", parent.name, name),
            (Target::Procedure(name), None) => name.clone(),
        };
        Self {
            inner: Rc::new(RefCell::new(NodeState {
                kind,
                target,
                target_name,
                scope,
                params,
                config: None,
                storage: Storage::new(),
                contents: None,
                signature: None,
                tail: Vec::new(),
                resolving: false,
            })),
        }
    }

    pub fn target_name(&self) -> String {
        self.inner.borrow().target_name.clone()
    }

    pub fn target(&self) -> Target {
        self.inner.borrow().target.clone()
    }

    /// Effective config, resolved on first use and fixed afterwards.
    pub fn config(&self) -> Result<Rc<Config>> {
        let cached = self.inner.borrow().config.clone();
        if let Some(config) = cached {
            return Ok(config);
        }
        let config = {
            let state = self.inner.borrow();
            let (root_dir, target, forced) = state.location()?;
            config::resolve(&ConfigRequest {
                env: state.scope.env(),
                repo: state.scope.repo(),
                root_dir: &root_dir,
                target: &target,
                target_name: &state.target_name,
                forced_objects_func: forced.as_deref(),
            })?
        };
        let config = Rc::new(config);
        self.inner.borrow_mut().config = Some(Rc::clone(&config));
        Ok(config)
    }

    /// The recipe's informational string.
    pub fn info(&self) -> Result<Option<String>> {
        Ok(self.config()?.info.clone())
    }

    pub fn params(&self) -> Params {
        self.inner.borrow().params.clone()
    }

    pub fn set_param(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.borrow_mut().params.set(key, value.into());
    }

    pub fn unset_param(&self, key: &str) -> Option<Value> {
        self.inner.borrow_mut().params.unset(key)
    }

    /// Current params signature; captures recipe defaults on first call.
    pub fn signature(&self) -> Result<String> {
        let config = self.config()?;
        let mut state = self.inner.borrow_mut();
        if !state.params.is_initialized() {
            state.params.initialize(config.default_params.clone());
        }
        Ok(state.params.signature())
    }

    /// Capture recipe defaults so overrides equal to a default are not shown
    /// as changed. Leaves params as they are when the config cannot be resolved.
    fn capture_defaults(&self) {
        let pending = match self.inner.try_borrow_mut() {
            Ok(state) => !state.params.is_initialized() && !state.params.overrides().is_empty(),
            Err(_) => false,
        };
        if pending {
            if let Err(e) = self.signature() {
                tracing::debug!(error = %e, "showing params without recipe defaults");
            }
        }
    }

    /// Keys still pending past this node in a compound lookup.
    pub fn set_tail(&self, tail: Vec<String>) {
        self.inner.borrow_mut().tail = tail;
    }

    /// Resolve if stale.
    pub fn load(&self) -> Result<()> {
        if self.inner.borrow().resolving {
            return Err(Error::Cycle {
                target: self.target_name(),
            });
        }
        let signature = self.signature()?;
        {
            let state = self.inner.borrow();
            if state.contents.is_some() && state.signature.as_deref() == Some(signature.as_str()) {
                tracing::debug!(target_name = %state.target_name, %signature, "memo hit");
                return Ok(());
            }
        }

        let config = self.config()?;
        let (kind, target_name, values, tail, child_scope) = {
            let mut state = self.inner.borrow_mut();
            let (root_dir, target, _) = state.location()?;
            state.signature = Some(signature.clone());
            let parent = Parent {
                name: state.target_name.clone(),
                root_dir,
                target,
            };
            let child_scope = state.scope.enter(&config.path, parent);
            (
                state.kind,
                state.target_name.clone(),
                state.params.values(),
                state.tail.clone(),
                child_scope,
            )
        };

        tracing::debug!(
            target_name = %target_name,
            %signature,
            entry = %config.objects_func,
            "resolving"
        );
        let outcome = cache_dirs::ensure_dir(&config.work_dir)
            .and_then(|()| self.execute(&config, &target_name, &values, &tail, child_scope))
            .and_then(|object| {
                if kind == NodeKind::Branch && object.as_map().is_none() {
                    return Err(Error::NotAMapping {
                        target: target_name.clone(),
                        found: object.kind_name(),
                    });
                }
                Ok(object)
            });

        let mut state = self.inner.borrow_mut();
        match outcome {
            Ok(object) => {
                state.contents = Some(object);
                Ok(())
            }
            Err(e) => {
                state.signature = None;
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        config: &Config,
        target_name: &str,
        values: &ParamMap,
        tail: &[String],
        scope: Scope,
    ) -> Result<Object> {
        let mut lent = Lent::take(self);
        let entry = config.objects_func.as_str();
        let registry_scope = scope.clone();
        let mut ctx = Context::new(entry, values, config, tail, &mut lent.storage, scope);

        let outcome = match registry_scope.registry().get(&config.object_loader) {
            Some(loader) => match loader.get(entry) {
                Some(procedure) => procedure.call(&mut ctx),
                None => {
                    return Err(Error::MissingEntryPoint {
                        entry: entry.to_string(),
                        loader: config.object_loader_path.clone(),
                    })
                }
            },
            None if config.object_loader_path.is_file() => {
                ScriptProcedure::new(&config.object_loader_path).call(&mut ctx)
            }
            None => {
                return Err(Error::MissingLoader {
                    loader: config.object_loader_path.clone(),
                })
            }
        };
        outcome.map_err(|e| Error::from_procedure(e, target_name, entry))
    }

    /// Resolved contents as a view.
    pub fn contents(&self) -> Result<View> {
        self.load()?;
        let state = self.inner.borrow();
        match &state.contents {
            Some(Object::Map(map)) => Ok(View::new(Rc::clone(map))),
            Some(other) => Err(Error::NotAMapping {
                target: state.target_name.clone(),
                found: other.kind_name(),
            }),
            None => Ok(View::new(Rc::new(Objects::new()))),
        }
    }

    pub fn get(&self, key: &str) -> Result<Entry> {
        self.contents()?.get(key)
    }

    /// Walk a compound key path, passing pending keys to nodes on the way.
    pub fn get_path(&self, keys: &[&str]) -> Result<Entry> {
        view::walk(Entry::Node(self.clone()), keys)
    }

    /// Forget contents, signature, and storage; the next access resolves again.
    pub fn clear(&self) {
        let mut state = self.inner.borrow_mut();
        state.contents = None;
        state.signature = None;
        state.storage.clear();
    }

    /// Purge both cache roots and [`clear`](Self::clear).
    pub fn clear_cache(&self) -> Result<()> {
        let config = self.config()?;
        if let (Some(repo), Some(data)) = (&config.repo_cache_dir, &config.data_cache_dir) {
            cache_dirs::purge(&CacheRoots {
                repo: repo.clone(),
                data: data.clone(),
            })?;
        }
        self.clear();
        Ok(())
    }

    /// Header line, then every top-level entry unwrapped.
    pub fn render(&self) -> Result<String> {
        let view = self.contents()?;
        let mut lines = Vec::with_capacity(view.len());
        for (key, entry) in view.entries()? {
            lines.push(format!("  \"{}\": {}", key, entry));
        }
        if lines.is_empty() {
            return Ok(format!("{}\n{{}}", self));
        }
        Ok(format!("{}\n{{\n{}\n}}", self, lines.join(",\n")))
    }
}

/// Storage lent out for one resolution. Dropping it hands the storage back
/// and ends the resolution, also while unwinding.
struct Lent<'n> {
    node: &'n Node,
    storage: Storage,
}

impl<'n> Lent<'n> {
    fn take(node: &'n Node) -> Self {
        let mut state = node.inner.borrow_mut();
        state.resolving = true;
        let storage = std::mem::take(&mut state.storage);
        drop(state);
        Self { node, storage }
    }
}

impl Drop for Lent<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.node.inner.try_borrow_mut() {
            state.storage = std::mem::take(&mut self.storage);
            state.resolving = false;
            // An unwinding procedure never reaches the failure path of `load`.
            if std::thread::panicking() {
                state.signature = None;
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.capture_defaults();
        match self.inner.try_borrow() {
            Ok(state) => write!(
                f,
                "{}({}{})",
                state.kind.label(),
                state.target_name,
                state.params
            ),
            Err(_) => write!(f, "Node(<busy>)"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(state) => f
                .debug_struct(state.kind.label())
                .field("target", &state.target)
                .field("target_name", &state.target_name)
                .field("signature", &state.signature)
                .field("resolved", &state.contents.is_some())
                .finish(),
            Err(_) => f.write_str("Node(<busy>)"),
        }
    }
}

/// A node whose contents is a single body rather than a mapping.
#[derive(Clone)]
pub struct Leaf {
    node: Node,
}

impl Leaf {
    pub(crate) fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// Underlying node: params, config, cache control.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Resolve if stale and return the body.
    pub fn get_body(&self) -> Result<Object> {
        self.node.load()?;
        let state = self.node.inner.borrow();
        Ok(state.contents.clone().unwrap_or(Object::Value(Value::Null)))
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::procedure::{Loader, Registry};
    use crate::core::testing::{counter, s, Fixture};
    use std::cell::Cell;

    const LOADER: &str = "builtin";

    fn params(entries: &[(&str, Value)]) -> ParamMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Recipe at `<project>/<target>/__flexsrc__.yaml` using the in-process loader.
    fn recipe(fx: &Fixture, target: &str, extra: &str) {
        fx.write(
            &format!("{}/__flexsrc__.yaml", target),
            &format!("object_loader: {}\n{}", LOADER, extra),
        );
    }

    fn counting(calls: &Rc<Cell<usize>>) -> Loader {
        let calls = Rc::clone(calls);
        Loader::new().entry("objects", move |ctx| {
            calls.set(calls.get() + 1);
            let mode = ctx.param("mode").cloned().unwrap_or(Value::Null);
            Ok([("mode", Object::Value(mode))].into_iter().collect())
        })
    }

    #[test]
    fn test_node_defaults_and_overrides_seen_by_procedure() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "default_params:\n  mode: fast\n");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));

        let plain = scope.node("foo", ParamMap::new());
        assert_eq!(plain.signature().unwrap(), "");
        assert_eq!(plain.get("mode").unwrap().as_str(), Some("fast"));

        let slow = scope.node("foo", params(&[("mode", s("slow"))]));
        assert_eq!(slow.signature().unwrap(), r#"{"mode":"slow"}"#);
        assert_eq!(slow.get("mode").unwrap().as_str(), Some("slow"));
    }

    #[test]
    fn test_node_memo_hit_runs_once() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());

        node.get("mode").unwrap();
        node.get("mode").unwrap();
        node.load().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_node_param_change_reruns_once() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "default_params:\n  mode: fast\n");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());

        node.load().unwrap();
        node.set_param("mode", "slow");
        assert_eq!(node.get("mode").unwrap().as_str(), Some("slow"));
        node.get("mode").unwrap();
        assert_eq!(calls.get(), 2);

        // Back to the default value: signature is empty again
        node.set_param("mode", "fast");
        node.load().unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_node_private_param_does_not_reload() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());

        node.load().unwrap();
        node.set_param(".verbose", true);
        node.load().unwrap();
        assert_eq!(calls.get(), 1);
        assert!(node.params().get(".verbose").is_some());
    }

    #[test]
    fn test_node_suffix_target_path_is_root() {
        let fx = Fixture::new();
        fx.write("foo.flexsrc.yaml", &format!("object_loader: {}\n", LOADER));
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());
        assert_eq!(node.config().unwrap().path, fx.project);
        node.load().unwrap();
        assert!(node.config().unwrap().work_dir.is_dir());
    }

    #[test]
    fn test_node_cache_path_shared_by_identical_recipes() {
        let fx = Fixture::new();
        recipe(&fx, "a/foo", "");
        recipe(&fx, "b/foo", "info: another copy\n");
        let scope_a = Scope::builder(Registry::new())
            .environment(fx.env())
            .root_dir(fx.project.join("a"))
            .build();
        let scope_b = Scope::builder(Registry::new())
            .environment(fx.env())
            .root_dir(fx.project.join("b"))
            .build();
        let a = scope_a.node("foo", ParamMap::new()).config().unwrap();
        let b = scope_b.node("foo", ParamMap::new()).config().unwrap();
        assert_eq!(a.cache_path, b.cache_path);
        assert_eq!(a.work_dir, b.work_dir);
    }

    #[test]
    fn test_node_invalid_target_names_root() {
        let fx = Fixture::new();
        let scope = fx.scope(Registry::new());
        let err = scope.node("ghost", ParamMap::new()).load().unwrap_err();
        assert!(matches!(err, Error::InvalidTarget { .. }));
        assert!(err.to_string().contains(&fx.project.display().to_string()));
    }

    #[test]
    fn test_node_clear_cache_forces_rerun() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());

        node.load().unwrap();
        let work_dir = node.config().unwrap().work_dir.clone();
        std::fs::write(work_dir.join("derived.txt"), "x").unwrap();

        node.clear_cache().unwrap();
        assert!(!work_dir.join("derived.txt").exists());
        node.load().unwrap();
        assert_eq!(calls.get(), 2);
        assert!(work_dir.is_dir());

        node.clear_cache().unwrap();
        node.load().unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_node_clear_keeps_disk() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());
        node.load().unwrap();
        let marker = node.config().unwrap().work_dir.join("derived.txt");
        std::fs::write(&marker, "x").unwrap();

        node.clear();
        node.load().unwrap();
        assert_eq!(calls.get(), 2);
        assert!(marker.exists());
    }

    fn run_counter() -> Loader {
        Loader::new().entry("objects", |ctx| {
            let runs = ctx.storage.get("runs").and_then(Value::as_i64).unwrap_or(0) + 1;
            ctx.storage.insert("runs".to_string(), Value::Number(runs.into()));
            Ok([("runs", Object::from(runs))].into_iter().collect())
        })
    }

    #[test]
    fn test_node_storage_survives_reloads() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let scope = fx.scope(Registry::new().with(LOADER, run_counter()));
        let node = scope.node("foo", ParamMap::new());

        assert_eq!(node.get("runs").unwrap().as_value(), Some(&Value::Number(1.into())));
        node.set_param("n", 1);
        assert_eq!(node.get("runs").unwrap().as_value(), Some(&Value::Number(2.into())));

        node.clear();
        assert_eq!(node.get("runs").unwrap().as_value(), Some(&Value::Number(1.into())));
    }

    #[test]
    fn test_node_tail_reaches_child() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        fx.write(
            "foo/child.flexsrc.yaml",
            &format!("object_loader: {}\nobjects_func: child\n", LOADER),
        );
        let loader = Loader::new()
            .entry("objects", |ctx| {
                Ok([
                    ("child", Object::from(ctx.node("child", ParamMap::new()))),
                    ("seen", Object::from(ctx.tail.join("/"))),
                ]
                .into_iter()
                .collect())
            })
            .entry("child", |ctx| {
                let seen: Object = [("y", Object::from(ctx.tail.join("/")))].into_iter().collect();
                Ok([("x", seen)].into_iter().collect())
            });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());

        let found = node.get_path(&["child", "x", "y"]).unwrap();
        assert_eq!(found.as_str(), Some("x/y"));
        assert_eq!(node.get("seen").unwrap().as_str(), Some("child/x/y"));
    }

    #[test]
    fn test_node_child_resolves_against_parent_recipe_dir() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        recipe(&fx, "foo/child", "info: nested\n");
        // Same name at the project root must not be picked
        recipe(&fx, "child", "info: top-level\n");
        let loader = Loader::new().entry("objects", |ctx| {
            Ok([("child", Object::from(ctx.node("child", ParamMap::new())))]
                .into_iter()
                .collect())
        });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());

        let child = node.get("child").unwrap();
        let child = child.as_node().unwrap();
        assert_eq!(child.info().unwrap().as_deref(), Some("nested"));
        assert_eq!(child.config().unwrap().path, fx.project.join("foo/child"));
    }

    #[test]
    fn test_node_bound_procedure() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "objects_func: objects\n");
        let loader = Loader::new()
            .entry("objects", |ctx| {
                Ok([("sub", Object::from(ctx.bound("train", ParamMap::new())))]
                    .into_iter()
                    .collect())
            })
            .entry("train", |ctx| {
                Ok([("entry", Object::from(ctx.entry))].into_iter().collect())
            });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());

        let sub = node.get("sub").unwrap();
        let sub = sub.as_node().unwrap();
        assert_eq!(sub.target_name(), "foo.train");
        assert_eq!(sub.get("entry").unwrap().as_str(), Some("train"));
        let config = sub.config().unwrap();
        assert_eq!(config.objects_func, "train");
        assert_eq!(config.path, fx.project.join("foo"));
        assert_ne!(config.work_dir, node.config().unwrap().work_dir);
    }

    #[test]
    fn test_node_unbound_procedure() {
        let fx = Fixture::new();
        let scope = fx.scope(Registry::new());
        let node = scope.node(Target::Procedure("train".to_string()), ParamMap::new());
        assert!(matches!(node.load().unwrap_err(), Error::UnboundProcedure { .. }));
    }

    #[test]
    fn test_node_leaf_unwrapped_on_lookup() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let loader = Loader::new()
            .entry("objects", |ctx| {
                Ok([("file", Object::from(ctx.bound_leaf("path", ParamMap::new())))]
                    .into_iter()
                    .collect())
            })
            .entry("path", |ctx| Ok(Object::from(ctx.work_dir.join("data.csv").display().to_string())));
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());

        let body = node.get("file").unwrap();
        let body = body.as_str().unwrap().to_string();
        assert!(body.ends_with("data.csv"));
        assert!(body.contains("foo.path-"));
    }

    #[test]
    fn test_node_leaf_get_body() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let loader = Loader::new().entry("objects", |_ctx| Ok(Object::from(42i64)));
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let leaf = scope.leaf("foo", ParamMap::new());
        assert_eq!(leaf.get_body().unwrap().as_value(), Some(&Value::Number(42.into())));
        assert_eq!(leaf.to_string(), "Leaf(foo)");
    }

    #[test]
    fn test_node_failure_restores_storage_and_retries() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let fail = Rc::new(Cell::new(true));
        let flag = Rc::clone(&fail);
        let loader = Loader::new().entry("objects", move |ctx| {
            let attempts = ctx.storage.get("attempts").and_then(Value::as_i64).unwrap_or(0) + 1;
            ctx.storage.insert("attempts".to_string(), Value::Number(attempts.into()));
            if flag.get() {
                anyhow::bail!("upstream unavailable");
            }
            Ok([("attempts", Object::from(attempts))].into_iter().collect())
        });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());

        let err = node.load().unwrap_err();
        assert!(matches!(err, Error::Procedure { .. }));
        assert!(err.to_string().contains("upstream unavailable"));

        fail.set(false);
        assert_eq!(node.get("attempts").unwrap().as_value(), Some(&Value::Number(2.into())));
    }

    #[test]
    fn test_node_panic_restores_storage_and_retries() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let explode = Rc::new(Cell::new(false));
        let flag = Rc::clone(&explode);
        let loader = Loader::new().entry("objects", move |ctx| {
            let runs = ctx.storage.get("runs").and_then(Value::as_i64).unwrap_or(0) + 1;
            ctx.storage.insert("runs".to_string(), Value::Number(runs.into()));
            if flag.get() {
                panic!("procedure crashed");
            }
            Ok([("runs", Object::from(runs))].into_iter().collect())
        });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());
        node.load().unwrap();

        explode.set(true);
        node.set_param("n", 1);
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| node.load()));
        assert!(caught.is_err());

        // Storage written before the panic survives; no stale memo hit, no cycle
        explode.set(false);
        node.load().unwrap();
        assert_eq!(node.get("runs").unwrap().as_value(), Some(&Value::Number(3.into())));
    }

    #[test]
    fn test_node_missing_entry_point() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "objects_func: nope\n");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let err = scope.node("foo", ParamMap::new()).load().unwrap_err();
        assert!(matches!(err, Error::MissingEntryPoint { ref entry, .. } if entry == "nope"));
    }

    #[test]
    fn test_node_missing_loader() {
        let fx = Fixture::new();
        fx.write("foo/__flexsrc__.yaml", "object_loader: absent.sh\n");
        let scope = fx.scope(Registry::new());
        let err = scope.node("foo", ParamMap::new()).load().unwrap_err();
        assert!(matches!(err, Error::MissingLoader { .. }));
    }

    #[test]
    fn test_node_branch_requires_mapping() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let loader = Loader::new().entry("objects", |_ctx| Ok(Object::from(1i64)));
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let err = scope.node("foo", ParamMap::new()).load().unwrap_err();
        assert!(matches!(err, Error::NotAMapping { found: "a value", .. }));
    }

    #[test]
    fn test_node_self_access_is_cycle() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let slot: Rc<RefCell<Option<Node>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let loader = Loader::new().entry("objects", move |_ctx| {
            let me = inner.borrow().clone();
            if let Some(me) = me {
                me.get("anything")?;
            }
            Ok(Object::empty())
        });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", ParamMap::new());
        *slot.borrow_mut() = Some(node.clone());

        assert!(matches!(node.load().unwrap_err(), Error::Cycle { .. }));
        // The guard ended the resolution
        *slot.borrow_mut() = None;
        node.load().unwrap();
    }

    #[test]
    fn test_node_numeric_id_resolves() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "id: 42\n");
        let calls = counter();
        let scope = fx.scope(Registry::new().with(LOADER, counting(&calls)));
        let node = scope.node("foo", ParamMap::new());
        node.load().unwrap();
        assert!(node.config().unwrap().work_dir.ends_with("local/foo-42"));
    }

    #[test]
    fn test_node_info() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "info: census extract\n");
        let scope = fx.scope(Registry::new());
        assert_eq!(
            scope.node("foo", ParamMap::new()).info().unwrap().as_deref(),
            Some("census extract")
        );
    }

    #[test]
    fn test_node_display_and_render() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "default_params:\n  mode: fast\n");
        let loader = Loader::new().entry("objects", |ctx| {
            Ok([
                ("mode", Object::Value(ctx.param("mode").cloned().unwrap_or(Value::Null))),
                ("n", Object::from(3i64)),
            ]
            .into_iter()
            .collect())
        });
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        let node = scope.node("foo", params(&[("mode", s("slow"))]));

        assert_eq!(node.to_string(), r#"Node(foo{"mode":"slow"})"#);
        assert_eq!(
            node.render().unwrap(),
            "Node(foo{\"mode\":\"slow\"})\n{\n  \"mode\": \"slow\",\n  \"n\": 3\n}"
        );
    }

    #[test]
    fn test_node_display_before_access_uses_defaults() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "default_params:\n  mode: fast\n");
        let scope = fx.scope(Registry::new());
        assert_eq!(scope.node("foo", params(&[("mode", s("fast"))])).to_string(), "Node(foo)");
        assert_eq!(
            scope.node("foo", params(&[("mode", s("slow"))])).to_string(),
            r#"Node(foo{"mode":"slow"})"#
        );
        // Unresolvable: overrides shown as given
        assert_eq!(
            scope.node("ghost", params(&[("mode", s("fast"))])).to_string(),
            r#"Node(ghost{"mode":"fast"})"#
        );
    }

    #[test]
    fn test_node_render_empty() {
        let fx = Fixture::new();
        recipe(&fx, "foo", "");
        let loader = Loader::new().entry("objects", |_ctx| Ok(Object::empty()));
        let scope = fx.scope(Registry::new().with(LOADER, loader));
        assert_eq!(scope.node("foo", ParamMap::new()).render().unwrap(), "Node(foo)\n{}");
    }
}
