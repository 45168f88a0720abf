//! Config merging.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. `~/.flexsrc.conf`
//! 3. `~/flexsrc.conf`
//! 4. `<project>/.flexsrc.conf`
//! 5. `<project>/flexsrc.conf`
//! 6. the target's recipe file
//! 7. forced overrides (the entry-procedure name of a bound procedure)
//!
//! A later layer replaces same-named top-level keys wholesale; there is no
//! deep merge, `default_params` included.
//!
//! Each file layer is checked key by key before merging. Scalars are
//! accepted wherever a string is expected (`id: 42` reads as `"42"`); a
//! recognised key of the wrong shape is dropped with a warning, leaving the
//! lower layers' value in effect.

use super::error::{Error, Result};
use super::locator;
use super::parser;
use super::types::*;
use crate::cache::dirs::{self as cache_dirs, CacheRoots};
use crate::cache::hasher;
use crate::cache::repo::RepoCache;
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Where config files are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// User home directory; home layers are skipped when unknown
    pub home_dir: Option<PathBuf>,
    /// Project directory: config layers 4-5 and the default root for targets
    pub project_dir: PathBuf,
}

impl Environment {
    pub fn new(home_dir: Option<PathBuf>, project_dir: PathBuf) -> Self {
        Self {
            home_dir,
            project_dir,
        }
    }

    /// Home from the platform, project from the process's current directory.
    pub fn from_process() -> Self {
        Self {
            home_dir: ::dirs::home_dir(),
            project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Config files in increasing precedence.
    pub fn config_files(&self) -> Vec<PathBuf> {
        let dotted = format!(".{}", CONFIG_FILE);
        let mut files = Vec::with_capacity(4);
        if let Some(home) = &self.home_dir {
            files.push(home.join(&dotted));
            files.push(home.join(CONFIG_FILE));
        }
        files.push(self.project_dir.join(&dotted));
        files.push(self.project_dir.join(CONFIG_FILE));
        files
    }
}

/// Layer 1.
pub fn builtin_defaults() -> Mapping {
    let mut m = Mapping::new();
    m.insert(key(REPO_CACHE_DIR), Value::Null);
    m.insert(key(DATA_CACHE_DIR), Value::Null);
    m.insert(key(OBJECT_LOADER), key(DEFAULT_OBJECT_LOADER));
    m.insert(key(DEFAULT_PARAMS), Value::Mapping(Mapping::new()));
    m.insert(key(OBJECTS_FUNC), key(DEFAULT_OBJECTS_FUNC));
    m.insert(key(INFO), Value::Null);
    m
}

fn key(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Overlay `layer` onto `base`; same-named keys are replaced entirely.
pub fn merge_layer(base: &mut Mapping, layer: Mapping) {
    for (k, v) in layer {
        base.insert(k, v);
    }
}

/// Read one file layer and coerce its recognised keys.
pub fn file_layer(path: &Path) -> Mapping {
    checked_layer(parser::load_layer(path), path)
}

/// Keep the keys of `layer` that have a usable shape.
pub fn checked_layer(layer: Mapping, origin: &Path) -> Mapping {
    let mut checked = Mapping::with_capacity(layer.len());
    for (k, v) in layer {
        let name = match k {
            Value::String(s) => s,
            scalar @ (Value::Number(_) | Value::Bool(_)) => yaml_value_to_string(&scalar),
            other => {
                tracing::warn!(
                    path = %origin.display(),
                    found = yaml_kind(&other),
                    "ignoring config key that is not a scalar"
                );
                continue;
            }
        };
        if COMPUTED_KEYS.contains(&name.as_str()) {
            tracing::debug!(path = %origin.display(), key = %name, "ignoring computed config key");
            continue;
        }
        match coerce(&name, v) {
            Ok(value) => {
                checked.insert(Value::String(name), value);
            }
            Err(found) => tracing::warn!(
                path = %origin.display(),
                key = %name,
                found,
                "config key has the wrong shape, keeping the lower layer's value"
            ),
        }
    }
    checked
}

/// Bring a recognised key to the shape [`Config`] reads. `Err` names what was found.
fn coerce(name: &str, value: Value) -> std::result::Result<Value, &'static str> {
    match name {
        INFO | ID | REPO_CACHE_DIR | DATA_CACHE_DIR => scalar_string(value, true),
        OBJECT_LOADER | OBJECTS_FUNC => scalar_string(value, false),
        DEFAULT_PARAMS => match value {
            Value::Mapping(params) => Ok(Value::Mapping(
                params
                    .into_iter()
                    .map(|(k, v)| (Value::String(yaml_value_to_string(&k)), v))
                    .collect(),
            )),
            Value::Null => Ok(Value::Mapping(Mapping::new())),
            other => Err(yaml_kind(&other)),
        },
        REPO_CACHE => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Null => Ok(Value::Bool(false)),
            other => Err(yaml_kind(&other)),
        },
        _ => Ok(value),
    }
}

fn scalar_string(value: Value, nullable: bool) -> std::result::Result<Value, &'static str> {
    match value {
        Value::String(s) => Ok(Value::String(s)),
        scalar @ (Value::Number(_) | Value::Bool(_)) => Ok(Value::String(yaml_value_to_string(&scalar))),
        Value::Null if nullable => Ok(Value::Null),
        other => Err(yaml_kind(&other)),
    }
}

/// Layers 1-5.
pub fn base_layers(env: &Environment) -> Mapping {
    let mut merged = builtin_defaults();
    for file in env.config_files() {
        merge_layer(&mut merged, file_layer(&file));
    }
    merged
}

/// A path-valued key of a merged mapping, if set.
fn path_entry(mapping: &Mapping, name: &str) -> Option<PathBuf> {
    match mapping.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
        _ => None,
    }
}

/// Inputs for computing a node's effective config.
pub struct ConfigRequest<'a> {
    pub env: &'a Environment,
    pub repo: &'a dyn RepoCache,
    /// Directory the target is relative to
    pub root_dir: &'a Path,
    /// Target string handed to the locator
    pub target: &'a str,
    /// Display name; feeds the cache path
    pub target_name: &'a str,
    /// Entry-procedure name forced by a bound-procedure target
    pub forced_objects_func: Option<&'a str>,
}

/// Merge all layers, locate the recipe, prepare cache roots, and fill in
/// the computed keys.
pub fn resolve(req: &ConfigRequest<'_>) -> Result<Config> {
    let mut merged = base_layers(req.env);
    let roots = cache_dirs::ensure_roots(
        path_entry(&merged, REPO_CACHE_DIR),
        path_entry(&merged, DATA_CACHE_DIR),
    )?;

    let located = locator::locate(req.repo, &roots.repo, req.root_dir, req.target)?;
    merge_layer(&mut merged, file_layer(&located.recipe_file));
    if let Some(func) = req.forced_objects_func {
        merged.insert(key(OBJECTS_FUNC), key(func));
    }

    let mut config = Config::from_mapping(merged).map_err(|message| Error::Config {
        target: req.target_name.to_string(),
        message,
    })?;

    // The recipe itself may relocate either root.
    let roots = cache_dirs::ensure_roots(
        Some(config.repo_cache_dir.clone().unwrap_or(roots.repo)),
        Some(config.data_cache_dir.clone().unwrap_or(roots.data)),
    )?;
    config.repo_cache_dir = Some(roots.repo.clone());
    config.data_cache_dir = Some(roots.data.clone());

    let mut cached = located.cached;
    if !cached && config.repo_cache {
        cached = true;
        req.repo.fetch(&roots.repo, &located.recipe_file)?;
    }

    let id = config
        .id
        .clone()
        .unwrap_or_else(|| hasher::identity(&config.object_loader));
    let cache_path = Path::new(LOCAL).join(format!("{}-{}", req.target_name, id));

    config.is_local = true;
    config.path = located.recipe_dir.clone();
    config.work_dir = roots.data.join(&cache_path);
    config.cache_path = cache_path;
    config.object_loader_path = loader_path(req.repo, &roots, &located.recipe_dir, &config.object_loader, cached)?;

    tracing::debug!(
        target_name = req.target_name,
        work_dir = %config.work_dir.display(),
        cached,
        "config resolved"
    );
    Ok(config)
}

fn loader_path(
    repo: &dyn RepoCache,
    roots: &CacheRoots,
    recipe_dir: &Path,
    object_loader: &str,
    cached: bool,
) -> Result<PathBuf> {
    let path = recipe_dir.join(object_loader);
    // In-process loaders have no file to fetch.
    if cached && (repo.exists(&roots.repo, &path) || path.is_file()) {
        return repo.fetch(&roots.repo, &path);
    }
    Ok(path)
}
