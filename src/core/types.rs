//! Recipe/config schema types, file-name conventions, and target references.
//!
//! The recipe file is a YAML mapping. Recognized keys are typed into
//! [`Config`]; everything else is retained verbatim in [`Config::extra`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// File-name conventions
// ============================================================================

/// Recipe file inside a directory-style target.
pub const RECIPE_FILE: &str = "__flexsrc__.yaml";

/// Recipe suffix for file-style targets (`<target>.flexsrc.yaml`).
pub const RECIPE_EXT: &str = ".flexsrc.yaml";

/// Layered config file name; also read with a leading dot.
pub const CONFIG_FILE: &str = "flexsrc.conf";

/// Default entry-procedure file name.
pub const DEFAULT_OBJECT_LOADER: &str = "__flexsrc__.sh";

/// Default entry-procedure name.
pub const DEFAULT_OBJECTS_FUNC: &str = "objects";

/// Namespace under the temp parent for default cache roots.
pub const CACHE_NAMESPACE: &str = "FlexSrc";

/// Cache-path prefix for locally found recipes.
pub const LOCAL: &str = "local";

/// Params whose key starts with this marker never affect the signature.
pub const PRIVATE_PREFIX: char = '.';

// ============================================================================
// Config keys
// ============================================================================

pub const REPO_CACHE_DIR: &str = "repo_cache_dir";
pub const DATA_CACHE_DIR: &str = "data_cache_dir";
pub const OBJECT_LOADER: &str = "object_loader";
pub const OBJECTS_FUNC: &str = "objects_func";
pub const DEFAULT_PARAMS: &str = "default_params";
pub const INFO: &str = "info";
pub const ID: &str = "id";
pub const REPO_CACHE: &str = "repo_cache";

/// Keys filled in during resolution; config layers cannot set them.
pub const COMPUTED_KEYS: [&str; 5] = ["is_local", "path", "cache_path", "work_dir", "object_loader_path"];

/// Parameter mapping (overrides, defaults, or effective values).
pub type ParamMap = IndexMap<String, serde_yaml_ng::Value>;

// ============================================================================
// Target reference
// ============================================================================

/// What a node resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Relative path naming a recipe directory or `<path>.flexsrc.yaml` file.
    Path(String),
    /// Named entry point of the enclosing target's own entry-procedure file.
    Procedure(String),
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self::Path(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Self::Path(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p),
            Self::Procedure(name) => write!(f, "<procedure {}>", name),
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Effective configuration of a node, merged from all layers.
///
/// Immutable once computed for a node; recomputing requires a new node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository-cache root (process default when unset)
    #[serde(default)]
    pub repo_cache_dir: Option<PathBuf>,

    /// Derived-data cache root (process default when unset)
    #[serde(default)]
    pub data_cache_dir: Option<PathBuf>,

    /// Entry-procedure file name, relative to the recipe directory
    #[serde(default = "default_object_loader")]
    pub object_loader: String,

    /// Entry-procedure name
    #[serde(default = "default_objects_func")]
    pub objects_func: String,

    /// Recipe-declared default params
    #[serde(default)]
    pub default_params: ParamMap,

    /// Informational string
    #[serde(default)]
    pub info: Option<String>,

    /// Explicit identity; derived from `object_loader` when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Treat a locally found recipe as a cacheable repository
    #[serde(default)]
    pub repo_cache: bool,

    // -- Computed --
    /// Recipe found on the local filesystem
    #[serde(default)]
    pub is_local: bool,

    /// Recipe directory
    #[serde(default)]
    pub path: PathBuf,

    /// Work directory suffix under the data cache (`local/<name>-<id>`)
    #[serde(default)]
    pub cache_path: PathBuf,

    /// Absolute work directory
    #[serde(default)]
    pub work_dir: PathBuf,

    /// Absolute entry-procedure file path (cached copy for repositories)
    #[serde(default)]
    pub object_loader_path: PathBuf,

    /// Unrecognized keys, retained without effect
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml_ng::Value>,
}

fn default_object_loader() -> String {
    DEFAULT_OBJECT_LOADER.to_string()
}

fn default_objects_func() -> String {
    DEFAULT_OBJECTS_FUNC.to_string()
}

impl Config {
    /// Type a merged mapping.
    pub fn from_mapping(mapping: serde_yaml_ng::Mapping) -> Result<Self, String> {
        serde_yaml_ng::from_value(serde_yaml_ng::Value::Mapping(mapping)).map_err(|e| e.to_string())
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a scalar YAML value to a plain string (mapping keys, CLI output).
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

/// Short kind name for diagnostics.
pub fn yaml_kind(val: &serde_yaml_ng::Value) -> &'static str {
    match val {
        serde_yaml_ng::Value::Null => "null",
        serde_yaml_ng::Value::Bool(_) => "a boolean",
        serde_yaml_ng::Value::Number(_) => "a number",
        serde_yaml_ng::Value::String(_) => "a string",
        serde_yaml_ng::Value::Sequence(_) => "a sequence",
        serde_yaml_ng::Value::Mapping(_) => "a mapping",
        serde_yaml_ng::Value::Tagged(_) => "a tagged value",
    }
}
