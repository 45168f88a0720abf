//! Tolerant YAML layer loading.
//!
//! A config layer that is missing, unreadable, malformed, or not a mapping
//! is treated as empty. Failures other than absence are logged.

use super::types::{ParamMap, DEFAULT_PARAMS};
use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

/// Read a file's contents. `None` when absent or unreadable.
pub fn read_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable config layer");
            None
        }
    }
}

/// Parse YAML text into a mapping; anything else yields an empty mapping.
pub fn parse_mapping(text: &str, origin: &Path) -> Mapping {
    match serde_yaml_ng::from_str::<Value>(text) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(Value::Null) => Mapping::new(),
        Ok(other) => {
            tracing::warn!(
                path = %origin.display(),
                found = super::types::yaml_kind(&other),
                "config layer is not a mapping, ignoring"
            );
            Mapping::new()
        }
        Err(e) => {
            tracing::warn!(path = %origin.display(), error = %e, "config layer parse error, ignoring");
            Mapping::new()
        }
    }
}

/// Load one config layer from disk.
pub fn load_layer(path: &Path) -> Mapping {
    read_file(path)
        .map(|text| parse_mapping(&text, path))
        .unwrap_or_default()
}

/// Read a recipe's `default_params` without resolving anything.
///
/// Returns an empty mapping when the file or key is missing or malformed.
pub fn load_default_params(path: &Path) -> ParamMap {
    let layer = load_layer(path);
    match layer.get(DEFAULT_PARAMS) {
        Some(Value::Mapping(params)) => params
            .iter()
            .map(|(k, v)| (super::types::yaml_value_to_string(k), v.clone()))
            .collect(),
        Some(Value::Null) | None => ParamMap::new(),
        Some(other) => {
            tracing::warn!(
                path = %path.display(),
                found = super::types::yaml_kind(other),
                "default_params is not a mapping, ignoring"
            );
            ParamMap::new()
        }
    }
}
