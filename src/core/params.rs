//! Parameter tracking: caller overrides over lazily loaded recipe defaults.
//!
//! Params are two-phase. Overrides are supplied by the caller at any time;
//! defaults arrive once, on first real use, from the recipe's
//! `default_params`. Effective values are the defaults overlaid by the
//! overrides, so an override always wins regardless of when it was set.
//!
//! The *signature* is the changed view rendered deterministically: entries
//! whose effective value differs from the recipe default, minus keys that
//! start with [`PRIVATE_PREFIX`]. A node re-resolves exactly when its
//! signature changes.

use super::types::{ParamMap, PRIVATE_PREFIX};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Params of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    overrides: ParamMap,
    defaults: Option<ParamMap>,
}

impl Params {
    pub fn new(overrides: ParamMap) -> Self {
        Self {
            overrides,
            defaults: None,
        }
    }

    /// Defaults have been captured.
    pub fn is_initialized(&self) -> bool {
        self.defaults.is_some()
    }

    /// Capture recipe defaults. Only the first call has an effect.
    pub fn initialize(&mut self, defaults: ParamMap) {
        if self.defaults.is_none() {
            self.defaults = Some(defaults);
        }
    }

    /// Drop captured defaults; the next use captures them again.
    pub fn reset(&mut self) {
        self.defaults = None;
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.overrides.insert(key.into(), value);
    }

    /// Remove an override, falling back to the recipe default.
    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.overrides.shift_remove(key)
    }

    pub fn overrides(&self) -> &ParamMap {
        &self.overrides
    }

    pub fn defaults(&self) -> Option<&ParamMap> {
        self.defaults.as_ref()
    }

    /// Effective value of one param.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.overrides
            .get(key)
            .or_else(|| self.defaults.as_ref().and_then(|d| d.get(key)))
    }

    /// Effective values: defaults in recipe order, overridden in place, then
    /// override-only keys in insertion order.
    pub fn values(&self) -> ParamMap {
        let mut values = self.defaults.clone().unwrap_or_default();
        for (k, v) in &self.overrides {
            values.insert(k.clone(), v.clone());
        }
        values
    }

    /// Entries that differ from the recipe defaults, private keys excluded.
    pub fn changed(&self) -> BTreeMap<String, Value> {
        let defaults = self.defaults.as_ref();
        self.overrides
            .iter()
            .filter(|(k, _)| !k.starts_with(PRIVATE_PREFIX))
            .filter(|(k, v)| defaults.and_then(|d| d.get(k.as_str())) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Deterministic rendering of [`changed`](Self::changed); empty when nothing changed.
    pub fn signature(&self) -> String {
        let changed = self.changed();
        if changed.is_empty() {
            return String::new();
        }
        serde_json::to_string(&changed).unwrap_or_else(|_| format!("{:?}", changed))
    }

    /// Pretty JSON of the effective values.
    pub fn to_pretty_json(&self) -> String {
        let values = self.values();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| format!("{:?}", values))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// Parse a `key=value` assignment; the value is read as a YAML scalar.
pub fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_yaml_ng::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
