//! The resolved object tree.
//!
//! An entry procedure returns an [`Object`]. Plain YAML mappings are turned
//! into [`Object::Map`] on conversion, so a nested mapping can always be
//! wrapped by a [`View`](crate::core::view::View) instead of leaking out raw.

use super::node::{Leaf, Node};
use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Named children of a node or nested mapping.
pub type Objects = IndexMap<String, Object>;

/// A value in a resolved tree.
#[derive(Debug, Clone)]
pub enum Object {
    /// Plain data: scalars and sequences.
    Value(serde_yaml_ng::Value),
    /// Nested mapping, shared with any views over it.
    Map(Rc<Objects>),
    /// Child node, resolved lazily with its own params.
    Node(Node),
    /// Single-valued child, unwrapped to its body on lookup.
    Leaf(Leaf),
}

impl Object {
    /// Empty mapping.
    pub fn empty() -> Self {
        Self::Map(Rc::new(Objects::new()))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "a value",
            Self::Map(_) => "a mapping",
            Self::Node(_) => "a node",
            Self::Leaf(_) => "a leaf",
        }
    }

    pub fn as_value(&self) -> Option<&serde_yaml_ng::Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Rc<Objects>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<serde_yaml_ng::Value> for Object {
    fn from(value: serde_yaml_ng::Value) -> Self {
        match value {
            serde_yaml_ng::Value::Mapping(mapping) => Self::Map(Rc::new(
                mapping
                    .into_iter()
                    .map(|(k, v)| (yaml_value_to_string(&k), Object::from(v)))
                    .collect(),
            )),
            other => Self::Value(other),
        }
    }
}

impl From<Objects> for Object {
    fn from(objects: Objects) -> Self {
        Self::Map(Rc::new(objects))
    }
}

impl From<Node> for Object {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Leaf> for Object {
    fn from(leaf: Leaf) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::Value(serde_yaml_ng::Value::String(s.to_string()))
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Self::Value(serde_yaml_ng::Value::String(s))
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Self::Value(serde_yaml_ng::Value::Bool(b))
    }
}

impl From<i64> for Object {
    fn from(n: i64) -> Self {
        Self::Value(serde_yaml_ng::Value::Number(n.into()))
    }
}

impl From<f64> for Object {
    fn from(n: f64) -> Self {
        Self::Value(serde_yaml_ng::Value::Number(n.into()))
    }
}

impl<K: Into<String>, V: Into<Object>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(Rc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

/// Compact JSON for plain data, falling back to the debug form.
pub(crate) fn value_repr(value: &serde_yaml_ng::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", value_repr(v)),
            Self::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
            Self::Node(n) => write!(f, "{}", n),
            Self::Leaf(l) => write!(f, "{}", l),
        }
    }
}
