//! Lazy, self-unwrapping access to resolved contents.
//!
//! Looking a key up never yields a raw nested mapping: leaves are forced
//! and replaced by their body, child nodes are returned as handles, and
//! mappings come back wrapped in a fresh [`View`].

use super::error::{Error, Result};
use super::node::Node;
use super::object::{value_repr, Object, Objects};
use super::types::yaml_kind;
use serde_yaml_ng::Value;
use std::fmt;
use std::rc::Rc;

/// Read-only view over a resolved mapping.
#[derive(Debug, Clone)]
pub struct View {
    map: Rc<Objects>,
}

impl View {
    pub(crate) fn new(map: Rc<Objects>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Result<Entry> {
        let object = self.map.get(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })?;
        Entry::from_object(object.clone())
    }

    pub fn get_path(&self, keys: &[&str]) -> Result<Entry> {
        walk(Entry::View(self.clone()), keys)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// The underlying objects, not unwrapped.
    pub fn raw(&self) -> &Objects {
        &self.map
    }

    /// Every entry, unwrapped, in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, Entry)>> {
        self.map
            .iter()
            .map(|(k, v)| Ok((k.clone(), Entry::from_object(v.clone())?)))
            .collect()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Object::Map(Rc::clone(&self.map)))
    }
}

/// Result of a lookup.
#[derive(Debug, Clone)]
pub enum Entry {
    Value(Value),
    View(View),
    Node(Node),
}

impl Entry {
    /// Unwrap an object: leaves are forced, mappings get a view.
    pub(crate) fn from_object(object: Object) -> Result<Self> {
        match object {
            Object::Value(value @ Value::Mapping(_)) => Self::from_object(Object::from(value)),
            Object::Value(value) => Ok(Self::Value(value)),
            Object::Map(map) => Ok(Self::View(View::new(map))),
            Object::Node(node) => Ok(Self::Node(node)),
            Object::Leaf(leaf) => Self::from_object(leaf.get_body()?),
        }
    }

    /// One step down. Sequences take numeric keys.
    pub fn get(&self, key: &str) -> Result<Entry> {
        match self {
            Self::Node(node) => node.get(key),
            Self::View(view) => view.get(key),
            Self::Value(Value::Sequence(items)) => {
                let item = key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| Error::KeyNotFound {
                        key: key.to_string(),
                    })?;
                Self::from_object(Object::from(item.clone()))
            }
            Self::Value(other) => Err(Error::NotIndexable {
                key: key.to_string(),
                kind: yaml_kind(other),
            }),
        }
    }

    pub fn get_path(&self, keys: &[&str]) -> Result<Entry> {
        walk(self.clone(), keys)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            Self::View(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", value_repr(v)),
            Self::View(v) => write!(f, "{}", v),
            Self::Node(n) => write!(f, "{}", n),
        }
    }
}

/// Index `keys` one at a time. Before indexing into a node, the keys not yet
/// consumed (the current one included) become that node's tail.
pub(crate) fn walk(start: Entry, keys: &[&str]) -> Result<Entry> {
    let mut current = start;
    for (i, key) in keys.iter().enumerate() {
        if let Entry::Node(node) = &current {
            node.set_tail(keys[i..].iter().map(|k| k.to_string()).collect());
        }
        current = current.get(key)?;
    }
    Ok(current)
}
