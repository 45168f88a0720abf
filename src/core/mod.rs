//! Core resolution logic: config, location, params, nodes, views.

pub mod config;
pub mod error;
pub mod locator;
pub mod node;
pub mod object;
pub mod params;
pub mod parser;
pub mod procedure;
pub mod scope;
pub mod types;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;
