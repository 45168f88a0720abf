//! FlexSrc: parameterized, memoized resolution of recipe targets.
//!
//! A target names a recipe (`<target>/__flexsrc__.yaml` or
//! `<target>.flexsrc.yaml`). Resolving it with a set of params runs the
//! recipe's entry procedure once per distinct params signature, inside a
//! derived work directory, and exposes the result as a lazy object tree.
//!
//! ```no_run
//! use flexsrc::{Loader, Object, ParamMap, Registry, Scope};
//!
//! let registry = Registry::new().with(
//!     "builtin",
//!     Loader::new().entry("objects", |ctx| {
//!         let mode = ctx.param_str("mode").unwrap_or("fast").to_string();
//!         Ok([("mode", Object::from(mode))].into_iter().collect())
//!     }),
//! );
//! let scope = Scope::builder(registry).build();
//! let node = scope.node("dataset", ParamMap::new());
//! println!("{}", node.render()?);
//! # Ok::<(), flexsrc::Error>(())
//! ```

pub mod cache;
pub mod cli;
pub mod core;
pub mod transport;

pub use crate::core::error::{Error, Result};
pub use crate::core::node::{Leaf, Node};
pub use crate::core::object::{Object, Objects};
pub use crate::core::params::Params;
pub use crate::core::procedure::{Context, Loader, Procedure, Registry, Storage};
pub use crate::core::scope::{Scope, ScopeBuilder};
pub use crate::core::types::{Config, ParamMap, Target};
pub use crate::core::view::{Entry, View};
