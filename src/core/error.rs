//! Error types for target resolution.
//!
//! Every fallible operation in the crate returns [`Result`]. Config layers
//! that fail to read or parse are not errors: they are logged and skipped
//! (see [`crate::core::parser`]).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while locating, configuring, or resolving a target.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither `<root>/<target>/__flexsrc__.yaml` nor `<root>/<target>.flexsrc.yaml` exists.
    #[error("invalid target '{target}' under {}", .root.display())]
    InvalidTarget { target: String, root: PathBuf },

    /// A bound procedure was requested outside of any enclosing resolution.
    #[error("procedure '{name}' is not bound to an enclosing target")]
    UnboundProcedure { name: String },

    /// A node was accessed again from inside its own entry procedure.
    #[error("'{target}' was accessed while it is being resolved")]
    Cycle { target: String },

    /// Filesystem failure (cache directories, work directories, scripts).
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged config could not be typed.
    #[error("invalid config for '{target}': {message}")]
    Config { target: String, message: String },

    /// The entry procedure raised an error.
    #[error("entry procedure '{entry}' of '{target}' failed: {source:#}")]
    Procedure {
        target: String,
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    /// The entry-procedure file does not define the requested entry point.
    #[error("no entry procedure '{entry}' in {}", .loader.display())]
    MissingEntryPoint { entry: String, loader: PathBuf },

    /// No in-process loader is registered and no script exists at the loader path.
    #[error("entry-procedure file {} is neither registered nor present", .loader.display())]
    MissingLoader { loader: PathBuf },

    /// A node's entry procedure must return a mapping.
    #[error("entry procedure of '{target}' returned {found} instead of a mapping")]
    NotAMapping { target: String, found: &'static str },

    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    #[error("cannot index {kind} with key '{key}'")]
    NotIndexable { key: String, kind: &'static str },

    /// A script entry procedure exited unsuccessfully.
    #[error("script {} exited with {code}: {stderr}", .path.display())]
    Script {
        path: PathBuf,
        code: i32,
        stderr: String,
    },

    /// The repository cache could not provide a file.
    #[error("cannot fetch {} from repository cache: {message}", .path.display())]
    Fetch { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wrap a procedure failure, passing crate errors raised inside it through untouched.
    pub(crate) fn from_procedure(source: anyhow::Error, target: &str, entry: &str) -> Self {
        match source.downcast::<Error>() {
            Ok(inner) => inner,
            Err(source) => Self::Procedure {
                target: target.to_string(),
                entry: entry.to_string(),
                source,
            },
        }
    }
}
