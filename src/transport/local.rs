//! Script entry procedures, run locally via `bash`.
//!
//! `bash <file> <entry>` runs in the node's work directory with a JSON
//! payload on stdin:
//!
//! ```json
//! {"entry": "...", "params": {...}, "tail": [...], "storage": {...},
//!  "work_dir": "...", "configs": {...}}
//! ```
//!
//! Stdout is read as YAML. Inside it, a mapping carrying `@target` (a
//! path relative to the recipe directory) or `@procedure` (another entry
//! point of the same file) becomes a child node, with optional `@params`
//! and `@leaf: true`. A top-level `@storage` mapping is merged into the
//! node's storage. Exit status 127 (bash: command not found) means the
//! entry point is not defined.

use super::ExecOutput;
use crate::core::error::{Error, Result};
use crate::core::object::{Object, Objects};
use crate::core::procedure::{Context, Procedure, Storage};
use crate::core::types::{yaml_value_to_string, Config, ParamMap, Target};
use anyhow::Context as _;
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const TARGET_KEY: &str = "@target";
const PROCEDURE_KEY: &str = "@procedure";
const PARAMS_KEY: &str = "@params";
const LEAF_KEY: &str = "@leaf";
const STORAGE_KEY: &str = "@storage";

/// bash exit status for an undefined command.
const ENTRY_NOT_FOUND: i32 = 127;

/// Run `bash <path> <args...>` in `work_dir`, feeding `input` on stdin.
pub fn exec_file(path: &Path, args: &[&str], work_dir: &Path, input: &str) -> Result<ExecOutput> {
    let mut child = Command::new("bash")
        .arg(path)
        .args(args)
        .current_dir(work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::io("cannot run", path, e))?;

    // Feed stdin while stdout and stderr drain; a script may fill its
    // output pipe before it reads any input.
    let stdin = child.stdin.take();
    let (written, output) = std::thread::scope(|s| {
        let writer = s.spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(input.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        (writer.join(), output)
    });

    match written {
        Ok(Ok(())) => {}
        // A script that never reads stdin closes the pipe early.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => return Err(Error::io("cannot write stdin of", path, e)),
        Err(panic) => std::panic::resume_unwind(panic),
    }
    let output = output.map_err(|e| Error::io("cannot wait for", path, e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[derive(Serialize)]
struct Payload<'a> {
    entry: &'a str,
    params: &'a ParamMap,
    tail: &'a [String],
    storage: &'a Storage,
    work_dir: &'a Path,
    configs: &'a Config,
}

/// Entry-procedure file executed as a bash script.
#[derive(Debug, Clone)]
pub struct ScriptProcedure {
    path: PathBuf,
}

impl ScriptProcedure {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Procedure for ScriptProcedure {
    fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<Object> {
        let payload = serde_json::to_string(&Payload {
            entry: ctx.entry,
            params: ctx.params,
            tail: ctx.tail,
            storage: &*ctx.storage,
            work_dir: ctx.work_dir,
            configs: ctx.configs,
        })?;
        tracing::debug!(script = %self.path.display(), entry = ctx.entry, "running script");
        let out = exec_file(&self.path, &[ctx.entry], ctx.work_dir, &payload)?;

        if out.exit_code == ENTRY_NOT_FOUND {
            return Err(Error::MissingEntryPoint {
                entry: ctx.entry.to_string(),
                loader: self.path.clone(),
            }
            .into());
        }
        if !out.success() {
            return Err(Error::Script {
                path: self.path.clone(),
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            }
            .into());
        }

        let value: Value = if out.stdout.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml_ng::from_str(&out.stdout)
                .with_context(|| format!("unreadable output from {}", self.path.display()))?
        };
        let value = match value {
            Value::Mapping(mapping) => Value::Mapping(split_storage(mapping, ctx.storage)),
            other => other,
        };
        Ok(decode(value, ctx))
    }
}

/// Move a top-level `@storage` mapping into `storage`.
fn split_storage(mapping: Mapping, storage: &mut Storage) -> Mapping {
    let mut kept = Mapping::with_capacity(mapping.len());
    for (k, v) in mapping {
        match v {
            Value::Mapping(stored) if k.as_str() == Some(STORAGE_KEY) => {
                for (sk, sv) in stored {
                    storage.insert(yaml_value_to_string(&sk), sv);
                }
            }
            v => {
                kept.insert(k, v);
            }
        }
    }
    kept
}

/// Turn script output into objects, building child nodes for references.
fn decode(value: Value, ctx: &Context<'_>) -> Object {
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        other => return Object::Value(other),
    };
    if let Some(target) = mapping.get(TARGET_KEY).and_then(Value::as_str) {
        return child(Target::Path(target.to_string()), &mapping, ctx);
    }
    if let Some(name) = mapping.get(PROCEDURE_KEY).and_then(Value::as_str) {
        return child(Target::Procedure(name.to_string()), &mapping, ctx);
    }
    let objects: Objects = mapping
        .into_iter()
        .map(|(k, v)| (yaml_value_to_string(&k), decode(v, ctx)))
        .collect();
    Object::from(objects)
}

fn child(target: Target, reference: &Mapping, ctx: &Context<'_>) -> Object {
    let params: ParamMap = match reference.get(PARAMS_KEY) {
        Some(Value::Mapping(p)) => p
            .iter()
            .map(|(k, v)| (yaml_value_to_string(k), v.clone()))
            .collect(),
        _ => ParamMap::new(),
    };
    let leaf = reference
        .get(LEAF_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if leaf {
        Object::Leaf(ctx.scope().leaf(target, params))
    } else {
        Object::Node(ctx.scope().node(target, params))
    }
}
