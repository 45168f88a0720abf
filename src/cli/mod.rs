//! CLI subcommands: show, info, clean, defaults.

use crate::cache::repo::MirrorCache;
use crate::core::config::Environment;
use crate::core::params::parse_assignment;
use crate::core::parser;
use crate::core::procedure::Registry;
use crate::core::scope::Scope;
use crate::core::types::ParamMap;
use crate::core::view::Entry;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a target and print its contents
    Show {
        /// Target, relative to the root directory
        target: String,

        /// Param override (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        params: Vec<(String, serde_yaml_ng::Value)>,

        /// Key path into the contents (repeatable)
        #[arg(short, long = "key", value_name = "KEY")]
        keys: Vec<String>,

        /// Root directory (default: current)
        #[arg(short = 'C', long)]
        root: Option<PathBuf>,
    },

    /// Print a target's informational string
    Info {
        target: String,

        #[arg(short = 'C', long)]
        root: Option<PathBuf>,
    },

    /// Purge the repository and data caches a target uses
    Clean {
        target: String,

        #[arg(short = 'C', long)]
        root: Option<PathBuf>,
    },

    /// Print the default params declared by a recipe file
    Defaults {
        /// Path to a recipe file
        file: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    let env = Environment::from_process();
    match cmd {
        Commands::Show {
            target,
            params,
            keys,
            root,
        } => {
            let scope = scope(env, root);
            println!("{}", cmd_show(&scope, &target, params, &keys)?);
            Ok(())
        }
        Commands::Info { target, root } => cmd_info(&scope(env, root), &target),
        Commands::Clean { target, root } => cmd_clean(&scope(env, root), &target),
        Commands::Defaults { file } => cmd_defaults(&file),
    }
}

fn scope(env: Environment, root: Option<PathBuf>) -> Scope {
    let builder = Scope::builder(Registry::new())
        .environment(env)
        .repo_cache(MirrorCache);
    let builder = match root {
        Some(root) => builder.root_dir(root),
        None => builder,
    };
    builder.build()
}

fn cmd_show(
    scope: &Scope,
    target: &str,
    params: Vec<(String, serde_yaml_ng::Value)>,
    keys: &[String],
) -> Result<String, String> {
    let overrides: ParamMap = params.into_iter().collect();
    let node = scope.node(target, overrides);
    if keys.is_empty() {
        return node.render().map_err(|e| e.to_string());
    }
    let path: Vec<&str> = keys.iter().map(String::as_str).collect();
    match node.get_path(&path).map_err(|e| e.to_string())? {
        Entry::Node(child) => child.render().map_err(|e| e.to_string()),
        other => Ok(other.to_string()),
    }
}

fn cmd_info(scope: &Scope, target: &str) -> Result<(), String> {
    let node = scope.node(target, ParamMap::new());
    match node.info().map_err(|e| e.to_string())? {
        Some(info) => println!("{}", info),
        None => println!("{}: no info", node.target_name()),
    }
    Ok(())
}

fn cmd_clean(scope: &Scope, target: &str) -> Result<(), String> {
    let node = scope.node(target, ParamMap::new());
    node.clear_cache().map_err(|e| e.to_string())?;
    let config = node.config().map_err(|e| e.to_string())?;
    println!("Purged caches for {}", node.target_name());
    if let Some(repo) = &config.repo_cache_dir {
        println!("  repo: {}", repo.display());
    }
    if let Some(data) = &config.data_cache_dir {
        println!("  data: {}", data.display());
    }
    Ok(())
}

fn cmd_defaults(file: &Path) -> Result<(), String> {
    if !file.is_file() {
        return Err(format!("{}: no such recipe file", file.display()));
    }
    let defaults = parser::load_default_params(file);
    let json = serde_json::to_string_pretty(&defaults).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
