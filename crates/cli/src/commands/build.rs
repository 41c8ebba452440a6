use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::debug;

use sigdb_core::build::{build_tree, BuildOptions};
use sigdb_core::config::load_config;
use sigdb_core::convert::{converter_registry, default_converter_registry};

use crate::canonicalize_or_current;

#[derive(Debug, Serialize)]
pub struct ConverterInfo {
    pub name: String,
    pub extension: String,
    pub description: String,
}

/// List converters compiled into this binary.
pub fn list_converters_command(json: bool) -> Result<()> {
    let registry = default_converter_registry();
    let entries: Vec<ConverterInfo> = registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(&name))
        .map(|c| ConverterInfo {
            name: c.name().to_string(),
            extension: c.extension().to_string(),
            description: c.description().to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Converters:");
    for entry in entries {
        println!("- {} (.{}): {}", entry.name, entry.extension, entry.description);
    }
    Ok(())
}

/// Arguments of `build`, grouped to keep the command signature readable.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub root: String,
    pub out: String,
    pub converter: Option<String>,
    pub rz_sign: Option<String>,
    pub format: Option<String>,
    pub arch: Option<String>,
    pub bits: Option<u32>,
    pub keep_going: bool,
    pub no_postlude: bool,
    pub overwrite: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// Build the distributable signature tree.
pub fn build_command(args: &BuildArgs) -> Result<()> {
    let root_path = canonicalize_or_current(&args.root)?;
    let out_path = canonicalize_or_current(&args.out)?;
    let config = load_config(&root_path)?;

    let registry = converter_registry(&config);
    let converter_name = args.converter.clone().unwrap_or_else(|| config.default_converter.clone());
    let converter = registry.get(&converter_name).ok_or_else(|| {
        anyhow!(
            "Unknown converter '{}'. Available: {}",
            converter_name,
            registry.names().join(", ")
        )
    })?;

    debug!(converter = converter.name(), root = %root_path.display(), "selected converter");

    let options = BuildOptions {
        format: args.format.clone(),
        arch: args.arch.clone(),
        bits: args.bits,
        keep_going: args.keep_going,
        tool_path: args.rz_sign.as_ref().map(PathBuf::from),
        no_postlude: args.no_postlude,
        overwrite: args.overwrite,
        dry_run: args.dry_run,
    };
    let index = build_tree(&root_path, &out_path, converter, &config, &options)
        .with_context(|| format!("Failed to build signatures from {}", root_path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
    } else {
        let verb = if index.dry_run { "Would build" } else { "Built" };
        println!("{verb} {} signature(s) into {}", index.entries.len(), out_path.display());
        println!("  Converter: {}", index.converter);
        if let Some(version) = &index.converter_version {
            println!("  Converter version: {version}");
        }
        for entry in &index.entries {
            match &entry.sha1 {
                Some(sha1) => {
                    println!("  - {} ({} records) sha1={sha1}", entry.signature, entry.records)
                }
                None => println!("  - {} ({} records)", entry.signature, entry.records),
            }
        }
        for failure in &index.failures {
            println!("  ! {}: {}", failure.key, failure.error);
        }
    }

    if index.failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} library(ies) failed to build", index.failures.len()))
    }
}
