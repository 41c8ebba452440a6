//! Building the distributable signature tree.
//!
//! Output layout is `<out>/<format>/<arch>/<bits>/<library>.<ext>` plus a
//! `<library>.description` next to each signature and an `index.json`
//! describing the whole build.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SigdbConfig;
use crate::convert::{ConvertError, ConvertRequest, SigConverter};
use crate::description::{Description, DescriptionError};
use crate::layout::{library_layouts, LayoutError, LibraryLayout, SigKey, DESCRIPTION_EXT};
use crate::manifest::{sha1_file, ManifestError};
use crate::merge::dedup;
use crate::pat::{PatError, PatFile};

/// Name of the build index written at the output root.
pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("{key}: {source}")]
    Pat {
        key: String,
        #[source]
        source: PatError,
    },

    #[error("{key}: {source}")]
    Description {
        key: String,
        #[source]
        source: DescriptionError,
    },

    #[error("{key}: {source}")]
    Convert {
        key: String,
        #[source]
        source: ConvertError,
    },

    #[error(transparent)]
    Hash(#[from] ManifestError),

    #[error("Output directory {0} is not empty; pass overwrite to build into it")]
    OutputNotEmpty(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize build index: {0}")]
    Index(#[from] serde_json::Error),
}

/// Selection and behavior of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub format: Option<String>,
    pub arch: Option<String>,
    pub bits: Option<u32>,
    /// Record failing libraries in the index instead of aborting.
    pub keep_going: bool,
    /// Explicit converter tool path; overrides the config.
    pub tool_path: Option<PathBuf>,
    /// Leave tail bytes out of the built signatures.
    pub no_postlude: bool,
    /// Allow building into a non-empty output directory.
    pub overwrite: bool,
    /// Check and count everything but write nothing to the output directory.
    pub dry_run: bool,
}

impl BuildOptions {
    fn selects(&self, key: &SigKey) -> bool {
        self.format.as_deref().map_or(true, |f| f == key.format)
            && self.arch.as_deref().map_or(true, |a| a == key.arch)
            && self.bits.map_or(true, |b| b == key.bits)
    }
}

/// One built library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub key: SigKey,
    /// Signature path relative to the output root.
    pub signature: String,
    /// Digest of the signature file; absent for dry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub records: usize,
    pub duplicates_removed: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub key: String,
    pub error: String,
}

/// Contents of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIndex {
    pub generated_at: String,
    pub converter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_version: Option<String>,
    pub entries: Vec<BuildEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BuildFailure>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl BuildIndex {
    pub fn load(out_dir: &Path) -> Result<Self, BuildError> {
        let path = out_dir.join(INDEX_FILE_NAME);
        let body = fs::read_to_string(&path).map_err(|source| BuildError::Io { path, source })?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Build every selected library under `root` into `out_dir`.
///
/// A dry run loads and checks every library but leaves `out_dir` untouched
/// and returns the index it would have written.
pub fn build_tree(
    root: &Path,
    out_dir: &Path,
    converter: &dyn SigConverter,
    config: &SigdbConfig,
    options: &BuildOptions,
) -> Result<BuildIndex, BuildError> {
    let layouts: Vec<LibraryLayout> =
        library_layouts(root)?.into_iter().filter(|l| options.selects(&l.key)).collect();
    info!(
        root = %root.display(),
        out = %out_dir.display(),
        converter = converter.name(),
        libraries = layouts.len(),
        dry_run = options.dry_run,
        "starting build"
    );

    if !options.dry_run {
        if !options.overwrite && has_entries(out_dir)? {
            return Err(BuildError::OutputNotEmpty(out_dir.to_path_buf()));
        }
        fs::create_dir_all(out_dir)
            .map_err(|source| BuildError::Io { path: out_dir.to_path_buf(), source })?;
    }
    let staging = tempfile::tempdir()
        .map_err(|source| BuildError::Io { path: std::env::temp_dir(), source })?;

    let tool_path = options.tool_path.clone().or_else(|| config.rz_sign_path());
    let mut entries = Vec::new();
    let mut failures = Vec::new();

    for layout in &layouts {
        let built = build_library(
            layout,
            out_dir,
            staging.path(),
            converter,
            config,
            options,
            tool_path.as_deref(),
        );
        match built {
            Ok(entry) => entries.push(entry),
            Err(err) if options.keep_going => {
                warn!(library = %layout.key, error = %err, "library failed to build");
                failures.push(BuildFailure { key: layout.key.to_string(), error: err.to_string() });
            }
            Err(err) => return Err(err),
        }
    }

    let converter_version =
        if options.dry_run { None } else { converter.version(tool_path.as_deref()) };
    let index = BuildIndex {
        generated_at: Utc::now().to_rfc3339(),
        converter: converter.name().to_string(),
        converter_version,
        entries,
        failures,
        dry_run: options.dry_run,
    };
    let index_path = out_dir.join(INDEX_FILE_NAME);
    if !options.dry_run {
        fs::write(&index_path, serde_json::to_string_pretty(&index)?)
            .map_err(|source| BuildError::Io { path: index_path.clone(), source })?;
    }

    info!(
        built = index.entries.len(),
        failed = index.failures.len(),
        index = %index_path.display(),
        "build finished"
    );
    Ok(index)
}

fn has_entries(dir: &Path) -> Result<bool, BuildError> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(BuildError::Io { path: dir.to_path_buf(), source }),
    }
}

fn build_library(
    layout: &LibraryLayout,
    out_dir: &Path,
    staging: &Path,
    converter: &dyn SigConverter,
    config: &SigdbConfig,
    options: &BuildOptions,
    tool_path: Option<&Path>,
) -> Result<BuildEntry, BuildError> {
    let key = layout.key.to_string();

    let description = Description::load(&layout.description_path)
        .and_then(|d| d.validate(config.max_description_len).map(|()| d))
        .map_err(|source| BuildError::Description { key: key.clone(), source })?;

    let source = PatFile::load(&layout.pat_path)
        .map_err(|source| BuildError::Pat { key: key.clone(), source })?;
    let outcome = dedup(&source);
    let staged = staging.join(format!("{}.pat", layout.key.library));
    outcome.file.write(&staged).map_err(|source| BuildError::Pat { key: key.clone(), source })?;

    let rel_dir = PathBuf::from(&layout.key.format)
        .join(&layout.key.arch)
        .join(layout.key.bits.to_string());
    let file_name = format!("{}.{}", layout.key.library, converter.extension());
    let signature = rel_dir.join(&file_name).to_string_lossy().replace('\\', "/");

    if options.dry_run {
        info!(library = %layout.key, signature = %signature, "would build");
        return Ok(BuildEntry {
            key: layout.key.clone(),
            signature,
            sha1: None,
            records: outcome.file.len(),
            duplicates_removed: outcome.duplicates,
            description: description.summary(),
        });
    }

    let target_dir = out_dir.join(&rel_dir);
    fs::create_dir_all(&target_dir)
        .map_err(|source| BuildError::Io { path: target_dir.clone(), source })?;

    let request = ConvertRequest {
        key: layout.key.clone(),
        input: staged,
        output: target_dir.join(&file_name),
        description: Some(description.summary()),
        tool_path: tool_path.map(Path::to_path_buf),
        extra_args: config.rz_sign.extra_args.clone(),
        no_postlude: options.no_postlude,
    };
    let converted = converter
        .convert(&request)
        .map_err(|source| BuildError::Convert { key: key.clone(), source })?;

    let desc_path = target_dir.join(format!("{}.{DESCRIPTION_EXT}", layout.key.library));
    fs::write(&desc_path, format!("{}\n", description.as_str()))
        .map_err(|source| BuildError::Io { path: desc_path.clone(), source })?;

    let sha1 = sha1_file(&converted.path)?;

    Ok(BuildEntry {
        key: layout.key.clone(),
        signature,
        sha1: Some(sha1),
        records: converted.records,
        duplicates_removed: outcome.duplicates,
        description: description.summary(),
    })
}
