use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use sigdb_core::config::load_config;
use sigdb_core::description::Description;
use sigdb_core::layout::{library_layouts, LibraryLayout, SigKey, MANIFEST_EXT};
use sigdb_core::manifest::{HashManifest, ManifestMismatch};
use sigdb_core::pat::{PatFile, PatStats};
use sigdb_core::validate::is_valid_library_name;

use crate::{canonicalize_or_current, library_name_from_dir};

/// One row of `list`.
#[derive(Debug, Serialize)]
pub struct LibraryInfo {
    pub key: SigKey,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LibraryInfo {
    fn from_layout(layout: &LibraryLayout) -> Self {
        // Listing is best-effort; `validate` reports broken files.
        let records = PatFile::load(&layout.pat_path).ok().map(|f| PatStats::from_file(&f).records);
        let description = Description::load(&layout.description_path).ok().map(|d| d.summary());
        Self {
            key: layout.key.clone(),
            path: layout.dir.display().to_string(),
            records,
            description,
        }
    }
}

/// List libraries in the tree, optionally filtered by format/arch/bits.
pub fn list_libraries_command(
    root: &str,
    format: Option<String>,
    arch: Option<String>,
    bits: Option<u32>,
    json: bool,
) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let libraries: Vec<LibraryInfo> = library_layouts(&root_path)
        .with_context(|| format!("Failed to scan {}", root_path.display()))?
        .iter()
        .filter(|l| format.as_deref().map_or(true, |f| f == l.key.format))
        .filter(|l| arch.as_deref().map_or(true, |a| a == l.key.arch))
        .filter(|l| bits.map_or(true, |b| b == l.key.bits))
        .map(LibraryInfo::from_layout)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&libraries)?);
        return Ok(());
    }

    println!("Libraries ({}):", libraries.len());
    if libraries.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for lib in libraries {
        let records = lib.records.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
        match lib.description {
            Some(desc) => println!("  - {} [{} records] - {}", lib.key, records, desc),
            None => println!("  - {} [{} records]", lib.key, records),
        }
    }
    Ok(())
}

/// Scaffold a new library directory with an empty pattern file and a description.
pub fn init_library_command(
    root: &str,
    format: &str,
    arch: &str,
    bits: u32,
    name: &str,
    description: Option<String>,
) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let config = load_config(&root_path)?;

    if !config.allows_format(format) {
        return Err(anyhow!(
            "Unknown format '{}'. Allowed: {}",
            format,
            config.formats.join(", ")
        ));
    }
    if !config.allows_arch(arch) {
        return Err(anyhow!(
            "Unknown architecture '{}'. Allowed: {}",
            arch,
            config.architectures.join(", ")
        ));
    }
    if !config.allows_bits(bits) {
        return Err(anyhow!("Unsupported bit-width {}", bits));
    }
    if !is_valid_library_name(name) {
        return Err(anyhow!(
            "Invalid library name '{}': use ASCII letters, digits and ._+-",
            name
        ));
    }

    let text = description.unwrap_or_else(|| format!("{name} ({format} {arch} {bits}-bit)"));
    let desc = Description::parse(&text);
    desc.validate(config.max_description_len).context("Invalid description")?;

    let layout = LibraryLayout::new(&root_path, SigKey::new(format, arch, bits, name));
    if layout.pat_path.exists() {
        return Err(anyhow!("Library already exists at {}", layout.dir.display()));
    }
    fs::create_dir_all(&layout.dir)
        .with_context(|| format!("Failed to create library dir {}", layout.dir.display()))?;

    PatFile::new(Vec::new())
        .write(&layout.pat_path)
        .with_context(|| format!("Failed to write {}", layout.pat_path.display()))?;
    fs::write(&layout.description_path, format!("{}\n", desc.as_str())).with_context(|| {
        format!("Failed to write description {}", layout.description_path.display())
    })?;

    println!("Initialized library:");
    println!("  Key: {}", layout.key);
    println!("  Dir: {}", layout.dir.display());
    println!("  Patterns: {}", layout.pat_path.display());
    println!("  Description: {}", layout.description_path.display());
    println!("Record source artifacts with `sigdb hash --library {}`", layout.dir.display());

    Ok(())
}

/// Write `<library>.src.sha1` for the given source artifacts.
pub fn hash_command(library: &str, artifacts: &[String]) -> Result<()> {
    if artifacts.is_empty() {
        return Err(anyhow!("hash needs at least one source artifact"));
    }
    let dir = canonicalize_or_current(library)?;
    if !dir.is_dir() {
        return Err(anyhow!("Library directory does not exist: {}", dir.display()));
    }
    let name = library_name_from_dir(&dir)?;

    let paths: Vec<PathBuf> = artifacts.iter().map(PathBuf::from).collect();
    for path in &paths {
        if !path.is_file() {
            return Err(anyhow!("Source artifact does not exist: {}", path.display()));
        }
    }
    let manifest = HashManifest::from_files(&paths).context("Failed to hash source artifacts")?;
    let manifest_path = dir.join(format!("{name}.{MANIFEST_EXT}"));
    manifest
        .write(&manifest_path)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    println!("Wrote {}", manifest_path.display());
    for entry in &manifest.entries {
        println!("  {}  {}", entry.sha1, entry.name);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct VerifySummary {
    pub manifest: String,
    pub checked: usize,
    pub mismatches: Vec<ManifestMismatch>,
}

/// Verify a library's manifest against the artifacts in `sources`.
pub fn verify_sources_command(library: &str, sources: &str, json: bool) -> Result<()> {
    let dir = canonicalize_or_current(library)?;
    let name = library_name_from_dir(&dir)?;
    let manifest_path = dir.join(format!("{name}.{MANIFEST_EXT}"));
    let manifest = HashManifest::load(&manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;

    let mismatches = manifest
        .verify(Path::new(sources))
        .with_context(|| format!("Failed to hash artifacts in {sources}"))?;
    let summary = VerifySummary {
        manifest: manifest_path.display().to_string(),
        checked: manifest.entries.len(),
        mismatches,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Checked {} artifact(s) from {}", summary.checked, summary.manifest);
        for mismatch in &summary.mismatches {
            match mismatch {
                ManifestMismatch::Missing { name } => println!("  missing: {name}"),
                ManifestMismatch::Digest { name, expected, actual } => {
                    println!("  changed: {name} (expected {expected}, found {actual})")
                }
            }
        }
    }

    if summary.mismatches.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} artifact(s) do not match the manifest", summary.mismatches.len()))
    }
}
