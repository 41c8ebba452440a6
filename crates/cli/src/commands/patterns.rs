use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use sigdb_core::layout::find_pat_files;
use sigdb_core::merge::{dedup_with, merge_with, Collision, MergeOptions, MergeOutcome};
use sigdb_core::pat::{DropReason, PatFile, PatStats, RecordFilter};

/// Record handling shared by `merge` and `dedup`.
#[derive(Debug, Clone, Default)]
pub struct RecordRules {
    /// Drop generated names, empty functions and fully variant patterns.
    pub curate: bool,
    /// Masked-byte percentage above which records are dropped; implies `curate`.
    pub max_masked: Option<u8>,
    /// Tail bytes kept per record; implies `curate`.
    pub max_postlude: Option<usize>,
    pub collapse_collisions: bool,
}

impl RecordRules {
    pub fn merge_options(&self) -> MergeOptions {
        let curate = self.curate || self.max_masked.is_some() || self.max_postlude.is_some();
        let filter = curate.then(|| {
            let defaults = RecordFilter::default();
            RecordFilter {
                max_masked: self.max_masked.unwrap_or(defaults.max_masked),
                max_postlude: self.max_postlude.unwrap_or(defaults.max_postlude),
            }
        });
        MergeOptions { filter, collapse_collisions: self.collapse_collisions }
    }
}

/// Summary printed by `merge` and `dedup`.
#[derive(Debug, Serialize)]
pub struct MergeSummary {
    pub output: String,
    pub input_records: usize,
    pub output_records: usize,
    pub dropped: BTreeMap<DropReason, usize>,
    pub duplicates: usize,
    pub collapsed: usize,
    pub collisions: Vec<Collision>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl MergeSummary {
    fn new(output: &Path, outcome: &MergeOutcome, dry_run: bool) -> Self {
        Self {
            output: output.display().to_string(),
            input_records: outcome.input_records,
            output_records: outcome.file.len(),
            dropped: outcome.dropped.clone(),
            duplicates: outcome.duplicates,
            collapsed: outcome.collapsed,
            collisions: outcome.collisions.clone(),
            dry_run,
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        if self.dry_run {
            println!("Would write {} (dry run)", self.output);
        } else {
            println!("Wrote {}", self.output);
        }
        println!("  Input records: {}", self.input_records);
        println!("  Output records: {}", self.output_records);
        for (reason, count) in &self.dropped {
            println!("  Dropped ({reason}): {count}");
        }
        println!("  Duplicates removed: {}", self.duplicates);
        if self.collapsed > 0 {
            println!("  Collisions collapsed: {}", self.collapsed);
        }
        if !self.collisions.is_empty() {
            println!("  Collisions ({}):", self.collisions.len());
            for collision in &self.collisions {
                println!("    - {}", collision.names.join(", "));
            }
        }
        Ok(())
    }
}

fn load_pat(path: &Path) -> Result<PatFile> {
    PatFile::load(path).with_context(|| format!("Failed to load pattern file {}", path.display()))
}

/// Arguments of `merge`.
#[derive(Debug, Clone, Default)]
pub struct MergeArgs {
    pub output: String,
    pub inputs: Vec<String>,
    /// Directories whose `.pat` files are merged too.
    pub directories: Vec<String>,
    pub recursive: bool,
    pub rules: RecordRules,
    /// Replace an existing output file.
    pub overwrite: bool,
    /// Report what would be written without writing it.
    pub dry_run: bool,
    pub json: bool,
}

fn collect_inputs(args: &MergeArgs, output: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for input in &args.inputs {
        let path = PathBuf::from(input);
        if !path.is_file() {
            return Err(anyhow!("Input pattern file does not exist: {}", path.display()));
        }
        inputs.push(path);
    }
    for dir in &args.directories {
        let found = find_pat_files(Path::new(dir), args.recursive)
            .with_context(|| format!("Failed to scan input directory {dir}"))?;
        inputs.extend(found);
    }

    // Merging into one of the inputs would read the old output back in.
    if let Ok(output) = output.canonicalize() {
        inputs.retain(|input| {
            let same = input.canonicalize().is_ok_and(|p| p == output);
            if same {
                info!(input = %input.display(), "skipping output file given as input");
            }
            !same
        });
    }
    if inputs.is_empty() {
        return Err(anyhow!("merge needs at least one input pattern file"));
    }
    Ok(inputs)
}

/// Merge several pattern files into `args.output`.
pub fn merge_command(args: &MergeArgs) -> Result<()> {
    let output_path = Path::new(&args.output);
    let inputs = collect_inputs(args, output_path)?;
    if output_path.exists() && !args.overwrite && !args.dry_run {
        return Err(anyhow!(
            "Output {} already exists; pass --overwrite to replace it",
            output_path.display()
        ));
    }

    let files = inputs.iter().map(|input| load_pat(input)).collect::<Result<Vec<_>>>()?;
    let outcome = merge_with(&files, &args.rules.merge_options());

    if !args.dry_run {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        outcome
            .file
            .write(output_path)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    }

    MergeSummary::new(output_path, &outcome, args.dry_run).print(args.json)
}

/// Deduplicate a pattern file in place. With `check`, only report whether
/// the file is already normalized and fail if it is not.
pub fn dedup_command(path: &str, check: bool, rules: &RecordRules, json: bool) -> Result<()> {
    let pat_path = Path::new(path);
    let current = fs::read_to_string(pat_path)
        .with_context(|| format!("Failed to read {}", pat_path.display()))?;
    let file = PatFile::parse(&current)
        .with_context(|| format!("Failed to parse pattern file {}", pat_path.display()))?;
    let outcome = dedup_with(&file, &rules.merge_options());
    let normalized = outcome.file.render();

    if check {
        if normalized == current {
            println!("{} is normalized ({} records)", pat_path.display(), outcome.file.len());
            return Ok(());
        }
        return Err(anyhow!(
            "{} is not normalized ({} duplicate record(s)); run `sigdb dedup {}`",
            pat_path.display(),
            outcome.duplicates,
            path
        ));
    }

    fs::write(pat_path, normalized)
        .with_context(|| format!("Failed to write {}", pat_path.display()))?;
    MergeSummary::new(pat_path, &outcome, false).print(json)
}

/// Print record statistics for a pattern file.
pub fn stats_command(path: &str, json: bool) -> Result<()> {
    let pat_path = Path::new(path);
    let stats = PatStats::from_file(&load_pat(pat_path)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Pattern file: {}", pat_path.display());
    println!("  Records: {}", stats.records);
    println!("  Public names: {}", stats.public_names);
    println!("  Local names: {}", stats.local_names);
    println!("  Unique names: {}", stats.unique_names);
    println!("  References: {}", stats.references);
    println!("  Trivial patterns: {}", stats.trivial_patterns);
    println!("  Largest function: {:#x}", stats.max_function_size);
    println!("  Terminated: {}", if stats.terminated { "yes" } else { "no" });
    Ok(())
}
