//! Validation of a signature tree against the directory convention and the
//! file formats it holds.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{SigdbConfig, CONFIG_FILE_NAME};
use crate::description::Description;
use crate::layout::{is_hidden, LayoutError, LibraryLayout, SigKey, LIBRARY_DEPTH};
use crate::manifest::HashManifest;
use crate::merge::dedup;
use crate::pat::{PatError, PatFile};

/// Root-level files that are allowed outside the library tree (matched by prefix).
const ROOT_FILE_PREFIXES: &[&str] = &["README", "LICENSE", "COPYING", CONFIG_FILE_NAME];

/// Library files shorter than this hold no usable content.
pub const MIN_FILE_LEN: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MisplacedFile,
    UnknownFormat,
    UnknownArch,
    InvalidBits,
    InvalidLibraryName,
    MissingFile,
    EmptyFile,
    UnexpectedFile,
    PatSyntax,
    PatUnterminated,
    PatEmpty,
    DuplicateRecords,
    Collision,
    OversizedPattern,
    InvalidDescription,
    InvalidManifest,
    Io,
}

/// A single finding, with its path relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub path: PathBuf,
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    fn error(path: impl Into<PathBuf>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self { path: path.into(), severity: Severity::Error, kind, message: message.into() }
    }

    fn warning(path: impl Into<PathBuf>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self { path: path.into(), severity: Severity::Warning, kind, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub root: PathBuf,
    /// Number of library directories inspected.
    pub libraries: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    /// True when no errors were found; warnings do not fail a tree.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Checks a tree against a [`SigdbConfig`].
pub struct Validator<'a> {
    config: &'a SigdbConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a SigdbConfig) -> Self {
        Self { config }
    }

    /// Walk the whole tree under `root` and collect issues.
    pub fn validate_tree(&self, root: &Path) -> Result<ValidationReport, LayoutError> {
        if !root.is_dir() {
            return Err(LayoutError::MissingRoot(root.to_path_buf()));
        }

        let mut issues = Vec::new();
        let mut libraries = 0usize;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(LIBRARY_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    issues.push(Issue::error(path, IssueKind::Io, err.to_string()));
                    continue;
                }
            };
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
            let name = entry.file_name().to_string_lossy().to_string();
            let depth = entry.depth();

            if !entry.file_type().is_dir() {
                if depth == 1 && ROOT_FILE_PREFIXES.iter().any(|p| name.starts_with(p)) {
                    continue;
                }
                issues.push(Issue::error(
                    rel,
                    IssueKind::MisplacedFile,
                    format!("file outside a library directory (depth {depth})"),
                ));
                continue;
            }

            match depth {
                1 if !self.config.allows_format(&name) => issues.push(Issue::error(
                    rel,
                    IssueKind::UnknownFormat,
                    format!("unknown format '{name}'; allowed: {}", self.config.formats.join(", ")),
                )),
                2 if !self.config.allows_arch(&name) => issues.push(Issue::error(
                    rel,
                    IssueKind::UnknownArch,
                    format!(
                        "unknown architecture '{name}'; allowed: {}",
                        self.config.architectures.join(", ")
                    ),
                )),
                3 => {
                    if let Some(message) = self.check_bits(&name) {
                        issues.push(Issue::error(rel, IssueKind::InvalidBits, message));
                    }
                }
                LIBRARY_DEPTH => {
                    libraries += 1;
                    if !is_valid_library_name(&name) {
                        issues.push(Issue::error(
                            rel.clone(),
                            IssueKind::InvalidLibraryName,
                            format!("library name '{name}' may only use ASCII letters, digits and ._+-"),
                        ));
                    }
                    // Bad bit-widths are already reported one level up.
                    match SigKey::from_relative(&rel) {
                        Ok(key) if key.relative_dir() == rel => {
                            let layout = LibraryLayout::new(root, key);
                            issues.extend(self.validate_library(&layout, &rel));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let report = ValidationReport { root: root.to_path_buf(), libraries, issues };
        info!(
            root = %root.display(),
            libraries,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "validated tree"
        );
        Ok(report)
    }

    /// Check one library directory. `rel` is the directory relative to the tree root.
    pub fn validate_library(&self, layout: &LibraryLayout, rel: &Path) -> Vec<Issue> {
        debug!(library = %layout.key, "validating library");
        let mut issues = Vec::new();
        let expected = layout.expected_file_names();

        match fs::read_dir(&layout.dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(err) => {
                            issues.push(Issue::error(rel, IssueKind::Io, err.to_string()));
                            continue;
                        }
                    };
                    let name = entry.file_name().to_string_lossy().to_string();
                    if is_hidden(&name) {
                        continue;
                    }
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    if is_dir || !expected.contains(&name) {
                        issues.push(Issue::error(
                            rel.join(&name),
                            IssueKind::UnexpectedFile,
                            format!("unexpected entry; a library holds only {}", expected.join(", ")),
                        ));
                    }
                }
            }
            Err(err) => {
                issues.push(Issue::error(rel, IssueKind::Io, err.to_string()));
                return issues;
            }
        }

        let mut usable = [false; 3];
        for (idx, (path, name)) in [
            (&layout.pat_path, &expected[0]),
            (&layout.description_path, &expected[1]),
            (&layout.manifest_path, &expected[2]),
        ]
        .into_iter()
        .enumerate()
        {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() && meta.len() < MIN_FILE_LEN => {
                    issues.push(Issue::error(
                        rel.join(name),
                        IssueKind::EmptyFile,
                        format!("file is empty ({} byte(s))", meta.len()),
                    ));
                }
                Ok(meta) if meta.is_file() => usable[idx] = true,
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                    issues.push(Issue::error(rel.join(name), IssueKind::Io, err.to_string()));
                }
                _ => issues.push(Issue::error(
                    rel.join(name),
                    IssueKind::MissingFile,
                    "required file is missing",
                )),
            }
        }

        if usable[0] {
            issues.extend(self.check_pat(&layout.pat_path, &rel.join(&expected[0])));
        }

        if usable[1] {
            let rel_desc = rel.join(&expected[1]);
            let result = Description::load(&layout.description_path)
                .and_then(|d| d.validate(self.config.max_description_len));
            if let Err(err) = result {
                issues.push(Issue::error(rel_desc, IssueKind::InvalidDescription, err.to_string()));
            }
        }

        if usable[2] {
            if let Err(err) = HashManifest::load(&layout.manifest_path) {
                issues.push(Issue::error(
                    rel.join(&expected[2]),
                    IssueKind::InvalidManifest,
                    err.to_string(),
                ));
            }
        }

        issues
    }

    fn check_pat(&self, path: &Path, rel: &Path) -> Vec<Issue> {
        let mut issues = Vec::new();
        let file = match PatFile::load(path) {
            Ok(file) => file,
            Err(err @ PatError::Syntax { .. }) => {
                issues.push(Issue::error(rel, IssueKind::PatSyntax, err.to_string()));
                return issues;
            }
            Err(err) => {
                issues.push(Issue::error(rel, IssueKind::Io, err.to_string()));
                return issues;
            }
        };

        if !file.terminated {
            issues.push(Issue::warning(
                rel,
                IssueKind::PatUnterminated,
                "missing '---' terminator line",
            ));
        }
        if file.is_empty() {
            // A terminated file without records is a freshly scaffolded library.
            if file.terminated {
                issues.push(Issue::warning(rel, IssueKind::PatEmpty, "pattern file has no records"));
            } else {
                issues.push(Issue::error(
                    rel,
                    IssueKind::PatEmpty,
                    "pattern file has no records and no terminator",
                ));
            }
            return issues;
        }

        let oversized: Vec<&str> = file
            .records
            .iter()
            .filter(|r| r.covered_len() > r.size)
            .map(|r| r.primary_name())
            .collect();
        if let Some(first) = oversized.first() {
            issues.push(Issue::warning(
                rel,
                IssueKind::OversizedPattern,
                format!(
                    "{} record(s) cover more bytes than the function size (first: {first})",
                    oversized.len()
                ),
            ));
        }

        let outcome = dedup(&file);
        if outcome.duplicates > 0 {
            issues.push(Issue::warning(
                rel,
                IssueKind::DuplicateRecords,
                format!("{} duplicate record(s)", outcome.duplicates),
            ));
        }
        for collision in &outcome.collisions {
            issues.push(Issue::warning(
                rel,
                IssueKind::Collision,
                format!("indistinguishable records: {}", collision.names.join(", ")),
            ));
        }

        issues
    }

    fn check_bits(&self, name: &str) -> Option<String> {
        match name.parse::<u32>() {
            Ok(bits) if bits.to_string() != name => {
                Some(format!("bit-width '{name}' is not in canonical form ({bits})"))
            }
            Ok(bits) if !self.config.allows_bits(bits) => Some(format!(
                "unsupported bit-width {bits}; allowed: {}",
                self.config.bits.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
            )),
            Ok(_) => None,
            Err(_) => Some(format!("bit-width '{name}' is not a number")),
        }
    }
}

/// Library names: non-empty, ASCII letters, digits and `._+-`, not hidden.
pub fn is_valid_library_name(name: &str) -> bool {
    !name.is_empty()
        && !is_hidden(name)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}
