//! The on-disk convention of the signature tree.
//!
//! Every library lives at `<format>/<arch>/<bits>/<library>/` and holds
//! `<library>.pat`, `<library>.description` and `<library>.src.sha1`.
//! Nothing here touches the filesystem except [`discover_libraries`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension of pattern files.
pub const PAT_EXT: &str = "pat";
/// Extension of description files.
pub const DESCRIPTION_EXT: &str = "description";
/// Extension of source-hash manifests.
pub const MANIFEST_EXT: &str = "src.sha1";

/// Directory depth of a library below the tree root.
pub const LIBRARY_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Tree root {0} is not a directory")]
    MissingRoot(PathBuf),

    #[error("Path {0} is not <format>/<arch>/<bits>/<library>")]
    WrongDepth(PathBuf),

    #[error("Path component {0:?} is not valid UTF-8")]
    NonUtf8(PathBuf),

    #[error("Bit-width '{0}' is not a number")]
    InvalidBits(String),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Four-level key identifying a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SigKey {
    pub format: String,
    pub arch: String,
    pub bits: u32,
    pub library: String,
}

impl SigKey {
    pub fn new(
        format: impl Into<String>,
        arch: impl Into<String>,
        bits: u32,
        library: impl Into<String>,
    ) -> Self {
        Self { format: format.into(), arch: arch.into(), bits, library: library.into() }
    }

    /// Parse a key from a path relative to the tree root.
    pub fn from_relative(path: &Path) -> Result<Self, LayoutError> {
        let mut parts = Vec::with_capacity(LIBRARY_DEPTH);
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part =
                        part.to_str().ok_or_else(|| LayoutError::NonUtf8(path.to_path_buf()))?;
                    parts.push(part.to_string());
                }
                Component::CurDir => {}
                _ => return Err(LayoutError::WrongDepth(path.to_path_buf())),
            }
        }
        let [format, arch, bits, library]: [String; LIBRARY_DEPTH] =
            parts.try_into().map_err(|_| LayoutError::WrongDepth(path.to_path_buf()))?;
        let bits = bits.parse::<u32>().map_err(|_| LayoutError::InvalidBits(bits.clone()))?;
        Ok(Self { format, arch, bits, library })
    }

    /// Relative directory of this library.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.format)
            .join(&self.arch)
            .join(self.bits.to_string())
            .join(&self.library)
    }
}

impl fmt::Display for SigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.format, self.arch, self.bits, self.library)
    }
}

/// Paths of one library's files below a tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    pub key: SigKey,
    /// Library directory.
    pub dir: PathBuf,
    pub pat_path: PathBuf,
    pub description_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl LibraryLayout {
    /// Compute the layout of `key` under `root` without touching the filesystem.
    pub fn new(root: impl AsRef<Path>, key: SigKey) -> Self {
        let dir = root.as_ref().join(key.relative_dir());
        let pat_path = dir.join(file_name(&key.library, PAT_EXT));
        let description_path = dir.join(file_name(&key.library, DESCRIPTION_EXT));
        let manifest_path = dir.join(file_name(&key.library, MANIFEST_EXT));
        Self { key, dir, pat_path, description_path, manifest_path }
    }

    /// File names a library directory is expected to contain.
    pub fn expected_file_names(&self) -> [String; 3] {
        [
            file_name(&self.key.library, PAT_EXT),
            file_name(&self.key.library, DESCRIPTION_EXT),
            file_name(&self.key.library, MANIFEST_EXT),
        ]
    }
}

fn file_name(library: &str, ext: &str) -> String {
    format!("{library}.{ext}")
}

/// Whether a path component is hidden (`.git`, `.scripts`, ...).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Find every library directory under `root`, sorted by key.
///
/// Directories at depth four are libraries; hidden entries are skipped at
/// every level. Keys that cannot be parsed are returned as errors so callers
/// can decide whether to report or abort.
pub fn discover_libraries(
    root: &Path,
) -> Result<Vec<Result<LibraryLayout, LayoutError>>, LayoutError> {
    if !root.is_dir() {
        return Err(LayoutError::MissingRoot(root.to_path_buf()));
    }
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(LIBRARY_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry =
            entry.map_err(|source| LayoutError::Walk { path: root.to_path_buf(), source })?;
        if entry.depth() != LIBRARY_DEPTH || !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        out.push(SigKey::from_relative(rel).map(|key| LibraryLayout::new(root, key)));
    }
    Ok(out)
}

/// Like [`discover_libraries`] but keeps only valid keys whose directory
/// matches the canonical layout (`064` does not stand in for `64`).
pub fn library_layouts(root: &Path) -> Result<Vec<LibraryLayout>, LayoutError> {
    let mut layouts: Vec<LibraryLayout> = discover_libraries(root)?
        .into_iter()
        .filter_map(Result::ok)
        .filter(|l| l.dir.is_dir())
        .collect();
    layouts.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(layouts)
}

/// `.pat` files directly inside `dir`, or anywhere below it when `recursive`.
/// Hidden entries are skipped. The result is sorted.
pub fn find_pat_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, LayoutError> {
    if !dir.is_dir() {
        return Err(LayoutError::MissingRoot(dir.to_path_buf()));
    }
    let walker = WalkDir::new(dir)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

    let mut out = Vec::new();
    for entry in walker {
        let entry =
            entry.map_err(|source| LayoutError::Walk { path: dir.to_path_buf(), source })?;
        let is_pat = entry.path().extension().is_some_and(|ext| ext == PAT_EXT);
        if entry.file_type().is_file() && is_pat {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}
