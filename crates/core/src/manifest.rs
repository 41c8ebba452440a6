//! Source-hash manifests (`<library>.src.sha1`).
//!
//! A manifest records the SHA-1 digest of every artifact the patterns were
//! generated from, in `sha1sum` format:
//!
//! ```text
//! 2fd4e1c67a2d28fced849ee1bb76e7391b93eb12  libc6_2.35-0ubuntu3_amd64.deb
//! ```

use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Manifest has no entries")]
    Empty,

    #[error("Artifact path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// One artifact and its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Lowercase hex SHA-1.
    pub sha1: String,
    /// Artifact file name.
    pub name: String,
}

/// Difference between a manifest and the artifacts found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestMismatch {
    Missing { name: String },
    Digest { name: String, expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HashManifest {
    pub entries: Vec<ManifestEntry>,
}

impl HashManifest {
    pub fn parse(body: &str) -> ManifestResult<Self> {
        let mut entries = Vec::new();
        for (idx, raw) in body.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let syntax = |message: String| ManifestError::Syntax { line: idx + 1, message };

            let (digest, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| syntax("expected '<sha1>  <file name>'".to_string()))?;
            if digest.len() != 40 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(syntax(format!("'{digest}' is not a SHA-1 digest")));
            }
            // sha1sum writes `*` in front of names hashed in binary mode.
            let name = rest.trim_start();
            let name = name.strip_prefix('*').unwrap_or(name);
            if name.is_empty() {
                return Err(syntax("missing file name".to_string()));
            }
            entries.push(ManifestEntry {
                sha1: digest.to_ascii_lowercase(),
                name: name.to_string(),
            });
        }
        if entries.is_empty() {
            return Err(ManifestError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> ManifestResult<Self> {
        let body = fs::read_to_string(path)
            .map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&body)
    }

    /// Hash each artifact and record it under its file name.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> ManifestResult<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ManifestError::NoFileName(path.to_path_buf()))?
                .to_string();
            entries.push(ManifestEntry { sha1: sha1_file(path)?, name });
        }
        if entries.is_empty() {
            return Err(ManifestError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("{}  {}\n", entry.sha1, entry.name));
        }
        out
    }

    pub fn write(&self, path: &Path) -> ManifestResult<()> {
        fs::write(path, self.render())
            .map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })
    }

    /// Compare every entry against `source_dir/<name>`.
    pub fn verify(&self, source_dir: &Path) -> ManifestResult<Vec<ManifestMismatch>> {
        let mut mismatches = Vec::new();
        for entry in &self.entries {
            let artifact = source_dir.join(&entry.name);
            if !artifact.is_file() {
                mismatches.push(ManifestMismatch::Missing { name: entry.name.clone() });
                continue;
            }
            let actual = sha1_file(&artifact)?;
            if actual != entry.sha1 {
                mismatches.push(ManifestMismatch::Digest {
                    name: entry.name.clone(),
                    expected: entry.sha1.clone(),
                    actual,
                });
            } else {
                debug!(artifact = %artifact.display(), "digest matches");
            }
        }
        Ok(mismatches)
    }
}

/// Compute the SHA-1 of a file and return it as lowercase hex.
pub fn sha1_file(path: &Path) -> ManifestResult<String> {
    let io_err = |source| ManifestError::Io { path: path.to_path_buf(), source };
    let file = fs::File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
