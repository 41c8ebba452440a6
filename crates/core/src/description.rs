//! Human-readable library descriptions (`<library>.description`).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest description accepted, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("Description is empty")]
    Empty,

    #[error("Description is {len} characters long; at most {max} allowed")]
    TooLong { len: usize, max: usize },

    #[error("Failed to read description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Text describing where a library's signatures come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    text: String,
}

impl Description {
    /// Build a description from file contents; trailing line breaks are dropped.
    pub fn parse(body: &str) -> Self {
        Self { text: body.trim_end_matches(['\r', '\n']).to_string() }
    }

    pub fn load(path: &Path) -> Result<Self, DescriptionError> {
        let body = fs::read_to_string(path)
            .map_err(|source| DescriptionError::Io { path: path.to_path_buf(), source })?;
        Ok(Self::parse(&body))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters, which is what the size cap counts.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn validate(&self, max_len: usize) -> Result<(), DescriptionError> {
        if self.text.trim().is_empty() {
            return Err(DescriptionError::Empty);
        }
        let len = self.char_len();
        if len > max_len {
            return Err(DescriptionError::TooLong { len, max: max_len });
        }
        Ok(())
    }

    /// Single-line form, used as the library name embedded in converted signatures.
    pub fn summary(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
