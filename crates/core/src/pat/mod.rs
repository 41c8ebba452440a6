//! FLIRT pattern files (`.pat`).
//!
//! A pattern file is a list of signature records, one per line, terminated by
//! a line containing `---`. Each record describes the leading bytes of a
//! function (with `..` marking variant bytes), a CRC16 over the bytes that
//! follow, the function size, the public names it defines, the symbols it
//! references, and an optional run of tail bytes:
//!
//! ```text
//! 5589E583EC18........ 1E 4A2F 0034 :0000 _main ^0012 _printf 8B45..
//! ```
//!
//! Parsing is strict about syntax but tolerant about layout (blank lines,
//! `#` comment lines, surrounding whitespace, lowercase hex). Rendering is canonical so that
//! merged and deduplicated files are stable under version control.

pub mod filter;
pub mod stats;

pub use filter::{DropReason, RecordFilter};
pub use stats::PatStats;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Line that terminates a pattern file.
pub const PAT_TERMINATOR: &str = "---";

/// Prefix of comment lines some generators emit before the records.
pub const PAT_COMMENT: char = '#';

/// Maximum number of leading bytes a record may carry.
pub const MAX_LEADING_BYTES: usize = 32;

/// Error type for pattern parsing and IO.
#[derive(Debug, Error)]
pub enum PatError {
    /// A single record line could not be parsed.
    #[error("Invalid pattern record: {0}")]
    InvalidRecord(String),

    /// A record inside a file could not be parsed; `line` is 1-based.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience result type for pattern operations.
pub type PatResult<T> = Result<T, PatError>;

/// A byte of a pattern; `None` is a variant (`..`) byte.
pub type PatByte = Option<u8>;

/// Public name defined by a record (`:OFFSET name`, or `:OFFSET@ name` for locals).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicName {
    pub offset: u32,
    pub name: String,
    pub local: bool,
}

/// Symbol referenced from inside the function (`^OFFSET name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub offset: u32,
    pub name: String,
}

/// One signature record of a pattern file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatRecord {
    pub leading: Vec<PatByte>,
    pub crc_len: u8,
    pub crc16: u16,
    pub size: u32,
    pub publics: Vec<PublicName>,
    pub references: Vec<Reference>,
    pub tail: Vec<PatByte>,
}

impl PatRecord {
    /// Parse a single record line.
    pub fn parse_line(line: &str) -> PatResult<Self> {
        let invalid = |msg: String| PatError::InvalidRecord(msg);
        let mut tokens = line.split_whitespace();

        let leading_tok = tokens.next().ok_or_else(|| invalid("empty record".to_string()))?;
        let leading = parse_pattern_bytes(leading_tok)
            .map_err(|e| invalid(format!("leading bytes: {e}")))?;
        if leading.is_empty() {
            return Err(invalid("leading bytes are empty".to_string()));
        }
        if leading.len() > MAX_LEADING_BYTES {
            return Err(invalid(format!(
                "leading bytes hold {} bytes, at most {MAX_LEADING_BYTES} allowed",
                leading.len()
            )));
        }

        let crc_len_tok = tokens.next().ok_or_else(|| invalid("missing CRC length".to_string()))?;
        if crc_len_tok.len() != 2 || !is_hex(crc_len_tok) {
            return Err(invalid(format!("CRC length '{crc_len_tok}' must be 2 hex digits")));
        }
        let crc_len = u8::from_str_radix(crc_len_tok, 16)
            .map_err(|_| invalid(format!("CRC length '{crc_len_tok}' is not hex")))?;

        let crc_tok = tokens.next().ok_or_else(|| invalid("missing CRC16".to_string()))?;
        if crc_tok.len() != 4 || !is_hex(crc_tok) {
            return Err(invalid(format!("CRC16 '{crc_tok}' must be 4 hex digits")));
        }
        let crc16 = u16::from_str_radix(crc_tok, 16)
            .map_err(|_| invalid(format!("CRC16 '{crc_tok}' is not hex")))?;

        let size_tok = tokens.next().ok_or_else(|| invalid("missing function size".to_string()))?;
        let size = parse_hex_u32(size_tok).map_err(|e| invalid(format!("function size: {e}")))?;

        let mut publics = Vec::new();
        let mut references = Vec::new();
        let mut tail = Vec::new();

        while let Some(tok) = tokens.next() {
            if !tail.is_empty() {
                return Err(invalid(format!("unexpected token '{tok}' after tail bytes")));
            }
            if let Some(offset) = tok.strip_prefix(':') {
                let (offset, local) = match offset.strip_suffix('@') {
                    Some(stripped) => (stripped, true),
                    None => (offset, false),
                };
                let offset = parse_hex_u32(offset)
                    .map_err(|e| invalid(format!("public name offset: {e}")))?;
                let name = tokens
                    .next()
                    .ok_or_else(|| invalid(format!("public name at :{offset:04X} has no name")))?;
                publics.push(PublicName { offset, name: name.to_string(), local });
            } else if let Some(offset) = tok.strip_prefix('^') {
                let offset =
                    parse_hex_u32(offset).map_err(|e| invalid(format!("reference offset: {e}")))?;
                let name = tokens
                    .next()
                    .ok_or_else(|| invalid(format!("reference at ^{offset:04X} has no name")))?;
                references.push(Reference { offset, name: name.to_string() });
            } else {
                tail = parse_pattern_bytes(tok).map_err(|e| invalid(format!("tail bytes: {e}")))?;
                if tail.is_empty() {
                    return Err(invalid("tail bytes are empty".to_string()));
                }
            }
        }

        if publics.is_empty() {
            return Err(invalid("record defines no public name".to_string()));
        }

        Ok(Self { leading, crc_len, crc16, size, publics, references, tail })
    }

    /// First public name, which tools use as the record's display name.
    pub fn primary_name(&self) -> &str {
        self.publics.first().map(|p| p.name.as_str()).unwrap_or_default()
    }

    /// True when every leading byte is variant; such records match almost anything.
    pub fn is_trivial(&self) -> bool {
        self.leading.iter().all(Option::is_none)
    }

    /// Number of bytes covered by the leading pattern plus the CRC window.
    pub fn covered_len(&self) -> u32 {
        self.leading.len() as u32 + u32::from(self.crc_len)
    }

    /// Canonical rendering of everything except names: two records with the same
    /// matching key are indistinguishable to a signature matcher.
    pub fn matching_key(&self) -> String {
        let mut out = format!(
            "{} {:02X} {:04X} {:04X}",
            render_pattern_bytes(&self.leading),
            self.crc_len,
            self.crc16,
            self.size
        );
        if !self.tail.is_empty() {
            out.push(' ');
            out.push_str(&render_pattern_bytes(&self.tail));
        }
        out
    }
}

impl fmt::Display for PatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02X} {:04X} {:04X}",
            render_pattern_bytes(&self.leading),
            self.crc_len,
            self.crc16,
            self.size
        )?;
        for public in &self.publics {
            let marker = if public.local { "@" } else { "" };
            write!(f, " :{:04X}{} {}", public.offset, marker, public.name)?;
        }
        for reference in &self.references {
            write!(f, " ^{:04X} {}", reference.offset, reference.name)?;
        }
        if !self.tail.is_empty() {
            write!(f, " {}", render_pattern_bytes(&self.tail))?;
        }
        Ok(())
    }
}

/// A parsed pattern file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatFile {
    pub records: Vec<PatRecord>,
    /// Whether the source carried the `---` terminator.
    pub terminated: bool,
}

impl PatFile {
    pub fn new(records: Vec<PatRecord>) -> Self {
        Self { records, terminated: true }
    }

    /// Parse the contents of a pattern file.
    ///
    /// Blank lines and `#` comments are skipped. Anything after the
    /// terminator is ignored.
    pub fn parse(body: &str) -> PatResult<Self> {
        let mut records = Vec::new();
        let mut terminated = false;

        let mut lines = body.lines().enumerate();
        for (idx, raw) in lines.by_ref() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(PAT_COMMENT) {
                continue;
            }
            if line == PAT_TERMINATOR {
                terminated = true;
                break;
            }
            let record = PatRecord::parse_line(line).map_err(|e| PatError::Syntax {
                line: idx + 1,
                message: match e {
                    PatError::InvalidRecord(msg) => msg,
                    other => other.to_string(),
                },
            })?;
            records.push(record);
        }

        let trailing = lines.filter(|(_, l)| !l.trim().is_empty()).count();
        if trailing > 0 {
            warn!(trailing, "ignoring lines after pattern terminator");
        }

        Ok(Self { records, terminated })
    }

    /// Read and parse a pattern file from disk.
    pub fn load(path: &Path) -> PatResult<Self> {
        let body = fs::read_to_string(path)
            .map_err(|source| PatError::Io { path: path.to_path_buf(), source })?;
        let file = Self::parse(&body)?;
        debug!(path = %path.display(), records = file.records.len(), "loaded pattern file");
        Ok(file)
    }

    /// Canonical text form, always terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out.push_str(PAT_TERMINATOR);
        out.push('\n');
        out
    }

    /// Write the canonical form to `path`.
    pub fn write(&self, path: &Path) -> PatResult<()> {
        fs::write(path, self.render())
            .map_err(|source| PatError::Io { path: path.to_path_buf(), source })?;
        debug!(path = %path.display(), records = self.records.len(), "wrote pattern file");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a run of hex pairs where `..` marks a variant byte.
pub fn parse_pattern_bytes(text: &str) -> Result<Vec<PatByte>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("'{text}' has an odd number of digits"));
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        match pair {
            [b'.', b'.'] => out.push(None),
            [hi, lo] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push(Some((hex_value(*hi) << 4) | hex_value(*lo)));
            }
            _ => {
                let shown = String::from_utf8_lossy(pair);
                return Err(format!("'{shown}' in '{text}' is not a hex byte"));
            }
        }
    }
    Ok(out)
}

/// Render pattern bytes as uppercase hex with `..` for variant bytes.
pub fn render_pattern_bytes(bytes: &[PatByte]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        match byte {
            Some(b) => out.push_str(&format!("{b:02X}")),
            None => out.push_str(".."),
        }
    }
    out
}

fn is_hex(text: &str) -> bool {
    text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

fn parse_hex_u32(text: &str) -> Result<u32, String> {
    if text.is_empty() || text.len() > 8 {
        return Err(format!("'{text}' must be 1 to 8 hex digits"));
    }
    if !is_hex(text) {
        return Err(format!("'{text}' is not hex"));
    }
    u32::from_str_radix(text, 16).map_err(|_| format!("'{text}' is not hex"))
}
