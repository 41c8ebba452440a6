//! Curation rules for records coming out of signature generators.
//!
//! Generators emit plenty of records that are useless or harmful in a
//! curated database: auto-named functions (`fcn.00401000`), empty functions,
//! patterns that are nothing but variant bytes. A [`RecordFilter`] drops
//! those and trims overly long tails.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PatRecord;

/// Name prefixes given to functions that were never really named.
pub const BAD_SYMBOL_PREFIXES: &[&str] =
    &["case.0x", "case.default.0x", "fcn.", "loc.", "sub.", "reloc."];

/// Names that are rejected outright.
pub const BAD_SYMBOL_NAMES: &[&str] = &["", "entry0"];

pub const DEFAULT_MAX_MASKED: u8 = 50;
pub const DEFAULT_MAX_POSTLUDE: usize = 64;

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Primary name is generated or otherwise meaningless.
    BadSymbol,
    /// Function size is zero.
    ZeroSize,
    /// Every leading byte is variant.
    MaskedPrelude,
    /// Too many variant bytes overall.
    TooMasked,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::BadSymbol => "bad symbol name",
            DropReason::ZeroSize => "function size is zero",
            DropReason::MaskedPrelude => "leading bytes are all variant",
            DropReason::TooMasked => "too many variant bytes",
        };
        f.write_str(text)
    }
}

/// Thresholds applied when curating records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    /// Highest share of variant bytes, in percent, a record may carry.
    pub max_masked: u8,
    /// Tail bytes kept per record; trailing variant bytes are stripped after cutting.
    pub max_postlude: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self { max_masked: DEFAULT_MAX_MASKED, max_postlude: DEFAULT_MAX_POSTLUDE }
    }
}

impl RecordFilter {
    /// The curated form of `record`, or the reason it does not belong in a database.
    pub fn apply(&self, record: &PatRecord) -> Result<PatRecord, DropReason> {
        if is_bad_symbol(record.primary_name()) {
            return Err(DropReason::BadSymbol);
        }
        if record.size == 0 {
            return Err(DropReason::ZeroSize);
        }
        if record.is_trivial() {
            return Err(DropReason::MaskedPrelude);
        }

        let mut kept = record.clone();
        kept.tail.truncate(self.max_postlude);
        while kept.tail.last() == Some(&None) {
            kept.tail.pop();
        }

        if masked_percent(&kept) > f64::from(self.max_masked) {
            return Err(DropReason::TooMasked);
        }
        Ok(kept)
    }
}

/// True for names generators assign to anonymous code.
pub fn is_bad_symbol(name: &str) -> bool {
    BAD_SYMBOL_NAMES.contains(&name) || BAD_SYMBOL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Share of variant pattern digits, in percent.
///
/// Counted over the hex digits of the leading and tail bytes plus the CRC
/// length, so a long CRC window makes a record more specific.
pub fn masked_percent(record: &PatRecord) -> f64 {
    let bytes = record.leading.iter().chain(&record.tail);
    let (total, masked) =
        bytes.fold((0usize, 0usize), |(t, m), b| (t + 2, if b.is_none() { m + 2 } else { m }));
    let denominator = total + usize::from(record.crc_len);
    if denominator == 0 {
        return 0.0;
    }
    masked as f64 * 100.0 / denominator as f64
}
