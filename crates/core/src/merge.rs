//! Merging and deduplication of pattern files.
//!
//! The merged file holds every distinct record of its inputs exactly once,
//! ordered by canonical line so the output does not depend on input order.
//! [`MergeOptions`] can additionally curate records and collapse records a
//! matcher cannot tell apart.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pat::{DropReason, PatFile, PatRecord, RecordFilter};

/// Two or more distinct records that a matcher cannot tell apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    /// Canonical record text without names (see [`PatRecord::matching_key`]).
    pub key: String,
    /// Primary names of the colliding records, sorted.
    pub names: Vec<String>,
}

/// How records are treated while merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Curation rules; `None` keeps every record.
    pub filter: Option<RecordFilter>,
    /// Keep only the first record (in output order) of each collision.
    pub collapse_collisions: bool,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub file: PatFile,
    /// Records read across all inputs, duplicates included.
    pub input_records: usize,
    /// Records rejected by the filter, per reason.
    pub dropped: BTreeMap<DropReason, usize>,
    /// Records dropped because an identical one was already present.
    pub duplicates: usize,
    /// Records dropped because they collided with an earlier one.
    pub collapsed: usize,
    pub collisions: Vec<Collision>,
}

impl MergeOutcome {
    /// True when the merge dropped nothing and found no collisions.
    pub fn is_clean(&self) -> bool {
        self.duplicates == 0
            && self.collapsed == 0
            && self.dropped_count() == 0
            && self.collisions.is_empty()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Merge pattern files into one deduplicated, sorted, terminated file,
/// keeping every distinct record.
pub fn merge(inputs: &[PatFile]) -> MergeOutcome {
    merge_with(inputs, &MergeOptions::default())
}

/// Merge pattern files under the given options.
pub fn merge_with(inputs: &[PatFile], options: &MergeOptions) -> MergeOutcome {
    let mut unique: BTreeMap<String, PatRecord> = BTreeMap::new();
    let mut dropped: BTreeMap<DropReason, usize> = BTreeMap::new();
    let mut input_records = 0usize;
    let mut accepted = 0usize;

    for file in inputs {
        for record in &file.records {
            input_records += 1;
            let record = match &options.filter {
                Some(filter) => match filter.apply(record) {
                    Ok(kept) => kept,
                    Err(reason) => {
                        debug!(name = record.primary_name(), %reason, "dropping record");
                        *dropped.entry(reason).or_default() += 1;
                        continue;
                    }
                },
                None => record.clone(),
            };
            accepted += 1;
            unique.entry(record.to_string()).or_insert(record);
        }
    }

    let duplicates = accepted - unique.len();

    let mut by_key: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in unique.values() {
        by_key.entry(record.matching_key()).or_default().insert(record.primary_name().to_string());
    }
    let collisions: Vec<Collision> = by_key
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(key, names)| Collision { key, names: names.into_iter().collect() })
        .collect();

    let mut records: Vec<PatRecord> = unique.into_values().collect();
    let before = records.len();
    if options.collapse_collisions {
        let mut seen = BTreeSet::new();
        records.retain(|r| seen.insert(r.matching_key()));
    }
    let collapsed = before - records.len();

    debug!(
        inputs = inputs.len(),
        input_records,
        dropped = dropped.values().sum::<usize>(),
        duplicates,
        collapsed,
        collisions = collisions.len(),
        "merged pattern files"
    );

    MergeOutcome {
        file: PatFile::new(records),
        input_records,
        dropped,
        duplicates,
        collapsed,
        collisions,
    }
}

/// Deduplicate and normalize a single pattern file.
pub fn dedup(file: &PatFile) -> MergeOutcome {
    dedup_with(file, &MergeOptions::default())
}

pub fn dedup_with(file: &PatFile, options: &MergeOptions) -> MergeOutcome {
    merge_with(std::slice::from_ref(file), options)
}
