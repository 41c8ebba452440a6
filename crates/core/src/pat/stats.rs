use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::PatFile;

/// Summary numbers for a pattern file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatStats {
    pub records: usize,
    pub public_names: usize,
    pub local_names: usize,
    pub references: usize,
    /// Distinct public (non-local) names across all records.
    pub unique_names: usize,
    /// Records whose leading bytes are all variant.
    pub trivial_patterns: usize,
    pub max_function_size: u32,
    pub terminated: bool,
}

impl PatStats {
    pub fn from_file(file: &PatFile) -> Self {
        let mut stats = PatStats { terminated: file.terminated, ..Default::default() };
        let mut names = BTreeSet::new();

        for record in &file.records {
            stats.records += 1;
            stats.references += record.references.len();
            stats.max_function_size = stats.max_function_size.max(record.size);
            if record.is_trivial() {
                stats.trivial_patterns += 1;
            }
            for public in &record.publics {
                if public.local {
                    stats.local_names += 1;
                } else {
                    stats.public_names += 1;
                    names.insert(public.name.as_str());
                }
            }
        }

        stats.unique_names = names.len();
        stats
    }
}
