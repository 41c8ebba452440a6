use anyhow::{anyhow, Context, Result};

use sigdb_core::config::load_config;
use sigdb_core::validate::{Severity, Validator};

use crate::canonicalize_or_current;

/// Validate the signature tree at `root`; fails when any error is found.
pub fn validate_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let config = load_config(&root_path)?;
    let report = Validator::new(&config)
        .validate_tree(&root_path)
        .with_context(|| format!("Failed to validate {}", root_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validated {} ({} libraries)", report.root.display(), report.libraries);
        for issue in &report.issues {
            let label = match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            println!("  {label}: {}: {}", issue.path.display(), issue.message);
        }
        println!("Errors: {}, warnings: {}", report.error_count(), report.warning_count());
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(anyhow!("Validation failed with {} error(s)", report.error_count()))
    }
}
