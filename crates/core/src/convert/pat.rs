use tracing::debug;

use super::{ConvertError, ConvertOutput, ConvertRequest, SigConverter};
use crate::merge::dedup;
use crate::pat::PatFile;

/// Writes the normalized, deduplicated pattern file itself.
///
/// Needs no external tool; the output can be fed to any FLIRT-compatible
/// signature compiler.
pub struct PatConverter;

impl SigConverter for PatConverter {
    fn name(&self) -> &'static str {
        "pat"
    }

    fn extension(&self) -> &'static str {
        "pat"
    }

    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput, ConvertError> {
        if !request.input.is_file() {
            return Err(ConvertError::MissingInput(request.input.clone()));
        }
        let mut file = dedup(&PatFile::load(&request.input)?).file;
        if request.no_postlude {
            for record in &mut file.records {
                record.tail.clear();
            }
            file = dedup(&file).file;
        }
        file.write(&request.output)?;
        debug!(key = %request.key, output = %request.output.display(), "wrote normalized pattern file");
        Ok(ConvertOutput {
            path: request.output.clone(),
            records: file.len(),
            tool_path: None,
        })
    }

    fn description(&self) -> &'static str {
        "Normalized, deduplicated .pat (no external tool)"
    }
}
