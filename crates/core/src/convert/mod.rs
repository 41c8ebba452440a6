//! Converters from source pattern files to distributable signatures.
//!
//! A converter turns one library's `.pat` into one output file. Converters
//! are looked up by name through a [`ConverterRegistry`] so frontends can
//! offer whatever this build was compiled with.

pub mod pat;
#[cfg(feature = "rz-sign")]
pub mod rz_sign;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SigdbConfig;
use crate::layout::SigKey;
use crate::pat::PatError;

pub use pat::PatConverter;
#[cfg(feature = "rz-sign")]
pub use rz_sign::RzSignConverter;

/// Request to convert one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub key: SigKey,
    /// Normalized input pattern file.
    pub input: PathBuf,
    /// Output file to create; its parent directory must exist.
    pub output: PathBuf,
    /// One-line description embedded by converters that support it.
    pub description: Option<String>,
    /// Optional explicit tool path (e.g., configured rz-sign).
    pub tool_path: Option<PathBuf>,
    /// Extra tool arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Leave tail bytes out of the output.
    #[serde(default)]
    pub no_postlude: bool,
}

/// What a converter produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOutput {
    pub path: PathBuf,
    pub records: usize,
    pub tool_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input pattern file not found at {0}")]
    MissingInput(PathBuf),
    #[error("Converter tool not found: {0}")]
    MissingTool(String),
    #[error("Converter tool error: {0}")]
    Tool(String),
    #[error(transparent)]
    Pat(#[from] PatError),
}

/// Trait implemented by signature converters.
pub trait SigConverter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extension of the files this converter writes.
    fn extension(&self) -> &'static str;

    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput, ConvertError>;

    /// Version string of the underlying tool, if any.
    fn version(&self, _tool_path: Option<&Path>) -> Option<String> {
        None
    }

    fn description(&self) -> &'static str;
}

/// Registry for converters; callers select by name.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Box<dyn SigConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self { converters: HashMap::new() }
    }

    pub fn register<C: SigConverter + 'static>(&mut self, converter: C) -> &mut Self {
        self.converters.insert(converter.name().to_string(), Box::new(converter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn SigConverter> {
        self.converters.get(name).map(|c| &**c)
    }

    /// Sorted converter names for help and error messages.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.converters.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry with every converter compiled into this build, using default settings.
pub fn default_converter_registry() -> ConverterRegistry {
    converter_registry(&SigdbConfig::default())
}

/// Registry with every converter compiled into this build, configured from `config`.
pub fn converter_registry(config: &SigdbConfig) -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    registry.register(PatConverter);
    #[cfg(feature = "rz-sign")]
    registry.register(RzSignConverter::new(config.rz_sign.clone()));
    #[cfg(not(feature = "rz-sign"))]
    let _ = config;
    registry
}
