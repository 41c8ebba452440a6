//! Tree configuration (`sigdb.yaml` at the tree root).
//!
//! The file is optional; a missing file yields [`SigdbConfig::default`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::description::MAX_DESCRIPTION_LEN;

/// Name of the config file looked up at the tree root.
pub const CONFIG_FILE_NAME: &str = "sigdb.yaml";

/// Environment variable overriding the rz-sign executable.
pub const RZ_SIGN_ENV: &str = "RZ_SIGN_BIN";

/// Suffix appended to the library name embedded in compiled signatures.
pub const DEFAULT_LIBRARY_SUFFIX: &str = " (rizin.re)";

/// Settings for the external rz-sign converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RzSignConfig {
    /// Explicit path to rz-sign; falls back to `RZ_SIGN_BIN`, then `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Pass `-q`.
    pub quiet: bool,
    /// Write deflate-compressed signatures (`flirt.sig.deflate`).
    pub deflate: bool,
    /// Appended to the description in `flirt.sig.library`.
    pub library_suffix: String,
    /// Extra arguments inserted before `-c`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for RzSignConfig {
    fn default() -> Self {
        Self {
            path: None,
            quiet: true,
            deflate: true,
            library_suffix: DEFAULT_LIBRARY_SUFFIX.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Validation and build settings for a signature tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigdbConfig {
    /// Binary formats allowed as first path level.
    pub formats: Vec<String>,
    /// Architectures allowed as second path level.
    pub architectures: Vec<String>,
    /// Bit-widths allowed as third path level.
    pub bits: Vec<u32>,
    pub max_description_len: usize,
    /// Converter used by `build` when none is requested.
    pub default_converter: String,
    pub rz_sign: RzSignConfig,
}

impl Default for SigdbConfig {
    fn default() -> Self {
        Self {
            formats: ["elf", "pe", "mach0"].map(String::from).to_vec(),
            architectures: ["arm", "mips", "ppc", "riscv", "sparc", "x86"]
                .map(String::from)
                .to_vec(),
            bits: vec![16, 32, 64],
            max_description_len: MAX_DESCRIPTION_LEN,
            default_converter: "pat".to_string(),
            rz_sign: RzSignConfig::default(),
        }
    }
}

impl SigdbConfig {
    pub fn allows_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }

    pub fn allows_arch(&self, arch: &str) -> bool {
        self.architectures.iter().any(|a| a == arch)
    }

    pub fn allows_bits(&self, bits: u32) -> bool {
        self.bits.contains(&bits)
    }

    /// rz-sign path from config, then from the environment.
    pub fn rz_sign_path(&self) -> Option<PathBuf> {
        self.rz_sign
            .path
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(RZ_SIGN_ENV).map(PathBuf::from))
    }
}

/// Path of the config file for a tree rooted at `root`.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load `sigdb.yaml` from `root`, or defaults when it does not exist.
pub fn load_config(root: &Path) -> Result<SigdbConfig> {
    let path = config_path(root);
    if !path.is_file() {
        return Ok(SigdbConfig::default());
    }
    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config: SigdbConfig = serde_yaml::from_str(&body)
        .with_context(|| format!("Failed to parse config YAML at {}", path.display()))?;
    Ok(config)
}
