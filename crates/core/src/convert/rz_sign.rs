use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{ConvertError, ConvertOutput, ConvertRequest, SigConverter};
use crate::config::{RzSignConfig, RZ_SIGN_ENV};
use crate::pat::PatFile;

/// Compiles `.pat` files into FLIRT `.sig` files by shelling out to rz-sign.
#[derive(Debug, Clone, Default)]
pub struct RzSignConverter {
    settings: RzSignConfig,
}

impl RzSignConverter {
    pub fn new(settings: RzSignConfig) -> Self {
        Self { settings }
    }

    /// Arguments for `rz-sign ... -c <output> <input>`.
    ///
    /// Node optimization level 1 keeps tail bytes, level 2 drops them.
    pub fn build_args(&self, request: &ConvertRequest) -> Vec<String> {
        let mut args = Vec::new();
        if self.settings.quiet {
            args.push("-q".to_string());
        }
        if self.settings.deflate {
            args.push("-e".to_string());
            args.push("flirt.sig.deflate=true".to_string());
        }
        args.extend([
            "-e".to_string(),
            format!("asm.arch={}", request.key.arch),
            "-e".to_string(),
            format!("asm.bits={}", request.key.bits),
            "-e".to_string(),
            format!("flirt.sig.file={}", request.key.format),
        ]);
        if let Some(desc) = &request.description {
            args.push("-e".to_string());
            args.push(format!("flirt.sig.library={desc}{}", self.settings.library_suffix));
        }
        let optimize = if request.no_postlude { 2 } else { 1 };
        args.push("-e".to_string());
        args.push(format!("flirt.node.optimize={optimize}"));
        args.extend(request.extra_args.iter().cloned());
        args.push("-c".to_string());
        args.push(request.output.display().to_string());
        args.push(request.input.display().to_string());
        args
    }
}

impl SigConverter for RzSignConverter {
    fn name(&self) -> &'static str {
        "rz-sign"
    }

    fn extension(&self) -> &'static str {
        "sig"
    }

    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput, ConvertError> {
        if !request.input.is_file() {
            return Err(ConvertError::MissingInput(request.input.clone()));
        }
        // Parse first so malformed input is reported by us, not by the tool.
        let records = PatFile::load(&request.input)?.len();

        let tool = request.tool_path.clone().unwrap_or_else(resolve_rz_sign_path);
        let args = self.build_args(request);
        debug!(tool = %tool.display(), ?args, "running rz-sign");

        let output = Command::new(&tool).args(&args).output().map_err(|e| spawn_error(&tool, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Tool(format!(
                "rz-sign exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if !request.output.is_file() {
            return Err(ConvertError::Tool(format!(
                "rz-sign produced no output at {}",
                request.output.display()
            )));
        }

        info!(key = %request.key, output = %request.output.display(), "compiled signature");
        Ok(ConvertOutput {
            path: request.output.clone(),
            records,
            tool_path: Some(tool.display().to_string()),
        })
    }

    fn version(&self, tool_path: Option<&Path>) -> Option<String> {
        let tool = tool_path.map(Path::to_path_buf).unwrap_or_else(resolve_rz_sign_path);
        version_string(&tool).ok()
    }

    fn description(&self) -> &'static str {
        "FLIRT .sig compiled with rz-sign (requires rizin; set RZ_SIGN_BIN or --rz-sign)"
    }
}

fn resolve_rz_sign_path() -> PathBuf {
    std::env::var_os(RZ_SIGN_ENV).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("rz-sign"))
}

fn spawn_error(tool: &Path, err: std::io::Error) -> ConvertError {
    if err.kind() == ErrorKind::NotFound {
        ConvertError::MissingTool(tool.display().to_string())
    } else {
        ConvertError::Tool(format!("failed to spawn {}: {err}", tool.display()))
    }
}

fn version_string(tool: &Path) -> Result<String, ConvertError> {
    let output = Command::new(tool).arg("-v").output().map_err(|e| spawn_error(tool, e))?;
    if !output.status.success() {
        return Err(ConvertError::Tool(format!("rz-sign -v exited with {}", output.status)));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ConvertError::Tool("rz-sign -v produced no output".to_string()))
}
