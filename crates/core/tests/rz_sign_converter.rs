#![cfg(feature = "rz-sign")]

use std::fs;
use std::path::{Path, PathBuf};

use sigdb_core::build::{build_tree, BuildOptions};
use sigdb_core::config::{RzSignConfig, SigdbConfig};
use sigdb_core::convert::{ConvertError, ConvertRequest, RzSignConverter, SigConverter};
use sigdb_core::layout::SigKey;
use tempfile::tempdir;

const PAT: &str = "5589E5C3 00 0000 0004 :0000 beta ^0002 gamma\n---\n";

fn request(dir: &Path, tool: Option<PathBuf>) -> ConvertRequest {
    let input = dir.join("libc.pat");
    fs::write(&input, PAT).unwrap();
    ConvertRequest {
        key: SigKey::new("elf", "x86", 64, "libc"),
        input,
        output: dir.join("libc.sig"),
        description: Some("GNU C library".to_string()),
        tool_path: tool,
        extra_args: vec!["-e".to_string(), "flirt.sig.os=linux".to_string()],
        no_postlude: false,
    }
}

#[test]
fn args_set_arch_bits_format_and_end_with_conversion() {
    let dir = tempdir().unwrap();
    let req = request(dir.path(), None);
    let args = RzSignConverter::default().build_args(&req);
    assert_eq!(
        &args[..9],
        [
            "-q",
            "-e",
            "flirt.sig.deflate=true",
            "-e",
            "asm.arch=x86",
            "-e",
            "asm.bits=64",
            "-e",
            "flirt.sig.file=elf"
        ]
    );
    assert!(args.contains(&"flirt.sig.library=GNU C library (rizin.re)".to_string()));
    assert!(args.contains(&"flirt.node.optimize=1".to_string()));
    assert!(args.contains(&"flirt.sig.os=linux".to_string()));
    let n = args.len();
    assert_eq!(args[n - 3], "-c");
    assert_eq!(args[n - 2], req.output.display().to_string());
    assert_eq!(args[n - 1], req.input.display().to_string());
}

#[test]
fn no_postlude_raises_node_optimization_and_settings_are_configurable() {
    let dir = tempdir().unwrap();
    let mut req = request(dir.path(), None);
    req.no_postlude = true;

    let settings = RzSignConfig {
        quiet: false,
        deflate: false,
        library_suffix: String::new(),
        ..Default::default()
    };
    let args = RzSignConverter::new(settings).build_args(&req);
    assert!(args.contains(&"flirt.node.optimize=2".to_string()));
    assert!(args.contains(&"flirt.sig.library=GNU C library".to_string()));
    assert!(!args.contains(&"-q".to_string()));
    assert!(!args.contains(&"flirt.sig.deflate=true".to_string()));
}

#[test]
fn missing_tool_is_reported() {
    let dir = tempdir().unwrap();
    let req = request(dir.path(), Some(dir.path().join("no-such-rz-sign")));
    let converter = RzSignConverter::default();
    let err = converter.convert(&req).unwrap_err();
    assert!(matches!(err, ConvertError::MissingTool(_)), "unexpected error: {err}");
    assert!(converter.version(Some(&dir.path().join("no-such-rz-sign"))).is_none());
}

#[test]
fn malformed_input_is_rejected_before_running_the_tool() {
    let dir = tempdir().unwrap();
    let req = request(dir.path(), Some(dir.path().join("no-such-rz-sign")));
    fs::write(&req.input, "zz\n---\n").unwrap();
    let err = RzSignConverter::default().convert(&req).unwrap_err();
    assert!(matches!(err, ConvertError::Pat(_)), "unexpected error: {err}");
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake rz-sign: answers `-v`, otherwise copies the last argument to the one before it.
#[cfg(unix)]
const FAKE_RZ_SIGN: &str = r#"#!/bin/sh
if [ "$1" = "-v" ]; then
  echo "rz-sign 0.7.0-fake"
  exit 0
fi
while [ "$#" -gt 2 ]; do shift; done
cp "$2" "$1"
"#;

#[cfg(unix)]
#[test]
fn fake_rz_sign_converts_and_reports_version() {
    let tools = tempdir().unwrap();
    let tool = write_script(tools.path(), "rz-sign", FAKE_RZ_SIGN);

    let dir = tempdir().unwrap();
    let req = request(dir.path(), Some(tool.clone()));
    let converter = RzSignConverter::default();
    let output = converter.convert(&req).expect("convert with fake rz-sign");
    assert_eq!(output.records, 1);
    assert_eq!(output.tool_path.as_deref(), Some(tool.display().to_string().as_str()));
    assert_eq!(fs::read_to_string(&req.output).unwrap(), PAT);
    assert_eq!(converter.version(Some(&tool)).as_deref(), Some("rz-sign 0.7.0-fake"));

    // The same tool drives a full build through the configured path.
    let root = tempdir().unwrap();
    let lib = root.path().join("elf/x86/64/libc");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("libc.pat"), PAT).unwrap();
    fs::write(lib.join("libc.description"), "GNU C library\n").unwrap();
    let mut config = SigdbConfig::default();
    config.rz_sign.path = Some(tool.display().to_string());

    let out = tempdir().unwrap();
    let converter = RzSignConverter::new(config.rz_sign.clone());
    let index = build_tree(root.path(), out.path(), &converter, &config, &BuildOptions::default())
        .expect("build with fake rz-sign");
    assert_eq!(index.converter, "rz-sign");
    assert_eq!(index.converter_version.as_deref(), Some("rz-sign 0.7.0-fake"));
    assert_eq!(index.entries[0].signature, "elf/x86/64/libc.sig");
    assert!(out.path().join("elf/x86/64/libc.sig").is_file());
}

#[cfg(unix)]
#[test]
fn failing_tool_surfaces_exit_status_and_stderr() {
    let tools = tempdir().unwrap();
    let tool = write_script(tools.path(), "rz-sign", "#!/bin/sh\necho 'bad pattern' >&2\nexit 3\n");

    let dir = tempdir().unwrap();
    let req = request(dir.path(), Some(tool));
    match RzSignConverter::default().convert(&req) {
        Err(ConvertError::Tool(msg)) => assert!(msg.contains("bad pattern"), "message: {msg}"),
        other => panic!("expected tool error, got {other:?}"),
    }
}
