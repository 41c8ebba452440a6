use std::fs;
use std::path::Path;

use sigdb_core::config::{config_path, load_config, SigdbConfig};
use sigdb_core::layout::{
    discover_libraries, find_pat_files, library_layouts, LayoutError, LibraryLayout, SigKey,
};
use tempfile::tempdir;

#[test]
fn sig_key_parses_relative_paths() {
    let key = SigKey::from_relative(Path::new("elf/x86/64/libc")).unwrap();
    assert_eq!(key, SigKey::new("elf", "x86", 64, "libc"));
    assert_eq!(key.to_string(), "elf/x86/64/libc");
    assert!(key.relative_dir().ends_with("elf/x86/64/libc"));
}

#[test]
fn sig_key_rejects_wrong_depth_and_bits() {
    assert!(matches!(
        SigKey::from_relative(Path::new("elf/x86/64")),
        Err(LayoutError::WrongDepth(_))
    ));
    assert!(matches!(
        SigKey::from_relative(Path::new("elf/x86/64/libc/extra")),
        Err(LayoutError::WrongDepth(_))
    ));
    assert!(matches!(
        SigKey::from_relative(Path::new("elf/x86/sixtyfour/libc")),
        Err(LayoutError::InvalidBits(bits)) if bits == "sixtyfour"
    ));
}

#[test]
fn library_layout_computes_file_paths() {
    let root = tempdir().unwrap();
    let layout = LibraryLayout::new(root.path(), SigKey::new("pe", "arm", 32, "msvcrt"));
    assert!(layout.dir.ends_with("pe/arm/32/msvcrt"));
    assert!(layout.pat_path.ends_with("msvcrt/msvcrt.pat"));
    assert!(layout.description_path.ends_with("msvcrt/msvcrt.description"));
    assert!(layout.manifest_path.ends_with("msvcrt/msvcrt.src.sha1"));
    assert_eq!(
        layout.expected_file_names(),
        [
            "msvcrt.pat".to_string(),
            "msvcrt.description".to_string(),
            "msvcrt.src.sha1".to_string()
        ]
    );
}

#[test]
fn discover_libraries_skips_hidden_and_shallow_entries() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("elf/x86/64/libc")).unwrap();
    fs::create_dir_all(root.path().join("elf/arm/32/libm")).unwrap();
    fs::create_dir_all(root.path().join(".git/objects/ab/cd")).unwrap();
    fs::create_dir_all(root.path().join("pe/x86/32")).unwrap();
    fs::create_dir_all(root.path().join("elf/x86/big/libz")).unwrap();
    fs::write(root.path().join("elf/x86/64/notes.txt"), "not a library").unwrap();

    let found = discover_libraries(root.path()).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(found.iter().filter(|r| r.is_err()).count(), 1);

    let layouts = library_layouts(root.path()).unwrap();
    let keys: Vec<String> = layouts.iter().map(|l| l.key.to_string()).collect();
    assert_eq!(keys, vec!["elf/arm/32/libm", "elf/x86/64/libc"]);
}

#[test]
fn discover_libraries_errors_for_missing_root() {
    let root = tempdir().unwrap();
    let missing = root.path().join("nope");
    assert!(matches!(discover_libraries(&missing), Err(LayoutError::MissingRoot(_))));
}

#[test]
fn config_defaults_when_file_missing() {
    let root = tempdir().unwrap();
    let config = load_config(root.path()).unwrap();
    assert_eq!(config, SigdbConfig::default());
    assert_eq!(config.max_description_len, 1024);
    assert!(config.allows_format("elf"));
    assert!(config.allows_arch("x86"));
    assert!(config.allows_bits(64));
    assert!(!config.allows_bits(8));
    assert_eq!(config.default_converter, "pat");
}

#[test]
fn config_yaml_overrides_selected_fields() {
    let root = tempdir().unwrap();
    fs::write(
        config_path(root.path()),
        "formats: [elf, coff]\nbits: [8, 16]\nrz_sign:\n  path: /opt/rizin/bin/rz-sign\n  deflate: false\n  extra_args: [\"-e\", \"flirt.sig.os=linux\"]\n",
    )
    .unwrap();

    let config = load_config(root.path()).unwrap();
    assert!(config.allows_format("coff"));
    assert!(!config.allows_format("pe"));
    assert!(config.allows_bits(8));
    assert!(config.allows_arch("mips"), "unset fields keep defaults");
    assert_eq!(config.rz_sign.extra_args.len(), 2);
    assert!(!config.rz_sign.deflate);
    assert!(config.rz_sign.quiet, "unset rz-sign fields keep defaults");
    assert_eq!(config.rz_sign.library_suffix, " (rizin.re)");
    assert_eq!(
        config.rz_sign_path().as_deref(),
        Some(Path::new("/opt/rizin/bin/rz-sign"))
    );
}

#[test]
fn config_reports_invalid_yaml() {
    let root = tempdir().unwrap();
    fs::write(config_path(root.path()), "bits: [sixty-four]\n").unwrap();
    let err = load_config(root.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config YAML"));
}

#[test]
fn find_pat_files_optionally_recurses_and_skips_hidden_entries() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("deep/er")).unwrap();
    fs::create_dir_all(dir.path().join(".cache")).unwrap();
    for rel in ["b.pat", "a.pat", "notes.txt", "deep/er/c.pat", ".cache/d.pat", ".hidden.pat"] {
        fs::write(dir.path().join(rel), "---\n").unwrap();
    }

    let flat = find_pat_files(dir.path(), false).unwrap();
    assert_eq!(flat, vec![dir.path().join("a.pat"), dir.path().join("b.pat")]);

    let deep = find_pat_files(dir.path(), true).unwrap();
    assert_eq!(deep.len(), 3);
    assert!(deep.contains(&dir.path().join("deep/er/c.pat")));

    assert!(matches!(
        find_pat_files(&dir.path().join("absent"), false),
        Err(LayoutError::MissingRoot(_))
    ));
}
