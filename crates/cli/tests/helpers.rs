use std::fs;
use std::path::Path;

use sigdb::{canonicalize_or_current, level_for_verbosity, library_name_from_dir};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_keeps_absolute_existing_paths() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("elf/x86");
    fs::create_dir_all(&nested).expect("create nested");

    let result = canonicalize_or_current(&nested.to_string_lossy()).expect("canonicalize");
    assert_eq!(result, nested.canonicalize().expect("canonicalize nested"));
}

#[test]
fn library_name_uses_last_path_component() {
    assert_eq!(library_name_from_dir(Path::new("/sigdb/elf/x86/64/libc")).unwrap(), "libc");
    assert!(library_name_from_dir(Path::new("/")).is_err());
}

#[test]
fn verbosity_maps_to_filter_levels() {
    assert_eq!(level_for_verbosity(0), "warn");
    assert_eq!(level_for_verbosity(1), "info");
    assert_eq!(level_for_verbosity(2), "debug");
    assert_eq!(level_for_verbosity(9), "trace");
}
