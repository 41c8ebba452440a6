use sigdb_core::merge::{dedup, dedup_with, merge, merge_with, MergeOptions};
use sigdb_core::pat::filter::{is_bad_symbol, masked_percent};
use sigdb_core::pat::{DropReason, PatFile, PatRecord, RecordFilter};

const ALPHA: &str = "5589E583EC18........ 00 0000 000A :0000 alpha";
const BETA: &str = "5589E5C3 00 0000 0004 :0000 beta ^0002 gamma";
const DELTA: &str = "5589E5C3 00 0000 0004 :0000 delta";
const LOCAL: &str = "31C0C3 00 0000 0003 :0000@ local_zero";

fn pat(lines: &[&str]) -> PatFile {
    let mut body = lines.join("\n");
    body.push_str("\n---\n");
    PatFile::parse(&body).expect("parse fixture")
}

#[test]
fn merge_collapses_duplicates_and_sorts() {
    let a = pat(&[BETA, ALPHA]);
    let b = pat(&[ALPHA, LOCAL]);

    let outcome = merge(&[a, b]);
    assert_eq!(outcome.input_records, 4);
    assert_eq!(outcome.duplicates, 1);
    assert!(outcome.collisions.is_empty());
    assert!(outcome.file.terminated);
    assert_eq!(outcome.file.render(), format!("{LOCAL}\n{ALPHA}\n{BETA}\n---\n"));
}

#[test]
fn merge_output_does_not_depend_on_input_order() {
    let a = pat(&[BETA, DELTA]);
    let b = pat(&[LOCAL, ALPHA]);

    let forward = merge(&[a.clone(), b.clone()]);
    let backward = merge(&[b, a]);
    assert_eq!(forward.file, backward.file);
}

#[test]
fn every_input_record_is_present_exactly_once() {
    let inputs = [pat(&[ALPHA, BETA, BETA]), pat(&[DELTA, ALPHA]), pat(&[LOCAL])];
    let outcome = merge(&inputs);

    for input in &inputs {
        for record in &input.records {
            let count = outcome.file.records.iter().filter(|r| *r == record).count();
            assert_eq!(count, 1, "record {record} should appear once");
        }
    }
    assert_eq!(outcome.file.len(), 4);
}

#[test]
fn merge_is_idempotent() {
    let once = merge(&[pat(&[BETA, ALPHA, BETA])]);
    let twice = dedup(&once.file);
    assert_eq!(once.file, twice.file);
    assert!(twice.is_clean());
}

#[test]
fn collisions_are_reported_and_kept() {
    let outcome = dedup(&pat(&[BETA, DELTA, ALPHA]));
    assert_eq!(outcome.file.len(), 3);
    assert_eq!(outcome.collisions.len(), 1);
    assert_eq!(outcome.collisions[0].names, vec!["beta".to_string(), "delta".to_string()]);
    assert_eq!(outcome.collisions[0].key, "5589E5C3 00 0000 0004");
    assert!(!outcome.is_clean());
}

#[test]
fn same_name_with_different_references_is_not_a_collision() {
    let other_refs = "5589E5C3 00 0000 0004 :0000 beta ^0002 epsilon";
    let outcome = dedup(&pat(&[BETA, other_refs]));
    assert_eq!(outcome.file.len(), 2);
    assert!(outcome.collisions.is_empty());
}

#[test]
fn merging_nothing_yields_an_empty_terminated_file() {
    let outcome = merge(&[]);
    assert!(outcome.file.is_empty());
    assert_eq!(outcome.file.render(), "---\n");
}

fn curated() -> MergeOptions {
    MergeOptions { filter: Some(RecordFilter::default()), ..Default::default() }
}

#[test]
fn curation_drops_generated_names_empty_functions_and_masked_preludes() {
    let noise = pat(&[
        "5589E5C3 00 0000 0000 :0000 zero_sized",
        "5589E5C3 00 0000 0010 :0000 fcn.00001000",
        "5589E5C3 00 0000 0010 :0000 entry0",
        "........ 00 0000 0010 :0000 masked",
        ALPHA,
    ]);

    let kept = dedup(&noise);
    assert_eq!(kept.file.len(), 5);

    let outcome = dedup_with(&noise, &curated());
    assert_eq!(outcome.input_records, 5);
    assert_eq!(outcome.file.len(), 1);
    assert_eq!(outcome.file.records[0].primary_name(), "alpha");
    assert_eq!(outcome.dropped_count(), 4);
    assert_eq!(outcome.dropped[&DropReason::BadSymbol], 2);
    assert_eq!(outcome.dropped[&DropReason::ZeroSize], 1);
    assert_eq!(outcome.dropped[&DropReason::MaskedPrelude], 1);
    assert!(!outcome.is_clean());
}

#[test]
fn bad_symbol_names_follow_generator_conventions() {
    for name in ["", "entry0", "fcn.00401000", "loc.0040", "sub.printf_10", "case.0x10", "reloc.puts"] {
        assert!(is_bad_symbol(name), "{name} should be rejected");
    }
    for name in ["main", "entry", "_sub.x", "case_default"] {
        assert!(!is_bad_symbol(name), "{name} should be kept");
    }
}

#[test]
fn masked_threshold_is_a_percentage_of_pattern_digits() {
    let half = PatRecord::parse_line("5589.... 00 0000 0010 :0000 half").unwrap();
    let mostly = PatRecord::parse_line("55...... 00 0000 0010 :0000 mostly").unwrap();
    assert_eq!(masked_percent(&half), 50.0);
    assert_eq!(masked_percent(&mostly), 75.0);

    let filter = RecordFilter::default();
    assert!(filter.apply(&half).is_ok());
    assert_eq!(filter.apply(&mostly), Err(DropReason::TooMasked));

    let strict = RecordFilter { max_masked: 25, ..Default::default() };
    assert_eq!(strict.apply(&half), Err(DropReason::TooMasked));

    // A CRC window counts towards the known part of the pattern.
    let crc = PatRecord::parse_line("55...... 10 1234 0040 :0000 crc").unwrap();
    assert!(filter.apply(&crc).is_ok());
}

#[test]
fn postlude_is_truncated_and_trailing_variant_bytes_stripped() {
    let record = PatRecord::parse_line("5589E5C3 00 0000 0040 :0000 tail 8B45....C3....").unwrap();

    let filter = RecordFilter { max_postlude: 4, ..Default::default() };
    let kept = filter.apply(&record).unwrap();
    assert_eq!(kept.tail, vec![Some(0x8B), Some(0x45)]);

    let kept = RecordFilter::default().apply(&record).unwrap();
    assert_eq!(kept.tail, vec![Some(0x8B), Some(0x45), None, None, Some(0xC3)]);

    let kept = RecordFilter { max_postlude: 0, ..Default::default() }.apply(&record).unwrap();
    assert!(kept.tail.is_empty());
    assert_eq!(kept.to_string(), "5589E5C3 00 0000 0040 :0000 tail");
}

#[test]
fn truncated_tails_can_turn_records_into_duplicates() {
    let a = "5589E5C3 00 0000 0040 :0000 same 8B45C3";
    let b = "5589E5C3 00 0000 0040 :0000 same 8B4590";
    let options = MergeOptions {
        filter: Some(RecordFilter { max_postlude: 2, ..Default::default() }),
        ..Default::default()
    };
    let outcome = merge_with(&[pat(&[a]), pat(&[b])], &options);
    assert_eq!(outcome.file.len(), 1);
    assert_eq!(outcome.duplicates, 1);
}

#[test]
fn collapsing_collisions_keeps_the_first_record_in_output_order() {
    let input = pat(&[DELTA, BETA, ALPHA]);

    let kept = dedup(&input);
    assert_eq!(kept.file.len(), 3);
    assert_eq!(kept.collapsed, 0);

    let options = MergeOptions { collapse_collisions: true, ..Default::default() };
    let collapsed = dedup_with(&input, &options);
    assert_eq!(collapsed.file.len(), 2);
    assert_eq!(collapsed.collapsed, 1);
    let names: Vec<&str> = collapsed.file.records.iter().map(|r| r.primary_name()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    // The collision is still reported so the dropped name is visible.
    assert_eq!(collapsed.collisions[0].names, vec!["beta".to_string(), "delta".to_string()]);
}
