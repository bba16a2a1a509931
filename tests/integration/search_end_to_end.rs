//! Whole-engine runs over temporary directory trees.

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use grepq::output::VecSink;
use grepq::{run_search, SearchConfig, SortKey};
use tempfile::tempdir;

fn base_config(root: &std::path::Path, pattern: &str) -> SearchConfig {
    SearchConfig {
        pattern: pattern.to_string(),
        roots: vec![root.to_path_buf()],
        recurse: true,
        ..SearchConfig::default()
    }
}

fn run_to_string(config: &SearchConfig) -> (String, grepq::Totals) {
    let sink = VecSink::new();
    let cancel = Arc::new(AtomicBool::new(false));
    let totals = run_search(config, &sink, &cancel).unwrap();
    (String::from_utf8_lossy(&sink.take()).into_owned(), totals)
}

#[test]
fn sorted_run_emits_files_in_name_order() {
    let dir = tempdir().unwrap();
    // Sizes are chosen so completion order tends to differ from name
    // order; slot ordering must win regardless.
    fs::write(dir.path().join("zz.txt"), "needle\n").unwrap();
    fs::write(
        dir.path().join("aa.txt"),
        "filler\n".repeat(2000) + "needle\n",
    )
    .unwrap();
    fs::write(dir.path().join("mm.txt"), "needle\nneedle\n").unwrap();

    let mut config = base_config(dir.path(), "needle");
    config.sort = SortKey::Name;
    config.line_number = false;
    let (out, totals) = run_to_string(&config);

    assert_eq!(totals.files_matched, 3);
    let aa = out.find("aa.txt").unwrap();
    let mm = out.find("mm.txt").unwrap();
    let zz = out.find("zz.txt").unwrap();
    assert!(aa < mm && mm < zz, "unsorted output:\n{out}");
}

#[test]
fn reverse_sort_flips_block_order() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "x\n").unwrap();
    fs::write(dir.path().join("b.txt"), "x\n").unwrap();

    let mut config = base_config(dir.path(), "x");
    config.sort = SortKey::Name;
    config.sort_reverse = true;
    let (out, _) = run_to_string(&config);
    assert!(out.find("b.txt").unwrap() < out.find("a.txt").unwrap());
}

#[test]
fn totals_count_files_and_matches() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("one.txt"), "hit\nmiss\nhit\n").unwrap();
    fs::write(dir.path().join("two.txt"), "miss\n").unwrap();
    fs::write(dir.path().join("three.txt"), "hit hit\n").unwrap();

    let config = base_config(dir.path(), "hit");
    let (_, totals) = run_to_string(&config);
    assert_eq!(totals.files_searched, 3);
    assert_eq!(totals.files_matched, 2);
    assert_eq!(totals.matches, 4);
}

#[test]
fn width_truncation_applies_to_stream() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("wide.txt"), "abcdefg\nxy\n").unwrap();

    let mut config = base_config(dir.path(), "[a-z]");
    config.width = 5;
    config.no_filename = true;
    let (out, _) = run_to_string(&config);
    assert_eq!(out, "abcde\nxy\n");
}

#[test]
fn files_with_matches_lists_names_once() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hit.txt"), "x\nx\nx\n").unwrap();
    fs::write(dir.path().join("miss.txt"), "y\n").unwrap();

    let mut config = base_config(dir.path(), "x");
    config.files_with_matches = true;
    let (out, _) = run_to_string(&config);
    assert_eq!(out.matches("hit.txt").count(), 1);
    assert!(!out.contains("miss.txt"));
}

#[test]
fn count_mode_reports_per_file_lines() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("data.txt"), "a\na\nb\n").unwrap();

    let mut config = base_config(dir.path(), "a");
    config.count = true;
    let (out, _) = run_to_string(&config);
    assert!(out.trim_end().ends_with(":2") || out.trim_end() == "2");
}

#[test]
fn cancel_before_start_produces_nothing() {
    let dir = tempdir().unwrap();
    for i in 0..50 {
        fs::write(dir.path().join(format!("f{i}.txt")), "needle\n").unwrap();
    }

    let config = base_config(dir.path(), "needle");
    let sink = VecSink::new();
    let cancel = Arc::new(AtomicBool::new(true));
    let totals = run_search(&config, &sink, &cancel).unwrap();
    assert_eq!(totals.files_searched, 0);
    assert!(sink.take().is_empty());
}

#[test]
fn heading_mode_frames_filenames_for_the_ui() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("f1.txt"), "match one\n").unwrap();

    let mut config = base_config(dir.path(), "match");
    config.frame_names = true;
    config.with_filename = true;
    let (out, _) = run_to_string(&config);

    let bytes = out.as_bytes();
    assert_eq!(bytes[0], 0, "heading must start with NUL framing");
    let mut last = Vec::new();
    let heading = out.lines().next().unwrap();
    assert!(grepq::query::view::is_filename(
        heading.as_bytes(),
        false,
        &mut last
    ));
    assert!(String::from_utf8_lossy(&last).ends_with("f1.txt"));
}
