//! The engine-to-UI pipeline: pipe, fetcher, viewport, cancellation.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use grepq::pipe::nonblocking_pipe;
use grepq::query::fetch::ResultFetcher;
use grepq::query::view::{is_filename, Viewport};
use grepq::{run_search, SearchConfig};
use tempfile::tempdir;

fn ui_config(root: &std::path::Path, pattern: &str) -> SearchConfig {
    SearchConfig {
        pattern: pattern.to_string(),
        roots: vec![root.to_path_buf()],
        recurse: true,
        frame_names: true,
        with_filename: true,
        line_buffered: true,
        sort: grepq::SortKey::Name,
        ..SearchConfig::default()
    }
}

/// Drives one search through a pipe into a viewport, like the UI tick
/// loop does, until the stream drains.
fn search_into_view(config: &SearchConfig) -> Viewport {
    let (reader, writer) = nonblocking_pipe().unwrap();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut fetcher = ResultFetcher::new();
    fetcher.restart(reader, Arc::clone(&cancel));

    let engine_cancel = Arc::clone(&cancel);
    let config = config.clone();
    let search = thread::spawn(move || {
        let _ = run_search(&config, &writer, &engine_cancel);
        writer.close();
    });

    let mut view = Viewport::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !fetcher.drained() {
        fetcher.fetch(view.rows() + 64, &mut view);
        assert!(Instant::now() < deadline, "pipeline stalled");
        thread::sleep(Duration::from_millis(5));
    }
    search.join().unwrap();
    view
}

#[test]
fn results_stream_into_rows_with_framing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("f1.txt"), "match one\nmatch two\n").unwrap();
    fs::write(dir.path().join("f2.txt"), "match three\n").unwrap();

    let view = search_into_view(&ui_config(dir.path(), "match"));
    // Two headings plus three match lines.
    assert_eq!(view.rows(), 5);

    let mut last = Vec::new();
    let markers: Vec<usize> = (0..view.rows())
        .filter(|&i| is_filename(view.line(i), false, &mut last))
        .collect();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0], 0);
    assert_eq!(markers[1], 3);
}

#[test]
fn filename_navigation_next_and_back() {
    // The marker scan the ^S/^W keys run over the row vector.
    let rows: Vec<&[u8]> = vec![b"\0m\0f1\0x", b"match2", b"\0m\0f2\0x"];
    let mut view = Viewport::new();
    for row in &rows {
        view.append_open(row);
        view.complete_row();
    }

    // next(): record the name under the cursor, then scan down for a
    // differing marker.
    let mut name = Vec::new();
    is_filename(view.line(0), false, &mut name);
    let mut pos = 0;
    for i in 1..view.rows() {
        if is_filename(view.line(i), false, &mut name) {
            pos = i;
            break;
        }
    }
    assert_eq!(pos, 2);

    // back(): scan up the same way.
    let mut name = Vec::new();
    is_filename(view.line(pos), false, &mut name);
    let mut back = pos;
    while back > 0 {
        back -= 1;
        if is_filename(view.line(back), false, &mut name) {
            break;
        }
    }
    assert_eq!(back, 0);
}

#[test]
fn closing_the_fetcher_cancels_the_engine() {
    // The UI ignores SIGPIPE and relies on EPIPE plus the cancel flag;
    // do the same here or the default handler kills the test process.
    unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };

    let dir = tempdir().unwrap();
    for i in 0..300 {
        fs::write(
            dir.path().join(format!("file{i:03}.txt")),
            "needle\n".repeat(50),
        )
        .unwrap();
    }

    let (reader, writer) = nonblocking_pipe().unwrap();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut fetcher = ResultFetcher::new();
    fetcher.restart(reader, Arc::clone(&cancel));

    let engine_cancel = Arc::clone(&cancel);
    let config = ui_config(dir.path(), "needle");
    let search = thread::spawn(move || {
        let _ = run_search(&config, &writer, &engine_cancel);
        writer.close();
    });

    // Simulate the user editing the pattern: drop the pipe mid-stream.
    let mut view = Viewport::new();
    fetcher.fetch(4, &mut view);
    fetcher.close();
    assert!(cancel.load(Ordering::Relaxed));

    // The engine must wind down promptly on the closed pipe.
    let start = Instant::now();
    search.join().unwrap();
    assert!(Instant::now() - start < Duration::from_secs(10));
}

#[test]
fn restart_discards_old_results() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "alpha line\nabandon\n").unwrap();

    // First search: pattern "a".
    let view = search_into_view(&ui_config(dir.path(), "a"));
    assert!(view.rows() >= 3);

    // The user types "b": the controller clears the viewport and starts
    // over with a fresh pipe; only "ab" matches remain.
    let view = search_into_view(&ui_config(dir.path(), "ab"));
    let text: Vec<String> = (0..view.rows())
        .map(|i| String::from_utf8_lossy(view.line(i)).into_owned())
        .collect();
    // Match highlighting splits "abandon" around the SGR reset.
    assert!(text.iter().any(|l| l.contains("andon")));
    assert!(!text.iter().any(|l| l.contains("alpha")));
}

#[test]
fn selection_survives_streaming_appends() {
    let mut view = Viewport::new();
    view.select_all = true;
    view.append_open(b"first");
    view.complete_row();
    // A row arriving in two pieces is still one selected row.
    view.append_open(b"second ");
    view.append_open(b"half");
    view.complete_row();
    assert_eq!(view.rows(), 2);
    assert!(view.is_selected(0));
    assert!(view.is_selected(1));
    assert_eq!(view.line(1), b"second half");
}
