//! Quantified writer, hex, and synchronizer laws.

use grepq::output::{
    HexClass, HexDumper, SyncMode, Synchronizer, VecSink, Writer, WriterOptions,
};
use proptest::prelude::*;
use std::thread;

fn emit(opts: WriterOptions, f: impl FnOnce(&mut Writer<'_>)) -> Vec<u8> {
    let sink = VecSink::new();
    let mut w = Writer::new(&sink, None, opts);
    f(&mut w);
    w.flush();
    sink.take()
}

proptest! {
    /// Emitted bytes reach the sink unchanged and in order.
    #[test]
    fn flush_preserves_bytes(chunks in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 0..512), 0..20)
    ) {
        let expected: Vec<u8> = chunks.concat();
        let out = emit(WriterOptions::default(), |w| {
            for chunk in &chunks {
                w.put(chunk);
            }
        });
        prop_assert_eq!(out, expected);
    }

    /// A UTF-8-limited emit never ends inside a code point and never
    /// exceeds the character budget.
    #[test]
    fn utf8n_ends_on_boundary(text in "\\PC{0,64}", k in 0usize..80) {
        let out = emit(WriterOptions::default(), |w| w.utf8n(text.as_bytes(), k));
        let s = std::str::from_utf8(&out).expect("split a code point");
        prop_assert!(s.chars().count() <= k);
        prop_assert!(text.starts_with(s));
    }

    /// Width-truncated output never shows more than `width` data columns
    /// per line, and short lines pass through untouched.
    #[test]
    fn width_limits_visible_columns(
        lines in proptest::collection::vec("[a-z]{0,20}", 1..10),
        width in 1usize..12,
    ) {
        let mut input = Vec::new();
        for line in &lines {
            input.extend_from_slice(line.as_bytes());
            input.push(b'\n');
        }
        let out = emit(
            WriterOptions { line_buffered: false, max_width: width },
            |w| w.put(&input),
        );
        let text = String::from_utf8(out).unwrap();
        let got: Vec<&str> = text.lines().collect();
        prop_assert_eq!(got.len(), lines.len());
        for (shown, full) in got.iter().zip(&lines) {
            let expect = &full[..full.len().min(width)];
            prop_assert_eq!(*shown, expect);
        }
    }

    /// Two consecutive fully-identical hex rows produce exactly one data
    /// row followed by a single `*` row, however long the run is.
    #[test]
    fn hex_elision_collapses_runs(
        row in proptest::collection::vec(any::<u8>(), 16),
        repeats in 2usize..6,
    ) {
        let sink = VecSink::new();
        let mut w = Writer::new(&sink, None, WriterOptions::default());
        let mut dumper = HexDumper::new(16, false);
        for i in 0..repeats {
            dumper.dump(HexClass::Line, i * 16, &row, &mut w);
        }
        dumper.done(&mut w);
        w.flush();
        let text = String::from_utf8(sink.take()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines.len(), 2);
        prop_assert!(lines[0].starts_with("00000000"));
        prop_assert_eq!(lines[1], "*");
    }

    /// ORDERED runs concatenate emit blocks in ascending slot order no
    /// matter how completions are scheduled.
    #[test]
    fn ordered_concatenation_is_sorted(
        produces in proptest::collection::vec(any::<bool>(), 2..8),
    ) {
        let sink = VecSink::new();
        let sync = Synchronizer::new(SyncMode::Ordered);
        let slots: Vec<usize> = (0..produces.len()).map(|_| sync.assign_slot()).collect();

        thread::scope(|scope| {
            for (&slot, &produce) in slots.iter().zip(&produces).rev() {
                let sink = &sink;
                let sync = &sync;
                scope.spawn(move || {
                    let mut w = Writer::new(sink, Some(sync), WriterOptions::default());
                    w.begin(slot);
                    if produce {
                        w.num(slot, 1);
                        w.nl();
                    }
                    w.release();
                    w.end();
                });
            }
        });

        let text = String::from_utf8(sink.take()).unwrap();
        let emitted: Vec<usize> = text.lines().map(|l| l.parse().unwrap()).collect();
        let expected: Vec<usize> = slots
            .iter()
            .zip(&produces)
            .filter(|&(_, &p)| p)
            .map(|(&s, _)| s)
            .collect();
        prop_assert_eq!(emitted, expected);
    }
}
