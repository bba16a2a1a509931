//! Output coordination across worker threads.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use grepq::output::{SyncMode, Synchronizer, VecSink, Writer, WriterOptions};

fn writer<'a>(sink: &'a VecSink, sync: &'a Synchronizer) -> Writer<'a> {
    Writer::new(sink, Some(sync), WriterOptions::default())
}

#[test]
fn ordered_two_workers_out_of_order_completion() {
    let sink = VecSink::new();
    let sync = Synchronizer::new(SyncMode::Ordered);
    let s0 = sync.assign_slot();
    let s1 = sync.assign_slot();

    thread::scope(|scope| {
        scope.spawn(|| {
            // Slot 1 finishes first but must still emit second.
            let mut w = writer(&sink, &sync);
            w.begin(s1);
            w.str("B\n");
            w.release();
            w.end();
        });
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            let mut w = writer(&sink, &sync);
            w.begin(s0);
            w.str("A\n");
            w.release();
            w.end();
        });
    });

    assert_eq!(sink.take(), b"A\nB\n");
}

#[test]
fn ordered_empty_middle_worker_runs_ahead() {
    let sink = VecSink::new();
    let sync = Synchronizer::new(SyncMode::Ordered);
    let slots: Vec<usize> = (0..3).map(|_| sync.assign_slot()).collect();

    // Completion order 1, 2, 0; slot 1 has no output at all.
    thread::scope(|scope| {
        scope.spawn(|| {
            let mut w = writer(&sink, &sync);
            w.begin(slots[1]);
            w.release();
            w.end();
        });
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            let mut w = writer(&sink, &sync);
            w.begin(slots[2]);
            w.str("C\n");
            w.release();
            w.end();
        });
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(60));
            let mut w = writer(&sink, &sync);
            w.begin(slots[0]);
            w.str("A\n");
            w.release();
            w.end();
        });
    });

    assert_eq!(sink.take(), b"A\nC\n");
}

#[test]
fn ordered_many_workers_emit_in_slot_order() {
    let sink = VecSink::new();
    let sync = Synchronizer::new(SyncMode::Ordered);
    let n = 16;
    let slots: Vec<usize> = (0..n).map(|_| sync.assign_slot()).collect();

    thread::scope(|scope| {
        for &slot in slots.iter().rev() {
            let sink = &sink;
            let sync = &sync;
            scope.spawn(move || {
                // Stagger completions against slot order.
                thread::sleep(Duration::from_millis(((n - slot) % 5) as u64 * 7));
                let mut w = Writer::new(sink, Some(sync), WriterOptions::default());
                w.begin(slot);
                if slot % 3 != 1 {
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
    let expected: Vec<usize> = (0..n).filter(|s| s % 3 != 1).collect();
    assert_eq!(emitted, expected);
}

#[test]
fn unordered_blocks_are_not_interleaved() {
    let sink = VecSink::new();
    let sync = Synchronizer::new(SyncMode::Unordered);

    thread::scope(|scope| {
        for id in 0..4u8 {
            let sink = &sink;
            let sync = &sync;
            scope.spawn(move || {
                let mut w = Writer::new(sink, Some(sync), WriterOptions::default());
                w.begin(0);
                let tag = [b'a' + id];
                for _ in 0..50 {
                    w.put(&tag);
                    w.str("-line\n");
                }
                w.release();
                w.end();
            });
        }
    });

    // Each worker's 50 lines form one contiguous block.
    let data = sink.take();
    let text = String::from_utf8(data).unwrap();
    let mut seen = Vec::new();
    let mut last = None;
    for line in text.lines() {
        let tag = line.as_bytes()[0];
        if last != Some(tag) {
            seen.push(tag);
            last = Some(tag);
        }
    }
    assert_eq!(seen.len(), 4, "worker blocks interleaved: {seen:?}");
}

#[test]
fn cancel_stops_further_output() {
    let sink = VecSink::new();
    let sync = Arc::new(Synchronizer::new(SyncMode::Ordered));
    let s0 = sync.assign_slot();
    let s1 = sync.assign_slot();

    let mut w = Writer::new(&sink, Some(&sync), WriterOptions::default());
    w.begin(s0);
    w.str("first\n");
    w.release();
    w.end();

    sync.cancel();
    assert!(sync.cancelled());

    let mut w = Writer::new(&sink, Some(&sync), WriterOptions::default());
    w.begin(s1);
    w.str("after cancel\n");
    w.release();
    w.end();

    assert_eq!(sink.take(), b"first\n");
}

#[test]
fn sink_failure_cancels_siblings() {
    // Sink dies after 8 bytes; the writer that hits it cancels the sync
    // so the other slot gives up instead of waiting forever.
    let sink = VecSink::failing_after(8);
    let sync = Synchronizer::new(SyncMode::Ordered);
    let s0 = sync.assign_slot();
    let s1 = sync.assign_slot();

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut w = writer(&sink, &sync);
            w.begin(s0);
            w.str("0123456789abcdef\n");
            w.release();
            assert!(w.eof());
            w.end();
        });
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            let mut w = writer(&sink, &sync);
            w.begin(s1);
            w.str("never seen\n");
            w.release();
            w.end();
        });
    });

    assert_eq!(sink.take(), b"01234567");
}
