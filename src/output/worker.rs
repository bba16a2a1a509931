//! Per-file search tasks and the job queue feeding them.
//!
//! A [`Worker`] is owned by one thread. It pulls jobs (one job = one file)
//! from the shared [`JobQueue`], announces the job's slot to the
//! synchronizer through its writer, runs the engine's per-file search, and
//! releases the slot. Slots are assigned at queue construction in file
//! order, so ORDERED output follows the sorted file list regardless of
//! which worker finishes first.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::engine::searcher;
use crate::engine::walk::FileEntry;
use crate::engine::SearchCtx;
use crate::output::hex::HexDumper;
use crate::output::writer::Writer;
use crate::output::{Sink, Synchronizer, WriterOptions};

/// Aggregate results of one search run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub files_searched: u64,
    pub files_matched: u64,
    pub matches: u64,
}

impl Totals {
    pub fn add(&mut self, other: Totals) {
        self.files_searched += other.files_searched;
        self.files_matched += other.files_matched;
        self.matches += other.matches;
    }
}

/// Shared queue of per-file jobs with slots preassigned in file order.
pub struct JobQueue {
    entries: Vec<(usize, FileEntry)>,
    next: AtomicUsize,
}

impl JobQueue {
    /// Builds the queue, drawing one slot per file from `sync` in order.
    pub fn new(files: Vec<FileEntry>, sync: &Synchronizer) -> Self {
        let entries = files
            .into_iter()
            .map(|entry| (sync.assign_slot(), entry))
            .collect();
        Self {
            entries,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claims the next pending job.
    fn claim(&self) -> Option<&(usize, FileEntry)> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.get(idx)
    }
}

/// Per-file search task runner bound to one thread.
pub struct Worker<'a> {
    writer: Writer<'a>,
    hex: HexDumper,
    ctx: &'a SearchCtx,
    cancel: &'a AtomicBool,
}

impl<'a> Worker<'a> {
    pub fn new(
        sink: &'a dyn Sink,
        sync: Option<&'a Synchronizer>,
        ctx: &'a SearchCtx,
        cancel: &'a AtomicBool,
    ) -> Self {
        let opts = WriterOptions {
            line_buffered: ctx.config.line_buffered,
            max_width: ctx.config.width,
        };
        Self {
            writer: Writer::new(sink, sync, opts),
            hex: HexDumper::new(ctx.config.hex_columns, ctx.color()),
            ctx,
            cancel,
        }
    }

    /// Drains the queue. After a cancel, remaining slots are still claimed
    /// and ended so no ORDERED peer waits on a turn that never comes.
    pub fn run(&mut self, queue: &JobQueue) -> Totals {
        let mut totals = Totals::default();
        while let Some(&(slot, ref entry)) = queue.claim() {
            self.writer.begin(slot);

            if self.cancel.load(Ordering::Relaxed) || self.writer.cancelled() || self.writer.eof() {
                self.writer.discard();
                self.writer.end();
                continue;
            }

            match searcher::search_file(entry, self.ctx, &mut self.writer, &mut self.hex, self.cancel)
            {
                Ok(result) => {
                    totals.files_searched += 1;
                    if result.matches > 0 {
                        totals.files_matched += 1;
                        totals.matches += result.matches;
                    }
                }
                Err(err) => {
                    tracing::debug!(path = %entry.path.display(), %err, "skipping unreadable file");
                }
            }

            self.writer.release();
            self.writer.end();
        }
        totals
    }
}
