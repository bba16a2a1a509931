//! Search engine: pattern compilation, directory walking, and per-file
//! matching.
//!
//! The engine is the synchronous collaborator behind both frontends. One
//! call to [`run_search`] walks the configured roots, fans the file list
//! out over a pool of worker threads, and streams results to the caller's
//! sink until completion or cancel. The output coordination layer (writers,
//! synchronizer, hex dump) lives in [`crate::output`]; this module decides
//! *what* to emit, not *when* it reaches the sink.

pub mod searcher;
pub mod walk;

use std::fmt;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use regex::bytes::{Regex, RegexBuilder};

use crate::flags::{SearchConfig, SortKey};
use crate::output::{JobQueue, Sink, SyncMode, Synchronizer, Totals, Worker};

/// Upper bound on worker threads; beyond this the sink is the bottleneck.
const MAX_WORKERS: usize = 12;

/// Errors surfaced by the engine. Per-file read errors are not here; they
/// are logged and the file is skipped.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The assembled pattern failed to compile. `pos` is a byte offset
    /// into the assembled pattern; subtract
    /// [`pattern_prefix_len`] to map it onto the user's input.
    Regex { msg: String, pos: usize },
    /// I/O error opening a search root.
    Io(io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex { msg, .. } => write!(f, "{msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Compiled search state shared read-only by all workers.
#[derive(Debug)]
pub struct SearchCtx {
    pub config: SearchConfig,
    pub re: Regex,
}

impl SearchCtx {
    /// Colors are produced when requested or when the interactive frontend
    /// consumes the stream; the UI strips them at render time in mono.
    pub fn color(&self) -> bool {
        self.config.color || self.config.frame_names
    }
}

/// Bytes the engine prepends to the user's pattern before compiling, used
/// to map regex error offsets back onto the pattern as typed.
pub fn pattern_prefix_len(config: &SearchConfig) -> usize {
    if config.fixed_strings {
        // Escaping rewrites the pattern; offsets are meaningless past it.
        return 0;
    }
    if config.word_regexp {
        br"\b(?:".len()
    } else if config.line_regexp {
        b"^(?:".len()
    } else {
        0
    }
}

/// Wraps the user's pattern per the matcher flags.
fn assemble_pattern(config: &SearchConfig) -> String {
    let base = if config.fixed_strings {
        regex::escape(&config.pattern)
    } else {
        config.pattern.clone()
    };
    if config.word_regexp {
        format!(r"\b(?:{base})\b")
    } else if config.line_regexp {
        format!("^(?:{base})$")
    } else {
        base
    }
}

/// Compiles the configured pattern into a shared [`SearchCtx`].
pub fn build_ctx(config: &SearchConfig) -> Result<SearchCtx, EngineError> {
    let assembled = assemble_pattern(config);
    let re = RegexBuilder::new(&assembled)
        .case_insensitive(config.case_insensitive())
        .build()
        .map_err(|err| regex_error(&assembled, err))?;
    Ok(SearchCtx {
        config: config.clone(),
        re,
    })
}

/// Extracts a byte offset from a compile failure by reparsing with the
/// syntax crate, which tracks spans; the offset falls back to the end of
/// the pattern when no span is available.
fn regex_error(assembled: &str, err: regex::Error) -> EngineError {
    let pos = match regex_syntax::Parser::new().parse(assembled) {
        Err(regex_syntax::Error::Parse(e)) => e.span().start.offset,
        Err(regex_syntax::Error::Translate(e)) => e.span().start.offset,
        _ => assembled.len(),
    };
    EngineError::Regex {
        msg: err.to_string(),
        pos,
    }
}

/// Runs one search to completion or cancel, writing results to `sink`.
///
/// The file list is gathered up front (it also fixes slot order for sorted
/// output), then drained by a worker pool. The returned totals aggregate
/// all workers.
pub fn run_search(
    config: &SearchConfig,
    sink: &dyn Sink,
    cancel: &Arc<AtomicBool>,
) -> Result<Totals, EngineError> {
    let mut config = config.clone();

    let files = walk::collect_files(&config, cancel);

    // Filenames are shown by default when more than one file is searched.
    if !config.with_filename && !config.no_filename {
        config.with_filename = files.len() > 1 || config.recurse;
    }

    let ctx = build_ctx(&config)?;

    let mode = if config.sort == SortKey::None {
        SyncMode::Unordered
    } else {
        SyncMode::Ordered
    };
    let sync = Synchronizer::new(mode);
    let queue = JobQueue::new(files, &sync);

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
        .min(queue.len().max(1));

    tracing::debug!(
        files = queue.len(),
        workers,
        ordered = mode == SyncMode::Ordered,
        "starting search"
    );

    let mut totals = Totals::default();
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = &queue;
            let sync = &sync;
            let ctx = &ctx;
            let cancel = cancel.as_ref();
            handles.push(scope.spawn(move || {
                let mut worker = Worker::new(sink, Some(sync), ctx, cancel);
                worker.run(queue)
            }));
        }
        for handle in handles {
            if let Ok(t) = handle.join() {
                totals.add(t);
            }
        }
    });

    tracing::debug!(?totals, "search finished");
    Ok(totals)
}
