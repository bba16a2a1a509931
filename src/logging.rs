//! File-backed tracing setup.
//!
//! The interactive frontend owns the terminal, so diagnostics go to a log
//! file instead of stderr. Batch mode uses the same sink to keep search
//! output clean for pipes. Filtering comes from `GREPQ_LOG` (standard
//! `EnvFilter` syntax); without it only warnings are recorded.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the background log writer alive for the process lifetime.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initializes tracing into `$XDG_STATE_HOME/grepq/` (or the temp dir).
/// Returns `None` when the directory cannot be created or a subscriber is
/// already installed; the program runs fine without logs.
pub fn init() -> Option<LoggingGuard> {
    let dir = log_dir()?;
    let appender = tracing_appender::rolling::daily(&dir, "grepq.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env("GREPQ_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true),
    );
    if subscriber.try_init().is_err() {
        return None;
    }
    Some(LoggingGuard { _guard: guard })
}

fn log_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/state")))
        .unwrap_or_else(std::env::temp_dir);
    let dir = base.join("grepq");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
