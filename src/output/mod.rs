//! Output coordination core.
//!
//! Many worker threads search different files in parallel and stream
//! buffered text to one terminal or pipe, either in arbitrary completion
//! order or strictly ordered by slot number:
//!
//! ```text
//! Worker -> Writer -> BufferChain -> (Synchronizer-gated) -> Sink
//! ```
//!
//! Each worker owns a [`Writer`] with a private [`chain::BufferChain`];
//! the global [`Synchronizer`] decides which writer may drain. The
//! [`hex::HexDumper`] is a sibling of the writer, emitting annotated hex
//! rows through it.

pub mod chain;
pub mod hex;
pub mod sync;
pub mod worker;
pub mod writer;

pub use hex::{HexClass, HexDumper};
pub use sync::{SyncMode, Synchronizer};
pub use worker::{JobQueue, Totals, Worker};
pub use writer::{Writer, WriterOptions};

use std::fs::File;
use std::io::{self, Write};

/// Final byte destination shared by all workers.
///
/// Writes go through `&self` because one sink is shared across worker
/// threads; serialization is the [`Synchronizer`]'s job, not the sink's.
/// A short write is fatal for the writer that observes it.
pub trait Sink: Send + Sync {
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&self) -> io::Result<()>;
}

impl Sink for File {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        (&*self).flush()
    }
}

/// Sink over the process stdout, locking per call.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().lock().write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// In-memory sink with an optional acceptance limit, for tests and for
/// capturing output in-process.
pub struct VecSink {
    data: std::sync::Mutex<Vec<u8>>,
    limit: Option<usize>,
}

impl VecSink {
    pub fn new() -> Self {
        Self {
            data: std::sync::Mutex::new(Vec::new()),
            limit: None,
        }
    }

    /// A sink that accepts exactly `limit` bytes, then fails.
    pub fn failing_after(limit: usize) -> Self {
        Self {
            data: std::sync::Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    /// Takes the captured bytes, leaving the sink empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.data.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for VecSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let n = match self.limit {
            Some(limit) if data.len() + buf.len() > limit => limit - data.len(),
            _ => buf.len(),
        };
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
