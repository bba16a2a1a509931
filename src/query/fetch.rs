//! Non-blocking drain of the engine-to-UI result pipe.
//!
//! The fetcher owns the pipe's read end and a fixed buffer. Each fetch
//! request pulls whatever the pipe has right now, splits it into rows on
//! newlines, and hands them to the viewport. A trailing span without a
//! newline stays an open row that the next read continues in place. A
//! closed pipe or hard read error marks EOF and cancels the engine so its
//! workers stop producing.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memchr::memchr;

use crate::pipe::PipeReader;
use crate::query::view::Viewport;

/// Size of the drain buffer; rows longer than this arrive in pieces.
pub const QUERY_BUFFER_SIZE: usize = 64 * 1024;

/// Reader side of the search pipeline.
pub struct ResultFetcher {
    reader: Option<PipeReader>,
    cancel: Option<Arc<AtomicBool>>,
    buf: Box<[u8; QUERY_BUFFER_SIZE]>,
    len: usize,
    eof: bool,
}

impl ResultFetcher {
    /// Starts idle, at EOF, with no pipe attached.
    pub fn new() -> Self {
        Self {
            reader: None,
            cancel: None,
            buf: Box::new([0u8; QUERY_BUFFER_SIZE]),
            len: 0,
            eof: true,
        }
    }

    /// Attaches a fresh pipe and the engine cancel flag for this search.
    pub fn restart(&mut self, reader: PipeReader, cancel: Arc<AtomicBool>) {
        self.close();
        self.reader = Some(reader);
        self.cancel = Some(cancel);
        self.len = 0;
        self.eof = false;
    }

    /// True once the pipe closed or errored.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Unconsumed bytes still in the drain buffer.
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// True when everything the engine will ever produce was consumed.
    pub fn drained(&self) -> bool {
        self.eof && self.len == 0
    }

    /// Closes the read end and cancels the engine. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
        self.eof = true;
    }

    /// Flips the pipe to blocking reads for the final drain before exit.
    pub fn set_blocking(&mut self) {
        if let Some(reader) = &self.reader {
            let _ = reader.set_nonblocking(false);
        }
    }

    fn mark_eof(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        if let Some(cancel) = &self.cancel {
            cancel.store(true, Ordering::Relaxed);
        }
        self.eof = true;
    }

    /// Fetches rows into `view` until row `target` exists or the pipe has
    /// nothing more to give right now. Never blocks while the pipe is in
    /// non-blocking mode.
    pub fn fetch(&mut self, target: usize, view: &mut Viewport) {
        while view.rows() <= target {
            let mut incomplete = false;
            let mut nl = memchr(b'\n', &self.buf[..self.len]);

            if nl.is_none() {
                if self.len < QUERY_BUFFER_SIZE && !self.eof {
                    let result = match self.reader.as_mut() {
                        Some(reader) => reader.read(&mut self.buf[self.len..]),
                        None => Ok(0),
                    };
                    match result {
                        Ok(0) => self.mark_eof(),
                        Ok(n) => self.len += n,
                        Err(err)
                            if err.kind() == io::ErrorKind::WouldBlock
                                || err.kind() == io::ErrorKind::Interrupted => {}
                        Err(_) => self.mark_eof(),
                    }
                }

                if self.len == 0 {
                    if self.eof {
                        // Nothing more will arrive; close any open row.
                        view.complete_row();
                    }
                    break;
                }

                nl = memchr(b'\n', &self.buf[..self.len]);
                if nl.is_none() {
                    // No newline, but either the buffer is full or the
                    // pipe hit EOF: hand over what we have. Only EOF
                    // closes the row.
                    nl = Some(self.len);
                    if !self.eof {
                        incomplete = true;
                    }
                }
            }

            let end = nl.unwrap_or(0);
            view.append_open(&self.buf[..end]);
            if !incomplete {
                view.complete_row();
            }

            let mut consumed = end;
            if consumed < self.len {
                // Skip the newline itself.
                consumed += 1;
            }
            self.buf.copy_within(consumed..self.len, 0);
            self.len -= consumed;
        }
    }
}

impl Default for ResultFetcher {
    fn default() -> Self {
        Self::new()
    }
}
