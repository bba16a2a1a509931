//! Per-worker typed output facade.
//!
//! A [`Writer`] owns one [`BufferChain`] and drains it to the shared
//! [`Sink`], gated by the optional [`Synchronizer`]. Emit operations never
//! block: when the cursor buffer runs out and the sink cannot be taken
//! right now (or output is held), the chain grows instead.
//!
//! Failure model: a short write, a sink error, or synchronizer cancellation
//! silently moves the writer into an EOF state. Every later emit and flush
//! is a no-op; the cancel is propagated to the synchronizer so sibling
//! workers stop producing as well.

use super::chain::BufferChain;
use super::sync::{SyncGuard, Synchronizer};
use super::Sink;

/// Mode bit: flush after each newline (line-buffered output).
pub const FLUSH: u8 = 1;
/// Mode bit: hold all output in the chain, suppressing every flush.
pub const HOLD: u8 = 2;
/// Mode bit: the current file was detected as binary. Advisory.
pub const BINARY: u8 = 4;

/// ANSI escape recognizer state for width-truncated flushing.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Ansi {
    Na,
    Esc,
    Csi,
    Osc,
    OscEsc,
}

/// Tuning shared by every writer of one search.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriterOptions {
    /// Flush on every newline.
    pub line_buffered: bool,
    /// Truncate output lines to this many columns; 0 disables.
    pub max_width: usize,
}

/// Buffered, synchronizer-aware typed output writer.
pub struct Writer<'a> {
    sink: &'a dyn Sink,
    sync: Option<&'a Synchronizer>,
    lock: Option<SyncGuard<'a>>,
    chain: BufferChain,
    slot: usize,
    mode: u8,
    line_buffered: bool,
    eof: bool,
    // Width truncation state, persistent across flushed blocks.
    max_width: usize,
    cols: usize,
    ansi: Ansi,
    skip: bool,
}

impl<'a> Writer<'a> {
    pub fn new(sink: &'a dyn Sink, sync: Option<&'a Synchronizer>, opts: WriterOptions) -> Self {
        Self {
            sink,
            sync,
            lock: None,
            chain: BufferChain::new(),
            slot: 0,
            mode: if opts.line_buffered { FLUSH } else { 0 },
            line_buffered: opts.line_buffered,
            eof: false,
            max_width: opts.max_width,
            cols: 0,
            ansi: Ansi::Na,
            skip: false,
        }
    }

    /// Starts an emit block for `slot` (ORDERED mode turn-taking).
    pub fn begin(&mut self, slot: usize) {
        self.slot = slot;
    }

    /// True once the sink failed or the synchronizer was cancelled.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Sets a mode bit (`FLUSH`, `HOLD`, `BINARY`).
    pub fn set_mode(&mut self, bit: u8) {
        self.mode |= bit;
    }

    /// Clears a mode bit.
    pub fn clear_mode(&mut self, bit: u8) {
        self.mode &= !bit;
    }

    /// True while `bit` is set.
    pub fn mode(&self, bit: u8) -> bool {
        self.mode & bit != 0
    }

    /// Holds all output in the chain until [`launch`](Self::launch).
    pub fn hold(&mut self) {
        self.mode |= HOLD;
    }

    /// Releases held output, flushing pending data if line-buffered.
    pub fn launch(&mut self) {
        if self.mode & HOLD != 0 {
            self.mode &= !HOLD;
            self.check_flush();
        }
    }

    /// True while output is held.
    pub fn holding(&self) -> bool {
        self.mode & HOLD != 0
    }

    // ---- typed emitters ----

    /// Emits a single byte.
    #[inline]
    pub fn chr(&mut self, b: u8) {
        if self.eof {
            return;
        }
        if self.chain.remaining() == 0 {
            self.overflow();
        }
        self.chain.push(b);
    }

    /// Emits a byte span.
    pub fn put(&mut self, mut s: &[u8]) {
        if self.eof {
            return;
        }
        while !s.is_empty() {
            let taken = self.chain.fill(s);
            s = &s[taken..];
            if !s.is_empty() {
                self.overflow();
            }
        }
    }

    /// Emits a string.
    #[inline]
    pub fn str(&mut self, s: &str) {
        self.put(s.as_bytes());
    }

    /// Emits at most `k` UTF-8 code points from `s`. The emitted span
    /// always ends on a UTF-8 boundary.
    pub fn utf8n(&mut self, s: &[u8], k: usize) {
        let mut end = 0;
        let mut chars = 0;
        while end < s.len() && chars < k {
            end += 1;
            while end < s.len() && s[end] & 0xc0 == 0x80 {
                end += 1;
            }
            chars += 1;
        }
        self.put(&s[..end]);
    }

    /// Emits an unsigned decimal with minimum field width `w`, space padded.
    pub fn num(&mut self, mut i: usize, w: usize) {
        let mut tmp = [0u8; 24];
        let mut k = tmp.len();
        loop {
            k -= 1;
            tmp[k] = b'0' + (i % 10) as u8;
            i /= 10;
            if i == 0 {
                break;
            }
        }
        let n = tmp.len() - k;
        for _ in n..w {
            self.chr(b' ');
        }
        self.put(&tmp[k..]);
    }

    /// Emits an unsigned hexadecimal with minimum width `w`, zero padded.
    pub fn hex(&mut self, mut i: usize, w: usize) {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut tmp = [0u8; 16];
        let mut k = tmp.len();
        loop {
            k -= 1;
            tmp[k] = DIGITS[i & 0xf];
            i >>= 4;
            if i == 0 {
                break;
            }
        }
        let n = tmp.len() - k;
        for _ in n..w {
            self.chr(b'0');
        }
        self.put(&tmp[k..]);
    }

    /// Emits one byte as a three-digit octal triplet.
    pub fn oct(&mut self, b: u8) {
        self.chr(b'0' + (b >> 6));
        self.chr(b'0' + ((b >> 3) & 7));
        self.chr(b'0' + (b & 7));
    }

    /// Emits a newline (CRLF on Windows builds) and flushes if line-buffered.
    pub fn nl(&mut self) {
        #[cfg(windows)]
        self.chr(b'\r');
        self.chr(b'\n');
        self.check_flush();
    }

    // ---- quoted emitters ----

    /// Emits `data` double-quoted with backslash escapes for `\` and `"`.
    pub fn quote(&mut self, data: &[u8]) {
        self.chr(b'"');
        for &b in data {
            if b == b'\\' || b == b'"' {
                self.chr(b'\\');
            }
            self.chr(b);
        }
        self.chr(b'"');
    }

    /// Emits `data` as a C string literal. Control bytes use named escapes
    /// or three-digit octal, which a C lexer decodes back to the original
    /// bytes unambiguously; bytes >= 0x80 pass through untouched.
    pub fn cpp(&mut self, data: &[u8]) {
        self.chr(b'"');
        for &b in data {
            match b {
                b'\\' => self.put(b"\\\\"),
                b'"' => self.put(b"\\\""),
                0x07 => self.put(b"\\a"),
                0x08 => self.put(b"\\b"),
                b'\t' => self.put(b"\\t"),
                b'\n' => self.put(b"\\n"),
                0x0b => self.put(b"\\v"),
                0x0c => self.put(b"\\f"),
                b'\r' => self.put(b"\\r"),
                0x00..=0x1f | 0x7f => {
                    self.chr(b'\\');
                    self.oct(b);
                }
                _ => self.chr(b),
            }
        }
        self.chr(b'"');
    }

    /// Emits `data` as a quoted CSV field with embedded quotes doubled.
    pub fn csv(&mut self, data: &[u8]) {
        self.chr(b'"');
        for &b in data {
            if b == b'"' {
                self.chr(b'"');
            }
            self.chr(b);
        }
        self.chr(b'"');
    }

    /// Emits `data` as a JSON string. Control bytes become `\uXXXX`; bytes
    /// >= 0x80 are passed through as UTF-8.
    pub fn json(&mut self, data: &[u8]) {
        self.chr(b'"');
        for &b in data {
            match b {
                b'"' => self.put(b"\\\""),
                b'\\' => self.put(b"\\\\"),
                0x08 => self.put(b"\\b"),
                0x0c => self.put(b"\\f"),
                b'\n' => self.put(b"\\n"),
                b'\r' => self.put(b"\\r"),
                b'\t' => self.put(b"\\t"),
                0x00..=0x1f => {
                    self.put(b"\\u00");
                    self.hex(b as usize, 2);
                }
                _ => self.chr(b),
            }
        }
        self.chr(b'"');
    }

    /// Emits `data` with XML entity escapes. Control bytes outside
    /// TAB/LF/CR become numeric character references.
    pub fn xml(&mut self, data: &[u8]) {
        for &b in data {
            match b {
                b'&' => self.put(b"&amp;"),
                b'<' => self.put(b"&lt;"),
                b'>' => self.put(b"&gt;"),
                b'"' => self.put(b"&quot;"),
                b'\'' => self.put(b"&apos;"),
                b'\t' | b'\n' | b'\r' => self.chr(b),
                0x00..=0x1f | 0x7f => {
                    self.put(b"&#x");
                    self.hex(b as usize, 2);
                    self.chr(b';');
                }
                _ => self.chr(b),
            }
        }
    }

    /// Emits `data` URI percent-encoded: bytes in `0x20..=0x7E` except `%`
    /// and `;` pass through, everything else becomes `%HH`.
    pub fn uri(&mut self, data: &[u8]) {
        for &b in data {
            if (0x20..=0x7e).contains(&b) && b != b'%' && b != b';' {
                self.chr(b);
            } else {
                self.chr(b'%');
                const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
                self.chr(DIGITS[(b >> 4) as usize]);
                self.chr(DIGITS[(b & 0xf) as usize]);
            }
        }
    }

    // ---- flush machinery ----

    /// Flushes if line buffering is on and output is not held.
    pub fn check_flush(&mut self) {
        if self.mode == FLUSH {
            self.flush();
        }
    }

    /// Acquires the synchronizer (waiting for this slot's turn in ORDERED
    /// mode), writes every full buffer followed by the partial tail, then
    /// syncs the sink. On any short write or error the writer goes EOF and
    /// cancels the synchronizer. The chain is reset for reuse either way.
    pub fn flush(&mut self) {
        if self.chain.is_empty() {
            return;
        }
        if !self.eof {
            if let Some(sync) = self.sync {
                self.lock = Some(sync.acquire(self.lock.take(), self.slot));
                if sync.cancelled() {
                    self.eof = true;
                }
            }

            if !self.eof {
                let sink = self.sink;
                let width = self.max_width;
                let failed = {
                    let mut failed = false;
                    let tail = self.chain.tail();
                    let blocks = self
                        .chain
                        .full_buffers()
                        .chain(std::iter::once(tail).filter(|t| !t.is_empty()));
                    for block in blocks {
                        let r = if width == 0 {
                            write_all(sink, block)
                        } else {
                            flush_truncated(
                                sink,
                                block,
                                width,
                                &mut self.cols,
                                &mut self.ansi,
                                &mut self.skip,
                            )
                        };
                        if r.is_err() {
                            failed = true;
                            break;
                        }
                    }
                    failed
                };
                if failed || sink.flush().is_err() {
                    self.fail();
                }
            }
        }
        self.chain.reset();
    }

    /// Discards buffered output without touching the sink.
    pub fn discard(&mut self) {
        self.chain.reset();
    }

    /// Flushes (or discards, when held) and releases the synchronizer lock
    /// in UNORDERED mode. Resets the mode bits for the next file.
    pub fn release(&mut self) {
        if self.mode & HOLD == 0 {
            self.flush();
        } else {
            self.discard();
        }
        self.mode = if self.line_buffered { FLUSH } else { 0 };
        if let Some(sync) = self.sync {
            self.lock = sync.release(self.lock.take());
        }
    }

    /// Ends this slot's emit block in ORDERED mode, handing the turn onward.
    pub fn end(&mut self) {
        if let Some(sync) = self.sync {
            sync.finish(self.lock.take(), self.slot);
        }
    }

    /// Moves the writer to the EOF state and cancels the synchronizer.
    pub fn cancel(&mut self) {
        self.fail();
    }

    /// True when the synchronizer was cancelled.
    pub fn cancelled(&self) -> bool {
        self.sync.is_some_and(|s| s.cancelled())
    }

    fn fail(&mut self) {
        self.eof = true;
        if let Some(sync) = self.sync {
            sync.cancel();
        }
    }

    /// The cursor buffer is full. Flush now if allowed and the sink can be
    /// taken without blocking, otherwise advance the chain.
    fn overflow(&mut self) {
        let can_flush = self.mode & HOLD == 0
            && match self.sync {
                None => true,
                Some(sync) => {
                    if self.lock.is_some() {
                        true
                    } else if let Some(guard) = sync.try_acquire() {
                        self.lock = Some(guard);
                        true
                    } else {
                        false
                    }
                }
            };
        if can_flush {
            self.flush();
        } else {
            self.chain.advance();
        }
    }
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Writes the whole block, treating a short write as an error.
fn write_all(sink: &dyn Sink, mut block: &[u8]) -> Result<(), ()> {
    while !block.is_empty() {
        match sink.write(block) {
            Ok(0) | Err(_) => return Err(()),
            Ok(n) => block = &block[n..],
        }
    }
    Ok(())
}

/// Writes `block` with each output line truncated to `width` columns.
///
/// The column counter advances on data bytes, pauses inside ANSI CSI/OSC
/// sequences, and does not count UTF-8 continuation bytes or NUL. Once the
/// limit is reached, bytes are dropped until the next line feed. All state
/// persists across blocks so lines spanning buffer boundaries truncate
/// correctly.
fn flush_truncated(
    sink: &dyn Sink,
    block: &[u8],
    width: usize,
    cols: &mut usize,
    ansi: &mut Ansi,
    skip: &mut bool,
) -> Result<(), ()> {
    let mut out = 0; // start of the pending run to write
    for (i, &b) in block.iter().enumerate() {
        if *skip {
            // Dropping until the next line feed. The pending run was
            // written when skipping began, so `out` tracks `i` here.
            if b == b'\n' {
                *skip = false;
                *cols = 0;
                out = i;
            } else {
                out = i + 1;
            }
            continue;
        }

        match *ansi {
            Ansi::Na => {
                if b == 0x1b {
                    *ansi = Ansi::Esc;
                } else if b == b'\n' {
                    *cols = 0;
                } else if b != 0 && b & 0xc0 != 0x80 {
                    *cols += 1;
                    if *cols > width {
                        *skip = true;
                        write_all(sink, &block[out..i])?;
                        out = i + 1;
                    }
                }
            }
            Ansi::Esc => {
                *ansi = match b {
                    b'[' => Ansi::Csi,
                    b']' => Ansi::Osc,
                    _ => Ansi::Na,
                };
            }
            Ansi::Csi => {
                if (0x40..=0x7e).contains(&b) {
                    *ansi = Ansi::Na;
                }
            }
            Ansi::Osc => {
                if b == 0x07 {
                    *ansi = Ansi::Na;
                } else if b == 0x1b {
                    *ansi = Ansi::OscEsc;
                }
            }
            Ansi::OscEsc => {
                *ansi = if b == b'\\' { Ansi::Na } else { Ansi::Osc };
            }
        }
    }
    if out < block.len() {
        write_all(sink, &block[out..])?;
    }
    Ok(())
}
