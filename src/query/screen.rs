//! Terminal surface for the interactive frontend.
//!
//! Raw mode and size come from crossterm; everything else is plain ANSI
//! written through an internal buffer that is flushed once per redraw.
//! Result lines pass through [`Screen::put_line`], which skips panned
//! columns, truncates at the right edge, and strips SGR sequences when
//! `mono` is on, never splitting an escape sequence mid-line.

use std::io::{self, Write};

use crossterm::terminal;

/// Terminal state and paint buffer.
pub struct Screen {
    pub rows: usize,
    pub cols: usize,
    /// Strip colors from result lines at render time.
    pub mono: bool,
    buf: Vec<u8>,
}

impl Screen {
    /// Enters raw mode and the alternate screen.
    pub fn setup() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut screen = Self {
            rows: 24,
            cols: 80,
            mono: false,
            buf: Vec::with_capacity(16 * 1024),
        };
        screen.put(b"\x1b[?1049h");
        screen.getsize();
        screen.clear();
        screen.flush()?;
        Ok(screen)
    }

    /// Leaves the alternate screen and restores cooked mode. Idempotent
    /// enough to be called from cleanup paths.
    pub fn cleanup(&mut self) {
        self.put(b"\x1b[m\x1b[?1049l");
        let _ = self.flush();
        let _ = terminal::disable_raw_mode();
    }

    /// Detached screen for unit tests; never touches the terminal.
    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self {
            rows: 24,
            cols: 80,
            mono: true,
            buf: Vec::new(),
        }
    }

    pub fn getsize(&mut self) {
        if let Ok((cols, rows)) = terminal::size() {
            self.cols = cols as usize;
            self.rows = rows as usize;
        }
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put(s.as_bytes());
    }

    /// Cursor to 1-based terminal position from 0-based row/col.
    pub fn setpos(&mut self, row: usize, col: usize) {
        self.put_str(&format!("\x1b[{};{}H", row + 1, col + 1));
    }

    pub fn home(&mut self) {
        self.setpos(0, 0);
    }

    /// Erase to end of line.
    pub fn erase(&mut self) {
        self.put(b"\x1b[K");
    }

    /// Erase to end of screen.
    pub fn end(&mut self) {
        self.put(b"\x1b[J");
    }

    pub fn clear(&mut self) {
        self.put(b"\x1b[2J");
        self.home();
    }

    pub fn normal(&mut self) {
        self.put(b"\x1b[m");
    }

    pub fn invert(&mut self) {
        self.put(b"\x1b[7m");
    }

    /// Selection highlight for marked result rows.
    pub fn select(&mut self) {
        self.put(b"\x1b[7m");
    }

    pub fn deselect(&mut self) {
        self.put(b"\x1b[27m");
    }

    pub fn alert(&mut self) {
        self.put(b"\x07");
        let _ = self.flush();
    }

    pub fn flush(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&self.buf)?;
        self.buf.clear();
        stdout.flush()
    }

    /// Paints text at a position and erases the rest of the row.
    pub fn put_at(&mut self, row: usize, col: usize, text: &str) {
        self.setpos(row, col);
        self.put_str(text);
        self.erase();
    }

    /// Renders one result line at `row`, panned right by `skip` columns
    /// and truncated at the screen edge.
    ///
    /// Escape sequences cost no columns and survive the pan so active
    /// colors still apply to the visible span; in mono they are dropped
    /// entirely. NUL framing bytes are dropped. Continuation bytes ride
    /// along with their lead byte.
    pub fn put_line(&mut self, row: usize, line: &[u8], skip: usize) {
        self.setpos(row, 0);
        let mut col = 0usize; // visible columns consumed, including skipped
        let limit = skip + self.cols.saturating_sub(1);
        let mut i = 0;
        while i < line.len() {
            let b = line[i];
            if b == 0x1b {
                let end = ansi_end(line, i);
                if !self.mono {
                    self.put(&line[i..end]);
                }
                i = end;
                continue;
            }
            if b == 0 {
                i += 1;
                continue;
            }
            let end = char_end(line, i);
            if col >= limit {
                break;
            }
            if col >= skip {
                self.put(&line[i..end]);
            }
            col += 1;
            i = end;
        }
        if !self.mono {
            self.normal();
        }
        self.erase();
    }
}

/// End of the escape sequence starting at `i` (`line[i] == ESC`).
pub(crate) fn ansi_end(line: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    match line.get(j) {
        Some(b'[') => {
            j += 1;
            while j < line.len() && !(0x40..=0x7e).contains(&line[j]) {
                j += 1;
            }
            (j + 1).min(line.len())
        }
        Some(b']') => {
            j += 1;
            while j < line.len() {
                if line[j] == 0x07 {
                    return j + 1;
                }
                if line[j] == 0x1b && line.get(j + 1) == Some(&b'\\') {
                    return j + 2;
                }
                j += 1;
            }
            j
        }
        Some(_) => j + 1,
        None => j,
    }
}

/// End of the UTF-8 character starting at `i`.
fn char_end(line: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    while j < line.len() && line[j] & 0xc0 == 0x80 {
        j += 1;
    }
    j
}
