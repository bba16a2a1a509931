//! Scrollable view over the append-only result line vector.
//!
//! Lines arrive from the [`ResultFetcher`](super::fetch::ResultFetcher)
//! byte-for-byte as the engine produced them: SGR sequences, NUL filename
//! framing and all. The viewport tracks which rows are selected, the top
//! row on screen, the optional selection cursor, a bookmark, and the
//! horizontal pan. Filename markers embedded in the stream drive the
//! next-file/previous-file navigation.

/// Result lines plus per-row selection and scroll state.
pub struct Viewport {
    lines: Vec<Vec<u8>>,
    selected: Vec<bool>,
    /// Number of complete rows; `lines` may hold one open row past this.
    complete: usize,
    /// Top row of the visible window.
    pub row: usize,
    /// Selection cursor; `None` outside selection mode.
    pub select: Option<usize>,
    /// Bookmarked row.
    pub mark: Option<usize>,
    /// Horizontal pan in display columns.
    pub skip: usize,
    /// New rows arrive pre-selected.
    pub select_all: bool,
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            selected: Vec::new(),
            complete: 0,
            row: 0,
            select: None,
            mark: None,
            skip: 0,
            select_all: false,
        }
    }

    /// Discards all rows for a fresh search. Scroll, pan, and selection
    /// cursor reset; the bookmark does not survive either.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.selected.clear();
        self.complete = 0;
        self.row = 0;
        self.select = None;
        self.mark = None;
        self.skip = 0;
        self.select_all = false;
    }

    /// Complete rows available for display.
    pub fn rows(&self) -> usize {
        self.complete
    }

    pub fn line(&self, idx: usize) -> &[u8] {
        &self.lines[idx]
    }

    pub fn is_selected(&self, idx: usize) -> bool {
        self.selected[idx]
    }

    pub fn toggle(&mut self, idx: usize) {
        self.selected[idx] = !self.selected[idx];
    }

    pub fn select_all_rows(&mut self, on: bool) {
        self.select_all = on;
        for s in &mut self.selected {
            *s = on;
        }
    }

    /// Appends bytes to the open row, creating it if needed. The open row
    /// is not counted by [`rows`](Self::rows) until
    /// [`complete_row`](Self::complete_row).
    pub fn append_open(&mut self, bytes: &[u8]) {
        if self.lines.len() == self.complete {
            self.lines.push(Vec::new());
            self.selected.push(self.select_all);
        }
        let row = self.lines.len() - 1;
        self.lines[row].extend_from_slice(bytes);
        self.selected[row] = self.select_all;
    }

    /// Marks the open row complete. An EOF with no open row is a no-op.
    pub fn complete_row(&mut self) {
        if self.lines.len() > self.complete {
            self.complete = self.lines.len();
        }
    }

    /// Replaces a row's content (EDIT mode commits through this).
    pub fn set_line(&mut self, idx: usize, bytes: Vec<u8>) {
        self.lines[idx] = bytes;
    }

    /// Appends an empty complete row (EDIT mode growing the list).
    pub fn push_row(&mut self) {
        self.lines.push(Vec::new());
        self.selected.push(false);
        self.complete = self.lines.len();
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects a filename marker in `line`, comparing against `last` so a run
/// of lines for the same file reports the marker only once. On a new name
/// the extracted filename replaces `last` and the call returns `true`.
///
/// Two encodings, kept exactly for stream compatibility:
/// - `files_with_matches`: the line starts with zero or more CSI
///   sequences, then a non-empty printable run up to the next escape;
///   that run is the filename.
/// - otherwise: the line starts with NUL, a non-empty span, another NUL,
///   then the non-empty filename terminated by a third NUL.
pub fn is_filename(line: &[u8], files_with_matches: bool, last: &mut Vec<u8>) -> bool {
    let name = match extract_filename(line, files_with_matches) {
        Some(name) => name,
        None => return false,
    };
    if name == last.as_slice() {
        return false;
    }
    last.clear();
    last.extend_from_slice(name);
    true
}

fn extract_filename(line: &[u8], files_with_matches: bool) -> Option<&[u8]> {
    let end = line.len();
    if files_with_matches {
        let mut pos = 0;
        while pos < end {
            if line[pos] != 0x1b {
                break;
            }
            pos += 1;
            while pos < end && !line[pos].is_ascii_alphabetic() {
                pos += 1;
            }
            pos += 1;
        }
        if pos >= end {
            return None;
        }
        let start = pos;
        while pos < end && line[pos] != 0x1b {
            pos += 1;
        }
        Some(&line[start..pos])
    } else {
        if end < 4 || line[0] != 0 {
            return None;
        }
        let mut pos = 1;
        while pos < end && line[pos] != 0 {
            pos += 1;
        }
        pos += 1;
        if pos >= end {
            return None;
        }
        let start = pos;
        while pos < end && line[pos] != 0 {
            pos += 1;
        }
        if pos == start || pos >= end {
            return None;
        }
        Some(&line[start..pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_tracks_rows() {
        let mut view = Viewport::new();
        view.append_open(b"one");
        view.complete_row();
        view.append_open(b"two");
        view.complete_row();
        assert_eq!(view.rows(), 2);
        view.toggle(1);
        assert!(!view.is_selected(0));
        assert!(view.is_selected(1));
        view.select_all_rows(true);
        assert!(view.is_selected(0));
    }

    #[test]
    fn open_row_grows_in_place() {
        let mut view = Viewport::new();
        view.append_open(b"par");
        assert_eq!(view.rows(), 0);
        view.append_open(b"tial");
        view.complete_row();
        assert_eq!(view.rows(), 1);
        assert_eq!(view.line(0), b"partial");
    }

    #[test]
    fn select_all_applies_to_new_rows() {
        let mut view = Viewport::new();
        view.select_all = true;
        view.append_open(b"late");
        view.complete_row();
        assert!(view.is_selected(0));
    }

    #[test]
    fn nul_triplet_extraction() {
        let mut last = Vec::new();
        let line = b"\0\x1b[1;35m\0src/main.rs\0\x1b[m";
        assert!(is_filename(line, false, &mut last));
        assert_eq!(last, b"src/main.rs");
    }

    #[test]
    fn nul_triplet_requires_all_parts() {
        let mut last = Vec::new();
        assert!(!is_filename(b"plain text", false, &mut last));
        assert!(!is_filename(b"\0a\0", false, &mut last));
        assert!(!is_filename(b"\0a\0\0", false, &mut last)); // empty name
        assert!(!is_filename(b"\0\0name", false, &mut last)); // no third NUL
    }

    #[test]
    fn detection_is_idempotent_per_name() {
        let mut last = Vec::new();
        let line = b"\0m\0f1\0";
        assert!(is_filename(line, false, &mut last));
        assert!(!is_filename(line, false, &mut last));
        let line2 = b"\0m\0f2\0";
        assert!(is_filename(line2, false, &mut last));
        assert_eq!(last, b"f2");
    }

    #[test]
    fn ansi_prefixed_extraction() {
        let mut last = Vec::new();
        let line = b"\x1b[1;35msrc/lib.rs\x1b[m";
        assert!(is_filename(line, true, &mut last));
        assert_eq!(last, b"src/lib.rs");
    }

    #[test]
    fn ansi_form_needs_nonempty_run() {
        let mut last = Vec::new();
        assert!(!is_filename(b"\x1b[1;35m\x1b[m", true, &mut last));
        assert!(!is_filename(b"\x1b[m", true, &mut last));
    }
}
