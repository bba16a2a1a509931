//! Per-file matching and result emission.
//!
//! A file is read in fixed-size chunks with the unterminated tail carried
//! over, so a reported line is never split across reads. Each complete
//! line runs through the compiled regex and the match/context state
//! machine, which emits through the worker's [`Writer`] in the configured
//! shape: plain match lines with prefixes and SGR highlights, counts,
//! filenames only, "Binary file matches" notices, or annotated hex rows.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use flate2::read::GzDecoder;
use memchr::{memchr, memchr_iter};

use crate::engine::walk::FileEntry;
use crate::engine::SearchCtx;
use crate::flags::SearchConfig;
use crate::output::hex::{HexClass, HexDumper};
use crate::output::writer::{Writer, BINARY};

const CHUNK: usize = 64 * 1024;
/// Bytes probed for NUL to classify a file as binary.
const BINARY_PROBE: usize = 8 * 1024;

// Default SGR palette, in the classic grep capability order.
const FN_COLOR: &str = "\x1b[1;35m"; // filename
const LN_COLOR: &str = "\x1b[32m"; // line/column/byte numbers
const SE_COLOR: &str = "\x1b[36m"; // separators
const MS_COLOR: &str = "\x1b[1;31m"; // match span
const RESET: &str = "\x1b[m";

/// Outcome of searching one file.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileResult {
    pub matches: u64,
}

/// Searches one file, emitting results through `out`.
pub fn search_file<'a>(
    entry: &FileEntry,
    ctx: &'a SearchCtx,
    out: &mut Writer<'a>,
    hex: &mut HexDumper,
    cancel: &AtomicBool,
) -> io::Result<FileResult> {
    let file = File::open(&entry.path)?;
    let gz = ctx.config.decompress
        && entry
            .path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    let mut reader: Box<dyn Read> = if gz {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut state = FileSearch::new(ctx, entry, out, hex);

    let mut pending: Vec<u8> = Vec::new();
    let mut base = 0usize;
    let mut probed = false;
    let mut chunk = vec![0u8; CHUNK];

    'read: loop {
        if cancel.load(Ordering::Relaxed) || state.out.eof() {
            break;
        }
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);

        if !probed {
            probed = true;
            let probe = &pending[..pending.len().min(BINARY_PROBE)];
            state.binary = memchr(0, probe).is_some();
            if state.binary {
                if ctx.config.binary_without_match {
                    return Ok(FileResult::default());
                }
                state.out.set_mode(BINARY);
            }
        }

        // Newline positions are collected first; slicing while consuming
        // would shift them.
        let newlines: Vec<usize> = memchr_iter(b'\n', &pending).collect();
        let mut start = 0;
        for nl in newlines {
            state.on_line(&pending[start..=nl], base + start);
            start = nl + 1;
            if state.done {
                break 'read;
            }
        }
        if start > 0 {
            pending.drain(..start);
            base += start;
        }
    }

    if !pending.is_empty() && !state.done {
        let line = std::mem::take(&mut pending);
        state.on_line(&line, base);
    }
    state.finish();
    Ok(FileResult {
        matches: state.matches,
    })
}

/// Match/context emission state for one file.
struct FileSearch<'w, 'a> {
    ctx: &'a SearchCtx,
    out: &'w mut Writer<'a>,
    hex: &'w mut HexDumper,
    name: String,
    binary: bool,
    heading_done: bool,
    lineno: u64,
    count_lines: u64,
    matches: u64,
    /// Pending before-context: (line number, absolute offset, bytes
    /// including the newline).
    before: VecDeque<(u64, usize, Vec<u8>)>,
    after_left: usize,
    last_emitted: u64,
    done: bool,
}

impl<'w, 'a> FileSearch<'w, 'a> {
    fn new(
        ctx: &'a SearchCtx,
        entry: &FileEntry,
        out: &'w mut Writer<'a>,
        hex: &'w mut HexDumper,
    ) -> Self {
        Self {
            ctx,
            out,
            hex,
            name: entry.path.display().to_string(),
            binary: false,
            heading_done: false,
            lineno: 0,
            count_lines: 0,
            matches: 0,
            before: VecDeque::new(),
            after_left: 0,
            last_emitted: 0,
            done: false,
        }
    }

    /// The configuration outlives `self`; borrowing it at `'a` keeps it
    /// usable across mutable emission calls.
    fn cfg(&self) -> &'a SearchConfig {
        &self.ctx.config
    }

    fn color(&self) -> bool {
        self.ctx.color()
    }

    fn hex_mode(&self) -> bool {
        self.cfg().hex || (self.cfg().with_hex && self.binary)
    }

    /// Binary files without hex output reduce to a single notice.
    fn binary_notice(&self) -> bool {
        self.binary && !self.hex_mode() && !self.cfg().text && !self.cfg().binary
    }

    fn on_line(&mut self, line: &[u8], offset: usize) {
        self.lineno += 1;
        let content = match line.last() {
            Some(b'\n') => &line[..line.len() - 1],
            _ => line,
        };

        let cfg = self.cfg();
        let mut hits: Vec<(usize, usize)> = self
            .ctx
            .re
            .find_iter(content)
            .map(|m| (m.start(), m.end()))
            .collect();
        if !cfg.empty {
            hits.retain(|&(s, e)| s != e);
        }
        let matched = if cfg.invert_match {
            let any = !hits.is_empty();
            hits.clear();
            !any
        } else {
            !hits.is_empty()
        };

        if matched {
            self.count_lines += 1;
            self.matches += hits.len().max(1) as u64;
        }

        if cfg.count {
            return;
        }

        if cfg.files_with_matches {
            if matched {
                self.emit_filename_line();
                self.done = true;
            }
            return;
        }

        if self.binary_notice() {
            if matched {
                self.emit_binary_notice();
                self.done = true;
            }
            return;
        }

        if matched {
            self.emit_group_separator_if_gap();
            self.flush_before_context();
            self.emit_match_line(content, line.len(), offset, &hits);
            self.after_left = cfg.after_context;
            self.last_emitted = self.lineno;
        } else if self.after_left > 0 {
            self.after_left -= 1;
            self.emit_context_line(content, line.len(), offset);
            self.last_emitted = self.lineno;
        } else if cfg.any_line {
            self.emit_context_line(content, line.len(), offset);
            self.last_emitted = self.lineno;
        } else if cfg.before_context > 0 {
            if self.before.len() == cfg.before_context {
                self.before.pop_front();
            }
            self.before.push_back((self.lineno, offset, line.to_vec()));
        }
    }

    fn finish(&mut self) {
        if self.hex_mode() {
            self.hex.done(self.out);
        }
        if self.cfg().count {
            self.emit_count_line();
        }
    }

    // ---- emission helpers ----

    fn put_color(&mut self, sgr: &str) {
        if self.color() {
            self.out.str(sgr);
        }
    }

    fn put_name(&mut self) {
        let name = std::mem::take(&mut self.name);
        self.out.put(name.as_bytes());
        self.name = name;
    }

    fn emit_sep(&mut self, sep: u8) {
        self.put_color(SE_COLOR);
        self.out.chr(sep);
        self.put_color(RESET);
    }

    /// Emits the per-file heading once. The interactive stream frames it
    /// as NUL, SGR color, NUL, plain name, NUL, SGR reset; the NULs are
    /// invisible on a terminal, and the viewport extracts the plain name
    /// between the second and third NUL.
    fn emit_heading_if_needed(&mut self) {
        let cfg = self.cfg();
        if self.heading_done || !(cfg.heading || cfg.frame_names) || !cfg.with_filename {
            return;
        }
        self.heading_done = true;
        if cfg.frame_names {
            self.out.chr(0);
            self.out.str(FN_COLOR);
            self.out.chr(0);
            self.put_name();
            self.out.chr(0);
            self.out.str(RESET);
            self.out.nl();
        } else {
            self.put_color(FN_COLOR);
            self.put_name();
            self.put_color(RESET);
            self.out.nl();
        }
    }

    /// One line carrying only the filename (`files-with-matches` mode).
    /// The interactive stream frames it as an SGR run followed by the name.
    fn emit_filename_line(&mut self) {
        let cfg = self.cfg();
        if cfg.frame_names {
            self.out.str(FN_COLOR);
            self.put_name();
            self.out.str(RESET);
            self.out.nl();
        } else {
            self.put_color(FN_COLOR);
            self.put_name();
            self.put_color(RESET);
            if cfg.null {
                self.out.chr(0);
            } else {
                self.out.nl();
            }
        }
    }

    fn emit_binary_notice(&mut self) {
        self.out.str("Binary file ");
        self.put_color(FN_COLOR);
        self.put_name();
        self.put_color(RESET);
        self.out.str(" matches");
        self.out.nl();
    }

    fn emit_count_line(&mut self) {
        let cfg = self.cfg();
        if cfg.with_filename {
            self.put_color(FN_COLOR);
            self.put_name();
            self.put_color(RESET);
            if cfg.null {
                self.out.chr(0);
            } else {
                self.emit_sep(b':');
            }
        }
        let count = self.count_lines as usize;
        self.out.num(count, 1);
        self.out.nl();
    }

    /// `--` between discontiguous context groups.
    fn emit_group_separator_if_gap(&mut self) {
        let cfg = self.cfg();
        if cfg.before_context == 0 && cfg.after_context == 0 {
            return;
        }
        let group_first = self.lineno - self.before.len() as u64;
        if self.last_emitted > 0 && group_first > self.last_emitted + 1 {
            if self.hex_mode() {
                self.hex.done(self.out);
            }
            self.put_color(SE_COLOR);
            self.out.str("--");
            self.put_color(RESET);
            self.out.nl();
        }
    }

    fn flush_before_context(&mut self) {
        while let Some((lineno, offset, line)) = self.before.pop_front() {
            let content_len = match line.last() {
                Some(b'\n') => line.len() - 1,
                _ => line.len(),
            };
            self.emit_one(&line[..content_len], line.len(), offset, lineno, &[], b'-');
        }
    }

    fn emit_context_line(&mut self, content: &[u8], raw_len: usize, offset: usize) {
        self.emit_one(content, raw_len, offset, self.lineno, &[], b'-');
    }

    fn emit_match_line(
        &mut self,
        content: &[u8],
        raw_len: usize,
        offset: usize,
        hits: &[(usize, usize)],
    ) {
        let cfg = self.cfg();
        if cfg.only_matching {
            let lineno = self.lineno;
            for &(start, end) in hits {
                self.emit_heading_if_needed();
                self.emit_prefix(lineno, Some(start), offset, b':');
                self.put_color(MS_COLOR);
                self.out.put(&content[start..end]);
                self.put_color(RESET);
                self.out.nl();
            }
        } else if cfg.ungroup && hits.len() > 1 {
            let lineno = self.lineno;
            for i in 0..hits.len() {
                let one = [hits[i]];
                self.emit_one(content, raw_len, offset, lineno, &one, b':');
            }
        } else {
            self.emit_one(content, raw_len, offset, self.lineno, hits, b':');
        }
    }

    /// Emits one result line: text with prefixes and highlights, or hex
    /// rows when hex output is active.
    fn emit_one(
        &mut self,
        content: &[u8],
        raw_len: usize,
        offset: usize,
        lineno: u64,
        hits: &[(usize, usize)],
        sep: u8,
    ) {
        self.emit_heading_if_needed();

        if self.hex_mode() {
            self.emit_hex(content, raw_len, offset, hits, sep);
            return;
        }

        self.emit_prefix(lineno, hits.first().map(|h| h.0), offset, sep);

        let mut pos = 0;
        for &(start, end) in hits {
            if start < pos {
                continue;
            }
            self.out.put(&content[pos..start]);
            self.put_color(MS_COLOR);
            self.out.put(&content[start..end]);
            self.put_color(RESET);
            pos = end;
        }
        self.out.put(&content[pos..]);
        self.out.nl();
    }

    /// Filename, line, column, and byte-offset prefixes in that order.
    fn emit_prefix(&mut self, lineno: u64, col: Option<usize>, offset: usize, sep: u8) {
        let cfg = self.cfg();
        if cfg.with_filename && !cfg.heading && !cfg.frame_names {
            self.put_color(FN_COLOR);
            self.put_name();
            self.put_color(RESET);
            if cfg.null {
                self.out.chr(0);
            } else {
                self.emit_sep(sep);
            }
        }
        if cfg.line_number {
            self.put_color(LN_COLOR);
            self.out.num(lineno as usize, 1);
            self.put_color(RESET);
            self.emit_sep(sep);
        }
        if cfg.column_number {
            self.put_color(LN_COLOR);
            self.out.num(col.map_or(1, |c| c + 1), 1);
            self.put_color(RESET);
            self.emit_sep(sep);
        }
        if cfg.byte_offset {
            self.put_color(LN_COLOR);
            self.out.num(offset, 1);
            self.put_color(RESET);
            self.emit_sep(sep);
        }
        if cfg.initial_tab {
            self.out.chr(b'\t');
        }
    }

    /// Hex rows for one line, classed per byte: match spans in the match
    /// class, the rest in the line class; context lines use the context
    /// classes. The trailing newline byte belongs to the line.
    fn emit_hex(
        &mut self,
        content: &[u8],
        raw_len: usize,
        offset: usize,
        hits: &[(usize, usize)],
        sep: u8,
    ) {
        let context = sep == b'-';
        let (span_class, line_class) = if context {
            (HexClass::ContextMatch, HexClass::ContextLine)
        } else {
            (HexClass::Match, HexClass::Line)
        };

        // Context lines can still carry pattern hits worth classing, e.g.
        // matching lines shown as context under invert.
        let owned_hits: Vec<(usize, usize)>;
        let hits = if context && hits.is_empty() {
            owned_hits = self
                .ctx
                .re
                .find_iter(content)
                .filter(|m| !m.is_empty())
                .map(|m| (m.start(), m.end()))
                .collect();
            owned_hits.as_slice()
        } else {
            hits
        };

        self.hex.next(offset, self.out);

        let mut pos = 0;
        for &(start, end) in hits {
            if start < pos {
                continue;
            }
            self.hex
                .dump(line_class, offset + pos, &content[pos..start], self.out);
            self.hex
                .dump(span_class, offset + start, &content[start..end], self.out);
            pos = end;
        }
        self.hex
            .dump(line_class, offset + pos, &content[pos..], self.out);
        if raw_len > content.len() {
            // The newline byte.
            self.hex
                .dump(line_class, offset + content.len(), b"\n", self.out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::build_ctx;
    use crate::output::writer::WriterOptions;
    use crate::output::VecSink;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn entry_for(path: &std::path::Path) -> FileEntry {
        FileEntry {
            path: path.to_path_buf(),
            size: 0,
            changed: SystemTime::UNIX_EPOCH,
            created: SystemTime::UNIX_EPOCH,
        }
    }

    fn run(config: SearchConfig, contents: &[u8]) -> (String, FileResult) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, contents).unwrap();

        let ctx = build_ctx(&config).unwrap();
        let sink = VecSink::new();
        let mut out = Writer::new(&sink, None, WriterOptions::default());
        let mut hex = HexDumper::new(config.hex_columns, false);
        let result = search_file(
            &entry_for(&path),
            &ctx,
            &mut out,
            &mut hex,
            &AtomicBool::new(false),
        )
        .unwrap();
        out.flush();
        (String::from_utf8_lossy(&sink.take()).into_owned(), result)
    }

    fn cfg(pattern: &str) -> SearchConfig {
        SearchConfig {
            pattern: pattern.to_string(),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn plain_match_lines() {
        let (out, result) = run(cfg("needle"), b"hay\nneedle here\nmore hay\nneedle again\n");
        assert_eq!(out, "needle here\nneedle again\n");
        assert_eq!(result.matches, 2);
    }

    #[test]
    fn line_numbers_and_separators() {
        let mut config = cfg("b");
        config.line_number = true;
        let (out, _) = run(config, b"a\nb\nc\nb\n");
        assert_eq!(out, "2:b\n4:b\n");
    }

    #[test]
    fn context_with_group_separator() {
        let mut config = cfg("x");
        config.line_number = true;
        config.before_context = 1;
        config.after_context = 1;
        let (out, _) = run(config, b"1\nx\n3\n4\n5\n6\nx\n8\n");
        assert_eq!(out, "1-1\n2:x\n3-3\n--\n6-6\n7:x\n8-8\n");
    }

    #[test]
    fn invert_match_selects_nonmatching() {
        let mut config = cfg("skip");
        config.invert_match = true;
        let (out, result) = run(config, b"keep one\nskip\nkeep two\n");
        assert_eq!(out, "keep one\nkeep two\n");
        assert_eq!(result.matches, 2);
    }

    #[test]
    fn count_mode_emits_totals_only() {
        let mut config = cfg("z");
        config.count = true;
        let (out, _) = run(config, b"z\nz\nnope\nz\n");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn only_matching_isolates_spans() {
        let mut config = cfg("[0-9]+");
        config.only_matching = true;
        let (out, result) = run(config, b"a12b34\nnone\n56\n");
        assert_eq!(out, "12\n34\n56\n");
        assert_eq!(result.matches, 3);
    }

    #[test]
    fn column_numbers_are_one_based() {
        let mut config = cfg("hit");
        config.column_number = true;
        let (out, _) = run(config, b"a hit\n");
        assert_eq!(out, "3:a hit\n");
    }

    #[test]
    fn binary_notice_replaces_output() {
        let (out, result) = run(cfg("data"), b"data\x00with nul\nmore data\n");
        assert!(out.starts_with("Binary file "));
        assert!(out.ends_with(" matches\n"));
        assert!(out.contains("input.txt"));
        assert!(result.matches >= 1);
    }

    #[test]
    fn binary_skipped_when_ignored() {
        let mut config = cfg("data");
        config.binary_without_match = true;
        let (out, result) = run(config, b"data\x00\n");
        assert!(out.is_empty());
        assert_eq!(result.matches, 0);
    }

    #[test]
    fn binary_text_flag_forces_text_output() {
        let mut config = cfg("data");
        config.text = true;
        let (out, _) = run(config, b"data\x00tail\n");
        assert!(out.starts_with("data\x00tail"));
    }

    #[test]
    fn any_line_emits_everything() {
        let mut config = cfg("m");
        config.any_line = true;
        config.line_number = true;
        let (out, _) = run(config, b"m\nn\n");
        assert_eq!(out, "1:m\n2-n\n");
    }

    #[test]
    fn ungroup_repeats_line_per_hit() {
        let mut config = cfg("[0-9]");
        config.ungroup = true;
        let (out, _) = run(config, b"a1b2\n");
        assert_eq!(out, "a1b2\na1b2\n");
    }

    #[test]
    fn hex_mode_dumps_rows() {
        let mut config = cfg("BBBB");
        config.hex = true;
        config.hex_columns = 16;
        let (out, _) = run(config, b"AAAABBBBCCCCDDD\n");
        assert!(out.starts_with("00000000 "));
        assert!(out.contains("|AAAABBBBCCCCDDD.|"));
    }

    #[test]
    fn lines_crossing_chunks_are_whole() {
        // A line longer than one read chunk must be emitted intact.
        let mut line = vec![b'a'; CHUNK + 100];
        line.extend_from_slice(b"needle");
        line.push(b'\n');
        let (out, result) = run(cfg("needle"), &line);
        assert_eq!(out.len(), line.len());
        assert_eq!(result.matches, 1);
    }

    #[test]
    fn gzip_decompression() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write as _;

        let dir = tempdir().unwrap();
        let path = dir.path().join("input.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"compressed needle line\n").unwrap();
        fs::write(&path, enc.finish().unwrap()).unwrap();

        let mut config = cfg("needle");
        config.decompress = true;
        let ctx = build_ctx(&config).unwrap();
        let sink = VecSink::new();
        let mut out = Writer::new(&sink, None, WriterOptions::default());
        let mut hex = HexDumper::new(16, false);
        let result = search_file(
            &entry_for(&path),
            &ctx,
            &mut out,
            &mut hex,
            &AtomicBool::new(false),
        )
        .unwrap();
        out.flush();
        assert_eq!(result.matches, 1);
        assert_eq!(sink.take(), b"compressed needle line\n");
    }

    #[test]
    fn heading_framing_carries_nul_triplet() {
        let mut config = cfg("hit");
        config.frame_names = true;
        config.with_filename = true;
        let (out, _) = run(config, b"hit\n");
        let bytes = out.as_bytes();
        assert_eq!(bytes[0], 0);
        let nuls: Vec<usize> = bytes
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == 0)
            .map(|(i, _)| i)
            .collect();
        assert!(nuls.len() >= 3);
        let name = &bytes[nuls[1] + 1..nuls[2]];
        assert!(String::from_utf8_lossy(name).ends_with("input.txt"));
    }
}
