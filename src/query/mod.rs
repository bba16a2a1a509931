//! Interactive query frontend.
//!
//! A keystroke-driven loop owns the terminal: the user edits a pattern,
//! and every edit (debounced over ~100 ms polling ticks) cancels the
//! running search, opens a fresh non-blocking pipe, and re-spawns the
//! engine with the current flags. Results stream through the
//! [`fetch::ResultFetcher`] into the [`view::Viewport`]; the controller
//! renders the visible window, dispatches navigation and selection keys,
//! and on exit prints the selected rows to stdout.
//!
//! Mode machine: QUERY (edit + browse) / LIST (file-type selection) /
//! EDIT (edit result rows in place) / HELP (overlay with flag toggles).

pub mod fetch;
pub mod keys;
pub mod line;
pub mod screen;
pub mod view;

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::{pattern_prefix_len, run_search, EngineError};
use crate::flags::{SearchConfig, SortKey};
use crate::pipe::nonblocking_pipe;
use fetch::ResultFetcher;
use keys::{Arrow, Key};
use line::EditLine;
use screen::{ansi_end, Screen};
use view::{is_filename, Viewport};

const PROMPT_COLOR: &str = "\x1b[32;1m";
const ERROR_COLOR: &str = "\x1b[37;41;1m";
const LARROW: &str = "\u{ab}";
const RARROW: &str = "\u{bb}";
const TICK: Duration = Duration::from_millis(100);

/// Mode state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Query,
    List,
    Edit,
    Help,
}

/// One toggleable search flag bound to a meta key.
struct FlagDef {
    key: char,
    label: &'static str,
}

macro_rules! flag {
    ($key:literal, $label:literal) => {
        FlagDef {
            key: $key,
            label: $label,
        }
    };
}

// Index order is load-bearing: the exclusion groups in `meta` and the
// projections in `flags_from_config`/`apply_flags` refer to these slots.
const FLAG_DEFS: &[FlagDef] = &[
    flag!('A', "after context"),     // 0
    flag!('B', "before context"),    // 1
    flag!('b', "byte offset"),       // 2
    flag!('C', "context"),           // 3
    flag!('c', "count lines"),       // 4
    flag!('F', "fixed strings"),     // 5
    flag!('H', "with filename"),     // 6
    flag!('h', "hide filename"),     // 7
    flag!('I', "ignore binary"),     // 8
    flag!('i', "ignore case"),       // 9
    flag!('j', "smart case"),        // 10
    flag!('k', "column number"),     // 11
    flag!('l', "list files"),        // 12
    flag!('n', "line number"),       // 13
    flag!('o', "only matching"),     // 14
    flag!('R', "recurse symlinks"),  // 15
    flag!('r', "recurse"),           // 16
    flag!('T', "initial tab"),       // 17
    flag!('U', "binary pattern"),    // 18
    flag!('u', "ungroup matches"),   // 19
    flag!('v', "invert matches"),    // 20
    flag!('W', "with hex binary"),   // 21
    flag!('w', "word match"),        // 22
    flag!('X', "hex binary"),        // 23
    flag!('x', "line match"),        // 24
    flag!('Y', "empty matches"),     // 25
    flag!('y', "any line"),          // 26
    flag!('z', "decompress"),        // 27
    flag!('0', "file name + \\0"),   // 28
    flag!('1', "recurse 1 level"),   // 29
    flag!('2', "recurse 2 levels"),  // 30
    flag!('3', "recurse 3 levels"),  // 31
    flag!('4', "recurse 4 levels"),  // 32
    flag!('5', "recurse 5 levels"),  // 33
    flag!('6', "recurse 6 levels"),  // 34
    flag!('7', "recurse 7 levels"),  // 35
    flag!('8', "recurse 8 levels"),  // 36
    flag!('9', "recurse 9 levels"),  // 37
    flag!('.', "no hidden files"),   // 38
    flag!('+', "with heading"),      // 39
    flag!('#', "sort by size"),      // 40
    flag!('$', "sort by changed"),   // 41
    flag!('@', "sort by created"),   // 42
    flag!('^', "reverse sort"),      // 43
];

const DEPTH_FIRST: usize = 29;
const DEPTH_LAST: usize = 37;

/// File types offered in LIST mode: display name plus the extensions it
/// stands for.
const FILE_TYPES: &[(&str, &[&str])] = &[
    ("c", &["c", "h"]),
    ("cpp", &["cpp", "cc", "cxx", "hpp", "hh", "hxx"]),
    ("go", &["go"]),
    ("html", &["html", "htm", "css"]),
    ("java", &["java"]),
    ("js", &["js", "jsx", "mjs"]),
    ("json", &["json"]),
    ("markdown", &["md", "markdown"]),
    ("python", &["py"]),
    ("ruby", &["rb"]),
    ("rust", &["rs"]),
    ("shell", &["sh", "bash", "zsh"]),
    ("sql", &["sql"]),
    ("text", &["txt", "text"]),
    ("toml", &["toml"]),
    ("ts", &["ts", "tsx"]),
    ("xml", &["xml"]),
    ("yaml", &["yml", "yaml"]),
];

// Signal flags polled by the event loop each tick; the handlers only
// store, keeping them async-signal-safe.
static WINCH: AtomicBool = AtomicBool::new(false);
static TERM_SIG: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_winch(_: libc::c_int) {
    WINCH.store(true, Ordering::Relaxed);
}

extern "C" fn on_term(sig: libc::c_int) {
    TERM_SIG.store(sig, Ordering::Relaxed);
}

fn install_signal_handlers() {
    // Safety: handlers only touch atomics.
    unsafe {
        libc::signal(libc::SIGWINCH, on_winch as libc::sighandler_t);
        libc::signal(libc::SIGINT, on_term as libc::sighandler_t);
        libc::signal(libc::SIGQUIT, on_term as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_term as libc::sighandler_t);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

/// Why the event loop ended.
enum Outcome {
    /// Normal exit; print the selection.
    Quit,
    /// Fatal signal; cleanup and re-raise.
    Signalled(i32),
}

/// Runs the interactive query UI to completion. Returns the process exit
/// code.
pub fn run(config: SearchConfig) -> io::Result<i32> {
    install_signal_handlers();
    let mut ui = QueryUi::new(config)?;
    ui.restart_search();
    let outcome = ui.event_loop();
    ui.screen.cleanup();

    match outcome {
        Ok(Outcome::Quit) => {
            ui.print_selection()?;
            ui.shutdown();
            Ok(0)
        }
        Ok(Outcome::Signalled(sig)) => {
            ui.shutdown();
            // Safety: re-raising with the default handler restored.
            unsafe {
                libc::signal(sig, libc::SIG_DFL);
                libc::raise(sig);
            }
            Ok(128 + sig)
        }
        Err(err) => {
            ui.shutdown();
            Err(err)
        }
    }
}

struct QueryUi {
    screen: Screen,
    /// Immutable parts of the configuration (roots, width, delays).
    base: SearchConfig,
    flags: Vec<bool>,
    context: usize,
    line: EditLine,
    view: Viewport,
    fetcher: ResultFetcher,
    mode: Mode,
    prompt: &'static str,
    /// Column where the edit area starts (after the prompt).
    start: usize,
    /// Horizontal pan of the edit line.
    offset: usize,
    /// Pan margin near the right edge.
    shift: usize,
    updated: bool,
    message: bool,
    /// Error column in the pattern (byte index), if a regex error is live.
    error: Option<usize>,
    what: String,
    error_slot: Arc<Mutex<Option<(String, usize)>>>,
    search: Option<JoinHandle<()>>,
    dots: usize,
    /// Extensions selected in LIST mode.
    types_selected: Vec<bool>,
}

impl QueryUi {
    fn new(config: SearchConfig) -> io::Result<Self> {
        let screen = Screen::setup()?;
        let context = if config.after_context > 0 {
            config.after_context
        } else if config.before_context > 0 {
            config.before_context
        } else {
            2
        };
        let flags = flags_from_config(&config);
        let mut line = EditLine::new();
        line.set_bytes(config.pattern.as_bytes());
        let types_selected = FILE_TYPES
            .iter()
            .map(|(_, exts)| exts.iter().any(|e| config.file_types.iter().any(|t| t == e)))
            .collect();
        Ok(Self {
            screen,
            base: config,
            flags,
            context,
            line,
            view: Viewport::new(),
            fetcher: ResultFetcher::new(),
            mode: Mode::Query,
            prompt: "Q>",
            start: 3,
            offset: 0,
            shift: 8,
            updated: false,
            message: false,
            error: None,
            what: String::new(),
            error_slot: Arc::new(Mutex::new(None)),
            search: None,
            dots: 3,
            types_selected,
        })
    }

    /// Result rows fit between the prompt row and the bottom.
    fn result_rows(&self) -> usize {
        self.screen.rows.saturating_sub(1).max(1)
    }

    fn delay_ticks(&self) -> usize {
        self.base.query_delay.max(1)
    }

    /// Builds the engine configuration from the flag table and the edit
    /// line.
    fn build_config(&self) -> SearchConfig {
        let mut config = self.base.clone();
        config.pattern = self.line.to_string_lossy();
        apply_flags(&mut config, &self.flags, self.context);
        config.frame_names = true;
        config.with_filename = !config.no_filename;
        config.line_buffered = true;
        config.file_types = self.selected_extensions();
        config
    }

    fn selected_extensions(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (i, &on) in self.types_selected.iter().enumerate() {
            if on {
                out.extend(FILE_TYPES[i].1.iter().map(|e| e.to_string()));
            }
        }
        out
    }

    // ---- search lifecycle ----

    /// Cancels the running search, opens a fresh pipe, and spawns a new
    /// engine thread with the current pattern and flags. The previous
    /// viewport is discarded.
    fn restart_search(&mut self) {
        self.view.clear();
        self.dots = 3;
        self.fetcher.close();
        if let Some(handle) = self.search.take() {
            let _ = handle.join();
        }
        self.error = None;
        self.what.clear();
        *lock(&self.error_slot) = None;

        let (reader, writer) = match nonblocking_pipe() {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "pipe creation failed");
                self.screen.put_str(ERROR_COLOR);
                self.screen.put_at(0, 0, "Error: cannot create pipe");
                self.screen.normal();
                return;
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.fetcher.restart(reader, Arc::clone(&cancel));

        let config = self.build_config();
        let slot = Arc::clone(&self.error_slot);
        self.search = Some(thread::spawn(move || {
            match run_search(&config, &writer, &cancel) {
                Err(EngineError::Regex { msg, pos }) => {
                    let user_pos = pos.saturating_sub(pattern_prefix_len(&config));
                    *lock(&slot) = Some((msg, user_pos));
                }
                Err(err) => {
                    tracing::warn!(%err, "search failed");
                }
                Ok(totals) => {
                    tracing::debug!(?totals, "search complete");
                }
            }
            writer.close();
        }));

        self.redraw();
    }

    fn shutdown(&mut self) {
        self.fetcher.close();
        if let Some(handle) = self.search.take() {
            let _ = handle.join();
        }
    }

    fn poll_error(&mut self) {
        if self.error.is_some() {
            return;
        }
        if let Some((msg, pos)) = lock(&self.error_slot).take() {
            self.what = msg;
            self.error = Some(pos);
        }
    }

    // ---- event loop ----

    fn event_loop(&mut self) -> io::Result<Outcome> {
        let mut ctrl_o = false;
        let mut ctrl_v = false;

        loop {
            let mut delay = self.delay_ticks();

            let key = loop {
                let sig = TERM_SIG.load(Ordering::Relaxed);
                if sig != 0 {
                    return Ok(Outcome::Signalled(sig));
                }
                if WINCH.swap(false, Ordering::Relaxed) {
                    self.redraw();
                }

                if self.mode == Mode::Query {
                    self.update();
                    match self.view.select {
                        None => {
                            let col = self.start + self.line.col() - self.offset;
                            self.screen.setpos(0, col);
                        }
                        Some(sel) => self.screen.setpos(sel - self.view.row + 1, 0),
                    }
                } else if let Some(sel) = self.view.select {
                    self.screen
                        .setpos(sel - self.view.row + 1, self.line.col() - self.offset);
                }
                self.screen.flush()?;

                match keys::poll_key(TICK)? {
                    Some(Key::Resize) => {
                        self.redraw();
                        continue;
                    }
                    Some(key) => break key,
                    None => {}
                }

                delay = delay.saturating_sub(1);
                if delay == 0 {
                    if self.message {
                        self.draw();
                        self.message = false;
                    }
                    if self.mode == Mode::Query && self.updated {
                        self.updated = false;
                        self.restart_search();
                    }
                    delay = self.delay_ticks();
                }
            };

            if ctrl_o {
                if let Key::Char(c) = key {
                    self.meta(c);
                }
                ctrl_o = false;
                continue;
            }
            if ctrl_v {
                if let Key::Char(c) = key {
                    self.insert_char(c);
                }
                ctrl_v = false;
                continue;
            }

            match key {
                Key::Esc => match self.mode {
                    Mode::Query => {
                        if self.view.select.is_none() {
                            if self.quit()? {
                                return Ok(Outcome::Quit);
                            }
                        } else {
                            self.view.select = None;
                            self.redraw();
                        }
                    }
                    Mode::List => self.commit_list(),
                    Mode::Edit => self.leave_edit(),
                    Mode::Help => {}
                },

                Key::Enter => match self.mode {
                    Mode::Query | Mode::List => match self.view.select {
                        None => {
                            if self.view.rows() > 0 {
                                self.view.select = Some(self.view.row);
                                self.draw();
                            } else {
                                self.screen.alert();
                            }
                        }
                        Some(sel) => {
                            self.view.toggle(sel);
                            self.paint_row(sel);
                            self.down();
                        }
                    },
                    Mode::Edit => {
                        if let Some(sel) = self.view.select {
                            if sel + 1 == self.view.rows() {
                                self.view.push_row();
                            }
                        }
                        self.down();
                    }
                    Mode::Help => {}
                },

                Key::Tab => match self.mode {
                    Mode::Query => {
                        self.view.skip += 8;
                        self.redraw();
                    }
                    Mode::Edit => {
                        self.insert_char('\t');
                    }
                    _ => self.screen.alert(),
                },

                Key::BackTab => {
                    if self.mode == Mode::Query {
                        self.view.skip = self.view.skip.saturating_sub(8);
                        self.redraw();
                    } else {
                        self.screen.alert();
                    }
                }

                Key::Meta(c) => {
                    if self.view.select.is_none() {
                        self.meta(c);
                    } else {
                        self.screen.alert();
                    }
                }

                Key::MetaArrow(arrow) => match arrow {
                    Arrow::Up => self.pgup(true),
                    Arrow::Down => self.pgdn(true),
                    Arrow::Left => {
                        if self.mode == Mode::Query {
                            self.view.skip = self.view.skip.saturating_sub(self.screen.cols / 2);
                            self.redraw();
                        }
                    }
                    Arrow::Right => {
                        if self.mode == Mode::Query {
                            self.view.skip += self.screen.cols / 2;
                            self.redraw();
                        }
                    }
                },

                Key::Backspace => match self.mode {
                    Mode::Query | Mode::List => {
                        if self.view.select.is_none() {
                            if self.line.col() > 0 {
                                self.move_col(self.line.col() as isize - 1);
                                self.erase_chars(1);
                            }
                        } else {
                            self.up();
                            if let Some(sel) = self.view.select {
                                self.view.toggle(sel);
                                self.paint_row(sel);
                            }
                        }
                    }
                    Mode::Edit => {
                        if self.line.col() == 0 {
                            self.up();
                            self.move_col(self.line.width() as isize);
                        } else {
                            self.move_col(self.line.col() as isize - 1);
                            self.erase_chars(1);
                        }
                    }
                    Mode::Help => {}
                },

                Key::Delete => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.erase_chars(1);
                    } else {
                        self.up();
                        if let Some(sel) = self.view.select {
                            self.view.toggle(sel);
                            self.paint_row(sel);
                        }
                    }
                }

                Key::Arrow(Arrow::Right) => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.move_col(self.line.col() as isize + 1);
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Arrow(Arrow::Left) => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.move_col(self.line.col() as isize - 1);
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Arrow(Arrow::Up) => self.up(),
                Key::Arrow(Arrow::Down) => self.down(),
                Key::PageUp => self.pgup(false),
                Key::PageDown => self.pgdn(false),

                Key::Home => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.move_col(0);
                    } else {
                        self.screen.alert();
                    }
                }
                Key::End => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.move_col(self.line.width() as isize);
                    } else {
                        self.screen.alert();
                    }
                }

                Key::Ctrl('c') => {
                    if self.quit()? {
                        return Ok(Outcome::Quit);
                    }
                }
                Key::Ctrl('e') => self.enter_edit(),
                Key::Ctrl('f') => self.enter_list(),
                Key::Ctrl('k') => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.line.kill_to_end();
                        self.mark_edited();
                        self.draw();
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Ctrl('l') => self.redraw(),
                Key::Ctrl('o') => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        ctrl_o = true;
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Ctrl('q') => return Ok(Outcome::Quit),
                Key::Ctrl('r') | Key::Fn(4) => {
                    if let Some(mark) = self.view.mark {
                        self.jump(mark);
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Ctrl('s') => self.next_file(),
                Key::Ctrl('t') => {
                    self.screen.mono = !self.screen.mono;
                    self.redraw();
                }
                Key::Ctrl('u') => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.line.kill_to_start();
                        self.mark_edited();
                        self.draw();
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Ctrl('v') => {
                    if self.view.select.is_none() {
                        ctrl_v = true;
                    } else {
                        self.screen.alert();
                    }
                }
                Key::Ctrl('w') => self.back_file(),
                Key::Ctrl('x') | Key::Fn(3) => {
                    self.view.mark = Some(self.view.select.unwrap_or(self.view.row));
                }
                Key::Ctrl('y') | Key::Fn(2) => self.edit_file()?,
                Key::Ctrl('z') | Key::Fn(1) => {
                    if self.help()? {
                        return Ok(Outcome::Quit);
                    }
                }
                Key::Ctrl('\\') => {
                    // Safety: re-raise for the default terminate path.
                    unsafe { libc::raise(libc::SIGTERM) };
                }

                Key::Char(c) => {
                    if self.mode == Mode::Edit || self.view.select.is_none() {
                        self.insert_char(c);
                    } else if self.mode == Mode::List || self.mode == Mode::Query {
                        match c.to_ascii_lowercase() {
                            'a' if self.mode == Mode::Query => {
                                self.view.select_all_rows(true);
                                self.redraw();
                            }
                            'c' => {
                                self.view.select_all_rows(false);
                                if self.mode == Mode::List {
                                    self.types_selected.iter_mut().for_each(|t| *t = false);
                                }
                                self.redraw();
                            }
                            _ => self.screen.alert(),
                        }
                    }
                }

                _ => {
                    if self.help()? {
                        return Ok(Outcome::Quit);
                    }
                }
            }
        }
    }

    // ---- edit helpers ----

    fn mark_edited(&mut self) {
        if self.mode == Mode::Edit {
            self.save_line();
        } else {
            self.updated = true;
            self.error = None;
        }
    }

    fn insert_char(&mut self, c: char) {
        if !self.line.insert_char(c) {
            // InputTooLong: bell, drop the excess, keep state consistent.
            self.screen.alert();
        }
        self.mark_edited();
        self.draw();
    }

    fn erase_chars(&mut self, n: usize) {
        self.line.erase(n);
        self.mark_edited();
        self.draw();
    }

    fn move_col(&mut self, col: isize) {
        self.line.move_to(col);
        self.offset_for_cursor();
        self.draw();
    }

    /// Adjusts the pan so the cursor stays inside the window minus the
    /// shift margin.
    fn offset_for_cursor(&mut self) {
        let avail = self.screen.cols.saturating_sub(self.start + 1);
        let col = self.line.col();
        let width = self.line.width();
        let pos = if width.saturating_sub(col) < self.shift {
            avail.saturating_sub(width.saturating_sub(col))
        } else {
            avail.saturating_sub(self.shift)
        };
        self.offset = col.saturating_sub(pos);
    }

    // ---- drawing ----

    fn redraw(&mut self) {
        self.screen.getsize();
        self.shift = self.screen.cols.saturating_sub(self.start) / 10;

        match self.mode {
            Mode::Query | Mode::List | Mode::Edit => {
                let rows = self.view.rows();
                let capacity = self.result_rows();
                if let Some(sel) = self.view.select {
                    if sel < self.view.row {
                        self.view.row = sel;
                    }
                    if sel >= self.view.row + capacity {
                        self.view.row = sel + 1 - capacity;
                    }
                }
                if self.view.row >= rows {
                    self.view.row = rows.saturating_sub(1);
                }
                self.paint_results();
                self.draw();
            }
            Mode::Help => self.draw_help(),
        }
        let _ = self.screen.flush();
    }

    fn paint_results(&mut self) {
        let capacity = self.result_rows();
        let end = self.view.rows().min(self.view.row + capacity);
        for i in self.view.row..end {
            self.paint_row(i);
        }
        if self.view.rows() < self.view.row + capacity {
            self.paint_status();
            self.screen.end();
        }
    }

    fn paint_row(&mut self, idx: usize) {
        let row = idx - self.view.row + 1;
        self.screen.normal();
        if self.view.is_selected(idx) {
            self.screen.select();
        }
        let line = self.view.line(idx).to_vec();
        let skip = self.view.skip;
        self.screen.put_line(row, &line, skip);
        if self.view.is_selected(idx) {
            self.screen.deselect();
        }
    }

    /// Status row below the last result: search animation, `(END)`, or
    /// the live regex error.
    fn paint_status(&mut self) {
        let row = self.view.rows() - self.view.row + 1;
        self.screen.normal();
        self.screen.invert();
        if self.error.is_none() {
            if self.fetcher.drained() {
                self.screen.put_at(row, 0, "(END)");
            } else {
                let label = format!("Searching{}", ".".repeat(self.dots));
                self.dots = (self.dots + 1) & 3;
                self.screen.put_at(row, 0, &label);
            }
            self.screen.normal();
        } else {
            self.screen.put_at(row, 0, "(ERROR)");
            self.screen.normal();
            self.screen.setpos(2, 0);
            self.screen.put_str(ERROR_COLOR);
            let what = self.what.clone();
            self.screen.put_str(&what);
            self.screen.normal();
            self.screen.erase();
        }
    }

    /// Repaints the prompt/status line for the current mode.
    fn draw(&mut self) {
        match self.mode {
            Mode::Query => {
                if self.view.select.is_none() {
                    self.screen.home();
                    if self.error.is_none() {
                        self.screen.put_str(PROMPT_COLOR);
                    } else {
                        self.screen.put_str(ERROR_COLOR);
                    }
                    let prompt = self.prompt;
                    self.screen.put_str(prompt);
                    self.screen.normal();
                    self.screen.put(b" ");
                    self.draw_edit_line(self.start);
                } else {
                    self.screen.normal();
                    self.screen.put_at(
                        0,
                        0,
                        "\x1b[7mEnter\x1b[m/\x1b[7mDel\x1b[m toggle selection  \x1b[7mA\x1b[m all  \x1b[7mC\x1b[m clear  \x1b[7mEsc\x1b[m go back  \x1b[7m^Q\x1b[m quick exit",
                    );
                }
            }
            Mode::List => {
                self.screen.normal();
                self.screen.put_at(
                    0,
                    0,
                    "\x1b[7mEnter\x1b[m/\x1b[7mDel\x1b[m toggle file type selection  \x1b[7mC\x1b[m clear  \x1b[7mEsc\x1b[m go back",
                );
            }
            Mode::Edit => {
                if let Some(sel) = self.view.select {
                    self.screen.setpos(sel - self.view.row + 1, 0);
                    self.draw_edit_line(0);
                }
                self.screen.put_at(0, 0, "\x1b[7mEDIT\x1b[m");
            }
            Mode::Help => {}
        }
        let _ = self.screen.flush();
    }

    /// Renders the edit line with pan arrows and the regex-error cell
    /// highlighted.
    fn draw_edit_line(&mut self, start: usize) {
        self.offset_for_cursor();
        let avail = self.screen.cols.saturating_sub(start + 1);
        let width = self.line.width();
        let text = self.line.to_string_lossy();
        let err_char = self.error.map(|byte| {
            text.as_bytes()
                .iter()
                .take(byte)
                .filter(|&&b| b & 0xc0 != 0x80)
                .count()
        });

        let mut out = String::new();
        let mut col = 0usize;
        let offset = self.offset;
        if offset > 0 {
            out.push_str(PROMPT_COLOR);
            out.push_str(LARROW);
            out.push_str("\x1b[m");
        }
        let mut shown = 0usize;
        let mut truncated = false;
        for (i, c) in text.chars().enumerate() {
            let w = char_cells(c);
            if col + w <= offset {
                col += w;
                continue;
            }
            if shown + w > avail.saturating_sub(if offset > 0 { 1 } else { 0 }) {
                truncated = true;
                break;
            }
            if Some(i) == err_char {
                out.push_str(ERROR_COLOR);
            }
            push_visible(&mut out, c);
            if Some(i) == err_char {
                out.push_str("\x1b[m");
            }
            col += w;
            shown += w;
        }
        if truncated || width > offset + avail {
            out.push_str(PROMPT_COLOR);
            out.push_str(RARROW);
            out.push_str("\x1b[m");
        }
        self.screen.setpos(if start == 0 { self.edit_row() } else { 0 }, start);
        self.screen.put_str(&out);
        self.screen.erase();
    }

    fn edit_row(&self) -> usize {
        self.view
            .select
            .map(|sel| sel - self.view.row + 1)
            .unwrap_or(0)
    }

    fn draw_help(&mut self) {
        self.screen.clear();
        let lines = [
            "",
            "\x1b[7mEsc\x1b[m   exit & save selected",
            "\x1b[7mEnter\x1b[m selection mode",
            "",
            "\x1b[7mTab\x1b[m    \x1b[7mS-Tab\x1b[m   pan",
            "\x1b[7mUp\x1b[m     \x1b[7mDown\x1b[m    scroll",
            "\x1b[7mPgUp\x1b[m   \x1b[7mPgDn\x1b[m    scroll page",
            "\x1b[7mM-Left\x1b[m \x1b[7mM-Right\x1b[m pan \u{bd} page",
            "\x1b[7mM-Up\x1b[m   \x1b[7mM-Down\x1b[m  scroll \u{bd} pg",
            "",
            "\x1b[7mHome\x1b[m \x1b[7mEnd\x1b[m begin/end of line",
            "\x1b[7m^E\x1b[m edit results in place",
            "\x1b[7m^F\x1b[m file type filter",
            "\x1b[7m^K\x1b[m delete after cursor",
            "\x1b[7m^L\x1b[m refresh screen",
            "\x1b[7m^Q\x1b[m quick exit and save",
            "\x1b[7m^R\x1b[m or \x1b[7mF4\x1b[m jump to bookmark",
            "\x1b[7m^S\x1b[m scroll to next file",
            "\x1b[7m^T\x1b[m toggle colors on/off",
            "\x1b[7m^U\x1b[m delete before cursor",
            "\x1b[7m^V\x1b[m verbatim character",
            "\x1b[7m^W\x1b[m scroll back one file",
            "\x1b[7m^X\x1b[m or \x1b[7mF3\x1b[m set bookmark",
            "\x1b[7m^Y\x1b[m or \x1b[7mF2\x1b[m edit file",
            "\x1b[7m^Z\x1b[m or \x1b[7mF1\x1b[m help",
            "\x1b[7m^\\\x1b[m terminate process",
        ];
        for (i, text) in lines.iter().enumerate() {
            self.screen.put_at(i + 1, 0, text);
        }

        let mut row = lines.len() + 2;
        let mut col = 0;
        for (i, def) in FLAG_DEFS.iter().enumerate() {
            if row >= self.screen.rows {
                row = 2;
                col += 28;
            }
            let mark = if self.flags[i] { 'X' } else { ' ' };
            let text = format!(
                "\x1b[7mM-{}\x1b[m [\x1b[32;1m{}\x1b[m] {}",
                def.key, mark, def.label
            );
            self.screen.put_at(row, col, &text);
            row += 1;
        }

        if !self.message {
            self.screen.put_at(
                0,
                0,
                "\x1b[7mF1\x1b[m help and options:        \x1b[7m^\x1b[m=\x1b[7mCtrl\x1b[m  \x1b[7mS-\x1b[m=\x1b[7mShift\x1b[m  \x1b[7mM-\x1b[m=\x1b[7mAlt\x1b[m or use \x1b[7m^O\x1b[m+key",
            );
        } else {
            self.message = false;
        }
        let cols = self.screen.cols;
        self.screen.setpos(0, cols.saturating_sub(1));
        self.screen.put(b"?");
        let _ = self.screen.flush();
    }

    // ---- periodic update ----

    /// One UI tick: drain the pipe, repaint newly arrived rows, and keep
    /// the status row fresh.
    fn update(&mut self) {
        let begin = self.view.rows();
        let target = self.view.row + 2 * self.result_rows();
        self.fetcher.fetch(target, &mut self.view);
        self.poll_error();

        let capacity = self.result_rows();
        if self.view.rows() > begin && begin < self.view.row + capacity {
            let start = begin.max(self.view.row);
            let end = self.view.rows().min(self.view.row + capacity);
            for i in start..end {
                self.paint_row(i);
            }
        }

        if self.view.rows() < self.view.row + capacity {
            self.paint_status();
            if self.error.is_some() {
                self.draw();
            }
        }
    }

    // ---- scrolling and selection ----

    fn save_line(&mut self) {
        if self.mode == Mode::Edit {
            if let Some(sel) = self.view.select {
                if sel < self.view.rows() {
                    self.view.set_line(sel, self.line.bytes().to_vec());
                }
            }
        }
    }

    fn load_line(&mut self) {
        if self.mode == Mode::Edit {
            if let Some(sel) = self.view.select {
                if sel < self.view.rows() {
                    let bytes = self.view.line(sel).to_vec();
                    self.line.set_bytes(&bytes);
                    self.line.move_to(0);
                }
            }
        }
    }

    fn up(&mut self) {
        if let Some(sel) = self.view.select {
            self.save_line();
            if sel > 0 {
                self.view.select = Some(sel - 1);
                self.load_line();
            }
            if self.view.select.unwrap_or(0) > self.view.row {
                self.paint_results();
                self.draw();
                return;
            }
        }
        if self.view.row > 0 {
            self.view.row -= 1;
        }
        self.paint_results();
        self.draw();
    }

    fn down(&mut self) {
        let rows = self.view.rows();
        if let Some(sel) = self.view.select {
            self.save_line();
            let next = (sel + 1).min(rows.saturating_sub(1));
            self.view.select = Some(next);
            self.load_line();
            if next + 1 < self.view.row + self.result_rows() {
                self.paint_results();
                self.draw();
                return;
            }
        }
        if self.view.row + 1 < rows {
            self.view.row += 1;
        }
        self.paint_results();
        self.draw();
    }

    fn pgup(&mut self, half: bool) {
        let step = if half {
            self.result_rows() / 2
        } else {
            self.result_rows().saturating_sub(1)
        }
        .max(1);
        if let Some(sel) = self.view.select {
            self.save_line();
            self.view.select = Some(sel.saturating_sub(step));
            self.load_line();
        }
        self.view.row = self.view.row.saturating_sub(step);
        if let Some(sel) = self.view.select {
            if sel < self.view.row {
                self.view.row = sel;
            }
        }
        self.paint_results();
        self.draw();
    }

    fn pgdn(&mut self, half: bool) {
        let rows = self.view.rows();
        let step = if half {
            self.result_rows() / 2
        } else {
            self.result_rows().saturating_sub(1)
        }
        .max(1);
        if let Some(sel) = self.view.select {
            self.save_line();
            let next = (sel + step).min(rows.saturating_sub(1));
            self.view.select = Some(next);
            self.load_line();
        }
        if self.view.row + step < rows {
            self.view.row += step;
        } else {
            self.view.row = rows.saturating_sub(1);
        }
        if let Some(sel) = self.view.select {
            let capacity = self.result_rows();
            if sel >= self.view.row + capacity {
                self.view.row = sel + 1 - capacity;
            }
        }
        self.paint_results();
        self.draw();
    }

    /// Scrolls forward to the next filename marker, fetching as needed.
    /// Degenerates to a page scroll when the output carries no markers.
    fn next_file(&mut self) {
        let config = self.build_config();
        if config.unsegmented() {
            self.pgdn(false);
            return;
        }
        let fwm = config.files_with_matches;

        let mut current = Vec::new();
        let at = self.view.select.unwrap_or(self.view.row);
        if at < self.view.rows() {
            is_filename(self.view.line(at), fwm, &mut current);
        }

        self.down();
        loop {
            let mut found = false;
            loop {
                let at = self.view.select.unwrap_or(self.view.row);
                let bottom = match self.view.select {
                    Some(sel) => sel + 1 >= self.view.rows(),
                    None => self.view.row + self.result_rows() > self.view.rows(),
                };
                if bottom {
                    break;
                }
                if is_filename(self.view.line(at), fwm, &mut current) {
                    found = true;
                    break;
                }
                self.down();
            }
            if found || self.fetcher.drained() || keys::key_pending() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
            self.update();
        }
    }

    /// Scrolls back to the previous filename marker.
    fn back_file(&mut self) {
        let config = self.build_config();
        if config.unsegmented() {
            self.pgup(false);
            return;
        }
        let fwm = config.files_with_matches;
        if self.view.rows() == 0 {
            return;
        }

        self.up();
        let mut current = Vec::new();
        let at = self.view.select.unwrap_or(self.view.row);
        if at < self.view.rows() {
            is_filename(self.view.line(at), fwm, &mut current);
        }
        loop {
            let at = self.view.select.unwrap_or(self.view.row);
            if at == 0 || is_filename(self.view.line(at), fwm, &mut current) {
                break;
            }
            self.up();
        }
    }

    /// Scrolls until `target` is visible, blocking on the fetcher as rows
    /// arrive; a pressed key interrupts the wait.
    fn jump(&mut self, target: usize) {
        if self.view.rows() == 0 {
            return;
        }
        let pos = self.view.select.unwrap_or(self.view.row);
        if target <= pos {
            match self.view.select {
                Some(_) => self.view.select = Some(target.min(self.view.rows() - 1)),
                None => self.view.row = target.min(self.view.rows() - 1),
            }
            self.redraw();
            return;
        }
        loop {
            let before = self.view.select.unwrap_or(self.view.row);
            if before >= target {
                break;
            }
            self.down();
            let after = self.view.select.unwrap_or(self.view.row);
            if after == before {
                if self.fetcher.drained() || keys::key_pending() {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
                self.update();
            }
        }
    }

    // ---- modes ----

    fn enter_edit(&mut self) {
        if self.mode != Mode::Query || self.view.rows() == 0 {
            self.screen.alert();
            return;
        }
        self.mode = Mode::Edit;
        self.view.select = Some(self.view.select.unwrap_or(self.view.row));
        self.load_line();
        self.redraw();
    }

    fn leave_edit(&mut self) {
        self.save_line();
        self.mode = Mode::Query;
        self.view.select = None;
        self.line.clear();
        self.redraw();
    }

    /// LIST mode shows the file-type table in the viewport; committing
    /// turns the selection into an extension filter and re-runs.
    fn enter_list(&mut self) {
        if self.mode != Mode::Query {
            self.screen.alert();
            return;
        }
        self.mode = Mode::List;
        self.fetcher.close();
        self.view.clear();
        for (i, (name, exts)) in FILE_TYPES.iter().enumerate() {
            let mut row = format!("{name:10} ");
            row.push_str(&exts.join(" "));
            self.view.append_open(row.as_bytes());
            self.view.complete_row();
            if self.types_selected[i] {
                self.view.toggle(i);
            }
        }
        self.view.select = Some(0);
        self.redraw();
    }

    fn commit_list(&mut self) {
        for i in 0..FILE_TYPES.len() {
            self.types_selected[i] = self.view.is_selected(i);
        }
        self.mode = Mode::Query;
        self.view.select = None;
        self.updated = true;
        self.redraw();
    }

    // ---- external editor ----

    /// Opens the file under the cursor in `$GREP_EDIT`/`$EDITOR`.
    fn edit_file(&mut self) -> io::Result<()> {
        let config = self.build_config();
        if self.view.rows() == 0 || config.unsegmented() {
            self.screen.alert();
            return Ok(());
        }
        let editor = std::env::var("GREP_EDIT")
            .or_else(|_| std::env::var("EDITOR"))
            .ok();
        let editor = match editor {
            Some(editor) if !editor.is_empty() => editor,
            _ => {
                self.screen.alert();
                return Ok(());
            }
        };

        let fwm = config.files_with_matches;
        let mut name = Vec::new();
        let mut found = false;
        let mut i = self.view.select.unwrap_or(self.view.row);
        loop {
            if is_filename(self.view.line(i), fwm, &mut name) {
                found = true;
                break;
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
        let path = std::path::PathBuf::from(String::from_utf8_lossy(&name).into_owned());
        if !found || !path.is_file() {
            self.screen.alert();
            self.message = true;
            self.what = format!("Cannot edit file {}", path.display());
            return Ok(());
        }

        self.screen.cleanup();
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("{} {}", editor, shell_quote(&path)))
            .status();
        self.screen = Screen::setup()?;

        match status {
            Ok(code) if code.success() => {
                self.view.mark = Some(self.view.select.unwrap_or(self.view.row));
                self.view.select = None;
                self.updated = true;
            }
            _ => self.screen.alert(),
        }
        self.redraw();
        Ok(())
    }

    // ---- flag toggles ----

    /// Toggles the flag bound to `key`, clearing its exclusion group, and
    /// shows a transient confirmation in row 0.
    fn meta(&mut self, key: char) {
        let Some(idx) = FLAG_DEFS.iter().position(|def| def.key == key) else {
            self.screen.alert();
            return;
        };

        if !self.flags[idx] {
            self.clear_exclusions(key);
        } else if key == 'R' || key == 'r' {
            for i in DEPTH_FIRST..=DEPTH_LAST {
                self.flags[i] = false;
            }
        }
        self.flags[idx] = !self.flags[idx];
        self.updated = true;

        let state = if self.flags[idx] {
            " \x1b[32;1mon\x1b[m  "
        } else {
            " \x1b[31;1moff\x1b[m  "
        };
        let text = format!(
            "\x1b[m\x1b[7mM-{}\x1b[m {}{}",
            key, FLAG_DEFS[idx].label, state
        );
        self.screen.normal();
        self.screen.put_at(0, 0, &text);
        let _ = self.screen.flush();
        self.message = true;
    }

    /// Mutual exclusions applied when a flag turns on.
    fn clear_exclusions(&mut self, key: char) {
        let clear = |flags: &mut Vec<bool>, idxs: &[usize]| {
            for &i in idxs {
                flags[i] = false;
            }
        };
        match key {
            'A' => clear(&mut self.flags, &[1, 3, 14, 26]),
            'B' => clear(&mut self.flags, &[0, 3, 14, 26]),
            'C' => clear(&mut self.flags, &[0, 1, 14, 26]),
            'b' | 'k' | 'n' => clear(&mut self.flags, &[4, 12]),
            'c' => clear(&mut self.flags, &[2, 11, 12, 13]),
            'H' => clear(&mut self.flags, &[7]),
            'h' => clear(&mut self.flags, &[6]),
            'I' => clear(&mut self.flags, &[21, 23]),
            'i' => clear(&mut self.flags, &[10]),
            'j' => clear(&mut self.flags, &[9]),
            'l' => clear(&mut self.flags, &[2, 4, 11, 13]),
            'o' => clear(&mut self.flags, &[0, 1, 3, 26]),
            'R' => {
                self.flags[16] = false;
                for i in DEPTH_FIRST..=DEPTH_LAST {
                    self.flags[i] = false;
                }
            }
            'r' => {
                self.flags[15] = false;
                for i in DEPTH_FIRST..=DEPTH_LAST {
                    self.flags[i] = false;
                }
            }
            'W' => clear(&mut self.flags, &[8, 23]),
            'w' => clear(&mut self.flags, &[24]),
            'X' => clear(&mut self.flags, &[8, 21]),
            'x' => clear(&mut self.flags, &[22]),
            'y' => clear(&mut self.flags, &[0, 1, 3, 14]),
            '1'..='9' => {
                for i in DEPTH_FIRST..=DEPTH_LAST {
                    self.flags[i] = false;
                }
                // Depth implies recursion, following symlinks.
                if !self.flags[15] && !self.flags[16] {
                    self.flags[15] = true;
                }
            }
            '#' => clear(&mut self.flags, &[41, 42]),
            '$' => clear(&mut self.flags, &[40, 42]),
            '@' => clear(&mut self.flags, &[40, 41]),
            _ => {}
        }
    }

    // ---- help and quit ----

    /// HELP overlay loop. Returns `true` when the user asked for a quick
    /// exit from inside help.
    fn help(&mut self) -> io::Result<bool> {
        let old_mode = self.mode;
        self.mode = Mode::Help;
        self.draw_help();

        let mut ctrl_o = false;
        let quick = loop {
            let key = keys::wait_key()?;
            if ctrl_o {
                if let Key::Char(c) = key {
                    self.meta(c);
                }
                self.draw_help();
                ctrl_o = false;
                continue;
            }
            match key {
                Key::Ctrl('q') => break true,
                Key::Esc => break false,
                Key::Ctrl('l') | Key::Resize => self.draw_help(),
                Key::Ctrl('c') => {
                    if self.quit()? {
                        return Ok(true);
                    }
                    self.draw_help();
                }
                Key::Ctrl('o') => ctrl_o = true,
                Key::Ctrl('t') => {
                    self.screen.mono = !self.screen.mono;
                    self.draw_help();
                }
                Key::Ctrl('\\') => {
                    // Safety: default terminate path.
                    unsafe { libc::raise(libc::SIGTERM) };
                }
                Key::Meta(c) => {
                    self.meta(c);
                    self.draw_help();
                }
                Key::Fn(1) => {}
                _ => self.screen.alert(),
            }
        };

        self.mode = old_mode;
        self.screen.clear();
        self.redraw();
        Ok(quick)
    }

    /// Exit confirmation. Returns `true` to really quit.
    fn quit(&mut self) -> io::Result<bool> {
        if self.base.no_confirm {
            return Ok(true);
        }
        self.screen.put_str(PROMPT_COLOR);
        self.screen.put_at(0, 0, ">>");
        self.screen.setpos(0, 2);
        self.screen.put_str("\x1b[mExit? (y/n) [n] ");
        self.screen.flush()?;

        let key = keys::wait_key()?;
        if matches!(key, Key::Char('y') | Key::Char('Y')) {
            return Ok(true);
        }
        self.draw();
        Ok(false)
    }

    // ---- exit printing ----

    /// Prints the selected rows to stdout after the terminal is restored.
    /// With select-all still streaming, the pipe flips to blocking and is
    /// drained to EOF so late rows are captured too.
    fn print_selection(&mut self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut i = 0;
        while i < self.view.rows() {
            if self.view.is_selected(i) && !print_row(&mut out, self.view.line(i), self.screen.mono)
            {
                return Ok(());
            }
            i += 1;
        }

        if self.view.select_all && !self.fetcher.drained() {
            self.fetcher.set_blocking();
            loop {
                self.fetcher.fetch(i, &mut self.view);
                if self.view.rows() == i {
                    break;
                }
                while i < self.view.rows() {
                    if !print_row(&mut out, self.view.line(i), self.screen.mono) {
                        return Ok(());
                    }
                    i += 1;
                }
            }
        }
        out.flush()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cells one char occupies in the edit line (controls render as `^X`).
fn char_cells(c: char) -> usize {
    if (c as u32) < 0x20 || c == '\u{7f}' {
        2
    } else {
        unicode_width::UnicodeWidthChar::width(c).unwrap_or(1)
    }
}

/// Pushes a char, rendering controls as inverted `^X`.
fn push_visible(out: &mut String, c: char) {
    if c == '\u{7f}' {
        out.push_str("\x1b[7m^?\x1b[m");
    } else if (c as u32) < 0x20 {
        out.push_str("\x1b[7m^");
        out.push(char::from(b'@' + c as u8));
        out.push_str("\x1b[m");
    } else {
        out.push(c);
    }
}

fn shell_quote(path: &std::path::Path) -> String {
    let s = path.display().to_string();
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Writes one selected row, dropping the framing NULs; in mono the CSI
/// sequences go too. Returns `false` on a short write.
fn print_row(out: &mut impl Write, line: &[u8], mono: bool) -> bool {
    let mut buf = Vec::with_capacity(line.len() + 1);
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        if b == 0 {
            i += 1;
            continue;
        }
        if b == 0x1b && mono {
            i = ansi_end(line, i);
            continue;
        }
        buf.push(b);
        i += 1;
    }
    buf.push(b'\n');
    out.write_all(&buf).is_ok()
}

/// Projects the configuration into the flag table.
fn flags_from_config(config: &SearchConfig) -> Vec<bool> {
    let mut flags = vec![false; FLAG_DEFS.len()];
    flags[0] = config.after_context > 0 && config.before_context == 0;
    flags[1] = config.before_context > 0 && config.after_context == 0;
    flags[2] = config.byte_offset;
    flags[3] = config.after_context > 0 && config.before_context > 0;
    flags[4] = config.count;
    flags[5] = config.fixed_strings;
    flags[6] = config.with_filename;
    flags[7] = config.no_filename;
    flags[8] = config.binary_without_match;
    flags[9] = config.ignore_case;
    flags[10] = config.smart_case;
    flags[11] = config.column_number;
    flags[12] = config.files_with_matches;
    flags[13] = config.line_number;
    flags[14] = config.only_matching;
    flags[15] = config.recurse && config.dereference;
    flags[16] = config.recurse && !config.dereference;
    flags[17] = config.initial_tab;
    flags[18] = config.binary;
    flags[19] = config.ungroup;
    flags[20] = config.invert_match;
    flags[21] = config.with_hex;
    flags[22] = config.word_regexp;
    flags[23] = config.hex;
    flags[24] = config.line_regexp;
    flags[25] = config.empty;
    flags[26] = config.any_line;
    flags[27] = config.decompress;
    flags[28] = config.null;
    for d in 1..=9usize {
        flags[DEPTH_FIRST + d - 1] = config.max_depth == d;
    }
    flags[38] = config.no_hidden;
    flags[39] = config.heading;
    flags[40] = config.sort == SortKey::Size;
    flags[41] = config.sort == SortKey::Changed;
    flags[42] = config.sort == SortKey::Created;
    flags[43] = config.sort_reverse;
    flags
}

/// Applies the flag table back onto the configuration.
fn apply_flags(config: &mut SearchConfig, flags: &[bool], context: usize) {
    config.after_context = if flags[0] || flags[3] { context } else { 0 };
    config.before_context = if flags[1] || flags[3] { context } else { 0 };
    config.byte_offset = flags[2];
    config.count = flags[4];
    config.fixed_strings = flags[5];
    config.with_filename = flags[6];
    config.no_filename = flags[7];
    config.binary_without_match = flags[8];
    config.ignore_case = flags[9];
    config.smart_case = flags[10];
    config.column_number = flags[11];
    config.files_with_matches = flags[12];
    config.line_number = flags[13];
    config.only_matching = flags[14];
    if flags[15] {
        config.recurse = true;
        config.dereference = true;
    } else if flags[16] {
        config.recurse = true;
        config.dereference = false;
    } else {
        config.recurse = false;
        config.dereference = false;
    }
    config.initial_tab = flags[17];
    config.binary = flags[18];
    config.ungroup = flags[19];
    config.invert_match = flags[20];
    config.with_hex = flags[21];
    config.word_regexp = flags[22];
    config.hex = flags[23];
    config.line_regexp = flags[24];
    config.empty = flags[25];
    config.any_line = flags[26];
    config.decompress = flags[27];
    config.null = flags[28];
    config.max_depth = 0;
    for d in 1..=9usize {
        if flags[DEPTH_FIRST + d - 1] {
            config.max_depth = d;
        }
    }
    config.no_hidden = flags[38];
    config.heading = flags[39];
    config.sort = if flags[40] {
        SortKey::Size
    } else if flags[41] {
        SortKey::Changed
    } else if flags[42] {
        SortKey::Created
    } else {
        SortKey::Name
    };
    config.sort_reverse = flags[43];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_projection_round_trips() {
        let mut config = SearchConfig::default();
        config.line_number = true;
        config.ignore_case = true;
        config.recurse = true;
        config.max_depth = 3;
        config.sort = SortKey::Changed;
        config.sort_reverse = true;
        config.after_context = 2;

        let flags = flags_from_config(&config);
        let mut back = SearchConfig::default();
        apply_flags(&mut back, &flags, 2);

        assert!(back.line_number);
        assert!(back.ignore_case);
        assert!(back.recurse && !back.dereference);
        assert_eq!(back.max_depth, 3);
        assert_eq!(back.sort, SortKey::Changed);
        assert!(back.sort_reverse);
        assert_eq!(back.after_context, 2);
        assert_eq!(back.before_context, 0);
    }

    #[test]
    fn flag_keys_are_unique() {
        for (i, a) in FLAG_DEFS.iter().enumerate() {
            for b in &FLAG_DEFS[i + 1..] {
                assert_ne!(a.key, b.key, "duplicate flag key {}", a.key);
            }
        }
    }

    #[test]
    fn context_flags_are_mutually_exclusive() {
        let mut config = SearchConfig::default();
        let mut ui_flags = flags_from_config(&config);
        ui_flags[0] = true; // A
        let mut harness = TestExclusions {
            flags: ui_flags,
        };
        harness.clear_for('B');
        harness.flags[1] = true;
        assert!(!harness.flags[0]);
        assert!(!harness.flags[3]);

        apply_flags(&mut config, &harness.flags, 2);
        assert_eq!(config.before_context, 2);
        assert_eq!(config.after_context, 0);
    }

    #[test]
    fn depth_digits_imply_recursion() {
        let mut harness = TestExclusions {
            flags: vec![false; FLAG_DEFS.len()],
        };
        harness.clear_for('3');
        harness.flags[DEPTH_FIRST + 2] = true;
        assert!(
            harness.flags[15],
            "depth digit must enable recurse with symlinks"
        );

        harness.clear_for('5');
        harness.flags[DEPTH_FIRST + 4] = true;
        assert!(!harness.flags[DEPTH_FIRST + 2], "digits exclude each other");
    }

    #[test]
    fn recurse_variants_exclude_each_other() {
        let mut harness = TestExclusions {
            flags: vec![false; FLAG_DEFS.len()],
        };
        harness.flags[16] = true;
        harness.clear_for('R');
        harness.flags[15] = true;
        assert!(!harness.flags[16]);
    }

    /// Exercises the exclusion table without a terminal.
    struct TestExclusions {
        flags: Vec<bool>,
    }

    impl TestExclusions {
        fn clear_for(&mut self, key: char) {
            let mut ui = fake_ui(self.flags.clone());
            ui.clear_exclusions(key);
            self.flags = ui.flags;
        }
    }

    fn fake_ui(flags: Vec<bool>) -> QueryUi {
        QueryUi {
            screen: Screen::stub(),
            base: SearchConfig::default(),
            flags,
            context: 2,
            line: EditLine::new(),
            view: Viewport::new(),
            fetcher: ResultFetcher::new(),
            mode: Mode::Query,
            prompt: "Q>",
            start: 3,
            offset: 0,
            shift: 8,
            updated: false,
            message: false,
            error: None,
            what: String::new(),
            error_slot: Arc::new(Mutex::new(None)),
            search: None,
            dots: 3,
            types_selected: vec![false; FILE_TYPES.len()],
        }
    }
}
