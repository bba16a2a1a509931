//! Search configuration.
//!
//! One owned [`SearchConfig`] value travels explicitly from the CLI (or the
//! interactive controller) into the engine; nothing here is process-global.
//! The interactive flag table projects in and out of this struct, so every
//! field that has a keyboard toggle round-trips through it.

use std::path::PathBuf;

/// File ordering for output. Anything but `None` switches the output
/// synchronizer into ORDERED mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Completion order; workers race.
    #[default]
    None,
    /// Lexicographic by path.
    Name,
    /// By file size.
    Size,
    /// By modification time.
    Changed,
    /// By creation (status-change) time.
    Created,
}

/// Full configuration of one search run.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub pattern: String,
    pub roots: Vec<PathBuf>,

    // Matcher behavior.
    pub fixed_strings: bool,
    pub ignore_case: bool,
    pub smart_case: bool,
    pub word_regexp: bool,
    pub line_regexp: bool,
    pub invert_match: bool,
    pub only_matching: bool,
    /// Permit patterns that match the empty string.
    pub empty: bool,

    // Output shape.
    pub line_number: bool,
    pub column_number: bool,
    pub byte_offset: bool,
    pub count: bool,
    pub files_with_matches: bool,
    pub with_filename: bool,
    pub no_filename: bool,
    pub heading: bool,
    /// Terminate file names with NUL instead of the usual separator.
    pub null: bool,
    /// Output every line, matching or not.
    pub any_line: bool,
    /// Do not group matches per line.
    pub ungroup: bool,
    pub initial_tab: bool,
    /// Emit the NUL-triplet filename framing the interactive viewport
    /// parses. Set by the query UI, never from the command line.
    pub frame_names: bool,

    // Context.
    pub after_context: usize,
    pub before_context: usize,

    // Binary handling.
    /// Treat binary input as text.
    pub text: bool,
    /// Search binary files with binary patterns.
    pub binary: bool,
    /// Skip binary files entirely.
    pub binary_without_match: bool,
    /// Dump all matching output in hex.
    pub hex: bool,
    /// Dump binary matches in hex, text matches as text.
    pub with_hex: bool,
    pub hex_columns: usize,

    // Traversal.
    pub recurse: bool,
    /// Follow symbolic links while recursing.
    pub dereference: bool,
    /// 0 means unlimited.
    pub max_depth: usize,
    pub no_hidden: bool,
    /// Restrict the walk to these file extensions; empty means all.
    pub file_types: Vec<String>,

    // Engine.
    pub decompress: bool,
    pub sort: SortKey,
    pub sort_reverse: bool,
    /// Truncate output lines to this many columns; 0 disables.
    pub width: usize,
    pub color: bool,
    pub line_buffered: bool,

    // Interactive.
    /// Debounce, in ~100 ms polling ticks, before an edit restarts the search.
    pub query_delay: usize,
    pub no_confirm: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            roots: Vec::new(),
            fixed_strings: false,
            ignore_case: false,
            smart_case: false,
            word_regexp: false,
            line_regexp: false,
            invert_match: false,
            only_matching: false,
            empty: false,
            line_number: false,
            column_number: false,
            byte_offset: false,
            count: false,
            files_with_matches: false,
            with_filename: false,
            no_filename: false,
            heading: false,
            null: false,
            any_line: false,
            ungroup: false,
            initial_tab: false,
            frame_names: false,
            after_context: 0,
            before_context: 0,
            text: false,
            binary: false,
            binary_without_match: false,
            hex: false,
            with_hex: false,
            hex_columns: 16,
            recurse: false,
            dereference: false,
            max_depth: 0,
            no_hidden: false,
            file_types: Vec::new(),
            decompress: false,
            sort: SortKey::None,
            sort_reverse: false,
            width: 0,
            color: false,
            line_buffered: false,
            query_delay: 3,
            no_confirm: false,
        }
    }
}

impl SearchConfig {
    /// True when per-file output carries no filename segmentation the
    /// viewport could navigate by.
    pub fn unsegmented(&self) -> bool {
        self.text || self.count
    }

    /// Effective case-insensitivity, folding smart case against the pattern.
    pub fn case_insensitive(&self) -> bool {
        self.ignore_case
            || (self.smart_case && !self.pattern.chars().any(|c| c.is_ascii_uppercase()))
    }
}
