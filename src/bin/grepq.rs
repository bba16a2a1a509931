//! Command-line entrypoint.
//!
//! Thin wrapper over the library: parse options, then either run one batch
//! search to stdout or hand the terminal to the interactive query UI.
//! Option parsing is deliberately plain; anything the interactive flag
//! table can toggle is reachable here too.

use std::env;
use std::error::Error;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use grepq::output::StdoutSink;
use grepq::{run_search, SearchConfig, SortKey};

fn usage(program: &str) {
    eprintln!(
        "usage: {program} [OPTIONS] PATTERN [PATH...]

OPTIONS:
  -Q, --query[=DELAY]    interactive query UI; DELAY is the response
                         time in 100 ms ticks (default 3)
  -r, --recursive        search directories recursively
  -R, --deref-recursive  recurse and follow symlinks
      --max-depth=NUM    limit recursion depth (1-9)
      --hidden           skip hidden files and directories
  -t, --types=EXT[,EXT]  only search files with these extensions

  -F, --fixed-strings    pattern is a literal string
  -i, --ignore-case      case-insensitive match
  -j, --smart-case       case-insensitive unless the pattern has capitals
  -w, --word-regexp      match whole words
  -x, --line-regexp      match whole lines
  -v, --invert-match     select non-matching lines
  -Y, --empty            permit empty matches

  -n, --line-number      show line numbers
  -k, --column-number    show column numbers
  -b, --byte-offset      show byte offsets
  -c, --count            count matching lines per file
  -l, --files-with-matches  list matching files only
  -o, --only-matching    show only the matched spans
  -u, --ungroup          repeat the line for each match
  -y, --any-line         show every line, matches and context
  -A, -B, -C NUM         after/before/both context lines
  -H, --with-filename    always show filenames
  -h, --no-filename      never show filenames
      --heading          group matches under a filename heading
  -0, --null             NUL after filenames
  -T, --initial-tab      tab before content
      --width=NUM        truncate output lines to NUM columns

  -a, --text             treat binary input as text
  -I, --ignore-binary    skip binary files
  -U, --binary           search binary files verbatim
  -X, --hex              dump all output in hex
  -W, --with-hex         dump binary matches in hex
      --hex-columns=NUM  hex bytes per row (8-64)

  -z, --decompress       search gzip-compressed files
      --sort=KEY         name|size|changed|created, r-prefix reverses
      --color=WHEN       always|never|auto
      --no-confirm       skip the interactive exit confirmation
      --help             this text"
    );
}

struct Parsed {
    config: SearchConfig,
    query: bool,
}

fn parse_args(args: Vec<String>) -> Result<Option<Parsed>, String> {
    let mut config = SearchConfig::default();
    let mut query = false;
    let mut color: Option<bool> = None;
    let mut pattern: Option<String> = None;

    let mut iter = args.into_iter();
    let mut positional_only = false;
    while let Some(arg) = iter.next() {
        if positional_only || !arg.starts_with('-') || arg == "-" {
            if pattern.is_none() {
                pattern = Some(arg);
            } else {
                config.roots.push(arg.into());
            }
            continue;
        }
        if arg == "--" {
            positional_only = true;
            continue;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, value) = match long.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (long, None),
            };
            let mut want =
                |value: Option<String>, iter: &mut std::vec::IntoIter<String>| -> Result<String, String> {
                    value
                        .or_else(|| iter.next())
                        .ok_or_else(|| format!("option --{name} needs a value"))
                };
            match name {
                "help" => return Ok(None),
                "query" => {
                    query = true;
                    // Optional attached value: the debounce in ~100 ms
                    // polling ticks before an edit restarts the search.
                    if let Some(delay) = value {
                        config.query_delay = delay
                            .parse()
                            .map_err(|_| "invalid --query delay".to_string())?;
                    }
                }
                "recursive" => config.recurse = true,
                "deref-recursive" => {
                    config.recurse = true;
                    config.dereference = true;
                }
                "max-depth" => {
                    config.max_depth = want(value, &mut iter)?
                        .parse()
                        .map_err(|_| "invalid --max-depth".to_string())?;
                    config.recurse = true;
                }
                "hidden" => config.no_hidden = true,
                "types" => {
                    config.file_types = want(value, &mut iter)?
                        .split(',')
                        .map(str::to_string)
                        .collect();
                }
                "fixed-strings" => config.fixed_strings = true,
                "ignore-case" => config.ignore_case = true,
                "smart-case" => config.smart_case = true,
                "word-regexp" => config.word_regexp = true,
                "line-regexp" => config.line_regexp = true,
                "invert-match" => config.invert_match = true,
                "empty" => config.empty = true,
                "line-number" => config.line_number = true,
                "column-number" => config.column_number = true,
                "byte-offset" => config.byte_offset = true,
                "count" => config.count = true,
                "files-with-matches" => config.files_with_matches = true,
                "only-matching" => config.only_matching = true,
                "ungroup" => config.ungroup = true,
                "any-line" => config.any_line = true,
                "with-filename" => config.with_filename = true,
                "no-filename" => config.no_filename = true,
                "heading" => config.heading = true,
                "null" => config.null = true,
                "initial-tab" => config.initial_tab = true,
                "width" => {
                    config.width = want(value, &mut iter)?
                        .parse()
                        .map_err(|_| "invalid --width".to_string())?;
                }
                "text" => config.text = true,
                "ignore-binary" => config.binary_without_match = true,
                "binary" => config.binary = true,
                "hex" => config.hex = true,
                "with-hex" => config.with_hex = true,
                "hex-columns" => {
                    config.hex_columns = want(value, &mut iter)?
                        .parse()
                        .map_err(|_| "invalid --hex-columns".to_string())?;
                }
                "decompress" => config.decompress = true,
                "sort" => {
                    let key = want(value, &mut iter)?;
                    let (rev, base) = match key.strip_prefix('r') {
                        Some(b) if matches!(b, "name" | "size" | "changed" | "created") => (true, b),
                        _ => (false, key.as_str()),
                    };
                    config.sort_reverse = rev;
                    config.sort = match base {
                        "name" => SortKey::Name,
                        "size" => SortKey::Size,
                        "changed" => SortKey::Changed,
                        "created" => SortKey::Created,
                        _ => return Err(format!("unknown sort key '{key}'")),
                    };
                }
                "color" => {
                    color = match want(value, &mut iter)?.as_str() {
                        "always" => Some(true),
                        "never" => Some(false),
                        "auto" => None,
                        other => return Err(format!("unknown color mode '{other}'")),
                    };
                }
                "no-confirm" => config.no_confirm = true,
                other => return Err(format!("unknown option --{other}")),
            }
            continue;
        }

        // Short options, groupable; -A/-B/-C take a value, attached or not.
        let mut chars = arg[1..].chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                'Q' => query = true,
                'r' => config.recurse = true,
                'R' => {
                    config.recurse = true;
                    config.dereference = true;
                }
                'F' => config.fixed_strings = true,
                'i' => config.ignore_case = true,
                'j' => config.smart_case = true,
                'w' => config.word_regexp = true,
                'x' => config.line_regexp = true,
                'v' => config.invert_match = true,
                'Y' => config.empty = true,
                'n' => config.line_number = true,
                'k' => config.column_number = true,
                'b' => config.byte_offset = true,
                'c' => config.count = true,
                'l' => config.files_with_matches = true,
                'o' => config.only_matching = true,
                'u' => config.ungroup = true,
                'y' => config.any_line = true,
                'H' => config.with_filename = true,
                'h' => config.no_filename = true,
                '0' => config.null = true,
                'T' => config.initial_tab = true,
                'a' => config.text = true,
                'I' => config.binary_without_match = true,
                'U' => config.binary = true,
                'X' => config.hex = true,
                'W' => config.with_hex = true,
                'z' => config.decompress = true,
                't' => {
                    let rest: String = chars.by_ref().collect();
                    let value = if rest.is_empty() {
                        iter.next().ok_or("option -t needs a value")?
                    } else {
                        rest
                    };
                    config.file_types = value.split(',').map(str::to_string).collect();
                }
                'A' | 'B' | 'C' => {
                    let rest: String = chars.by_ref().collect();
                    let value = if rest.is_empty() {
                        iter.next().ok_or(format!("option -{c} needs a value"))?
                    } else {
                        rest
                    };
                    let n: usize = value.parse().map_err(|_| format!("invalid -{c} value"))?;
                    match c {
                        'A' => config.after_context = n,
                        'B' => config.before_context = n,
                        _ => {
                            config.after_context = n;
                            config.before_context = n;
                        }
                    }
                }
                other => return Err(format!("unknown option -{other}")),
            }
        }
    }

    let Some(pattern) = pattern else {
        if query {
            // The interactive UI starts from an empty pattern.
            config.pattern = String::new();
            if let Some(c) = color {
                config.color = c;
            }
            return Ok(Some(Parsed { config, query }));
        }
        return Err("missing PATTERN".to_string());
    };
    config.pattern = pattern;
    config.color = color.unwrap_or_else(|| std::io::stdout().is_terminal());
    Ok(Some(Parsed { config, query }))
}

static CANCEL: AtomicBool = AtomicBool::new(false);

extern "C" fn on_int(_: libc::c_int) {
    CANCEL.store(true, Ordering::Relaxed);
}

fn main() -> ExitCode {
    let _log = grepq::logging::init();
    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() {
        "grepq".to_string()
    } else {
        args.remove(0)
    };

    let parsed = match parse_args(args) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            usage(&program);
            return ExitCode::from(2);
        }
        Err(err) => {
            eprintln!("{program}: {err}");
            usage(&program);
            return ExitCode::from(2);
        }
    };

    match run(parsed) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{program}: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(parsed: Parsed) -> Result<u8, Box<dyn Error>> {
    if parsed.query {
        let code = grepq::query::run(parsed.config)?;
        return Ok(code.clamp(0, 255) as u8);
    }

    // Safety: the handler only stores to an atomic.
    unsafe { libc::signal(libc::SIGINT, on_int as libc::sighandler_t) };

    let cancel = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cancel = Arc::clone(&cancel);
        std::thread::spawn(move || {
            while !cancel.load(Ordering::Relaxed) {
                if CANCEL.load(Ordering::Relaxed) {
                    cancel.store(true, Ordering::Relaxed);
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
        })
    };

    let sink = StdoutSink;
    let totals = run_search(&parsed.config, &sink, &cancel)?;
    cancel.store(true, Ordering::Relaxed);
    let _ = watcher.join();

    Ok(if totals.matches > 0 { 0 } else { 1 })
}
