//! Directory traversal and file ordering.
//!
//! The walk happens up front and produces the complete file list before any
//! worker starts: sorted output needs the final order to assign slots, and
//! an explicit list keeps the job queue trivial. Traversal honors the
//! recursion flags, depth limit, hidden filter, symlink policy, and the
//! optional file-type extension filter.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use ignore::WalkBuilder;

use crate::flags::{SearchConfig, SortKey};

/// One file to search, with the metadata the sort keys need.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub path: std::path::PathBuf,
    pub size: u64,
    pub changed: SystemTime,
    pub created: SystemTime,
}

fn wanted_type(config: &SearchConfig, path: &Path) -> bool {
    if config.file_types.is_empty() {
        return true;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    config.file_types.iter().any(|t| t == ext)
}

/// Collects and orders the files to search.
///
/// Roots that are plain files are always included; directory roots are
/// descended only one level unless recursion is on. Unreadable entries are
/// skipped with a debug log.
pub fn collect_files(config: &SearchConfig, cancel: &AtomicBool) -> Vec<FileEntry> {
    let mut files = Vec::new();
    let roots = if config.roots.is_empty() {
        vec![std::path::PathBuf::from(".")]
    } else {
        config.roots.clone()
    };

    let depth = if config.recurse {
        (config.max_depth > 0).then_some(config.max_depth)
    } else {
        Some(1)
    };

    let mut builder = WalkBuilder::new(&roots[0]);
    for root in &roots[1..] {
        builder.add(root);
    }
    builder
        .standard_filters(false)
        .hidden(config.no_hidden)
        .follow_links(config.dereference)
        .max_depth(depth);

    for entry in builder.build() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "walk error");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        // Explicit file roots bypass the type filter.
        if entry.depth() > 0 && !wanted_type(config, path) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "stat failed");
                continue;
            }
        };
        files.push(FileEntry {
            path: path.to_path_buf(),
            size: meta.len(),
            changed: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            created: meta.created().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    sort_files(&mut files, config.sort, config.sort_reverse);
    files
}

/// Applies the configured ordering; path is the tiebreak for every key so
/// output is deterministic.
fn sort_files(files: &mut [FileEntry], key: SortKey, reverse: bool) {
    match key {
        SortKey::None => return,
        SortKey::Name => files.sort_by(|a, b| a.path.cmp(&b.path)),
        SortKey::Size => files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path))),
        SortKey::Changed => {
            files.sort_by(|a, b| a.changed.cmp(&b.changed).then_with(|| a.path.cmp(&b.path)))
        }
        SortKey::Created => {
            files.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)))
        }
    }
    if reverse {
        files.reverse();
    }
}
