use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tracing::error;

/// One regular file seen during traversal, with the metadata the
/// dedup pipeline scores on.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_modified: i64,
    pub last_accessed: Option<i64>,
}

#[derive(Debug, Default)]
pub struct WalkReport {
    pub files: Vec<WalkedFile>,
    /// (path, error message) for entries we could not stat or read.
    pub unreadable: Vec<(String, String)>,
}

/// Parallel directory traversal over the given roots, filtering by glob
/// exclusion patterns. Zero-byte files are kept — they hash and dedupe
/// like any other file. Unreadable entries are reported, never fatal.
pub fn collect_files(
    root_paths: &[&str],
    exclude_globs: &[&str],
    follow_symlinks: bool,
    cancel: &AtomicBool,
) -> io::Result<WalkReport> {
    let exclude_patterns: Vec<Pattern> = exclude_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let files = Mutex::new(Vec::new());
    let unreadable: DashMap<String, String> = DashMap::new();

    root_paths.par_iter().try_for_each(|root_dir| {
        visit_dirs(
            Path::new(root_dir),
            &files,
            &unreadable,
            &exclude_patterns,
            follow_symlinks,
            cancel,
        )
    })?;

    let mut unreadable: Vec<(String, String)> = unreadable.into_iter().collect();
    unreadable.sort();

    Ok(WalkReport {
        files: files.into_inner().unwrap_or_default(),
        unreadable,
    })
}

fn visit_dirs(
    dir: &Path,
    files: &Mutex<Vec<WalkedFile>>,
    unreadable: &DashMap<String, String>,
    exclude_patterns: &[Pattern],
    follow_symlinks: bool,
    cancel: &AtomicBool,
) -> io::Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Ok(());
    }
    if !dir.is_dir() {
        return Ok(());
    }

    if exclude_patterns
        .iter()
        .any(|pattern| pattern.matches_path(dir))
    {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            // One unreadable directory must not abort the whole scan.
            error!("Error reading directory {}: {}", dir.display(), err);
            unreadable.insert(dir.to_string_lossy().into_owned(), err.to_string());
            return Ok(());
        }
    };

    entries.par_bridge().try_for_each(|entry_result| -> io::Result<()> {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }

        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                unreadable.insert(dir.to_string_lossy().into_owned(), err.to_string());
                return Ok(());
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(err) => {
                unreadable.insert(path.to_string_lossy().into_owned(), err.to_string());
                return Ok(());
            }
        };

        if file_type.is_symlink() && !follow_symlinks {
            return Ok(());
        }

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                unreadable.insert(path.to_string_lossy().into_owned(), err.to_string());
                return Ok(());
            }
        };

        if metadata.is_dir() {
            visit_dirs(
                &path,
                files,
                unreadable,
                exclude_patterns,
                follow_symlinks,
                cancel,
            )?;
        } else if metadata.is_file() {
            if exclude_patterns
                .iter()
                .any(|pattern| pattern.matches_path(&path))
            {
                return Ok(());
            }

            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let last_accessed = metadata
                .accessed()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);

            files.lock().unwrap().push(WalkedFile {
                path,
                size_bytes: metadata.len(),
                last_modified,
                last_accessed,
            });
        }
        Ok(())
    })?;

    Ok(())
}
