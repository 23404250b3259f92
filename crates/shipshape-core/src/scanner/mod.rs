pub mod walk;

use crate::config;
use crate::context::AppContext;
use crate::error::Error;
use crate::hasher;
use crate::progress::ProgressReporter;
use crate::registry::models::FileDraft;
use crate::registry::queries::ScanUpsertStats;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walk::WalkedFile;

#[derive(Debug)]
pub struct ScanReport {
    pub files_seen: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub errors: usize,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub db_write_duration: Duration,
}

/// Walk the configured roots, quick-hash everything in a worker pool, and
/// upsert drafts into the registry in batched transactions. Full hashes
/// are deliberately NOT computed here — the analyzer requests them only
/// for quick-hash collisions.
pub fn scan(
    ctx: &AppContext,
    reporter: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> Result<ScanReport, Error> {
    let roots = config::non_overlapping_directories(ctx.config.root_paths.clone());
    info!("Scanning roots: {:?}", roots);

    let root_slices: Vec<&str> = roots.iter().map(|s| s.as_str()).collect();
    let exclude_slices: Vec<&str> = ctx
        .config
        .exclude_patterns
        .iter()
        .map(|s| s.as_str())
        .collect();

    reporter.on_scan_start();
    let scan_start = Instant::now();
    let walk_report = walk::collect_files(
        &root_slices,
        &exclude_slices,
        ctx.config.follow_symlinks,
        cancel,
    )?;
    let scan_duration = scan_start.elapsed();

    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let files_seen = walk_report.files.len();
    reporter.on_scan_complete(files_seen, scan_duration.as_secs_f64());
    debug!(
        "Walk completed in {:.2}s — {} files, {} unreadable",
        scan_duration.as_secs_f64(),
        files_seen,
        walk_report.unreadable.len(),
    );

    // Quick-hash pool. One file is always hashed by one worker, start to end.
    reporter.on_hash_start();
    let hash_start = Instant::now();
    let (mut drafts, hash_failures) = quick_hash_files(ctx, &walk_report.files, reporter, cancel)?;
    // The pool returns results in completion order; registration order (and
    // therefore id assignment) should not depend on scheduling.
    drafts.sort_by(|a, b| a.original_path.cmp(&b.original_path));
    let hash_duration = hash_start.elapsed();
    reporter.on_hash_complete(drafts.len(), hash_duration.as_secs_f64());

    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    // Registry writes, batched. Cancellation between batches leaves every
    // committed batch valid; the next scan simply resumes.
    reporter.on_db_write_start();
    let db_start = Instant::now();
    let mut stats = ScanUpsertStats::default();
    for batch in drafts.chunks(ctx.config.scan_batch_size.max(1)) {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        let batch_stats = ctx.db.upsert_scanned(batch)?;
        stats.inserted += batch_stats.inserted;
        stats.unchanged += batch_stats.unchanged;
        stats.changed += batch_stats.changed;
    }

    let mut errors = 0;
    for (path, message) in walk_report.unreadable.iter().chain(hash_failures.iter()) {
        warn!("Unreadable during scan: {} ({})", path, message);
        ctx.db.record_unreadable(path, message)?;
        errors += 1;
    }
    let db_write_duration = db_start.elapsed();
    reporter.on_db_write_complete(
        stats.inserted + stats.unchanged + stats.changed,
        db_write_duration.as_secs_f64(),
    );

    info!(
        "Scan complete: {} seen, {} new, {} unchanged, {} changed, {} errors",
        files_seen, stats.inserted, stats.unchanged, stats.changed, errors
    );

    Ok(ScanReport {
        files_seen,
        inserted: stats.inserted,
        unchanged: stats.unchanged,
        changed: stats.changed,
        errors,
        scan_duration,
        hash_duration,
        db_write_duration,
    })
}

fn quick_hash_files(
    ctx: &AppContext,
    files: &[WalkedFile],
    reporter: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> Result<(Vec<FileDraft>, Vec<(String, String)>), Error> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.config.scan_workers.max(1))
        .build()
        .map_err(|e| Error::Other(format!("failed to build scan pool: {e}")))?;

    let total = files.len();
    let hashed = AtomicUsize::new(0);
    let failures: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    let drafts: Vec<FileDraft> = pool.install(|| {
        files
            .par_iter()
            .filter_map(|file| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                reporter.on_hash_progress(done, total);

                match hasher::quick_hash_file(&file.path) {
                    Ok(quick_hash) => Some(draft_for(file, quick_hash)),
                    Err(e) => {
                        failures
                            .lock()
                            .unwrap()
                            .push((file.path.to_string_lossy().into_owned(), e.to_string()));
                        None
                    }
                }
            })
            .collect()
    });

    Ok((drafts, failures.into_inner().unwrap_or_default()))
}

fn draft_for(file: &WalkedFile, quick_hash: String) -> FileDraft {
    let path: &Path = &file.path;
    FileDraft {
        original_path: path.to_string_lossy().into_owned(),
        file_name: path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        size_bytes: file.size_bytes as i64,
        quick_hash: Some(quick_hash),
        last_modified: file.last_modified,
        last_accessed: file.last_accessed,
    }
}
