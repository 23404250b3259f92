use crate::context::AppContext;
use crate::error::Error;
use crate::executor::{self, ExecutionReport};
use crate::hasher;
use crate::planner::{self, PlanScope, PlanSummary};
use crate::progress::ProgressReporter;
use ahash::{AHashMap, AHashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct SyncReport {
    pub files_on_disk: usize,
    pub matched: usize,
    pub discovered: usize,
    pub missing: usize,
    pub external_moves: usize,
}

#[derive(Debug)]
pub struct ReorganizeReport {
    pub sync: SyncReport,
    pub plan: PlanSummary,
    /// (source, target) for every move the plan calls for; this is the
    /// whole output in dry-run mode.
    pub pending_moves: Vec<(String, String)>,
    pub execution: Option<ExecutionReport>,
    pub pruned_dirs: usize,
}

/// Reconcile the registry with reality, then re-run placement. Because
/// target-path computation is pure, a second run with unchanged config and
/// classifications produces zero moves — reorganization converges.
pub fn reorganize(
    ctx: &AppContext,
    canonical_root: &Path,
    dry_run: bool,
    reporter: &dyn ProgressReporter,
) -> Result<ReorganizeReport, Error> {
    let sync = sync_registry(ctx, canonical_root)?;

    let plan = planner::build_plan(ctx, canonical_root, PlanScope::Organized)?;

    let pending_moves = match plan.plan_id {
        Some(plan_id) => ctx
            .db
            .get_plan_actions(plan_id)?
            .into_iter()
            .map(|a| (a.source_path, a.target_path))
            .collect(),
        None => Vec::new(),
    };

    let mut execution = None;
    let mut pruned_dirs = 0;
    if !dry_run {
        if let Some(plan_id) = plan.plan_id {
            // The plan derives from the registry we just synced; approval
            // here is the reorganizer's own sign-off.
            planner::approve_plan(ctx, plan_id)?;
            execution = Some(executor::execute(ctx, plan_id, reporter)?);
        }
        pruned_dirs = prune_empty_dirs(canonical_root)?;
    }

    info!(
        "Reorganize{}: {} pending moves, {} dirs pruned",
        if dry_run { " (dry run)" } else { "" },
        pending_moves.len(),
        pruned_dirs
    );

    Ok(ReorganizeReport {
        sync,
        plan,
        pending_moves,
        execution,
        pruned_dirs,
    })
}

/// Step 1: explicit filesystem/registry reconciliation.
/// - files on disk whose hash the registry has never seen → registered
///   as organized at their found path ("discovered")
/// - organized records whose canonical_path is gone → state = missing
/// - records whose content turns up at a different path → canonical_path
///   updated and an external-move event logged (no move_count bump; the
///   system didn't perform that move)
pub fn sync_registry(ctx: &AppContext, canonical_root: &Path) -> Result<SyncReport, Error> {
    let mut report = SyncReport::default();

    // Enumerate and hash everything physically present.
    let mut disk_paths: Vec<(String, u64, i64, String, String)> = Vec::new();
    for entry in WalkDir::new(canonical_root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Sync cannot read entry under canonical root: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Sync cannot stat '{}': {}", path.display(), e);
                continue;
            }
        };
        let quick = match hasher::quick_hash_file(path) {
            Ok(h) => h,
            Err(e) => {
                warn!("Sync cannot hash '{}': {}", path.display(), e);
                continue;
            }
        };
        let full = match hasher::full_hash_file(path) {
            Ok(h) => h,
            Err(e) => {
                warn!("Sync cannot hash '{}': {}", path.display(), e);
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        disk_paths.push((
            path.to_string_lossy().into_owned(),
            metadata.len(),
            mtime,
            quick,
            full,
        ));
    }
    disk_paths.sort_by(|a, b| a.0.cmp(&b.0));
    report.files_on_disk = disk_paths.len();

    let path_set: AHashSet<&str> = disk_paths.iter().map(|d| d.0.as_str()).collect();
    let mut by_hash: AHashMap<&str, Vec<&str>> = AHashMap::new();
    for (path, _, _, _, full) in &disk_paths {
        by_hash.entry(full.as_str()).or_default().push(path.as_str());
    }

    let mut claimed: AHashSet<String> = AHashSet::new();
    let organized = ctx.db.organized_records()?;

    // Pass 1: records still where we put them.
    let mut displaced = Vec::new();
    for record in &organized {
        match record.canonical_path.as_deref() {
            Some(path) if path_set.contains(path) => {
                claimed.insert(path.to_string());
                report.matched += 1;
            }
            _ => displaced.push(record),
        }
    }

    // Pass 2: displaced records — externally moved if their content shows
    // up somewhere unclaimed, otherwise missing.
    for record in displaced {
        let relocated = record.content_hash.as_deref().and_then(|hash| {
            by_hash.get(hash).and_then(|paths| {
                paths
                    .iter()
                    .find(|p| !claimed.contains(**p))
                    .map(|p| p.to_string())
            })
        });
        match relocated {
            Some(new_path) => {
                debug!(
                    "File {} moved externally: '{}' -> '{}'",
                    record.id,
                    record.canonical_path.as_deref().unwrap_or(""),
                    new_path
                );
                ctx.db.record_external_move(record.id, &new_path)?;
                claimed.insert(new_path);
                report.external_moves += 1;
            }
            None => {
                ctx.db.mark_missing(record.id)?;
                report.missing += 1;
            }
        }
    }

    // Pass 3: unclaimed disk files with a hash the registry has never seen.
    for (path, size, mtime, quick, full) in &disk_paths {
        if claimed.contains(path.as_str()) {
            continue;
        }
        let known = ctx.db.find_by_content_hash(full)?;
        if known.is_empty() {
            ctx.db
                .register_discovered(path, *size as i64, quick, full, *mtime)?;
            report.discovered += 1;
        }
        // A known hash at an unclaimed path is an unregistered copy; the
        // scanner and analyzer own that case.
    }

    info!(
        "Registry sync: {} on disk, {} matched, {} discovered, {} missing, {} external moves",
        report.files_on_disk,
        report.matched,
        report.discovered,
        report.missing,
        report.external_moves
    );
    Ok(report)
}

/// Step 4: remove directories the moves left empty, bottom-up. The
/// canonical root itself is never removed.
pub fn prune_empty_dirs(canonical_root: &Path) -> Result<usize, Error> {
    let mut removed = 0usize;
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(canonical_root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.file_type().is_dir() && entry.path() != canonical_root {
            dirs.push(entry.path().to_path_buf());
        }
    }
    // Deepest first so emptied parents are caught in the same pass.
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

    for dir in dirs {
        let is_empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if is_empty && fs::remove_dir(&dir).is_ok() {
            debug!("Pruned empty directory '{}'", dir.display());
            removed += 1;
        }
    }
    Ok(removed)
}
