use crate::context::AppContext;
use crate::error::Error;
use crate::hasher;
use crate::progress::ProgressReporter;
use crate::registry::models::{ActionStatus, ActionType, MigrationAction, PlanStatus};
use crate::registry::queries::ActionOutcome;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ExecutionReport {
    pub plan_id: i64,
    pub checkpoint_id: i64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub status: PlanStatus,
    /// Every action outcome, in plan order. Silent partial success is not
    /// a thing: anything that didn't happen as planned is in here.
    pub outcomes: Vec<ActionOutcome>,
    pub rollback: Option<RollbackReport>,
}

#[derive(Debug)]
pub struct RollbackReport {
    pub checkpoint_id: i64,
    pub restored: usize,
    pub discrepancies: Vec<String>,
}

/// Execute an approved plan: checkpoint first, then batches of actions in
/// plan order. Per-action failures never abort the run; they are recorded
/// and counted. If the failure rate exceeds the configured threshold the
/// plan is marked failed and the checkpoint is rolled back automatically.
pub fn execute(
    ctx: &AppContext,
    plan_id: i64,
    reporter: &dyn ProgressReporter,
) -> Result<ExecutionReport, Error> {
    let plan = ctx.db.get_plan(plan_id)?;
    if !plan.approved {
        return Err(Error::PlanNotApproved(plan_id));
    }

    let actions = ctx.db.get_plan_actions(plan_id)?;
    let checkpoint_id = ctx.db.create_checkpoint(plan_id)?;
    ctx.db.set_plan_status(plan_id, PlanStatus::Executing)?;
    info!(
        "Executing plan {} ({} actions, checkpoint {})",
        plan_id,
        actions.len(),
        checkpoint_id
    );

    let start = Instant::now();
    reporter.on_execute_start(actions.len());

    let batch_size = ctx.config.execution_batch_size.max(1);
    let mut outcomes: Vec<ActionOutcome> = Vec::with_capacity(actions.len());
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut processed = 0usize;

    for batch in actions.chunks(batch_size) {
        let mut batch_outcomes: Vec<ActionOutcome> = Vec::with_capacity(batch.len());
        for action in batch {
            processed += 1;
            reporter.on_execute_progress(processed, actions.len());

            // A re-run of a partially executed plan skips what already
            // happened; that is what makes interrupted runs resumable.
            if action.status != ActionStatus::Pending {
                skipped += 1;
                continue;
            }

            let outcome = perform_action(action);
            match outcome.status {
                ActionStatus::Done => succeeded += 1,
                _ => {
                    failed += 1;
                    warn!(
                        "Action {} failed ({} -> {}): {}",
                        action.id,
                        action.source_path,
                        action.target_path,
                        outcome.error.as_deref().unwrap_or("unknown"),
                    );
                }
            }
            batch_outcomes.push(outcome);
        }
        // One transaction per batch: a crash loses at most this batch.
        ctx.db.apply_batch_outcomes(plan_id, &batch_outcomes)?;
        outcomes.extend(batch_outcomes);
    }

    let attempted = succeeded + failed;
    let failure_rate = if attempted > 0 {
        failed as f64 / attempted as f64
    } else {
        0.0
    };

    let mut rollback_report = None;
    let status = if attempted > 0 && failure_rate > ctx.config.failure_threshold {
        error!(
            "Plan {}: failure rate {:.0}% exceeds threshold — rolling back",
            plan_id,
            failure_rate * 100.0
        );
        ctx.db.set_plan_status(plan_id, PlanStatus::Failed)?;
        match rollback(ctx, checkpoint_id) {
            Ok(report) => {
                ctx.db.set_plan_status(plan_id, PlanStatus::RolledBack)?;
                rollback_report = Some(report);
                PlanStatus::RolledBack
            }
            Err(Error::RollbackIncomplete { discrepancies }) => {
                // Plan stays failed; the discrepancies ride the report.
                rollback_report = Some(RollbackReport {
                    checkpoint_id,
                    restored: 0,
                    discrepancies,
                });
                PlanStatus::Failed
            }
            Err(other) => return Err(other),
        }
    } else {
        ctx.db.set_plan_status(plan_id, PlanStatus::Completed)?;
        PlanStatus::Completed
    };

    reporter.on_execute_complete(succeeded, failed, start.elapsed().as_secs_f64());
    info!(
        "Plan {} finished: {} ok, {} failed, {} skipped, status {}",
        plan_id, succeeded, failed, skipped, status
    );

    Ok(ExecutionReport {
        plan_id,
        checkpoint_id,
        attempted,
        succeeded,
        failed,
        skipped,
        status,
        outcomes,
        rollback: rollback_report,
    })
}

/// Carry out one action against the filesystem. Never touches the
/// registry — the caller commits outcomes per batch.
fn perform_action(action: &MigrationAction) -> ActionOutcome {
    let mut outcome = ActionOutcome {
        action_id: action.id,
        file_id: action.file_id,
        source_path: action.source_path.clone(),
        target_path: action.target_path.clone(),
        action_type: action.action_type,
        status: ActionStatus::Done,
        error: None,
    };

    let source = Path::new(&action.source_path);
    if !source.exists() {
        return outcome.fail("source changed: file no longer exists");
    }

    // Guard against concurrent external modification: the bytes we are
    // about to move must still be the bytes the plan was built from.
    if let Some(expected) = &action.expected_hash {
        match hasher::full_hash_file(source) {
            Ok(actual) if actual == *expected => {}
            Ok(_) => return outcome.fail("source changed: content hash mismatch"),
            Err(e) => return outcome.fail(&format!("source unreadable: {e}")),
        }
    }

    let target = Path::new(&action.target_path);
    match action.action_type {
        ActionType::Move | ActionType::Copy | ActionType::Archive => {
            if target.exists() {
                return outcome.fail("target already exists");
            }
            if let Some(parent) = target.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    return outcome.fail(&format!("cannot create target directory: {e}"));
                }
            }
            let result = if action.action_type == ActionType::Copy {
                fs::copy(source, target).map(|_| ())
            } else {
                move_file(source, target)
            };
            if let Err(e) = result {
                return outcome.fail(&format!("filesystem operation failed: {e}"));
            }
        }
        ActionType::Delete => {
            if let Err(e) = fs::remove_file(source) {
                return outcome.fail(&format!("delete failed: {e}"));
            }
        }
    }

    debug!(
        "{}: {} -> {}",
        action.action_type, action.source_path, action.target_path
    );
    outcome
}

impl ActionOutcome {
    fn fail(mut self, message: &str) -> Self {
        self.status = ActionStatus::Failed;
        self.error = Some(message.to_string());
        self
    }
}

/// Rename, falling back to copy+remove across filesystems.
fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
    }
}

/// Restore every checkpointed record: registry fields back to their
/// snapshot values, files physically moved back where the system had moved
/// them. Idempotent — records already matching the snapshot are left
/// alone. Files altered since the checkpoint are reported, not overwritten;
/// a non-empty discrepancy list surfaces as RollbackIncomplete AFTER
/// everything restorable has been restored.
pub fn rollback(ctx: &AppContext, checkpoint_id: i64) -> Result<RollbackReport, Error> {
    let checkpoint = ctx.db.get_checkpoint(checkpoint_id)?;
    let entries = ctx.db.get_checkpoint_entries(checkpoint_id)?;
    info!(
        "Rolling back checkpoint {} ({} entries)",
        checkpoint_id,
        entries.len()
    );

    let mut to_restore = Vec::new();
    let mut moved: Vec<(i64, String, String)> = Vec::new();
    let mut discrepancies: Vec<String> = Vec::new();

    for entry in &entries {
        let record = ctx.db.get_file(entry.file_id)?;

        if record.canonical_path == entry.canonical_path && record.state == entry.state {
            continue; // already at checkpoint state — safe retry
        }

        let desired = entry
            .canonical_path
            .clone()
            .unwrap_or_else(|| record.original_path.clone());
        let current = record.current_path().to_string();

        if current == desired {
            // Registry drifted but the file never moved; registry-only fix.
            to_restore.push(entry.clone());
            continue;
        }

        let current_path = Path::new(&current);
        let desired_path = Path::new(&desired);

        if !current_path.exists() {
            discrepancies.push(format!(
                "file {}: not found at '{}', cannot restore to '{}'",
                entry.file_id, current, desired
            ));
            continue;
        }
        if desired_path.exists() {
            discrepancies.push(format!(
                "file {}: restore target '{}' is occupied",
                entry.file_id, desired
            ));
            continue;
        }
        if let Some(expected) = &entry.content_hash {
            match hasher::full_hash_file(current_path) {
                Ok(actual) if actual == *expected => {}
                Ok(_) => {
                    discrepancies.push(format!(
                        "file {}: content at '{}' changed since checkpoint, not restored",
                        entry.file_id, current
                    ));
                    continue;
                }
                Err(e) => {
                    discrepancies.push(format!(
                        "file {}: unreadable at '{}': {}",
                        entry.file_id, current, e
                    ));
                    continue;
                }
            }
        }

        if let Some(parent) = desired_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                discrepancies.push(format!(
                    "file {}: cannot recreate directory for '{}': {}",
                    entry.file_id, desired, e
                ));
                continue;
            }
        }
        if let Err(e) = move_file(current_path, desired_path) {
            discrepancies.push(format!(
                "file {}: move back to '{}' failed: {}",
                entry.file_id, desired, e
            ));
            continue;
        }

        moved.push((entry.file_id, current, desired));
        to_restore.push(entry.clone());
    }

    let restored = to_restore.len();
    ctx.db.apply_rollback(checkpoint.plan_id, &to_restore, &moved)?;

    if discrepancies.is_empty() {
        info!(
            "Rollback of checkpoint {} complete: {} records restored",
            checkpoint_id, restored
        );
        Ok(RollbackReport {
            checkpoint_id,
            restored,
            discrepancies,
        })
    } else {
        error!(
            "Rollback of checkpoint {} incomplete: {} restored, {} discrepancies",
            checkpoint_id,
            restored,
            discrepancies.len()
        );
        Err(Error::RollbackIncomplete { discrepancies })
    }
}
