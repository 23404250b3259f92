pub mod template;

use crate::context::AppContext;
use crate::error::Error;
use crate::registry::models::{ActionType, FileRecord, FileState, PlannedAction};
use ahash::AHashSet;
use chrono::Datelike;
use std::collections::BTreeMap;
use std::path::Path;
use template::TemplateContext;
use tracing::{debug, info, warn};

/// Which records a planning pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    /// Freshly classified files awaiting first placement.
    Classified,
    /// Already-organized files, re-checked after a registry sync.
    Organized,
}

#[derive(Debug)]
pub struct PlanSummary {
    /// None when planning produced zero actions — nothing is persisted.
    pub plan_id: Option<i64>,
    pub actions: usize,
    pub skipped_in_place: usize,
    pub review_flagged: usize,
    pub collisions_resolved: usize,
}

/// Compute required moves for every non-duplicate record in scope.
/// Target-path computation is a pure function of (document type, metadata,
/// config), so files already at their target generate no action — running
/// the planner twice without intervening mutation yields an empty plan the
/// second time. Plans persist unapproved.
pub fn build_plan(
    ctx: &AppContext,
    canonical_root: &Path,
    scope: PlanScope,
) -> Result<PlanSummary, Error> {
    let state = match scope {
        PlanScope::Classified => FileState::Classified,
        PlanScope::Organized => FileState::Organized,
    };
    let records = ctx.db.files_in_state(state)?;

    let mut actions: Vec<PlannedAction> = Vec::new();
    let mut skipped_in_place = 0usize;
    let mut review_flagged = 0usize;

    for record in &records {
        if record.is_duplicate {
            continue;
        }

        let (relative, mut requires_review) = resolve_target(ctx, record)?;
        let target_path = canonical_root.join(&relative);
        let current = Path::new(record.current_path());

        if current == target_path {
            skipped_in_place += 1;
            continue;
        }

        let reason = match scope {
            PlanScope::Classified => format!(
                "place as {}",
                record.document_type.as_deref().unwrap_or("unclassified")
            ),
            PlanScope::Organized => "reorganize to current structure".to_string(),
        };
        requires_review |= record.requires_review;
        if requires_review {
            review_flagged += 1;
        }

        actions.push(PlannedAction {
            file_id: record.id,
            source_path: record.current_path().to_string(),
            target_path: target_path.to_string_lossy().into_owned(),
            action_type: ActionType::Move,
            reason,
            expected_hash: record.content_hash.clone(),
            requires_review,
        });
    }

    let collisions_resolved = resolve_collisions(&mut actions);
    persist(ctx, actions, skipped_in_place, review_flagged, collisions_resolved)
}

/// Optional sweep: archive confirmed duplicate losers under the configured
/// archive directory. Conservative counterpart to deleting them.
pub fn build_duplicate_sweep(ctx: &AppContext, canonical_root: &Path) -> Result<PlanSummary, Error> {
    let archive_root = canonical_root.join(&ctx.config.structure.archive_dir);
    let records = ctx.db.files_in_state(FileState::Duplicate)?;

    let mut actions: Vec<PlannedAction> = Vec::new();
    for record in &records {
        if !record.is_duplicate {
            continue;
        }
        let target = archive_root.join(&record.file_name);
        if Path::new(record.current_path()) == target {
            continue;
        }
        actions.push(PlannedAction {
            file_id: record.id,
            source_path: record.current_path().to_string(),
            target_path: target.to_string_lossy().into_owned(),
            action_type: ActionType::Archive,
            reason: format!(
                "duplicate of file {}",
                record.duplicate_of.unwrap_or_default()
            ),
            expected_hash: record.content_hash.clone(),
            requires_review: false,
        });
    }

    let collisions_resolved = resolve_collisions(&mut actions);
    persist(ctx, actions, 0, 0, collisions_resolved)
}

/// Approval gate: verify the plan is still collision-free, then flip the
/// flag. Execution refuses unapproved plans.
pub fn approve_plan(ctx: &AppContext, plan_id: i64) -> Result<(), Error> {
    let plan = ctx.db.get_plan(plan_id)?;
    if plan.approved {
        return Ok(());
    }

    let collisions = ctx.db.duplicate_targets(plan_id)?;
    if let Some(target) = collisions.into_iter().next() {
        return Err(Error::Conflict {
            target,
            message: "plan has unresolved target collisions".to_string(),
        });
    }

    ctx.db.set_plan_approved(plan_id)?;
    info!("Plan {} approved", plan_id);
    Ok(())
}

/// Where this record belongs, relative to the canonical root, plus whether
/// anything about the resolution needs human eyes.
fn resolve_target(ctx: &AppContext, record: &FileRecord) -> Result<(String, bool), Error> {
    let structure = &ctx.config.structure;
    let metadata = parse_metadata(record);
    let filename = template::sanitize_component(&record.file_name);

    let document_type = match &record.document_type {
        Some(t) => t.as_str(),
        None => {
            // No classification at all: park under the fallback directory.
            return Ok((format!("{}/{}", structure.fallback_dir, filename), true));
        }
    };

    let Some(tpl) = structure.templates.get(document_type) else {
        warn!(
            "No template for document type '{}'; using fallback directory",
            document_type
        );
        return Ok((format!("{}/{}", structure.fallback_dir, filename), true));
    };

    let rendered = template::render(
        tpl,
        &TemplateContext {
            document_type,
            date: extracted_date(&metadata),
            fallback_date: discovery_date(record),
            metadata: &metadata,
            filename: &filename,
        },
    )?;

    let requires_review = !rendered.missing_keys.is_empty();
    if requires_review {
        debug!(
            "File {} target used fallbacks for {:?}",
            record.id, rendered.missing_keys
        );
    }
    Ok((rendered.relative_path, requires_review))
}

fn parse_metadata(record: &FileRecord) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let Some(raw) = &record.metadata else {
        return map;
    };
    if let Ok(serde_json::Value::Object(object)) = serde_json::from_str(raw) {
        for (key, value) in object {
            match value {
                serde_json::Value::String(s) => {
                    map.insert(key, s);
                }
                serde_json::Value::Number(n) => {
                    map.insert(key, n.to_string());
                }
                _ => {}
            }
        }
    }
    map
}

/// "date" metadata in ISO form ("2024-11-05", or any prefix of it down to
/// "2024-11") supplies the template date.
fn extracted_date(metadata: &BTreeMap<String, String>) -> Option<(i32, u32)> {
    let raw = metadata.get("date")?;
    let mut parts = raw.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

fn discovery_date(record: &FileRecord) -> (i32, u32) {
    chrono::DateTime::parse_from_rfc3339(&record.first_seen_at)
        .map(|dt| (dt.year(), dt.month()))
        .unwrap_or((1970, 1))
}

/// Deterministic conflict resolution: actions are generated in ascending
/// file-id order; the first claim on a target keeps the name, later ones
/// get an incrementing suffix on the filename stem.
fn resolve_collisions(actions: &mut [PlannedAction]) -> usize {
    let mut used: AHashSet<String> = AHashSet::new();
    let mut resolved = 0usize;

    for action in actions.iter_mut() {
        if used.insert(action.target_path.clone()) {
            continue;
        }

        let path = Path::new(&action.target_path);
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

        let mut n = 1usize;
        loop {
            let candidate_name = match &ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            let candidate = parent.join(candidate_name).to_string_lossy().into_owned();
            if used.insert(candidate.clone()) {
                debug!(
                    "Collision on '{}' resolved to '{}'",
                    action.target_path, candidate
                );
                action.target_path = candidate;
                resolved += 1;
                break;
            }
            n += 1;
        }
    }

    resolved
}

fn persist(
    ctx: &AppContext,
    actions: Vec<PlannedAction>,
    skipped_in_place: usize,
    review_flagged: usize,
    collisions_resolved: usize,
) -> Result<PlanSummary, Error> {
    if actions.is_empty() {
        info!("Planning produced no actions — nothing to do");
        return Ok(PlanSummary {
            plan_id: None,
            actions: 0,
            skipped_in_place,
            review_flagged,
            collisions_resolved,
        });
    }

    let count = actions.len();
    let plan_id = ctx.db.create_plan(&actions)?;
    info!(
        "Plan {} created: {} actions, {} already in place, {} flagged for review, {} collisions resolved",
        plan_id, count, skipped_in_place, review_flagged, collisions_resolved
    );
    Ok(PlanSummary {
        plan_id: Some(plan_id),
        actions: count,
        skipped_in_place,
        review_flagged,
        collisions_resolved,
    })
}
