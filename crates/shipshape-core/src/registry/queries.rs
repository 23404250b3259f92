use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, Result, Row};
use tracing::debug;

const FILE_COLUMNS: &str = "id, original_path, file_name, extension, size_bytes, quick_hash, \
     content_hash, state, document_type, confidence, classification_method, metadata, \
     is_duplicate, duplicate_of, canonical_path, move_count, last_moved_at, \
     last_modified, last_accessed, first_seen_at, requires_review";

fn map_file_record(row: &Row) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        original_path: row.get(1)?,
        file_name: row.get(2)?,
        extension: row.get(3)?,
        size_bytes: row.get(4)?,
        quick_hash: row.get(5)?,
        content_hash: row.get(6)?,
        state: row.get(7)?,
        document_type: row.get(8)?,
        confidence: row.get(9)?,
        classification_method: row.get(10)?,
        metadata: row.get(11)?,
        is_duplicate: row.get(12)?,
        duplicate_of: row.get(13)?,
        canonical_path: row.get(14)?,
        move_count: row.get(15)?,
        last_moved_at: row.get(16)?,
        last_modified: row.get(17)?,
        last_accessed: row.get(18)?,
        first_seen_at: row.get(19)?,
        requires_review: row.get(20)?,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanUpsertStats {
    pub inserted: usize,
    pub unchanged: usize,
    pub changed: usize,
}

/// Per-action result of an execution batch, applied to the registry in
/// one transaction per batch.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action_id: i64,
    pub file_id: i64,
    pub source_path: String,
    pub target_path: String,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub error: Option<String>,
}

impl Database {
    // ── Scanned files ────────────────────────────────────────────

    /// Batched upsert of scanner drafts. A draft whose path already has a
    /// live record with identical size and quick hash is unchanged (the
    /// record's timestamps are refreshed); differing content inserts a new
    /// record and leaves the old one for reconciliation.
    pub fn upsert_scanned(&self, drafts: &[FileDraft]) -> Result<ScanUpsertStats> {
        let tx = self.connection().unchecked_transaction()?;
        let mut stats = ScanUpsertStats::default();
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut find = tx.prepare_cached(
                "SELECT id, size_bytes, quick_hash FROM file_record \
                 WHERE original_path = ?1 AND state != 'missing' \
                 ORDER BY id DESC LIMIT 1",
            )?;
            let mut touch = tx.prepare_cached(
                "UPDATE file_record SET last_modified = ?2, last_accessed = ?3 WHERE id = ?1",
            )?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO file_record \
                 (original_path, file_name, extension, size_bytes, quick_hash, \
                  state, first_seen_at, last_modified, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8)",
            )?;

            for draft in drafts {
                let existing: Option<(i64, i64, Option<String>)> = find
                    .query_row(params![draft.original_path], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                match existing {
                    Some((id, size, quick))
                        if size == draft.size_bytes && quick == draft.quick_hash =>
                    {
                        touch.execute(params![
                            id,
                            draft.last_modified,
                            draft.last_accessed
                        ])?;
                        stats.unchanged += 1;
                    }
                    Some(_) => {
                        insert.execute(params![
                            draft.original_path,
                            draft.file_name,
                            draft.extension,
                            draft.size_bytes,
                            draft.quick_hash,
                            now,
                            draft.last_modified,
                            draft.last_accessed,
                        ])?;
                        stats.changed += 1;
                    }
                    None => {
                        insert.execute(params![
                            draft.original_path,
                            draft.file_name,
                            draft.extension,
                            draft.size_bytes,
                            draft.quick_hash,
                            now,
                            draft.last_modified,
                            draft.last_accessed,
                        ])?;
                        stats.inserted += 1;
                    }
                }
            }
        }
        tx.commit()?;
        debug!(
            "Upserted scan batch: {} new, {} unchanged, {} changed",
            stats.inserted, stats.unchanged, stats.changed
        );
        Ok(stats)
    }

    /// An unreadable file becomes an error-state record; the scan goes on.
    /// Rescans of a still-broken path reuse the existing record.
    pub fn record_unreadable(&self, path: &str, message: &str) -> Result<i64> {
        let existing: Option<i64> = match self.connection().query_row(
            "SELECT id FROM file_record WHERE original_path = ?1 AND state = 'error'",
            params![path],
            |row| row.get(0),
        ) {
            Ok(id) => Some(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e),
        };
        if let Some(id) = existing {
            return Ok(id);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let file_name = std::path::Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.connection().execute(
            "INSERT INTO file_record \
             (original_path, file_name, extension, size_bytes, state, first_seen_at, metadata) \
             VALUES (?1, ?2, '', 0, 'error', ?3, ?4)",
            params![
                path,
                file_name,
                now,
                serde_json::json!({ "error": message }).to_string()
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_file(&self, id: i64) -> Result<FileRecord> {
        self.connection().query_row(
            &format!("SELECT {FILE_COLUMNS} FROM file_record WHERE id = ?1"),
            params![id],
            map_file_record,
        )
    }

    pub fn files_in_state(&self, state: FileState) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM file_record WHERE state = ?1 ORDER BY id"
        ))?;
        let files = stmt
            .query_map(params![state], map_file_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Everything the duplicate pipeline may consider: live records with a
    /// real on-disk presence. Fixed id order keeps the passes deterministic.
    pub fn dedup_candidates(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM file_record \
             WHERE state NOT IN ('error', 'missing') ORDER BY id"
        ))?;
        let files = stmt
            .query_map([], map_file_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn update_quick_hashes(&self, hashes: &[(i64, String)]) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("UPDATE file_record SET quick_hash = ?2 WHERE id = ?1")?;
            for (id, hash) in hashes {
                stmt.execute(params![id, hash])?;
            }
        }
        tx.commit()
    }

    pub fn update_content_hashes(&self, hashes: &[(i64, String)]) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("UPDATE file_record SET content_hash = ?2 WHERE id = ?1")?;
            for (id, hash) in hashes {
                stmt.execute(params![id, hash])?;
            }
        }
        tx.commit()
    }

    // ── Duplicate groups ─────────────────────────────────────────

    /// Replace all duplicate groups with a fresh analyzer result, updating
    /// member records in the same transaction. A failure leaves the
    /// registry exactly as it was — no group ever observes zero or two
    /// canonical members.
    pub fn apply_duplicate_groups(&self, groups: &[ResolvedGroup]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            tx.execute("DELETE FROM duplicate_group", [])?;
            // Former duplicates fall back to their classification state
            // until the fresh result reassigns them.
            tx.execute(
                "UPDATE file_record SET is_duplicate = 0, duplicate_of = NULL, \
                 state = CASE WHEN document_type IS NULL THEN 'pending' ELSE 'classified' END \
                 WHERE state = 'duplicate'",
                [],
            )?;
            tx.execute(
                "UPDATE file_record SET is_duplicate = 0, duplicate_of = NULL \
                 WHERE is_duplicate = 1",
                [],
            )?;

            let mut group_stmt = tx.prepare_cached(
                "INSERT INTO duplicate_group \
                 (content_hash, canonical_file_id, detection_method, file_count, \
                  wasted_bytes, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut member_stmt = tx.prepare_cached(
                "INSERT INTO duplicate_group_member (group_id, file_id) VALUES (?1, ?2)",
            )?;
            // A loser that was already physically placed keeps its state;
            // canonical_path stays truthful for organized records.
            let mut loser_stmt = tx.prepare_cached(
                "UPDATE file_record SET is_duplicate = 1, duplicate_of = ?2, \
                 state = CASE WHEN canonical_path IS NULL THEN 'duplicate' ELSE state END \
                 WHERE id = ?1",
            )?;

            for group in groups {
                let file_count = group.member_ids.len() as i64;
                let wasted_bytes = group.file_size * (file_count - 1);
                group_stmt.execute(params![
                    group.content_hash,
                    group.canonical_file_id,
                    group.detection_method,
                    file_count,
                    wasted_bytes,
                    now,
                ])?;
                let group_id = tx.last_insert_rowid();
                for file_id in &group.member_ids {
                    member_stmt.execute(params![group_id, file_id])?;
                    if *file_id != group.canonical_file_id {
                        loser_stmt.execute(params![file_id, group.canonical_file_id])?;
                    }
                }
            }
        }
        tx.commit()?;
        debug!("Applied {} duplicate groups", groups.len());
        Ok(groups.len())
    }

    pub fn get_duplicate_groups(&self, offset: i64, limit: i64) -> Result<Vec<DuplicateGroup>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, content_hash, canonical_file_id, detection_method, file_count, \
                    wasted_bytes, created_at \
             FROM duplicate_group ORDER BY wasted_bytes DESC LIMIT ?1 OFFSET ?2",
        )?;
        let groups = stmt
            .query_map(params![limit, offset], |row| {
                Ok(DuplicateGroup {
                    id: row.get(0)?,
                    content_hash: row.get(1)?,
                    canonical_file_id: row.get(2)?,
                    detection_method: row.get(3)?,
                    file_count: row.get(4)?,
                    wasted_bytes: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(groups)
    }

    pub fn get_files_in_group(&self, group_id: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT fr.id, fr.original_path, fr.file_name, fr.extension, fr.size_bytes, \
                    fr.quick_hash, fr.content_hash, fr.state, fr.document_type, fr.confidence, \
                    fr.classification_method, fr.metadata, fr.is_duplicate, fr.duplicate_of, \
                    fr.canonical_path, fr.move_count, fr.last_moved_at, fr.last_modified, \
                    fr.last_accessed, fr.first_seen_at, fr.requires_review \
             FROM file_record fr \
             JOIN duplicate_group_member dgm ON fr.id = dgm.file_id \
             WHERE dgm.group_id = ?1 ORDER BY fr.id",
        )?;
        let files = stmt
            .query_map(params![group_id], map_file_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Store fuzzy-filename suggestions and flag both sides for review.
    pub fn insert_near_duplicates(&self, pairs: &[(i64, i64, f64, String)]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        let mut count = 0;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO near_duplicate \
                 (file_id_a, file_id_b, similarity, reason, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut flag = tx.prepare_cached(
                "UPDATE file_record SET requires_review = 1 WHERE id IN (?1, ?2)",
            )?;
            for (a, b, similarity, reason) in pairs {
                count += insert.execute(params![a, b, similarity, reason, now])?;
                flag.execute(params![a, b])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    pub fn list_near_duplicates(&self) -> Result<Vec<NearDuplicate>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, file_id_a, file_id_b, similarity, reason, created_at \
             FROM near_duplicate ORDER BY similarity DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NearDuplicate {
                    id: row.get(0)?,
                    file_id_a: row.get(1)?,
                    file_id_b: row.get(2)?,
                    similarity: row.get(3)?,
                    reason: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Classification ───────────────────────────────────────────

    pub fn pending_classification(&self, limit: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM file_record \
             WHERE state = 'pending' ORDER BY id LIMIT ?1"
        ))?;
        let files = stmt
            .query_map(params![limit], map_file_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn set_classification(
        &self,
        file_id: i64,
        document_type: &str,
        confidence: f64,
        method: ClassificationMethod,
        state: FileState,
        requires_review: bool,
    ) -> Result<()> {
        self.connection().execute(
            "UPDATE file_record SET document_type = ?2, confidence = ?3, \
             classification_method = ?4, state = ?5, requires_review = ?6 \
             WHERE id = ?1",
            params![
                file_id,
                document_type,
                confidence,
                method,
                state,
                requires_review
            ],
        )?;
        Ok(())
    }

    pub fn set_metadata(&self, file_id: i64, metadata_json: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE file_record SET metadata = ?2 WHERE id = ?1",
            params![file_id, metadata_json],
        )?;
        Ok(())
    }

    /// Manual correction: retype the record, log the audit entry, and make
    /// it eligible for the next reorganization pass — one transaction.
    pub fn record_correction(
        &self,
        file_id: i64,
        new_type: &str,
        reason: &str,
    ) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let (old_type, state): (Option<String>, FileState) = tx.query_row(
                "SELECT document_type, state FROM file_record WHERE id = ?1",
                params![file_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            // A previously organized file drops back to classified so the
            // next planner pass recomputes its target; it is not moved here.
            let next_state = match state {
                FileState::Organized => FileState::Classified,
                other => other,
            };

            tx.execute(
                "UPDATE file_record SET document_type = ?2, confidence = 1.0, \
                 classification_method = 'manual', state = ?3, requires_review = 0 \
                 WHERE id = ?1",
                params![file_id, new_type, next_state],
            )?;
            tx.execute(
                "INSERT INTO correction_log (file_id, corrected_at, old_type, new_type, reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![file_id, now, old_type, new_type, reason],
            )?;
        }
        tx.commit()
    }

    pub fn list_corrections(&self, file_id: Option<i64>) -> Result<Vec<Correction>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, file_id, corrected_at, old_type, new_type, reason \
             FROM correction_log WHERE ?1 IS NULL OR file_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![file_id], |row| {
                Ok(Correction {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    corrected_at: row.get(2)?,
                    old_type: row.get(3)?,
                    new_type: row.get(4)?,
                    reason: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Migration plans ──────────────────────────────────────────

    /// Persist a plan with its ordered actions. Plans start unapproved.
    pub fn create_plan(&self, actions: &[PlannedAction]) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        let plan_id;
        {
            tx.execute(
                "INSERT INTO migration_plan (created_at, approved, status) \
                 VALUES (?1, 0, 'pending')",
                params![now],
            )?;
            plan_id = tx.last_insert_rowid();

            let mut stmt = tx.prepare_cached(
                "INSERT INTO migration_action \
                 (plan_id, seq, file_id, source_path, target_path, action_type, \
                  reason, expected_hash, requires_review) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (seq, action) in actions.iter().enumerate() {
                stmt.execute(params![
                    plan_id,
                    seq as i64,
                    action.file_id,
                    action.source_path,
                    action.target_path,
                    action.action_type,
                    action.reason,
                    action.expected_hash,
                    action.requires_review,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Created plan {} with {} actions", plan_id, actions.len());
        Ok(plan_id)
    }

    pub fn get_plan(&self, plan_id: i64) -> Result<MigrationPlan> {
        self.connection().query_row(
            "SELECT id, created_at, approved, status FROM migration_plan WHERE id = ?1",
            params![plan_id],
            |row| {
                Ok(MigrationPlan {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    approved: row.get(2)?,
                    status: row.get(3)?,
                })
            },
        )
    }

    pub fn get_plan_actions(&self, plan_id: i64) -> Result<Vec<MigrationAction>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, plan_id, seq, file_id, source_path, target_path, action_type, \
                    reason, expected_hash, requires_review, status, error \
             FROM migration_action WHERE plan_id = ?1 ORDER BY seq",
        )?;
        let actions = stmt
            .query_map(params![plan_id], |row| {
                Ok(MigrationAction {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    seq: row.get(2)?,
                    file_id: row.get(3)?,
                    source_path: row.get(4)?,
                    target_path: row.get(5)?,
                    action_type: row.get(6)?,
                    reason: row.get(7)?,
                    expected_hash: row.get(8)?,
                    requires_review: row.get(9)?,
                    status: row.get(10)?,
                    error: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(actions)
    }

    pub fn latest_plan_id(&self) -> Result<Option<i64>> {
        match self.connection().query_row(
            "SELECT id FROM migration_plan ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Target paths appearing more than once within a plan. Must be empty
    /// before approval.
    pub fn duplicate_targets(&self, plan_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare(
            "SELECT target_path FROM migration_action WHERE plan_id = ?1 \
             GROUP BY target_path HAVING COUNT(*) > 1",
        )?;
        let targets = stmt
            .query_map(params![plan_id], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(targets)
    }

    pub fn set_plan_approved(&self, plan_id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE migration_plan SET approved = 1, status = 'approved' WHERE id = ?1",
            params![plan_id],
        )?;
        Ok(())
    }

    pub fn set_plan_status(&self, plan_id: i64, status: PlanStatus) -> Result<()> {
        self.connection().execute(
            "UPDATE migration_plan SET status = ?2 WHERE id = ?1",
            params![plan_id, status],
        )?;
        Ok(())
    }

    // ── Execution bookkeeping ────────────────────────────────────

    /// Commit one execution batch: action statuses, record placement
    /// updates, and move history, atomically. A crash mid-execution loses
    /// at most this batch.
    pub fn apply_batch_outcomes(&self, plan_id: i64, outcomes: &[ActionOutcome]) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut action_stmt = tx.prepare_cached(
                "UPDATE migration_action SET status = ?2, error = ?3 WHERE id = ?1",
            )?;
            let mut placed_stmt = tx.prepare_cached(
                "UPDATE file_record SET canonical_path = ?2, state = 'organized', \
                 move_count = move_count + 1, last_moved_at = ?3 WHERE id = ?1",
            )?;
            let mut deleted_stmt = tx.prepare_cached(
                "UPDATE file_record SET canonical_path = NULL, state = 'missing', \
                 last_moved_at = ?2 WHERE id = ?1",
            )?;
            let mut history_stmt = tx.prepare_cached(
                "INSERT INTO move_history (file_id, moved_at, from_path, to_path, plan_id, external) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            )?;

            for outcome in outcomes {
                action_stmt.execute(params![outcome.action_id, outcome.status, outcome.error])?;

                if outcome.status != ActionStatus::Done {
                    continue;
                }
                match outcome.action_type {
                    ActionType::Move | ActionType::Copy | ActionType::Archive => {
                        placed_stmt.execute(params![
                            outcome.file_id,
                            outcome.target_path,
                            now
                        ])?;
                        history_stmt.execute(params![
                            outcome.file_id,
                            now,
                            outcome.source_path,
                            outcome.target_path,
                            plan_id,
                        ])?;
                    }
                    ActionType::Delete => {
                        deleted_stmt.execute(params![outcome.file_id, now])?;
                        history_stmt.execute(params![
                            outcome.file_id,
                            now,
                            outcome.source_path,
                            "",
                            plan_id,
                        ])?;
                    }
                }
            }
        }
        tx.commit()
    }

    // ── Checkpoints ──────────────────────────────────────────────

    /// Snapshot the pre-move state of every file the plan references.
    pub fn create_checkpoint(&self, plan_id: i64) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        let checkpoint_id;
        {
            tx.execute(
                "INSERT INTO checkpoint (plan_id, created_at) VALUES (?1, ?2)",
                params![plan_id, now],
            )?;
            checkpoint_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO checkpoint_entry \
                 (checkpoint_id, file_id, canonical_path, state, content_hash, document_type) \
                 SELECT ?1, fr.id, fr.canonical_path, fr.state, fr.content_hash, fr.document_type \
                 FROM file_record fr \
                 WHERE fr.id IN (SELECT DISTINCT file_id FROM migration_action WHERE plan_id = ?2)",
                params![checkpoint_id, plan_id],
            )?;
        }
        tx.commit()?;
        debug!("Created checkpoint {} for plan {}", checkpoint_id, plan_id);
        Ok(checkpoint_id)
    }

    pub fn get_checkpoint(&self, checkpoint_id: i64) -> Result<Checkpoint> {
        self.connection().query_row(
            "SELECT id, plan_id, created_at FROM checkpoint WHERE id = ?1",
            params![checkpoint_id],
            |row| {
                Ok(Checkpoint {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
    }

    pub fn checkpoint_for_plan(&self, plan_id: i64) -> Result<Option<Checkpoint>> {
        match self.connection().query_row(
            "SELECT id, plan_id, created_at FROM checkpoint \
             WHERE plan_id = ?1 ORDER BY id DESC LIMIT 1",
            params![plan_id],
            |row| {
                Ok(Checkpoint {
                    id: row.get(0)?,
                    plan_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        ) {
            Ok(cp) => Ok(Some(cp)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_checkpoint_entries(&self, checkpoint_id: i64) -> Result<Vec<CheckpointEntry>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, checkpoint_id, file_id, canonical_path, state, content_hash, document_type \
             FROM checkpoint_entry WHERE checkpoint_id = ?1 ORDER BY file_id",
        )?;
        let entries = stmt
            .query_map(params![checkpoint_id], |row| {
                Ok(CheckpointEntry {
                    id: row.get(0)?,
                    checkpoint_id: row.get(1)?,
                    file_id: row.get(2)?,
                    canonical_path: row.get(3)?,
                    state: row.get(4)?,
                    content_hash: row.get(5)?,
                    document_type: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Restore checkpointed record state after files were moved back.
    /// `moved` triples (file_id, from_path, to_path) add reverse-move
    /// history rows and bump move_count — the move back is a real move.
    pub fn apply_rollback(
        &self,
        plan_id: i64,
        entries: &[CheckpointEntry],
        moved: &[(i64, String, String)],
    ) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut restore = tx.prepare_cached(
                "UPDATE file_record SET canonical_path = ?2, state = ?3, document_type = ?4 \
                 WHERE id = ?1",
            )?;
            for entry in entries {
                restore.execute(params![
                    entry.file_id,
                    entry.canonical_path,
                    entry.state,
                    entry.document_type,
                ])?;
            }

            let mut history = tx.prepare_cached(
                "INSERT INTO move_history (file_id, moved_at, from_path, to_path, plan_id, external) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            )?;
            let mut bump = tx.prepare_cached(
                "UPDATE file_record SET move_count = move_count + 1 WHERE id = ?1",
            )?;
            for (file_id, from_path, to_path) in moved {
                history.execute(params![file_id, now, from_path, to_path, plan_id])?;
                bump.execute(params![file_id])?;
            }
        }
        tx.commit()
    }

    // ── Reorganizer sync ─────────────────────────────────────────

    pub fn organized_records(&self) -> Result<Vec<FileRecord>> {
        self.files_in_state(FileState::Organized)
    }

    pub fn find_by_content_hash(&self, content_hash: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM file_record WHERE content_hash = ?1 ORDER BY id"
        ))?;
        let files = stmt
            .query_map(params![content_hash], map_file_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn mark_missing(&self, file_id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE file_record SET state = 'missing' WHERE id = ?1",
            params![file_id],
        )?;
        Ok(())
    }

    /// The file moved without us: track the new location and log the event,
    /// without touching move_count.
    pub fn record_external_move(&self, file_id: i64, new_path: &str) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let old_path: Option<String> = tx.query_row(
                "SELECT canonical_path FROM file_record WHERE id = ?1",
                params![file_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE file_record SET canonical_path = ?2, state = 'organized' WHERE id = ?1",
                params![file_id, new_path],
            )?;
            tx.execute(
                "INSERT INTO move_history (file_id, moved_at, from_path, to_path, plan_id, external) \
                 VALUES (?1, ?2, ?3, ?4, NULL, 1)",
                params![file_id, now, old_path.unwrap_or_default(), new_path],
            )?;
        }
        tx.commit()
    }

    /// A file found on disk with no matching registry hash: register it as
    /// already organized at its found path.
    pub fn register_discovered(
        &self,
        path: &str,
        size_bytes: i64,
        quick_hash: &str,
        content_hash: &str,
        last_modified: i64,
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let p = std::path::Path::new(path);
        let file_name = p
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = p
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.connection().execute(
            "INSERT INTO file_record \
             (original_path, file_name, extension, size_bytes, quick_hash, content_hash, \
              state, canonical_path, first_seen_at, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'organized', ?1, ?7, ?8)",
            params![
                path,
                file_name,
                extension,
                size_bytes,
                quick_hash,
                content_hash,
                now,
                last_modified
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    // ── History & metrics ────────────────────────────────────────

    pub fn move_history_for_file(&self, file_id: i64) -> Result<Vec<MoveEvent>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, file_id, moved_at, from_path, to_path, plan_id, external \
             FROM move_history WHERE file_id = ?1 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![file_id], |row| {
                Ok(MoveEvent {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    moved_at: row.get(2)?,
                    from_path: row.get(3)?,
                    to_path: row.get(4)?,
                    plan_id: row.get(5)?,
                    external: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn count_by_state(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT state, COUNT(*) FROM file_record GROUP BY state ORDER BY state")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn total_wasted_bytes(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COALESCE(SUM(wasted_bytes), 0) FROM duplicate_group",
            [],
            |row| row.get(0),
        )
    }
}
