use shipshape_core::registry::models::*;
use shipshape_core::registry::Database;

fn make_draft(path: &str, size: i64, quick_hash: &str) -> FileDraft {
    FileDraft {
        original_path: path.to_string(),
        file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
        extension: path.rsplit('.').next().unwrap_or("").to_string(),
        size_bytes: size,
        quick_hash: Some(quick_hash.to_string()),
        last_modified: 1700000000,
        last_accessed: None,
    }
}

fn file_id_for(db: &Database, path: &str) -> i64 {
    db.connection()
        .query_row(
            "SELECT id FROM file_record WHERE original_path = ?1 ORDER BY id DESC",
            rusqlite::params![path],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn test_upsert_new_unchanged_and_changed() {
    let db = Database::open_in_memory().unwrap();

    let stats = db
        .upsert_scanned(&[make_draft("/in/a.txt", 100, "aaa")])
        .unwrap();
    assert_eq!(stats.inserted, 1);

    // Same path, same size and quick hash → unchanged, no new record
    let stats = db
        .upsert_scanned(&[make_draft("/in/a.txt", 100, "aaa")])
        .unwrap();
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.inserted, 0);

    // Same path, different content → new record, old one kept
    let stats = db
        .upsert_scanned(&[make_draft("/in/a.txt", 120, "bbb")])
        .unwrap();
    assert_eq!(stats.changed, 1);

    let count: i64 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM file_record WHERE original_path = '/in/a.txt'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 2, "changed content must create a second record");
}

#[test]
fn test_record_unreadable_creates_error_record() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .record_unreadable("/in/locked.bin", "permission denied")
        .unwrap();
    let record = db.get_file(id).unwrap();
    assert_eq!(record.state, FileState::Error);
    assert_eq!(record.original_path, "/in/locked.bin");
}

#[test]
fn test_apply_duplicate_groups_single_canonical() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[
        make_draft("/in/a.txt", 100, "h1"),
        make_draft("/in/b.txt", 100, "h1"),
        make_draft("/in/c.txt", 100, "h1"),
    ])
    .unwrap();

    let ids: Vec<i64> = ["/in/a.txt", "/in/b.txt", "/in/c.txt"]
        .iter()
        .map(|p| file_id_for(&db, p))
        .collect();

    db.apply_duplicate_groups(&[ResolvedGroup {
        content_hash: "full1".to_string(),
        file_size: 100,
        canonical_file_id: ids[1],
        member_ids: ids.clone(),
        detection_method: DetectionMethod::FullHashVerified,
    }])
    .unwrap();

    let canonical = db.get_file(ids[1]).unwrap();
    assert!(!canonical.is_duplicate);
    assert_eq!(canonical.duplicate_of, None);

    for &loser in [ids[0], ids[2]].iter() {
        let record = db.get_file(loser).unwrap();
        assert!(record.is_duplicate);
        assert_eq!(record.duplicate_of, Some(ids[1]));
        assert_eq!(record.state, FileState::Duplicate);
    }

    let groups = db.get_duplicate_groups(0, 10).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].file_count, 3);
    assert_eq!(groups[0].wasted_bytes, 200);
}

#[test]
fn test_reapplying_groups_replaces_previous_result() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[
        make_draft("/in/a.txt", 100, "h1"),
        make_draft("/in/b.txt", 100, "h1"),
    ])
    .unwrap();
    let id_a = file_id_for(&db, "/in/a.txt");
    let id_b = file_id_for(&db, "/in/b.txt");

    db.apply_duplicate_groups(&[ResolvedGroup {
        content_hash: "full1".to_string(),
        file_size: 100,
        canonical_file_id: id_a,
        member_ids: vec![id_a, id_b],
        detection_method: DetectionMethod::FullHashVerified,
    }])
    .unwrap();

    // The files diverged; a fresh run finds no duplicates at all.
    db.apply_duplicate_groups(&[]).unwrap();

    let groups = db.get_duplicate_groups(0, 10).unwrap();
    assert!(groups.is_empty());
    let b = db.get_file(id_b).unwrap();
    assert!(!b.is_duplicate);
    assert_eq!(b.duplicate_of, None);
    assert_ne!(b.state, FileState::Duplicate);
}

#[test]
fn test_plan_persistence_and_approval_flow() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[make_draft("/in/a.txt", 100, "h1")])
        .unwrap();
    let file_id = file_id_for(&db, "/in/a.txt");

    let plan_id = db
        .create_plan(&[
            PlannedAction {
                file_id,
                source_path: "/in/a.txt".to_string(),
                target_path: "/out/a.txt".to_string(),
                action_type: ActionType::Move,
                reason: "test".to_string(),
                expected_hash: None,
                requires_review: false,
            },
            PlannedAction {
                file_id,
                source_path: "/in/a2.txt".to_string(),
                target_path: "/out/a.txt".to_string(),
                action_type: ActionType::Move,
                reason: "test".to_string(),
                expected_hash: None,
                requires_review: false,
            },
        ])
        .unwrap();

    let plan = db.get_plan(plan_id).unwrap();
    assert!(!plan.approved, "plans must default to unapproved");
    assert_eq!(plan.status, PlanStatus::Pending);

    let collisions = db.duplicate_targets(plan_id).unwrap();
    assert_eq!(collisions, vec!["/out/a.txt".to_string()]);

    db.set_plan_approved(plan_id).unwrap();
    let plan = db.get_plan(plan_id).unwrap();
    assert!(plan.approved);
    assert_eq!(plan.status, PlanStatus::Approved);

    let actions = db.get_plan_actions(plan_id).unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].seq, 0);
    assert_eq!(actions[1].seq, 1);
}

#[test]
fn test_checkpoint_snapshots_plan_files() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[
        make_draft("/in/a.txt", 100, "h1"),
        make_draft("/in/b.txt", 200, "h2"),
    ])
    .unwrap();
    let id_a = file_id_for(&db, "/in/a.txt");
    let id_b = file_id_for(&db, "/in/b.txt");

    let plan_id = db
        .create_plan(&[PlannedAction {
            file_id: id_a,
            source_path: "/in/a.txt".to_string(),
            target_path: "/out/a.txt".to_string(),
            action_type: ActionType::Move,
            reason: "test".to_string(),
            expected_hash: None,
            requires_review: false,
        }])
        .unwrap();

    let checkpoint_id = db.create_checkpoint(plan_id).unwrap();
    let entries = db.get_checkpoint_entries(checkpoint_id).unwrap();
    assert_eq!(entries.len(), 1, "only plan-referenced files are snapshotted");
    assert_eq!(entries[0].file_id, id_a);
    assert_eq!(entries[0].state, FileState::Pending);
    assert!(entries[0].canonical_path.is_none());

    // id_b was not in the plan
    assert!(entries.iter().all(|e| e.file_id != id_b));

    let checkpoint = db.checkpoint_for_plan(plan_id).unwrap().unwrap();
    assert_eq!(checkpoint.id, checkpoint_id);
}

#[test]
fn test_correction_updates_type_and_appends_audit() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[make_draft("/in/doc.pdf", 100, "h1")])
        .unwrap();
    let file_id = file_id_for(&db, "/in/doc.pdf");
    db.set_classification(
        file_id,
        "receipt",
        0.9,
        ClassificationMethod::Pattern,
        FileState::Organized,
        false,
    )
    .unwrap();
    db.connection()
        .execute(
            "UPDATE file_record SET canonical_path = '/org/Receipts/doc.pdf' WHERE id = ?1",
            rusqlite::params![file_id],
        )
        .unwrap();

    db.record_correction(file_id, "financial_invoice", "mislabeled")
        .unwrap();

    let record = db.get_file(file_id).unwrap();
    assert_eq!(record.document_type.as_deref(), Some("financial_invoice"));
    assert_eq!(
        record.classification_method,
        Some(ClassificationMethod::Manual)
    );
    // Organized files fall back to classified so the next pass re-plans them
    assert_eq!(record.state, FileState::Classified);

    let corrections = db.list_corrections(Some(file_id)).unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].old_type.as_deref(), Some("receipt"));
    assert_eq!(corrections[0].new_type, "financial_invoice");
    assert_eq!(corrections[0].reason, "mislabeled");
}

#[test]
fn test_near_duplicates_are_deduplicated_and_flag_review() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[
        make_draft("/in/a.txt", 100, "h1"),
        make_draft("/in/b.txt", 120, "h2"),
    ])
    .unwrap();
    let id_a = file_id_for(&db, "/in/a.txt");
    let id_b = file_id_for(&db, "/in/b.txt");

    let pair = vec![(id_a, id_b, 0.9, "fuzzy_filename".to_string())];
    assert_eq!(db.insert_near_duplicates(&pair).unwrap(), 1);
    // Re-running the analyzer must not duplicate the suggestion
    assert_eq!(db.insert_near_duplicates(&pair).unwrap(), 0);

    let suggestions = db.list_near_duplicates().unwrap();
    assert_eq!(suggestions.len(), 1);

    let a = db.get_file(id_a).unwrap();
    let b = db.get_file(id_b).unwrap();
    assert!(a.requires_review && b.requires_review);
    // Suggestions never set duplicate linkage
    assert!(!a.is_duplicate && !b.is_duplicate);
}

#[test]
fn test_external_move_keeps_move_count() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_scanned(&[make_draft("/in/a.txt", 100, "h1")])
        .unwrap();
    let file_id = file_id_for(&db, "/in/a.txt");

    db.record_external_move(file_id, "/organized/misc/a.txt")
        .unwrap();

    let record = db.get_file(file_id).unwrap();
    assert_eq!(record.canonical_path.as_deref(), Some("/organized/misc/a.txt"));
    assert_eq!(record.state, FileState::Organized);
    assert_eq!(record.move_count, 0, "external moves never bump move_count");

    let history = db.move_history_for_file(file_id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].external);
}
