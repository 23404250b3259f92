use shipshape_core::hasher;
use shipshape_core::registry::models::FileState;
use shipshape_core::reorganizer;
use shipshape_core::{AppConfig, AppContext, SilentReporter};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn context_with_template(template: (&str, &str)) -> AppContext {
    let mut config = AppConfig::default();
    config
        .structure
        .templates
        .insert(template.0.to_string(), template.1.to_string());
    AppContext::open_in_memory(config).unwrap()
}

/// Place a real file inside the organized tree and register it as
/// organized at that path, the way a past execution would have.
fn seed_organized(ctx: &AppContext, path: &Path, content: &str, document_type: &str) -> i64 {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    let id = ctx
        .db
        .register_discovered(
            &path.to_string_lossy(),
            content.len() as i64,
            &hasher::quick_hash_file(path).unwrap(),
            &hasher::full_hash_file(path).unwrap(),
            1_700_000_000,
        )
        .unwrap();
    ctx.db
        .connection()
        .execute(
            "UPDATE file_record SET document_type = ?2, confidence = 0.9, \
             classification_method = 'pattern' WHERE id = ?1",
            rusqlite::params![id, document_type],
        )
        .unwrap();
    id
}

#[test]
fn test_sync_marks_vanished_files_missing() {
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    let ctx = context_with_template(("note", "Notes/{filename}"));

    let id = seed_organized(&ctx, &org.join("Notes/gone.txt"), "will vanish", "note");
    fs::remove_file(org.join("Notes/gone.txt")).unwrap();

    let report = reorganizer::sync_registry(&ctx, &org).unwrap();
    assert_eq!(report.missing, 1);
    assert_eq!(ctx.db.get_file(id).unwrap().state, FileState::Missing);
}

#[test]
fn test_sync_tracks_external_moves_without_move_count() {
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    let ctx = context_with_template(("note", "Notes/{filename}"));

    let id = seed_organized(&ctx, &org.join("Notes/roamer.txt"), "roaming bytes", "note");

    // Someone drags the file elsewhere inside the organized tree
    fs::create_dir_all(org.join("Stash")).unwrap();
    fs::rename(org.join("Notes/roamer.txt"), org.join("Stash/roamer.txt")).unwrap();

    let report = reorganizer::sync_registry(&ctx, &org).unwrap();
    assert_eq!(report.external_moves, 1);
    assert_eq!(report.missing, 0);

    let record = ctx.db.get_file(id).unwrap();
    assert_eq!(
        record.canonical_path.as_deref(),
        Some(org.join("Stash/roamer.txt").to_string_lossy().as_ref())
    );
    assert_eq!(record.move_count, 0, "the system didn't perform this move");

    let history = ctx.db.move_history_for_file(id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].external);
}

#[test]
fn test_sync_registers_unknown_files_as_discovered() {
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    let ctx = context_with_template(("note", "Notes/{filename}"));

    fs::create_dir_all(org.join("Imported")).unwrap();
    fs::write(org.join("Imported/surprise.txt"), "never scanned before").unwrap();

    let report = reorganizer::sync_registry(&ctx, &org).unwrap();
    assert_eq!(report.discovered, 1);

    let organized = ctx.db.organized_records().unwrap();
    assert_eq!(organized.len(), 1);
    let record = &organized[0];
    assert_eq!(
        record.canonical_path.as_deref(),
        Some(org.join("Imported/surprise.txt").to_string_lossy().as_ref())
    );
    assert!(record.content_hash.is_some());
}

#[test]
fn test_reorganize_converges_to_zero_moves() {
    // A structure change relocates organized files once; the second run
    // has nothing left to do.
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    let ctx = context_with_template(("note", "Docs/{filename}"));

    // File organized under a layout the current template no longer produces
    seed_organized(&ctx, &org.join("Notes/a.txt"), "note body", "note");

    let first = reorganizer::reorganize(&ctx, &org, false, &SilentReporter).unwrap();
    assert_eq!(first.pending_moves.len(), 1);
    let execution = first.execution.expect("first run must execute");
    assert_eq!(execution.succeeded, 1);
    assert_eq!(execution.failed, 0);
    assert!(org.join("Docs/a.txt").exists());
    assert!(
        !org.join("Notes").exists(),
        "emptied directory should be pruned"
    );

    let second = reorganizer::reorganize(&ctx, &org, false, &SilentReporter).unwrap();
    assert_eq!(second.pending_moves.len(), 0, "second run must converge");
    assert!(second.execution.is_none());
    assert_eq!(second.sync.missing, 0);
    assert_eq!(second.sync.discovered, 0);
}

#[test]
fn test_dry_run_reports_without_touching_disk() {
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    let ctx = context_with_template(("note", "Docs/{filename}"));

    seed_organized(&ctx, &org.join("Notes/a.txt"), "note body", "note");

    let report = reorganizer::reorganize(&ctx, &org, true, &SilentReporter).unwrap();
    assert_eq!(report.pending_moves.len(), 1);
    assert!(report.execution.is_none());
    assert_eq!(report.pruned_dirs, 0);

    // Nothing moved, nothing pruned
    assert!(org.join("Notes/a.txt").exists());
    assert!(!org.join("Docs").exists());
}

#[test]
fn test_prune_removes_nested_empty_directories_but_not_root() {
    let tmp = tempdir().unwrap();
    let org = tmp.path().join("org");
    fs::create_dir_all(org.join("a/b/c")).unwrap();
    fs::create_dir_all(org.join("keep")).unwrap();
    fs::write(org.join("keep/file.txt"), "occupied").unwrap();

    let removed = reorganizer::prune_empty_dirs(&org).unwrap();
    assert_eq!(removed, 3);
    assert!(org.exists());
    assert!(org.join("keep/file.txt").exists());
    assert!(!org.join("a").exists());
}
