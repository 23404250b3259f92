use shipshape_core::analyzer;
use shipshape_core::registry::models::{FileDraft, FileState};
use shipshape_core::scanner;
use shipshape_core::{AppConfig, AppContext, SilentReporter};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

/// Seed a record with fully controlled metadata and hashes; the analyzer
/// then never needs to touch the disk for it.
fn seed_record(ctx: &AppContext, path: &str, size: i64, hash: &str, mtime: i64) -> i64 {
    ctx.db
        .upsert_scanned(&[FileDraft {
            original_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: path.rsplit('.').next().unwrap_or("").to_string(),
            size_bytes: size,
            quick_hash: Some(format!("quick-{hash}")),
            last_modified: mtime,
            last_accessed: None,
        }])
        .unwrap();
    let id: i64 = ctx
        .db
        .connection()
        .query_row(
            "SELECT id FROM file_record WHERE original_path = ?1",
            rusqlite::params![path],
            |row| row.get(0),
        )
        .unwrap();
    ctx.db
        .update_content_hashes(&[(id, hash.to_string())])
        .unwrap();
    id
}

fn context_for(root: &Path, configure: impl FnOnce(&mut AppConfig)) -> AppContext {
    let mut config = AppConfig {
        root_paths: vec![root.to_string_lossy().into_owned()],
        ..Default::default()
    };
    configure(&mut config);
    AppContext::open_in_memory(config).unwrap()
}

fn scan(ctx: &AppContext) {
    scanner::scan(ctx, &SilentReporter, &AtomicBool::new(false)).unwrap();
}

#[test]
fn test_exact_duplicates_end_up_in_one_group() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("x")).unwrap();
    fs::create_dir_all(root.join("y")).unwrap();
    fs::write(root.join("x/shared.txt"), "identical bytes").unwrap();
    fs::write(root.join("y/shared.txt"), "identical bytes").unwrap();
    fs::write(root.join("x/unique.txt"), "something else!").unwrap();

    let ctx = context_for(root, |_| {});
    scan(&ctx);
    let report = analyzer::analyze(&ctx).unwrap();

    assert_eq!(report.confirmed_groups, 1);
    assert_eq!(report.duplicate_files, 1);

    let groups = ctx.db.get_duplicate_groups(0, 10).unwrap();
    assert_eq!(groups.len(), 1);
    let members = ctx.db.get_files_in_group(groups[0].id).unwrap();
    assert_eq!(members.len(), 2);

    let canonicals: Vec<_> = members.iter().filter(|m| !m.is_duplicate).collect();
    assert_eq!(canonicals.len(), 1, "exactly one canonical per group");
    let loser = members.iter().find(|m| m.is_duplicate).unwrap();
    assert_eq!(loser.duplicate_of, Some(canonicals[0].id));
}

#[test]
fn test_same_size_different_extension_never_grouped() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("data.txt"), "same content here").unwrap();
    fs::write(root.join("data.bin"), "same content here").unwrap();

    let ctx = context_for(root, |_| {});
    scan(&ctx);
    let report = analyzer::analyze(&ctx).unwrap();

    // The size+extension pre-filter excludes them before any hashing runs
    assert_eq!(report.size_groups, 0);
    assert_eq!(report.confirmed_groups, 0);
}

#[test]
fn test_zero_byte_files_hash_and_dedupe() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("empty_one.dat"), "").unwrap();
    fs::write(root.join("empty_two.dat"), "").unwrap();

    let ctx = context_for(root, |_| {});
    scan(&ctx);
    let report = analyzer::analyze(&ctx).unwrap();

    assert_eq!(report.confirmed_groups, 1);
    let groups = ctx.db.get_duplicate_groups(0, 10).unwrap();
    let members = ctx.db.get_files_in_group(groups[0].id).unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.content_hash.is_some()));
}

#[test]
fn test_preferred_path_wins_canonical_selection() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    let keep = root.join("curated");
    let inbox = root.join("inbox");
    fs::create_dir_all(&keep).unwrap();
    fs::create_dir_all(&inbox).unwrap();
    fs::write(keep.join("report.pdf"), "report body X").unwrap();
    fs::write(inbox.join("report (1).pdf"), "report body X").unwrap();

    let preferred = keep.to_string_lossy().into_owned();
    let ctx = context_for(root, |config| {
        config.preferred_prefixes = vec![preferred];
    });
    scan(&ctx);
    analyzer::analyze(&ctx).unwrap();

    let groups = ctx.db.get_duplicate_groups(0, 10).unwrap();
    assert_eq!(groups.len(), 1);
    let members = ctx.db.get_files_in_group(groups[0].id).unwrap();
    let canonical = members.iter().find(|m| !m.is_duplicate).unwrap();
    assert!(
        canonical.original_path.contains("curated"),
        "preferred-path copy must win, got '{}'",
        canonical.original_path
    );
    assert_eq!(canonical.file_name, "report.pdf");
}

#[test]
fn test_canonical_selection_is_stable_across_reruns() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::write(root.join("doc.txt"), "stable content").unwrap();
    fs::write(root.join("a/b/c/doc.txt"), "stable content").unwrap();

    let ctx = context_for(root, |_| {});
    scan(&ctx);

    analyzer::analyze(&ctx).unwrap();
    let first = ctx.db.get_duplicate_groups(0, 10).unwrap()[0].canonical_file_id;

    analyzer::analyze(&ctx).unwrap();
    let second = ctx.db.get_duplicate_groups(0, 10).unwrap()[0].canonical_file_id;

    assert_eq!(first, second, "unchanged metadata must re-select the same canonical");
}

#[test]
fn test_newest_mtime_wins_when_all_else_is_equal() {
    let ctx = AppContext::open_in_memory(AppConfig::default()).unwrap();
    let _older = seed_record(&ctx, "/v/a/doc.txt", 50, "same-hash", 1_700_000_000);
    let newer = seed_record(&ctx, "/v/b/doc.txt", 50, "same-hash", 1_700_500_000);

    analyzer::analyze(&ctx).unwrap();

    let groups = ctx.db.get_duplicate_groups(0, 10).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].canonical_file_id, newer);
}

#[test]
fn test_depth_and_name_quality_outweigh_mtime_tie_bonus() {
    let ctx = AppContext::open_in_memory(AppConfig::default()).unwrap();
    // The deep, copy-suffixed record is registered first, so the mtime
    // tie-bonus lands on it; the shallow clean-named copy must still win
    // on the depth and name-quality terms combined.
    let _deep = seed_record(
        &ctx,
        "/v/deep/deeper/deepest/doc copy.txt",
        50,
        "depth-hash",
        1_700_000_000,
    );
    let shallow = seed_record(&ctx, "/v/doc.txt", 50, "depth-hash", 1_700_000_000);

    analyzer::analyze(&ctx).unwrap();

    let groups = ctx.db.get_duplicate_groups(0, 10).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].canonical_file_id, shallow);
}

#[test]
fn test_fuzzy_suggestions_are_review_only() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    // Different content and size, so no stage confirms them; only the
    // filename stage may speak up.
    fs::write(root.join("quarterly_v1.txt"), "first draft").unwrap();
    fs::write(root.join("quarterly_v2.txt"), "second, longer draft").unwrap();

    let ctx = context_for(root, |_| {});
    scan(&ctx);
    let report = analyzer::analyze(&ctx).unwrap();

    assert_eq!(report.confirmed_groups, 0);
    assert_eq!(report.near_duplicates, 1);

    let suggestions = ctx.db.list_near_duplicates().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0].similarity >= 0.85);

    // Review-only: no duplicate linkage, no state change
    for record in ctx.db.dedup_candidates().unwrap() {
        assert!(!record.is_duplicate);
        assert_ne!(record.state, FileState::Duplicate);
        assert!(record.requires_review);
    }
}

#[test]
fn test_fuzzy_stage_can_be_disabled() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("notes_v1.md"), "alpha").unwrap();
    fs::write(root.join("notes_v2.md"), "beta and gamma").unwrap();

    let ctx = context_for(root, |config| {
        config.fuzzy_matching = false;
    });
    scan(&ctx);
    let report = analyzer::analyze(&ctx).unwrap();

    assert_eq!(report.near_duplicates, 0);
    assert!(ctx.db.list_near_duplicates().unwrap().is_empty());
}
