use crate::context::AppContext;
use crate::error::Error;

/// Read-only statistics derived from the registry and its audit logs.
#[derive(Debug)]
pub struct MetricsReport {
    pub total_files: i64,
    pub by_state: Vec<(String, i64)>,
    pub duplicate_groups: i64,
    pub duplicate_files: i64,
    /// Duplicates over all hashed records.
    pub duplicate_rate: f64,
    pub wasted_bytes: i64,
    pub corrections: i64,
    /// Corrections over all records that ever got a classification.
    pub correction_rate: f64,
    /// Mean move count over organized records — placement stability.
    pub avg_move_count: f64,
    pub max_move_count: i64,
    pub requires_review: i64,
    pub near_duplicates: i64,
    pub external_moves: i64,
}

pub fn collect(ctx: &AppContext) -> Result<MetricsReport, Error> {
    let conn = ctx.db.connection();

    let total_files: i64 =
        conn.query_row("SELECT COUNT(*) FROM file_record", [], |row| row.get(0))?;
    let by_state = ctx.db.count_by_state()?;

    let duplicate_groups: i64 =
        conn.query_row("SELECT COUNT(*) FROM duplicate_group", [], |row| row.get(0))?;
    let duplicate_files: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_record WHERE is_duplicate = 1",
        [],
        |row| row.get(0),
    )?;
    let hashed_files: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_record WHERE content_hash IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    let wasted_bytes = ctx.db.total_wasted_bytes()?;

    let corrections: i64 =
        conn.query_row("SELECT COUNT(*) FROM correction_log", [], |row| row.get(0))?;
    let classified_ever: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_record WHERE document_type IS NOT NULL",
        [],
        |row| row.get(0),
    )?;

    let (avg_move_count, max_move_count): (f64, i64) = conn.query_row(
        "SELECT COALESCE(AVG(move_count), 0.0), COALESCE(MAX(move_count), 0) \
         FROM file_record WHERE state = 'organized'",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let requires_review: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_record WHERE requires_review = 1",
        [],
        |row| row.get(0),
    )?;
    let near_duplicates: i64 =
        conn.query_row("SELECT COUNT(*) FROM near_duplicate", [], |row| row.get(0))?;
    let external_moves: i64 = conn.query_row(
        "SELECT COUNT(*) FROM move_history WHERE external = 1",
        [],
        |row| row.get(0),
    )?;

    Ok(MetricsReport {
        total_files,
        by_state,
        duplicate_groups,
        duplicate_files,
        duplicate_rate: rate(duplicate_files, hashed_files),
        wasted_bytes,
        corrections,
        correction_rate: rate(corrections, classified_ever),
        avg_move_count,
        max_move_count,
        requires_review,
        near_duplicates,
        external_moves,
    })
}

fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}
