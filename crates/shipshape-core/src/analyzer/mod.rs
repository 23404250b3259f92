pub mod fuzzy;

use crate::context::AppContext;
use crate::error::Error;
use crate::hasher;
use crate::registry::models::{DetectionMethod, FileRecord, ResolvedGroup};
use ahash::{AHashMap, AHashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct AnalysisReport {
    pub candidates: usize,
    pub size_groups: usize,
    pub quick_hash_groups: usize,
    pub confirmed_groups: usize,
    pub duplicate_files: usize,
    pub near_duplicates: usize,
    pub wasted_bytes: u64,
    pub duration: Duration,
}

/// Four-stage narrowing pipeline. Each stage only ever sees files the
/// previous stage kept:
/// 1. group by (size, extension), drop singletons
/// 2. quick hash (first 1 MiB), regroup, drop singletons
/// 3. full hash, exact groups of ≥2 become confirmed duplicate groups
/// 4. fuzzy filename pass over everything NOT confirmed — review
///    suggestions only
///
/// The registry is read until the single atomic group write at the end;
/// a failure anywhere leaves previous group state intact.
pub fn analyze(ctx: &AppContext) -> Result<AnalysisReport, Error> {
    let start = Instant::now();
    let records = ctx.db.dedup_candidates()?;
    let candidates = records.len();
    info!("Analyzing {} candidate records", candidates);

    // Stage 1: size + extension pre-filter.
    let mut by_size_ext: AHashMap<(i64, &str), Vec<&FileRecord>> = AHashMap::new();
    for record in &records {
        by_size_ext
            .entry((record.size_bytes, record.extension.as_str()))
            .or_default()
            .push(record);
    }
    by_size_ext.retain(|_, members| members.len() > 1);
    let size_groups = by_size_ext.len();
    debug!("Stage 1: {} size/extension groups survive", size_groups);

    // Stage 2: quick hash within surviving groups.
    let mut quick_updates: Vec<(i64, String)> = Vec::new();
    let mut quick_groups: Vec<Vec<&FileRecord>> = Vec::new();

    let mut size_group_list: Vec<_> = by_size_ext.into_values().collect();
    size_group_list.sort_by_key(|members| members[0].id);

    for members in size_group_list {
        let mut by_quick: AHashMap<String, Vec<&FileRecord>> = AHashMap::new();
        for record in members {
            let quick = match &record.quick_hash {
                Some(h) => h.clone(),
                None => match hasher::quick_hash_file(Path::new(record.current_path())) {
                    Ok(h) => {
                        quick_updates.push((record.id, h.clone()));
                        h
                    }
                    Err(e) => {
                        warn!(
                            "Cannot quick-hash '{}': {} — excluded from grouping",
                            record.current_path(),
                            e
                        );
                        continue;
                    }
                },
            };
            by_quick.entry(quick).or_default().push(record);
        }
        for (_, group) in by_quick {
            if group.len() > 1 {
                quick_groups.push(group);
            }
        }
    }
    if !quick_updates.is_empty() {
        ctx.db.update_quick_hashes(&quick_updates)?;
    }
    quick_groups.sort_by_key(|members| members[0].id);
    let quick_hash_groups = quick_groups.len();
    debug!("Stage 2: {} quick-hash groups survive", quick_hash_groups);

    // Stage 3: full hash every survivor; exact matches confirm.
    let mut content_updates: Vec<(i64, String)> = Vec::new();
    let mut confirmed: Vec<Vec<&FileRecord>> = Vec::new();

    for members in quick_groups {
        let mut by_full: AHashMap<String, Vec<&FileRecord>> = AHashMap::new();
        for record in members {
            let full = match &record.content_hash {
                Some(h) => h.clone(),
                None => match hasher::full_hash_file(Path::new(record.current_path())) {
                    Ok(h) => {
                        content_updates.push((record.id, h.clone()));
                        h
                    }
                    Err(e) => {
                        warn!(
                            "Cannot full-hash '{}': {} — excluded from grouping",
                            record.current_path(),
                            e
                        );
                        continue;
                    }
                },
            };
            by_full.entry(full).or_default().push(record);
        }
        for (_, group) in by_full {
            if group.len() > 1 {
                confirmed.push(group);
            }
        }
    }
    if !content_updates.is_empty() {
        ctx.db.update_content_hashes(&content_updates)?;
    }
    confirmed.sort_by_key(|members| members[0].id);
    debug!("Stage 3: {} confirmed duplicate groups", confirmed.len());

    let content_hash_of: AHashMap<i64, String> = records
        .iter()
        .filter_map(|r| r.content_hash.clone().map(|h| (r.id, h)))
        .chain(content_updates.iter().map(|(id, h)| (*id, h.clone())))
        .collect();

    // Canonical selection, then ONE atomic write of all group results.
    let mut resolved: Vec<ResolvedGroup> = Vec::new();
    let mut duplicate_files = 0usize;
    let mut wasted_bytes = 0u64;
    let mut confirmed_ids: AHashSet<i64> = AHashSet::new();

    for members in &confirmed {
        let canonical_file_id = select_canonical(members, ctx);
        let mut member_ids: Vec<i64> = members.iter().map(|m| m.id).collect();
        member_ids.sort_unstable();
        let content_hash = content_hash_of
            .get(&member_ids[0])
            .cloned()
            .unwrap_or_default();
        duplicate_files += member_ids.len() - 1;
        wasted_bytes += members[0].size_bytes as u64 * (member_ids.len() as u64 - 1);
        confirmed_ids.extend(member_ids.iter().copied());
        resolved.push(ResolvedGroup {
            content_hash,
            file_size: members[0].size_bytes,
            canonical_file_id,
            member_ids,
            detection_method: DetectionMethod::FullHashVerified,
        });
    }
    let confirmed_groups = resolved.len();
    ctx.db.apply_duplicate_groups(&resolved)?;

    // Stage 4: fuzzy filename suggestions for the leftovers.
    let near_duplicates = if ctx.config.fuzzy_matching {
        suggest_near_duplicates(ctx, &records, &confirmed_ids)?
    } else {
        0
    };

    let duration = start.elapsed();
    info!(
        "Analysis complete: {} groups, {} duplicate files, {} near-duplicate suggestions in {:.2}s",
        confirmed_groups,
        duplicate_files,
        near_duplicates,
        duration.as_secs_f64(),
    );

    Ok(AnalysisReport {
        candidates,
        size_groups,
        quick_hash_groups,
        confirmed_groups,
        duplicate_files,
        near_duplicates,
        wasted_bytes,
        duration,
    })
}

/// Additive scoring: newest mtime, preferred path prefix, shallow depth,
/// clean filename, access recency. Highest total wins, ties broken by
/// lowest file id. Deterministic for unchanged metadata.
fn select_canonical(members: &[&FileRecord], ctx: &AppContext) -> i64 {
    let max_mtime = members.iter().map(|m| m.last_modified).max().unwrap_or(0);
    let mtime_winner = members
        .iter()
        .filter(|m| m.last_modified == max_mtime)
        .map(|m| m.id)
        .min()
        .unwrap_or(0);

    let max_depth = members
        .iter()
        .map(|m| path_depth(m.current_path()))
        .max()
        .unwrap_or(0);

    // Access-frequency term is all-or-nothing: without atime on every
    // member (noatime mounts), it contributes zero rather than guessing.
    let atime_ranks = access_rank(members);

    let mut best: Option<(f64, i64)> = None;
    for member in members {
        let mut score = 0.0f64;

        if member.id == mtime_winner {
            score += 10.0;
        }

        if ctx
            .config
            .preferred_prefixes
            .iter()
            .any(|prefix| member.current_path().starts_with(prefix.as_str()))
        {
            score += 20.0;
        }

        let depth = path_depth(member.current_path());
        if max_depth > 0 {
            score += (10.0 * (1.0 - depth as f64 / max_depth as f64)).max(0.0);
        } else {
            score += 10.0;
        }

        if !is_low_quality_name(&member.file_name) {
            score += 5.0;
        }

        if let Some(rank) = atime_ranks.get(&member.id) {
            score += 15.0 * rank;
        }

        let better = match best {
            None => true,
            Some((best_score, best_id)) => {
                score > best_score || (score == best_score && member.id < best_id)
            }
        };
        if better {
            best = Some((score, member.id));
        }
    }

    best.map(|(_, id)| id).unwrap_or(members[0].id)
}

/// Directory segments above the file itself.
fn path_depth(path: &str) -> usize {
    Path::new(path).components().count().saturating_sub(1)
}

fn is_low_quality_name(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    if lower.contains("copy") || lower.contains("backup") || lower.contains('~') {
        return true;
    }
    // "(n)" counter anywhere in the name
    if let Some(open) = lower.rfind('(') {
        if let Some(close) = lower[open..].find(')') {
            let inner = &lower[open + 1..open + close];
            if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Relative access-recency rank in [0, 1] per member; empty map when any
/// member lacks atime metadata.
fn access_rank(members: &[&FileRecord]) -> AHashMap<i64, f64> {
    let mut ranks = AHashMap::new();
    if members.len() < 2 || members.iter().any(|m| m.last_accessed.is_none()) {
        return ranks;
    }
    let mut ordered: Vec<(i64, i64)> = members
        .iter()
        .map(|m| (m.last_accessed.unwrap_or(0), m.id))
        .collect();
    ordered.sort_unstable();
    let denom = (ordered.len() - 1) as f64;
    for (rank, (_, id)) in ordered.iter().enumerate() {
        ranks.insert(*id, rank as f64 / denom);
    }
    ranks
}

/// Stage 4: pairwise similarity of normalized stems within each extension,
/// restricted to files no confirmed group claimed. Writes review rows only.
fn suggest_near_duplicates(
    ctx: &AppContext,
    records: &[FileRecord],
    confirmed_ids: &AHashSet<i64>,
) -> Result<usize, Error> {
    let threshold = ctx.config.fuzzy_threshold;
    let mut by_ext: AHashMap<&str, Vec<(&FileRecord, String)>> = AHashMap::new();

    for record in records {
        if confirmed_ids.contains(&record.id) || record.is_duplicate {
            continue;
        }
        let stem = Path::new(&record.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized = fuzzy::normalize_stem(&stem);
        if normalized.is_empty() {
            continue;
        }
        by_ext
            .entry(record.extension.as_str())
            .or_default()
            .push((record, normalized));
    }

    let mut pairs: Vec<(i64, i64, f64, String)> = Vec::new();
    for (_, group) in by_ext.iter_mut() {
        group.sort_by_key(|(record, _)| record.id);
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                let (a, stem_a) = &group[i];
                let (b, stem_b) = &group[j];
                let similarity = fuzzy::similarity(stem_a, stem_b);
                if similarity >= threshold {
                    pairs.push((
                        a.id,
                        b.id,
                        similarity,
                        format!("fuzzy_filename: '{}' ~ '{}'", a.file_name, b.file_name),
                    ));
                }
            }
        }
    }
    pairs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let inserted = ctx.db.insert_near_duplicates(&pairs)?;
    Ok(inserted)
}
