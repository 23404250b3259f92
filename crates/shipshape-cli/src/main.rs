mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use shipshape_core::classify::PatternClassifier;
use shipshape_core::{AppContext, Engine};
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match shipshape_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let db_path = std::env::var("SHIPSHAPE_DB").unwrap_or_else(|_| "shipshape.db".to_string());

    match args.command {
        Some(Commands::Scan) => run(&config, &db_path, |engine| {
            let report = engine.scan(&CliReporter::new())?;
            info!(
                "Scan: {} files seen, {} new, {} unchanged, {} changed, {} errors",
                format!("{}", report.files_seen).green(),
                format!("{}", report.inserted).green(),
                report.unchanged,
                report.changed,
                format!("{}", report.errors).red(),
            );
            Ok(())
        }),
        Some(Commands::Classify) => run(&config, &db_path, |engine| {
            let classifier = Arc::new(PatternClassifier::from_config(&engine.context().config));
            let report = engine.classify(classifier)?;
            info!(
                "Classified {}, {} sent to review, {} failed, {} timed out",
                format!("{}", report.classified).green(),
                report.sent_to_review,
                report.failed,
                report.timed_out,
            );
            Ok(())
        }),
        Some(Commands::Analyze) => run(&config, &db_path, |engine| {
            let report = engine.analyze(&CliReporter::new())?;
            info!(
                "{} duplicate groups, {} duplicate files, {} bytes wasted, {} near-duplicate suggestions",
                format!("{}", report.confirmed_groups).red(),
                format!("{}", report.duplicate_files).red(),
                format!("{}", report.wasted_bytes).red(),
                report.near_duplicates,
            );
            Ok(())
        }),
        Some(Commands::Process) => run(&config, &db_path, |engine| {
            let classifier = Arc::new(PatternClassifier::from_config(&engine.context().config));
            let report = engine.pipeline(classifier, &CliReporter::new())?;
            info!(
                "Scanned {}, classified {}, {} duplicate groups, plan {} with {} actions",
                format!("{}", report.scan.files_seen).green(),
                format!("{}", report.classify.classified).green(),
                format!("{}", report.analysis.confirmed_groups).red(),
                report
                    .plan
                    .plan_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                report.plan.actions,
            );
            if report.plan.plan_id.is_some() {
                println!("Review the plan, then run: shipshape approve && shipshape execute");
            }
            Ok(())
        }),
        Some(Commands::Plan { duplicates }) => run(&config, &db_path, |engine| {
            let summary = if duplicates {
                engine.plan_duplicate_sweep()?
            } else {
                engine.plan()?
            };
            match summary.plan_id {
                Some(id) => info!(
                    "Plan {}: {} actions, {} already in place, {} flagged for review, {} collisions resolved",
                    format!("{}", id).green(),
                    summary.actions,
                    summary.skipped_in_place,
                    summary.review_flagged,
                    summary.collisions_resolved,
                ),
                None => info!("Nothing to plan — everything is already in place"),
            }
            Ok(())
        }),
        Some(Commands::Approve { plan_id }) => run(&config, &db_path, |engine| {
            let plan_id = resolve_plan_id(engine, plan_id)?;
            engine.approve(plan_id)?;
            println!("Plan {} approved", plan_id);
            Ok(())
        }),
        Some(Commands::Execute { plan_id, yes }) => run(&config, &db_path, |engine| {
            let plan_id = resolve_plan_id(engine, plan_id)?;
            if !yes
                && !prompt_confirm(
                    &format!("Execute plan {} and move files on disk?", plan_id),
                    Some(false),
                )?
            {
                process::exit(0);
            }
            let report = engine.execute(plan_id, &CliReporter::new())?;
            info!(
                "Plan {}: {} succeeded, {} failed, status {}",
                plan_id,
                format!("{}", report.succeeded).green(),
                format!("{}", report.failed).red(),
                report.status,
            );
            for outcome in report.outcomes.iter().filter(|o| o.error.is_some()) {
                println!(
                    "  {} {} -> {}: {}",
                    "failed".red(),
                    outcome.source_path,
                    outcome.target_path,
                    outcome.error.as_deref().unwrap_or(""),
                );
            }
            if let Some(rollback) = &report.rollback {
                info!(
                    "Rolled back {} records ({} discrepancies)",
                    rollback.restored,
                    rollback.discrepancies.len()
                );
                for discrepancy in &rollback.discrepancies {
                    println!("  {} {}", "unrestored".red(), discrepancy);
                }
            }
            Ok(())
        }),
        Some(Commands::Rollback { plan_id }) => run(&config, &db_path, |engine| {
            let report = engine.rollback_plan(plan_id)?;
            info!(
                "Rollback of plan {} complete: {} records restored",
                plan_id, report.restored
            );
            Ok(())
        }),
        Some(Commands::Reorganize { dry_run }) => run(&config, &db_path, |engine| {
            let report = engine.reorganize(dry_run, &CliReporter::new())?;
            info!(
                "Sync: {} matched, {} discovered, {} missing, {} external moves",
                report.sync.matched,
                report.sync.discovered,
                format!("{}", report.sync.missing).red(),
                report.sync.external_moves,
            );
            if dry_run {
                for (source, target) in &report.pending_moves {
                    println!("  {} -> {}", source, target.green());
                }
                info!("{} pending moves (dry run)", report.pending_moves.len());
            } else {
                info!(
                    "{} moves applied, {} empty directories pruned",
                    report.pending_moves.len(),
                    report.pruned_dirs
                );
            }
            Ok(())
        }),
        Some(Commands::Correct {
            file_id,
            new_type,
            reason,
        }) => run(&config, &db_path, |engine| {
            engine.correct(file_id, &new_type, &reason)?;
            println!("File {} corrected to '{}'", file_id, new_type);
            Ok(())
        }),
        Some(Commands::Status) => run(&config, &db_path, |engine| {
            let m = engine.metrics()?;
            println!("{}", "Registry".bold());
            println!("  total files     {}", m.total_files);
            for (state, count) in &m.by_state {
                println!("  {:<15} {}", state, count);
            }
            println!("{}", "Duplicates".bold());
            println!("  groups          {}", m.duplicate_groups);
            println!("  files           {}", m.duplicate_files);
            println!("  rate            {:.1}%", m.duplicate_rate * 100.0);
            println!("  wasted bytes    {}", m.wasted_bytes);
            println!("  suggestions     {}", m.near_duplicates);
            println!("{}", "Stability".bold());
            println!("  avg moves/file  {:.2}", m.avg_move_count);
            println!("  max moves/file  {}", m.max_move_count);
            println!("  external moves  {}", m.external_moves);
            println!("{}", "Review".bold());
            println!("  corrections     {}", m.corrections);
            println!("  correction rate {:.1}%", m.correction_rate * 100.0);
            println!("  needs review    {}", m.requires_review);
            Ok(())
        }),
        Some(Commands::History { file_id }) => run(&config, &db_path, |engine| {
            let events = engine.context().db.move_history_for_file(file_id)?;
            if events.is_empty() {
                println!("No moves recorded for file {}", file_id);
            }
            for event in events {
                println!(
                    "{} {} -> {}{}",
                    event.moved_at,
                    event.from_path,
                    event.to_path,
                    if event.external { " (external)" } else { "" },
                );
            }
            Ok(())
        }),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the registry?",
                Some(false),
            ) {
                Ok(true) => match shipshape_core::registry::Database::open(&db_path) {
                    Ok(db) => {
                        if let Err(e) = db.truncate_all() {
                            error!("Error truncating registry: {}", e);
                        } else {
                            println!("All tables truncated");
                        }
                    }
                    Err(e) => error!("Error opening registry: {}", e),
                },
                _ => {
                    process::exit(0);
                }
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run<F>(config: &shipshape_core::AppConfig, db_path: &str, f: F)
where
    F: FnOnce(&Engine) -> Result<(), shipshape_core::Error>,
{
    let ctx = match AppContext::open(config.clone(), db_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error opening registry: {}", e);
            process::exit(1);
        }
    };
    let engine = Engine::new(ctx);
    if let Err(err) = f(&engine) {
        error!("Error: {}", err);
    }
}

fn resolve_plan_id(engine: &Engine, explicit: Option<i64>) -> Result<i64, shipshape_core::Error> {
    match explicit {
        Some(id) => Ok(id),
        None => engine
            .context()
            .db
            .latest_plan_id()?
            .ok_or_else(|| shipshape_core::Error::Other("no plans exist yet".into())),
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
