use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "shipshape")]
#[command(about = "Index, dedupe, and reorganize messy file collections", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan configured roots into the file registry
    Scan,
    /// Classify pending files using the built-in pattern classifier
    Classify,
    /// Run the duplicate detection pipeline
    Analyze,
    /// Run scan, classify, and analyze, then build a placement plan
    Process,
    /// Build a migration plan for classified files
    Plan {
        /// Plan an archive sweep of confirmed duplicates instead
        #[arg(long)]
        duplicates: bool,
    },
    /// Approve a plan for execution (latest plan if omitted)
    Approve { plan_id: Option<i64> },
    /// Execute an approved plan (latest plan if omitted)
    Execute {
        plan_id: Option<i64>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Roll a plan back to its pre-execution checkpoint
    Rollback { plan_id: i64 },
    /// Sync the registry with the organized tree and converge placement
    Reorganize {
        /// Report pending moves without touching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Manually correct a file's document type
    Correct {
        file_id: i64,
        new_type: String,
        #[arg(long, default_value = "manual correction")]
        reason: String,
    },
    /// Show registry statistics and accuracy metrics
    Status,
    /// Show the move history of one file
    History { file_id: i64 },
    /// Print configuration values
    PrintConfig,
    /// Truncate all registry tables
    TruncateDb,
}
