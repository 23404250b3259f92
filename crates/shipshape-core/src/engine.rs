use crate::analyzer::{self, AnalysisReport};
use crate::classify::{self, Classifier, ClassifyReport};
use crate::context::AppContext;
use crate::error::Error;
use crate::executor::{self, ExecutionReport};
use crate::metrics::{self, MetricsReport};
use crate::planner::{self, PlanScope, PlanSummary};
use crate::progress::ProgressReporter;
use crate::reorganizer::{self, ReorganizeReport};
use crate::scanner::{self, ScanReport};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Orchestration facade over the pipeline phases. Holds the shared
/// cancellation token; every phase takes the context it needs and nothing
/// else.
pub struct Engine {
    ctx: AppContext,
    cancel: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub scan: ScanReport,
    pub classify: ClassifyReport,
    pub analysis: AnalysisReport,
    pub plan: PlanSummary,
}

impl Engine {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Shared token: store `true` to stop a running scan or execution at
    /// the next safe point. The registry stays valid and resumable.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn canonical_root(&self) -> PathBuf {
        PathBuf::from(&self.ctx.config.canonical_root)
    }

    pub fn scan(&self, reporter: &dyn ProgressReporter) -> Result<ScanReport, Error> {
        self.cancel.store(false, Ordering::Relaxed);
        scanner::scan(&self.ctx, reporter, &self.cancel)
    }

    pub fn classify(&self, classifier: Arc<dyn Classifier>) -> Result<ClassifyReport, Error> {
        classify::run_classification_pass(&self.ctx, classifier)
    }

    pub fn analyze(&self, reporter: &dyn ProgressReporter) -> Result<AnalysisReport, Error> {
        reporter.on_analyze_start();
        let report = analyzer::analyze(&self.ctx)?;
        reporter.on_analyze_complete(report.confirmed_groups, report.duration.as_secs_f64());
        Ok(report)
    }

    pub fn plan(&self) -> Result<PlanSummary, Error> {
        planner::build_plan(&self.ctx, &self.canonical_root(), PlanScope::Classified)
    }

    pub fn plan_duplicate_sweep(&self) -> Result<PlanSummary, Error> {
        planner::build_duplicate_sweep(&self.ctx, &self.canonical_root())
    }

    pub fn approve(&self, plan_id: i64) -> Result<(), Error> {
        planner::approve_plan(&self.ctx, plan_id)
    }

    pub fn execute(
        &self,
        plan_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExecutionReport, Error> {
        self.cancel.store(false, Ordering::Relaxed);
        executor::execute(&self.ctx, plan_id, reporter)
    }

    pub fn rollback_plan(&self, plan_id: i64) -> Result<executor::RollbackReport, Error> {
        let checkpoint = self
            .ctx
            .db
            .checkpoint_for_plan(plan_id)?
            .ok_or_else(|| Error::Other(format!("plan {plan_id} has no checkpoint")))?;
        executor::rollback(&self.ctx, checkpoint.id)
    }

    pub fn reorganize(
        &self,
        dry_run: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<ReorganizeReport, Error> {
        reorganizer::reorganize(&self.ctx, &self.canonical_root(), dry_run, reporter)
    }

    pub fn correct(&self, file_id: i64, new_type: &str, reason: &str) -> Result<(), Error> {
        classify::correct(&self.ctx, file_id, new_type, reason)?;
        Ok(())
    }

    pub fn metrics(&self) -> Result<MetricsReport, Error> {
        metrics::collect(&self.ctx)
    }

    /// Full ingest pipeline: scan, classify, duplicate analysis, then a
    /// placement plan over the freshly classified records. The plan is
    /// left unapproved for review.
    pub fn pipeline(
        &self,
        classifier: Arc<dyn Classifier>,
        reporter: &dyn ProgressReporter,
    ) -> Result<PipelineReport, Error> {
        let scan = self.scan(reporter)?;
        let classify = self.classify(classifier)?;
        let analysis = self.analyze(reporter)?;
        let plan = self.plan()?;
        info!(
            "Pipeline complete: {} scanned, {} classified, {} duplicate groups, {} planned moves",
            scan.files_seen, classify.classified, analysis.confirmed_groups, plan.actions
        );
        Ok(PipelineReport {
            scan,
            classify,
            analysis,
            plan,
        })
    }
}
