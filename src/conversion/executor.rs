//! Runs a job's stage plan on a [`TranscodeEngine`], turning stage-local
//! progress into job-wide progress events.

use std::sync::Arc;

use mediaforge_av::{StagePlan, TranscodeEngine};
use mediaforge_common::{Error, ProgressEvent, Result};

use super::progress::ProgressBroadcaster;
use super::registry::JobRecord;

/// How a plan run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Completed,
    Cancelled,
}

/// Executes stage plans for the orchestrator.
#[derive(Clone)]
pub struct StageExecutor {
    engine: Arc<dyn TranscodeEngine>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl StageExecutor {
    pub fn new(engine: Arc<dyn TranscodeEngine>, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            engine,
            broadcaster,
        }
    }

    /// Run every stage in order.
    ///
    /// Percent values are mapped into each stage's range and never go
    /// backwards; each stage's upper bound is emitted when it finishes. Once
    /// the record is cancelled no further stage starts and whatever the
    /// killed stage returned is discarded.
    pub async fn run_plan(&self, record: &JobRecord, plan: &StagePlan) -> Result<PlanOutcome> {
        let job_id = &record.id;
        let broadcaster = &self.broadcaster;
        let mut last = 0.0_f64;

        for (index, stage) in plan.stages.iter().enumerate() {
            let Some(token) = record.begin_stage() else {
                return Ok(PlanOutcome::Cancelled);
            };

            tracing::info!(
                job_id = %job_id,
                stage = stage.label,
                "Starting stage {}/{}",
                index + 1,
                plan.stages.len()
            );

            let range = stage.range;
            let mut on_progress = |stage_percent: f64| {
                let percent = range.map(stage_percent);
                if percent > last {
                    last = percent;
                    broadcaster.emit(job_id, ProgressEvent::progress(percent));
                }
            };
            let result = self.engine.run(stage, token, &mut on_progress).await;

            if record.is_cancelled() {
                tracing::debug!(job_id = %job_id, stage = stage.label, "Stage ended after cancellation");
                return Ok(PlanOutcome::Cancelled);
            }

            if let Err(e) = result {
                tracing::warn!(job_id = %job_id, stage = stage.label, "Stage failed: {e}");
                // Tool diagnostics stay in the log; callers get the stage name.
                return Err(Error::Engine(format!("{} stage failed", stage.label)));
            }

            if range.end > last {
                last = range.end;
                broadcaster.emit(job_id, ProgressEvent::progress(range.end));
            }
        }

        Ok(PlanOutcome::Completed)
    }
}
