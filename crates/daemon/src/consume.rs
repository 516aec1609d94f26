//! The retry pass over a batch of run records.

use std::ops::ControlFlow;

use serde::Serialize;
use tracing::{debug, error};

use assetflow_runs::{EngineEventData, Run, RunRecord, SerializableErrorInfo};

use crate::context::WorkspaceProcessContext;
use crate::decider::filter_runs_to_should_retry;
use crate::executor::{RetryOutcome, retry_run};

/// Counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumeSummary {
    pub launched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Candidates left unprocessed because the checkpoint asked to stop
    pub abandoned: usize,
}

impl ConsumeSummary {
    pub fn candidates(&self) -> usize {
        self.launched + self.skipped + self.failed + self.abandoned
    }
}

/// Retry every eligible run in `run_records`.
///
/// `checkpoint` runs before each candidate; `ControlFlow::Break` stops the
/// pass and leaves the remaining candidates for a later call. A failed retry
/// is reported on its run as a `"Failed to retry run"` engine event and does
/// not stop the pass.
///
/// Calling this again with the same records is safe: runs whose retry was
/// already created are not yielded by the decider.
pub fn consume_new_runs_for_automatic_reexecution<F>(
    ctx: &WorkspaceProcessContext,
    run_records: &[RunRecord],
    mut checkpoint: F,
) -> ConsumeSummary
where
    F: FnMut(&Run) -> ControlFlow<()>,
{
    let mut summary = ConsumeSummary::default();
    let mut candidates = filter_runs_to_should_retry(
        run_records.iter().map(|record| &record.run),
        ctx.instance(),
    );

    while let Some((run, retry_number)) = candidates.next() {
        if checkpoint(run).is_break() {
            summary.abandoned = 1 + candidates.by_ref().count();
            debug!(abandoned = summary.abandoned, "retry pass interrupted");
            break;
        }

        match retry_run(run, retry_number, ctx) {
            Ok(RetryOutcome::Launched { .. }) => summary.launched += 1,
            Ok(RetryOutcome::Skipped(_)) => summary.skipped += 1,
            Err(err) => {
                summary.failed += 1;
                let error_info = SerializableErrorInfo::from_error(&err).with_cls_name(err.kind_name());
                error!(run_id = %run.run_id, retry_number, error = %err, "failed to retry run");
                if let Err(report_err) = ctx.instance().report_engine_event(
                    "Failed to retry run",
                    run,
                    Some(EngineEventData::new().with_error(error_info)),
                ) {
                    error!(run_id = %run.run_id, error = %report_err, "failed to report retry failure");
                }
            }
        }
    }

    summary
}

/// `consume_new_runs_for_automatic_reexecution` without interruption.
pub fn consume_all(ctx: &WorkspaceProcessContext, run_records: &[RunRecord]) -> ConsumeSummary {
    consume_new_runs_for_automatic_reexecution(ctx, run_records, |_| ControlFlow::Continue(()))
}
