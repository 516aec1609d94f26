//! Which failed runs to retry, and how.

use tracing::{error, warn};

use assetflow_runs::tags::RETRY_STRATEGY_TAG;
use assetflow_runs::{Instance, ReexecutionStrategy, Run, RunStorageError, StrategyTag};

/// Strategy used when a run does not name a valid one.
pub const DEFAULT_REEXECUTION_STRATEGY: ReexecutionStrategy = ReexecutionStrategy::FromFailure;

/// Runs that should be retried, paired with the retry number of their retry.
///
/// Lazy: storage is only consulted as the iterator is advanced. Runs whose
/// retry already exists are skipped, so feeding the same runs twice yields
/// nothing the second time.
pub fn filter_runs_to_should_retry<'a, I>(
    runs: I,
    instance: &'a Instance,
) -> impl Iterator<Item = (&'a Run, u32)> + 'a
where
    I: IntoIterator<Item = &'a Run>,
    I::IntoIter: 'a,
{
    runs.into_iter().filter_map(move |run| {
        let state = run.retry_state();
        if !state.eligible {
            return None;
        }
        let retry_number = state.next_retry_number();
        match instance.has_retry_run(run, retry_number) {
            Ok(false) => Some((run, retry_number)),
            Ok(true) => None,
            Err(err) => {
                // unknown state; retrying could duplicate
                error!(run_id = %run.run_id, retry_number, error = %err, "could not check for existing retry");
                None
            }
        }
    })
}

/// Strategy named by the run's retry-strategy tag.
///
/// An unrecognized value is reported as an engine event on the run and
/// treated as absent.
pub fn get_reexecution_strategy(
    run: &Run,
    instance: &Instance,
) -> Result<Option<ReexecutionStrategy>, RunStorageError> {
    match run.retry_state().strategy {
        StrategyTag::Absent => Ok(None),
        StrategyTag::Known(strategy) => Ok(Some(strategy)),
        StrategyTag::Unknown(raw) => {
            warn!(run_id = %run.run_id, value = %raw, "unknown retry strategy");
            instance.report_engine_event(
                format!("Error parsing retry strategy from tag '{RETRY_STRATEGY_TAG}: {raw}'"),
                run,
                None,
            )?;
            Ok(None)
        }
    }
}
