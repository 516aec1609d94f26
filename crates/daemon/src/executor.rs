//! Re-submission of a single failed run.

use std::collections::BTreeMap;

use tracing::{info, warn};

use assetflow_core::RunId;
use assetflow_runs::tags::RETRY_NUMBER_TAG;
use assetflow_runs::{EngineEventData, JobSubsetSelector, MetadataValue, Run};

use crate::context::WorkspaceProcessContext;
use crate::decider::{DEFAULT_REEXECUTION_STRATEGY, get_reexecution_strategy};
use crate::error::RetryError;

/// Why a run could not be retried. `Display` is the engine event message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingJobOrigin,
    RepositoryNotFound { location: String, repository: String },
    JobNotFound { repository: String, job: String },
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SkipReason::MissingJobOrigin => {
                f.write_str("Run does not have an external job origin, unable to retry the run.")
            }
            SkipReason::RepositoryNotFound {
                location,
                repository,
            } => write!(
                f,
                "Could not find repository {repository} in location {location}, unable to retry the run. It was likely renamed or deleted."
            ),
            SkipReason::JobNotFound { repository, job } => write!(
                f,
                "Could not find job {job} in repository {repository}, unable to retry the run. It was likely renamed or deleted."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Launched { new_run_id: RunId },
    Skipped(SkipReason),
}

/// Re-execute `failed_run` as retry number `retry_number`.
///
/// Definitions that have gone missing are reported on the failed run and
/// yield `Skipped`. Every `Launched` call creates a new run; callers decide
/// whether a retry is still needed.
pub fn retry_run(
    failed_run: &Run,
    retry_number: u32,
    ctx: &WorkspaceProcessContext,
) -> Result<RetryOutcome, RetryError> {
    let instance = ctx.instance();
    let workspace = ctx.create_request_context();

    let Some(origin) = &failed_run.remote_job_origin else {
        return skip(ctx, failed_run, SkipReason::MissingJobOrigin);
    };

    let code_location = workspace.get_code_location(origin.location_name())?;
    let repository_name = origin.repository_name();

    let Ok(repository) = code_location.get_repository(repository_name) else {
        let reason = SkipReason::RepositoryNotFound {
            location: code_location.name.clone(),
            repository: repository_name.to_string(),
        };
        return skip(ctx, failed_run, reason);
    };
    if !repository.has_job(&failed_run.job_name) {
        let reason = SkipReason::JobNotFound {
            repository: repository_name.to_string(),
            job: failed_run.job_name.clone(),
        };
        return skip(ctx, failed_run, reason);
    }

    let remote_job = code_location.get_job(&JobSubsetSelector {
        location_name: origin.location_name().to_string(),
        repository_name: repository_name.to_string(),
        job_name: failed_run.job_name.clone(),
        op_selection: failed_run.op_selection.clone(),
        asset_selection: failed_run.asset_selection.clone(),
    })?;

    let strategy =
        get_reexecution_strategy(failed_run, instance)?.unwrap_or(DEFAULT_REEXECUTION_STRATEGY);

    let new_run = instance.create_reexecuted_run(
        failed_run,
        &remote_job,
        strategy,
        BTreeMap::from([(RETRY_NUMBER_TAG.to_string(), retry_number.to_string())]),
        true,
    )?;

    instance.report_engine_event(
        "Retrying the run",
        failed_run,
        Some(EngineEventData::new().with_metadata("new run", MetadataValue::Run(new_run.run_id))),
    )?;
    instance.report_engine_event(
        "Launched as an automatic retry",
        &new_run,
        Some(
            EngineEventData::new()
                .with_metadata("failed run", MetadataValue::Run(failed_run.run_id)),
        ),
    )?;

    instance.submit_run(new_run.run_id, workspace.as_ref())?;

    info!(
        run_id = %failed_run.run_id,
        new_run_id = %new_run.run_id,
        retry_number,
        %strategy,
        "launched automatic retry"
    );
    Ok(RetryOutcome::Launched {
        new_run_id: new_run.run_id,
    })
}

fn skip(
    ctx: &WorkspaceProcessContext,
    run: &Run,
    reason: SkipReason,
) -> Result<RetryOutcome, RetryError> {
    warn!(run_id = %run.run_id, reason = %reason, "not retrying run");
    ctx.instance().report_engine_event(reason.to_string(), run, None)?;
    Ok(RetryOutcome::Skipped(reason))
}
