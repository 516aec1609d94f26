//! The instance: the service daemons and the engine report through.
//!
//! `Instance` owns run storage and the run-retry settings. It is the only
//! writer of lifecycle events (enqueue, start, failure) and of the
//! re-execution lineage tags, which keeps the tag protocol in one place.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use assetflow_core::RunId;

use crate::event::{EngineEventData, RunEvent, RunEventType, StoredRunEvent};
use crate::run::{Run, RunRecord, RunStatus};
use crate::storage::{InMemoryRunStorage, RunStorage, RunStorageError, RunsFilter};
use crate::strategy::ReexecutionStrategy;
use crate::tags::{
    MAX_RETRIES_TAG, PARENT_RUN_ID_TAG, RETRY_NUMBER_TAG, RETRY_ON_ASSET_OR_OP_FAILURE_TAG,
    ROOT_RUN_ID_TAG, WILL_RETRY_TAG, get_boolean_tag_value, get_u32_tag_value,
};
use crate::workspace::{RemoteJob, Workspace, WorkspaceError};

/// Tags recomputed for every re-executed run instead of being inherited.
const LINEAGE_TAGS: [&str; 4] = [
    WILL_RETRY_TAG,
    RETRY_NUMBER_TAG,
    PARENT_RUN_ID_TAG,
    ROOT_RUN_ID_TAG,
];

/// Automatic run retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRetriesConfig {
    pub enabled: bool,
    /// Retries allowed per lineage unless a run overrides it with a tag
    pub max_retries: u32,
    /// Whether failures inside steps are retried (vs. only run-level failures)
    pub retry_on_asset_or_op_failure: bool,
}

impl Default for RunRetriesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            retry_on_asset_or_op_failure: true,
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunFailureReason {
    /// An op or asset step raised
    StepFailure,
    /// The run worker itself failed
    RunException,
    /// The run never reached `Started`
    StartTimeout,
    Unexpected,
}

/// Error from an instance operation that touches both storage and the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Storage(#[from] RunStorageError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

pub struct Instance {
    storage: Arc<dyn RunStorage>,
    run_retries: RunRetriesConfig,
}

impl core::fmt::Debug for Instance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Instance")
            .field("run_retries", &self.run_retries)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub fn new(storage: Arc<dyn RunStorage>, run_retries: RunRetriesConfig) -> Self {
        Self {
            storage,
            run_retries,
        }
    }

    /// Instance backed by in-memory storage.
    pub fn ephemeral(run_retries: RunRetriesConfig) -> Self {
        Self::new(InMemoryRunStorage::arc(), run_retries)
    }

    pub fn storage(&self) -> &Arc<dyn RunStorage> {
        &self.storage
    }

    pub fn run_retries(&self) -> &RunRetriesConfig {
        &self.run_retries
    }

    pub fn run_retries_enabled(&self) -> bool {
        self.run_retries.enabled
    }

    pub fn run_retries_max_retries(&self) -> u32 {
        self.run_retries.max_retries
    }

    pub fn add_run(&self, run: Run) -> Result<Run, RunStorageError> {
        Ok(self.storage.add_run(run)?.run)
    }

    pub fn get_run(&self, run_id: RunId) -> Result<Option<Run>, RunStorageError> {
        self.storage.get_run(run_id)
    }

    pub fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStorageError> {
        self.storage.get_run_records(filter, limit)
    }

    fn require_run(&self, run_id: RunId) -> Result<Run, RunStorageError> {
        self.storage
            .get_run(run_id)?
            .ok_or(RunStorageError::RunNotFound(run_id))
    }

    /// Attach an engine event to `run`.
    pub fn report_engine_event(
        &self,
        message: impl Into<String>,
        run: &Run,
        engine_event_data: Option<EngineEventData>,
    ) -> Result<StoredRunEvent, RunStorageError> {
        let event = RunEvent::engine(run.run_id, message, engine_event_data);
        debug!(run_id = %run.run_id, message = %event.message, "engine event");
        self.storage.store_event(event)
    }

    /// Build and store a run re-executing `parent`.
    ///
    /// Tags are layered: job tags, then the parent's tags (if requested,
    /// minus lineage tags), then `extra_tags`, then the lineage tags.
    pub fn create_reexecuted_run(
        &self,
        parent: &Run,
        remote_job: &RemoteJob,
        strategy: ReexecutionStrategy,
        extra_tags: BTreeMap<String, String>,
        use_parent_run_tags: bool,
    ) -> Result<Run, RunStorageError> {
        let root_run_id = parent.root_run_id.unwrap_or(parent.run_id);

        let mut tags = remote_job.snapshot.tags.clone();
        if use_parent_run_tags {
            tags.extend(
                parent
                    .tags
                    .iter()
                    .filter(|(k, _)| !LINEAGE_TAGS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        tags.extend(extra_tags);
        tags.insert(PARENT_RUN_ID_TAG.to_string(), parent.run_id.to_string());
        tags.insert(ROOT_RUN_ID_TAG.to_string(), root_run_id.to_string());

        let mut run = Run::new(remote_job.name()).with_origin(remote_job.origin.clone());
        run.tags = tags;
        run.op_selection = remote_job.op_selection.clone();
        run.asset_selection = remote_job.asset_selection.clone();
        run.parent_run_id = Some(parent.run_id);
        run.root_run_id = Some(root_run_id);
        run.reexecution_strategy = Some(strategy);

        let run = self.add_run(run)?;
        info!(
            run_id = %run.run_id,
            parent_run_id = %parent.run_id,
            root_run_id = %root_run_id,
            strategy = %strategy,
            "created re-executed run"
        );
        Ok(run)
    }

    /// Queue a not-yet-started run for launch.
    ///
    /// The run's code location must still be loadable from `workspace`.
    pub fn submit_run(
        &self,
        run_id: RunId,
        workspace: &dyn Workspace,
    ) -> Result<Run, InstanceError> {
        let run = self.require_run(run_id)?;
        if let Some(origin) = &run.remote_job_origin {
            workspace.get_code_location(origin.location_name())?;
        }

        let record = self.storage.handle_run_status(run_id, RunStatus::Queued)?;
        self.storage.store_event(RunEvent::new(
            run_id,
            RunEventType::RunEnqueued,
            "Run is enqueued",
        ))?;
        info!(run_id = %run_id, job = %record.run.job_name, "run submitted");
        Ok(record.run)
    }

    pub fn report_run_started(&self, run_id: RunId) -> Result<Run, RunStorageError> {
        let record = self.storage.handle_run_status(run_id, RunStatus::Started)?;
        self.storage.store_event(RunEvent::new(
            run_id,
            RunEventType::RunStart,
            "Started execution of run",
        ))?;
        Ok(record.run)
    }

    pub fn report_run_succeeded(&self, run_id: RunId) -> Result<Run, RunStorageError> {
        let record = self.storage.handle_run_status(run_id, RunStatus::Success)?;
        self.storage.store_event(RunEvent::new(
            run_id,
            RunEventType::RunSuccess,
            "Finished execution of run",
        ))?;
        Ok(record.run)
    }

    /// Whether a run failing for `reason` should be retried automatically.
    ///
    /// Per-run tags override the configured max retries and step-failure
    /// policy.
    pub fn should_retry_run(&self, run: &Run, reason: RunFailureReason) -> bool {
        if !self.run_retries.enabled {
            return false;
        }

        let max_retries = get_u32_tag_value(&run.tags, MAX_RETRIES_TAG, self.run_retries.max_retries);
        if run.retry_state().retry_number >= max_retries {
            return false;
        }

        let retry_on_step_failure = get_boolean_tag_value(
            run.tag(RETRY_ON_ASSET_OR_OP_FAILURE_TAG),
            self.run_retries.retry_on_asset_or_op_failure,
        );
        reason != RunFailureReason::StepFailure || retry_on_step_failure
    }

    /// Mark a run failed, tag its retry eligibility and record the failure.
    ///
    /// The tag is written before the `RunFailure` event so anything tailing
    /// failure events sees the final tags.
    pub fn report_run_failed(
        &self,
        run_id: RunId,
        reason: RunFailureReason,
        message: impl Into<String>,
    ) -> Result<Run, RunStorageError> {
        let run = self.require_run(run_id)?;
        self.storage.handle_run_status(run_id, RunStatus::Failure)?;

        if self.run_retries.enabled {
            let will_retry = self.should_retry_run(&run, reason);
            self.storage.add_run_tags(
                run_id,
                BTreeMap::from([(WILL_RETRY_TAG.to_string(), will_retry.to_string())]),
            )?;
            debug!(run_id = %run_id, ?reason, will_retry, "tagged failed run");
        }

        self.storage
            .store_event(RunEvent::new(run_id, RunEventType::RunFailure, message))?;
        self.require_run(run_id)
    }

    /// Whether a retry numbered `retry_number` already exists for `run`.
    pub fn has_retry_run(&self, run: &Run, retry_number: u32) -> Result<bool, RunStorageError> {
        let filter = RunsFilter::new()
            .with_tag(PARENT_RUN_ID_TAG, run.run_id.to_string())
            .with_tag(RETRY_NUMBER_TAG, retry_number.to_string());
        Ok(!self.storage.get_run_records(&filter, Some(1))?.is_empty())
    }
}
