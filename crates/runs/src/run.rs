//! Core run types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assetflow_core::{AssetKey, RunId};

use crate::strategy::ReexecutionStrategy;
use crate::tags::RetryState;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Created, not yet submitted
    NotStarted,
    /// Submitted, waiting to be launched
    Queued,
    /// Currently executing
    Started,
    /// Finished successfully
    Success,
    /// Finished with a failure
    Failure,
    /// Cancelled by user/system
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failure | RunStatus::Canceled
        )
    }

    /// Whether a run in this status may move to `next`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            RunStatus::NotStarted => matches!(
                next,
                RunStatus::Queued | RunStatus::Started | RunStatus::Failure | RunStatus::Canceled
            ),
            RunStatus::Queued => matches!(
                next,
                RunStatus::Started | RunStatus::Failure | RunStatus::Canceled
            ),
            RunStatus::Started => next.is_terminal(),
            RunStatus::Success | RunStatus::Failure | RunStatus::Canceled => false,
        }
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "NOT_STARTED",
            RunStatus::Queued => "QUEUED",
            RunStatus::Started => "STARTED",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
            RunStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Where a repository is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryOrigin {
    pub code_location_name: String,
    pub repository_name: String,
}

/// Identity of the job a run was launched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteJobOrigin {
    pub repository_origin: RepositoryOrigin,
    pub job_name: String,
}

impl RemoteJobOrigin {
    pub fn new(
        code_location_name: impl Into<String>,
        repository_name: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            repository_origin: RepositoryOrigin {
                code_location_name: code_location_name.into(),
                repository_name: repository_name.into(),
            },
            job_name: job_name.into(),
        }
    }

    pub fn location_name(&self) -> &str {
        &self.repository_origin.code_location_name
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_origin.repository_name
    }
}

/// One execution attempt of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub job_name: String,
    pub status: RunStatus,
    pub tags: BTreeMap<String, String>,
    pub remote_job_origin: Option<RemoteJobOrigin>,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<AssetKey>>,
    /// Run this one re-executes, if any
    pub parent_run_id: Option<RunId>,
    /// First run of the re-execution lineage
    pub root_run_id: Option<RunId>,
    /// Strategy the run was re-executed with
    pub reexecution_strategy: Option<ReexecutionStrategy>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            job_name: job_name.into(),
            status: RunStatus::NotStarted,
            tags: BTreeMap::new(),
            remote_job_origin: None,
            op_selection: None,
            asset_selection: None,
            parent_run_id: None,
            root_run_id: None,
            reexecution_strategy: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_origin(mut self, origin: RemoteJobOrigin) -> Self {
        self.remote_job_origin = Some(origin);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_op_selection<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_selection = Some(ops.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_asset_selection(mut self, assets: impl IntoIterator<Item = AssetKey>) -> Self {
        self.asset_selection = Some(assets.into_iter().collect());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Retry flags parsed from this run's tags.
    pub fn retry_state(&self) -> RetryState {
        RetryState::from_tags(&self.tags)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A run as persisted by run storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonically increasing insertion position.
    pub storage_id: u64,
    pub run: Run,
    pub create_timestamp: DateTime<Utc>,
    pub update_timestamp: DateTime<Utc>,
}
