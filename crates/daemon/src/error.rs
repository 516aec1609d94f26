use thiserror::Error;

use assetflow_runs::{InstanceError, RunStorageError, WorkspaceError};

/// Error raised while retrying a single run.
///
/// Expected misses (deleted job, renamed repository) are not errors; they
/// surface as `RetryOutcome::Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("run storage: {0}")]
    Storage(#[from] RunStorageError),
    #[error("workspace: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("instance: {0}")]
    Instance(#[from] InstanceError),
}

impl RetryError {
    /// Name of the underlying error kind, recorded on failure events.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RetryError::Storage(_) | RetryError::Instance(InstanceError::Storage(_)) => {
                "RunStorageError"
            }
            RetryError::Workspace(_) | RetryError::Instance(InstanceError::Workspace(_)) => {
                "WorkspaceError"
            }
        }
    }
}
