//! Run records, run storage and the instance service.
//!
//! ## Components
//!
//! - `Run` / `RunRecord`: one execution attempt of a job and its stored form
//! - `tags`: the string tag protocol (retry flags, lineage) and `RetryState`
//! - `RunEvent`: engine and lifecycle events attached to runs
//! - `RunStorage`: persistence for runs and their events (in-memory or durable)
//! - `Workspace`: code locations, repositories and job snapshots
//! - `Instance`: the service the daemons talk to (report events, create and
//!   submit runs, record failures)

pub mod event;
pub mod instance;
pub mod run;
pub mod storage;
pub mod strategy;
pub mod tags;
pub mod workspace;

pub use event::{
    EngineEventData, MetadataValue, RunEvent, RunEventType, SerializableErrorInfo, StoredRunEvent,
};
pub use instance::{Instance, InstanceError, RunFailureReason, RunRetriesConfig};
pub use run::{RemoteJobOrigin, RepositoryOrigin, Run, RunRecord, RunStatus};
pub use storage::{InMemoryRunStorage, RunStorage, RunStorageError, RunsFilter};
pub use strategy::{ReexecutionStrategy, UnknownStrategy};
pub use tags::{RetryState, StrategyTag};
pub use workspace::{
    CodeLocation, InMemoryWorkspace, JobSnapshot, JobSubsetSelector, RemoteJob,
    RepositorySnapshot, Workspace, WorkspaceError,
};
