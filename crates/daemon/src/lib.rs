//! Automatic run retries.
//!
//! ## Flow
//!
//! 1. `RetryDaemon` tails `RunFailure` events and loads the failed runs
//! 2. `consume_new_runs_for_automatic_reexecution` walks the candidates the
//!    decider yields, checking in with a cooperative checkpoint before each
//! 3. `retry_run` resolves the job in the workspace, creates the re-executed
//!    run, links the two runs with engine events and submits the new one
//!
//! Duplicate retries are prevented by the decider, which skips any run whose
//! successor (same parent, next retry number) already exists in storage.
//! This makes every step safe to repeat after a crash.

pub mod config;
pub mod consume;
pub mod context;
pub mod daemon;
pub mod decider;
pub mod error;
pub mod executor;

pub use config::{ConfigError, DaemonConfig};
pub use consume::{ConsumeSummary, consume_all, consume_new_runs_for_automatic_reexecution};
pub use context::WorkspaceProcessContext;
pub use daemon::{DaemonStats, RetryDaemon, RetryDaemonHandle};
pub use decider::{DEFAULT_REEXECUTION_STRATEGY, filter_runs_to_should_retry, get_reexecution_strategy};
pub use error::RetryError;
pub use executor::{RetryOutcome, SkipReason, retry_run};
