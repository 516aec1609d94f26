//! Polling driver for automatic run retries.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use assetflow_core::RunId;
use assetflow_runs::{Run, RunEventType, RunStorageError, RunsFilter};

use crate::config::DaemonConfig;
use crate::consume::{ConsumeSummary, consume_new_runs_for_automatic_reexecution};
use crate::context::WorkspaceProcessContext;

/// Daemon runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonStats {
    pub iterations: u64,
    pub runs_launched: u64,
    pub runs_skipped: u64,
    pub runs_failed: u64,
    pub iteration_errors: u64,
    pub last_iteration_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

impl DaemonStats {
    fn record(&mut self, summary: &ConsumeSummary) {
        self.runs_launched += summary.launched as u64;
        self.runs_skipped += summary.skipped as u64;
        self.runs_failed += summary.failed as u64;
    }
}

/// Handle to control a running daemon.
#[derive(Debug)]
pub struct RetryDaemonHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<DaemonStats>>,
}

impl RetryDaemonHandle {
    /// Request shutdown and wait for the current iteration to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> DaemonStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Tails `RunFailure` events and retries the failed runs.
///
/// The cursor (storage id of the last processed failure event) lives in
/// memory. After a restart every failure event is revisited; runs already
/// retried are filtered out by the decider.
#[derive(Debug)]
pub struct RetryDaemon {
    ctx: WorkspaceProcessContext,
    config: DaemonConfig,
    cursor: Option<u64>,
}

impl RetryDaemon {
    pub fn new(ctx: WorkspaceProcessContext, config: DaemonConfig) -> Self {
        Self {
            ctx,
            config,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// One pass over new failure events.
    pub fn run_iteration(&mut self) -> Result<ConsumeSummary, RunStorageError> {
        self.run_iteration_with(|_| ControlFlow::Continue(()))
    }

    /// One pass, checking in with `checkpoint` before each retry.
    ///
    /// If the pass is interrupted the cursor stays put, so the same events
    /// are read again next time.
    pub fn run_iteration_with<F>(&mut self, checkpoint: F) -> Result<ConsumeSummary, RunStorageError>
    where
        F: FnMut(&Run) -> ControlFlow<()>,
    {
        let instance = self.ctx.instance();
        if !instance.run_retries_enabled() {
            debug!(daemon = %self.config.name, "run retries disabled");
            return Ok(ConsumeSummary::default());
        }

        let events = instance.storage().get_events_after(
            self.cursor,
            Some(RunEventType::RunFailure),
            self.config.batch_size,
        )?;
        let Some(last) = events.last().map(|stored| stored.storage_id) else {
            return Ok(ConsumeSummary::default());
        };

        let run_ids: BTreeSet<RunId> = events.iter().map(|stored| stored.event.run_id).collect();
        let records =
            instance.get_run_records(&RunsFilter::new().with_run_ids(run_ids), None)?;

        let summary = consume_new_runs_for_automatic_reexecution(&self.ctx, &records, checkpoint);
        if summary.abandoned == 0 {
            self.cursor = Some(last);
        }

        debug!(
            daemon = %self.config.name,
            events = events.len(),
            launched = summary.launched,
            skipped = summary.skipped,
            failed = summary.failed,
            abandoned = summary.abandoned,
            cursor = ?self.cursor,
            "retry iteration finished"
        );
        Ok(summary)
    }

    /// Run the daemon on a background thread.
    pub fn spawn(self) -> RetryDaemonHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(DaemonStats::default()));
        let stats_clone = stats.clone();

        let name = self.config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || daemon_loop(self, shutdown_rx, stats_clone))
            .expect("failed to spawn retry daemon thread");

        RetryDaemonHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn daemon_loop(
    mut daemon: RetryDaemon,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<DaemonStats>>,
) {
    let name = daemon.config.name.clone();
    let poll_interval = daemon.config.poll_interval();
    info!(daemon = %name, ?poll_interval, "retry daemon started");
    let start_time = Instant::now();

    loop {
        let mut stop = false;
        let result = daemon.run_iteration_with(|_| match shutdown_rx.try_recv() {
            Err(mpsc::TryRecvError::Empty) => ControlFlow::Continue(()),
            _ => {
                stop = true;
                ControlFlow::Break(())
            }
        });

        {
            let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
            s.iterations += 1;
            s.last_iteration_at = Some(Utc::now());
            s.uptime_secs = start_time.elapsed().as_secs();
            match &result {
                Ok(summary) => s.record(summary),
                Err(_) => s.iteration_errors += 1,
            }
        }
        if let Err(e) = result {
            error!(daemon = %name, error = %e, "retry iteration failed");
        }
        if stop {
            break;
        }

        match shutdown_rx.recv_timeout(poll_interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            _ => break,
        }
    }

    info!(daemon = %name, "retry daemon stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assetflow_runs::{
        CodeLocation, InMemoryWorkspace, Instance, JobSnapshot, RemoteJobOrigin,
        RepositorySnapshot, RunFailureReason, RunRetriesConfig,
    };

    fn retries() -> RunRetriesConfig {
        RunRetriesConfig {
            enabled: true,
            max_retries: 2,
            retry_on_asset_or_op_failure: true,
        }
    }

    fn context(run_retries: RunRetriesConfig) -> WorkspaceProcessContext {
        let workspace = InMemoryWorkspace::new();
        workspace
            .add_location(CodeLocation::new("loc").with_repository(
                RepositorySnapshot::new("repo").with_job(JobSnapshot::new("etl")),
            ))
            .unwrap();
        WorkspaceProcessContext::new(
            Arc::new(Instance::ephemeral(run_retries)),
            Arc::new(workspace),
        )
    }

    fn fail_new_run(ctx: &WorkspaceProcessContext) -> RunId {
        let instance = ctx.instance();
        let run = instance
            .add_run(Run::new("etl").with_origin(RemoteJobOrigin::new("loc", "repo", "etl")))
            .unwrap();
        instance.report_run_started(run.run_id).unwrap();
        instance
            .report_run_failed(run.run_id, RunFailureReason::RunException, "worker crashed")
            .unwrap();
        run.run_id
    }

    #[test]
    fn iteration_advances_cursor() {
        let ctx = context(retries());
        let mut daemon = RetryDaemon::new(ctx.clone(), DaemonConfig::default());

        fail_new_run(&ctx);
        let summary = daemon.run_iteration().unwrap();
        assert_eq!(summary.launched, 1);
        let cursor = daemon.cursor();
        assert!(cursor.is_some());

        let summary = daemon.run_iteration().unwrap();
        assert_eq!(summary, ConsumeSummary::default());
        assert_eq!(daemon.cursor(), cursor);
    }

    #[test]
    fn batch_size_limits_events_per_iteration() {
        let ctx = context(retries());
        let config = DaemonConfig {
            batch_size: 1,
            ..DaemonConfig::default()
        };
        let mut daemon = RetryDaemon::new(ctx.clone(), config);

        fail_new_run(&ctx);
        fail_new_run(&ctx);
        assert_eq!(daemon.run_iteration().unwrap().launched, 1);
        assert_eq!(daemon.run_iteration().unwrap().launched, 1);
        assert_eq!(daemon.run_iteration().unwrap().launched, 0);
    }

    #[test]
    fn interrupted_iteration_keeps_cursor() {
        let ctx = context(retries());
        let mut daemon = RetryDaemon::new(ctx.clone(), DaemonConfig::default());

        fail_new_run(&ctx);
        let summary = daemon.run_iteration_with(|_| ControlFlow::Break(())).unwrap();
        assert_eq!(summary.abandoned, 1);
        assert_eq!(daemon.cursor(), None);

        assert_eq!(daemon.run_iteration().unwrap().launched, 1);
    }

    #[test]
    fn disabled_retries_do_nothing() {
        let ctx = context(RunRetriesConfig::default());
        let mut daemon = RetryDaemon::new(ctx.clone(), DaemonConfig::default());

        let run_id = fail_new_run(&ctx);
        assert_eq!(daemon.run_iteration().unwrap(), ConsumeSummary::default());
        assert_eq!(ctx.instance().get_run(run_id).unwrap().unwrap().tag("dagster/will_retry"), None);
    }

    #[test]
    fn spawned_daemon_retries_and_shuts_down() {
        let ctx = context(retries());
        fail_new_run(&ctx);

        let config = DaemonConfig {
            poll_interval_ms: 10,
            ..DaemonConfig::default()
        };
        let handle = RetryDaemon::new(ctx.clone(), config).spawn();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().runs_launched == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let stats = handle.stats();
        assert_eq!(stats.runs_launched, 1);
        assert!(stats.iterations >= 1);
        handle.shutdown();
    }
}
