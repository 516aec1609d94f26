//! Run storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::Utc;

use assetflow_core::RunId;

use crate::event::{RunEvent, RunEventType, StoredRunEvent};
use crate::run::{Run, RunRecord, RunStatus};

/// Persistence for runs and their events.
///
/// Runs are listed in insertion (`storage_id`) order. Events get a global,
/// monotonically increasing `storage_id` so consumers can tail them with a
/// cursor.
pub trait RunStorage: Send + Sync {
    /// Persist a new run.
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStorageError>;

    fn get_run_record(&self, run_id: RunId) -> Result<Option<RunRecord>, RunStorageError>;

    fn get_run(&self, run_id: RunId) -> Result<Option<Run>, RunStorageError> {
        Ok(self.get_run_record(run_id)?.map(|record| record.run))
    }

    /// Records matching `filter`, oldest first, at most `limit` of them.
    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStorageError>;

    /// Insert or overwrite tags on an existing run.
    fn add_run_tags(
        &self,
        run_id: RunId,
        tags: BTreeMap<String, String>,
    ) -> Result<(), RunStorageError>;

    /// Move a run to `status`, rejecting illegal lifecycle transitions.
    fn handle_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
    ) -> Result<RunRecord, RunStorageError>;

    /// Append an event to an existing run.
    fn store_event(&self, event: RunEvent) -> Result<StoredRunEvent, RunStorageError>;

    fn get_events_for_run(&self, run_id: RunId) -> Result<Vec<StoredRunEvent>, RunStorageError>;

    /// Events with `storage_id > cursor`, optionally of one type, oldest first.
    fn get_events_after(
        &self,
        cursor: Option<u64>,
        event_type: Option<RunEventType>,
        limit: usize,
    ) -> Result<Vec<StoredRunEvent>, RunStorageError>;

    /// Remove a run and its events.
    fn delete_run(&self, run_id: RunId) -> Result<(), RunStorageError>;
}

impl<S> RunStorage for Arc<S>
where
    S: RunStorage + ?Sized,
{
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStorageError> {
        (**self).add_run(run)
    }

    fn get_run_record(&self, run_id: RunId) -> Result<Option<RunRecord>, RunStorageError> {
        (**self).get_run_record(run_id)
    }

    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStorageError> {
        (**self).get_run_records(filter, limit)
    }

    fn add_run_tags(
        &self,
        run_id: RunId,
        tags: BTreeMap<String, String>,
    ) -> Result<(), RunStorageError> {
        (**self).add_run_tags(run_id, tags)
    }

    fn handle_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
    ) -> Result<RunRecord, RunStorageError> {
        (**self).handle_run_status(run_id, status)
    }

    fn store_event(&self, event: RunEvent) -> Result<StoredRunEvent, RunStorageError> {
        (**self).store_event(event)
    }

    fn get_events_for_run(&self, run_id: RunId) -> Result<Vec<StoredRunEvent>, RunStorageError> {
        (**self).get_events_for_run(run_id)
    }

    fn get_events_after(
        &self,
        cursor: Option<u64>,
        event_type: Option<RunEventType>,
        limit: usize,
    ) -> Result<Vec<StoredRunEvent>, RunStorageError> {
        (**self).get_events_after(cursor, event_type, limit)
    }

    fn delete_run(&self, run_id: RunId) -> Result<(), RunStorageError> {
        (**self).delete_run(run_id)
    }
}

/// Run storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStorageError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    #[error("run already exists: {0}")]
    RunAlreadyExists(RunId),
    #[error("run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Criteria for listing runs. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunsFilter {
    pub run_ids: Vec<RunId>,
    pub statuses: Vec<RunStatus>,
    /// Every listed tag must be present with the given value
    pub tags: BTreeMap<String, String>,
    pub job_name: Option<String>,
}

impl RunsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_ids(mut self, run_ids: impl IntoIterator<Item = RunId>) -> Self {
        self.run_ids.extend(run_ids);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn matches(&self, run: &Run) -> bool {
        (self.run_ids.is_empty() || self.run_ids.contains(&run.run_id))
            && (self.statuses.is_empty() || self.statuses.contains(&run.status))
            && self
                .tags
                .iter()
                .all(|(k, v)| run.tags.get(k).is_some_and(|actual| actual == v))
            && self.job_name.as_ref().is_none_or(|name| name == &run.job_name)
    }
}

#[derive(Debug, Default)]
struct State {
    runs: HashMap<RunId, RunRecord>,
    events: Vec<StoredRunEvent>,
    next_run_storage_id: u64,
    next_event_storage_id: u64,
}

/// In-memory run storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRunStorage {
    state: RwLock<State>,
}

impl InMemoryRunStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, RunStorageError> {
        self.state
            .read()
            .map_err(|_| RunStorageError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, RunStorageError> {
        self.state
            .write()
            .map_err(|_| RunStorageError::Storage("lock poisoned".to_string()))
    }
}

impl RunStorage for InMemoryRunStorage {
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStorageError> {
        let mut state = self.write()?;
        if state.runs.contains_key(&run.run_id) {
            return Err(RunStorageError::RunAlreadyExists(run.run_id));
        }
        state.next_run_storage_id += 1;
        let now = Utc::now();
        let record = RunRecord {
            storage_id: state.next_run_storage_id,
            run,
            create_timestamp: now,
            update_timestamp: now,
        };
        state.runs.insert(record.run.run_id, record.clone());
        Ok(record)
    }

    fn get_run_record(&self, run_id: RunId) -> Result<Option<RunRecord>, RunStorageError> {
        Ok(self.read()?.runs.get(&run_id).cloned())
    }

    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStorageError> {
        let state = self.read()?;
        let mut records: Vec<RunRecord> = state
            .runs
            .values()
            .filter(|record| filter.matches(&record.run))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.storage_id);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn add_run_tags(
        &self,
        run_id: RunId,
        tags: BTreeMap<String, String>,
    ) -> Result<(), RunStorageError> {
        let mut state = self.write()?;
        let record = state
            .runs
            .get_mut(&run_id)
            .ok_or(RunStorageError::RunNotFound(run_id))?;
        record.run.tags.extend(tags);
        record.update_timestamp = Utc::now();
        Ok(())
    }

    fn handle_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
    ) -> Result<RunRecord, RunStorageError> {
        let mut state = self.write()?;
        let record = state
            .runs
            .get_mut(&run_id)
            .ok_or(RunStorageError::RunNotFound(run_id))?;
        let from = record.run.status;
        if !from.can_transition_to(status) {
            return Err(RunStorageError::InvalidTransition {
                run_id,
                from,
                to: status,
            });
        }
        record.run.status = status;
        record.update_timestamp = Utc::now();
        Ok(record.clone())
    }

    fn store_event(&self, event: RunEvent) -> Result<StoredRunEvent, RunStorageError> {
        let mut state = self.write()?;
        if !state.runs.contains_key(&event.run_id) {
            return Err(RunStorageError::RunNotFound(event.run_id));
        }
        state.next_event_storage_id += 1;
        let stored = StoredRunEvent {
            storage_id: state.next_event_storage_id,
            event,
        };
        state.events.push(stored.clone());
        Ok(stored)
    }

    fn get_events_for_run(&self, run_id: RunId) -> Result<Vec<StoredRunEvent>, RunStorageError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|stored| stored.event.run_id == run_id)
            .cloned()
            .collect())
    }

    fn get_events_after(
        &self,
        cursor: Option<u64>,
        event_type: Option<RunEventType>,
        limit: usize,
    ) -> Result<Vec<StoredRunEvent>, RunStorageError> {
        let state = self.read()?;
        let after = cursor.unwrap_or(0);
        // events are appended in storage_id order
        Ok(state
            .events
            .iter()
            .filter(|stored| stored.storage_id > after)
            .filter(|stored| event_type.is_none_or(|t| stored.event.event_type == t))
            .take(limit)
            .cloned()
            .collect())
    }

    fn delete_run(&self, run_id: RunId) -> Result<(), RunStorageError> {
        let mut state = self.write()?;
        if state.runs.remove(&run_id).is_none() {
            return Err(RunStorageError::RunNotFound(run_id));
        }
        state.events.retain(|stored| stored.event.run_id != run_id);
        Ok(())
    }
}
