//! Code locations, repositories and job snapshots.
//!
//! A `Workspace` resolves code location names to the definitions currently
//! loaded from them. Definitions can disappear between a run's launch and a
//! later retry (renamed repository, deleted job), so every lookup is fallible.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use assetflow_core::AssetKey;

use crate::run::RemoteJobOrigin;

/// Workspace lookup error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("code location not found: {0}")]
    CodeLocationNotFound(String),
    #[error("repository {repository} not found in location {location}")]
    RepositoryNotFound { location: String, repository: String },
    #[error("job {job} not found in repository {repository}")]
    JobNotFound { repository: String, job: String },
    #[error("invalid selection for job {job}: {reason}")]
    InvalidSelection { job: String, reason: String },
    #[error("workspace error: {0}")]
    Unavailable(String),
}

/// Static description of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: String,
    pub op_names: BTreeSet<String>,
    pub asset_keys: BTreeSet<AssetKey>,
    /// Tags every run of the job starts with
    pub tags: BTreeMap<String, String>,
}

impl JobSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_names: BTreeSet::new(),
            asset_keys: BTreeSet::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_ops<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_names.extend(ops.into_iter().map(Into::into));
        self
    }

    pub fn with_assets(mut self, assets: impl IntoIterator<Item = AssetKey>) -> Self {
        self.asset_keys.extend(assets);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub name: String,
    pub jobs: BTreeMap<String, JobSnapshot>,
}

impl RepositorySnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: BTreeMap::new(),
        }
    }

    pub fn with_job(mut self, job: JobSnapshot) -> Self {
        self.jobs.insert(job.name.clone(), job);
        self
    }

    pub fn has_job(&self, job_name: &str) -> bool {
        self.jobs.contains_key(job_name)
    }
}

/// Identifies a job, optionally narrowed to a subset of ops or assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubsetSelector {
    pub location_name: String,
    pub repository_name: String,
    pub job_name: String,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<AssetKey>>,
}

/// A job resolved from a code location, with its selection applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub origin: RemoteJobOrigin,
    pub snapshot: JobSnapshot,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<AssetKey>>,
}

impl RemoteJob {
    pub fn name(&self) -> &str {
        &self.snapshot.name
    }
}

/// Definitions loaded from one code location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub name: String,
    pub repositories: BTreeMap<String, RepositorySnapshot>,
}

impl CodeLocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repositories: BTreeMap::new(),
        }
    }

    pub fn with_repository(mut self, repository: RepositorySnapshot) -> Self {
        self.repositories.insert(repository.name.clone(), repository);
        self
    }

    pub fn has_repository(&self, repository_name: &str) -> bool {
        self.repositories.contains_key(repository_name)
    }

    pub fn get_repository(&self, repository_name: &str) -> Result<&RepositorySnapshot, WorkspaceError> {
        self.repositories
            .get(repository_name)
            .ok_or_else(|| WorkspaceError::RepositoryNotFound {
                location: self.name.clone(),
                repository: repository_name.to_string(),
            })
    }

    /// Resolve a job and validate its selection against the snapshot.
    pub fn get_job(&self, selector: &JobSubsetSelector) -> Result<RemoteJob, WorkspaceError> {
        let repository = self.get_repository(&selector.repository_name)?;
        let snapshot = repository
            .jobs
            .get(&selector.job_name)
            .ok_or_else(|| WorkspaceError::JobNotFound {
                repository: repository.name.clone(),
                job: selector.job_name.clone(),
            })?;

        if let Some(ops) = &selector.op_selection {
            if let Some(missing) = ops.iter().find(|op| !snapshot.op_names.contains(*op)) {
                return Err(WorkspaceError::InvalidSelection {
                    job: snapshot.name.clone(),
                    reason: format!("op '{missing}' does not exist"),
                });
            }
        }
        if let Some(assets) = &selector.asset_selection {
            if let Some(missing) = assets.iter().find(|key| !snapshot.asset_keys.contains(*key)) {
                return Err(WorkspaceError::InvalidSelection {
                    job: snapshot.name.clone(),
                    reason: format!("asset '{missing}' does not exist"),
                });
            }
        }

        Ok(RemoteJob {
            origin: RemoteJobOrigin::new(&self.name, &repository.name, &snapshot.name),
            snapshot: snapshot.clone(),
            op_selection: selector.op_selection.clone(),
            asset_selection: selector.asset_selection.clone(),
        })
    }
}

/// Source of code locations.
pub trait Workspace: Send + Sync {
    fn get_code_location(&self, name: &str) -> Result<Arc<CodeLocation>, WorkspaceError>;
}

impl<W> Workspace for Arc<W>
where
    W: Workspace + ?Sized,
{
    fn get_code_location(&self, name: &str) -> Result<Arc<CodeLocation>, WorkspaceError> {
        (**self).get_code_location(name)
    }
}

/// In-memory workspace for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    locations: RwLock<HashMap<String, Arc<CodeLocation>>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a code location.
    pub fn add_location(&self, location: CodeLocation) -> Result<(), WorkspaceError> {
        let mut locations = self
            .locations
            .write()
            .map_err(|_| WorkspaceError::Unavailable("lock poisoned".to_string()))?;
        locations.insert(location.name.clone(), Arc::new(location));
        Ok(())
    }

    pub fn remove_location(&self, name: &str) -> Result<Option<Arc<CodeLocation>>, WorkspaceError> {
        let mut locations = self
            .locations
            .write()
            .map_err(|_| WorkspaceError::Unavailable("lock poisoned".to_string()))?;
        Ok(locations.remove(name))
    }
}

impl Workspace for InMemoryWorkspace {
    fn get_code_location(&self, name: &str) -> Result<Arc<CodeLocation>, WorkspaceError> {
        let locations = self
            .locations
            .read()
            .map_err(|_| WorkspaceError::Unavailable("lock poisoned".to_string()))?;
        locations
            .get(name)
            .cloned()
            .ok_or_else(|| WorkspaceError::CodeLocationNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> CodeLocation {
        CodeLocation::new("loc").with_repository(
            RepositorySnapshot::new("repo").with_job(
                JobSnapshot::new("etl")
                    .with_ops(["extract", "load"])
                    .with_assets([AssetKey::new(["orders"]).unwrap()]),
            ),
        )
    }

    fn selector(job: &str) -> JobSubsetSelector {
        JobSubsetSelector {
            location_name: "loc".into(),
            repository_name: "repo".into(),
            job_name: job.into(),
            op_selection: None,
            asset_selection: None,
        }
    }

    #[test]
    fn resolves_job_with_origin() {
        let job = location().get_job(&selector("etl")).unwrap();
        assert_eq!(job.origin, RemoteJobOrigin::new("loc", "repo", "etl"));
        assert_eq!(job.name(), "etl");
    }

    #[test]
    fn missing_job_and_repository() {
        let loc = location();
        assert!(matches!(
            loc.get_job(&selector("gone")),
            Err(WorkspaceError::JobNotFound { .. })
        ));
        assert!(!loc.has_repository("other"));
        assert!(matches!(
            loc.get_repository("other"),
            Err(WorkspaceError::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn selections_are_validated() {
        let loc = location();
        let mut sel = selector("etl");
        sel.op_selection = Some(vec!["extract".into()]);
        assert!(loc.get_job(&sel).is_ok());

        sel.op_selection = Some(vec!["transform".into()]);
        assert!(matches!(
            loc.get_job(&sel),
            Err(WorkspaceError::InvalidSelection { .. })
        ));

        sel.op_selection = None;
        sel.asset_selection = Some(BTreeSet::from([AssetKey::new(["users"]).unwrap()]));
        assert!(matches!(
            loc.get_job(&sel),
            Err(WorkspaceError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn in_memory_workspace_add_and_remove() {
        let workspace = InMemoryWorkspace::new();
        workspace.add_location(location()).unwrap();
        assert!(workspace.get_code_location("loc").is_ok());

        workspace.remove_location("loc").unwrap();
        assert_eq!(
            workspace.get_code_location("loc"),
            Err(WorkspaceError::CodeLocationNotFound("loc".into()))
        );
    }
}
