use std::sync::Arc;

use assetflow_runs::{Instance, RunStorage, Workspace};

use crate::config::DaemonConfig;

/// Long-lived handles a daemon process works with.
#[derive(Clone)]
pub struct WorkspaceProcessContext {
    pub instance: Arc<Instance>,
    workspace: Arc<dyn Workspace>,
}

impl WorkspaceProcessContext {
    pub fn new(instance: Arc<Instance>, workspace: Arc<dyn Workspace>) -> Self {
        Self {
            instance,
            workspace,
        }
    }

    /// Context whose instance applies `config`'s run retry settings.
    pub fn from_config(
        config: &DaemonConfig,
        storage: Arc<dyn RunStorage>,
        workspace: Arc<dyn Workspace>,
    ) -> Self {
        let instance = Instance::new(storage, config.run_retries.clone());
        Self::new(Arc::new(instance), workspace)
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Workspace view for one unit of work.
    pub fn create_request_context(&self) -> Arc<dyn Workspace> {
        Arc::clone(&self.workspace)
    }
}

impl core::fmt::Debug for WorkspaceProcessContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkspaceProcessContext")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
