//! Worker-provisioner capability: requesting a dedicated compute instance
//! for a run. The core only needs the request seam; the concrete cloud
//! client lives behind it.

use std::sync::Arc;

use thiserror::Error;

use crate::run::RunId;

pub const DEFAULT_INSTANCE_TYPE: &str = "z1d.3xlarge";

/// Whether a request blocks until the instance reports running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    FireAndForget,
    UntilRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub instance_type: String,
}

impl Default for InstanceSpec {
    fn default() -> Self {
        Self {
            instance_type: String::from(DEFAULT_INSTANCE_TYPE),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("worker request for run {run_id} failed: {message}")]
    RequestFailed { run_id: RunId, message: String },
    #[error("worker for run {run_id} never became ready: {message}")]
    NeverReady { run_id: RunId, message: String },
    #[error("no worker provisioner is configured")]
    NotConfigured,
}

/// Requests one worker instance for one run. With
/// [`WaitMode::UntilRunning`] the call blocks until the instance is up and
/// returns its address; with [`WaitMode::FireAndForget`] it returns as soon
/// as the request is accepted, with no address.
pub trait WorkerProvisioner: Send + Sync + 'static {
    fn request_worker(
        &self,
        run_id: RunId,
        spec: &InstanceSpec,
        wait: WaitMode,
    ) -> Result<Option<String>, ProvisionError>;
}

pub type SharedWorkerProvisioner = Arc<dyn WorkerProvisioner>;
