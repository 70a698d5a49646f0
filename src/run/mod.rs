//! Run model and its lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::BlobHandle;

pub mod state;
pub mod state_machine;

pub use state::RunState;
pub use state_machine::{HistoryError, RunStateMachine, Transition, TransitionError};

/// Identifier assigned by the request layer that owns run records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(u64);

impl RunId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("post-processing can only be enabled when pre-processing is enabled")]
    PostProcessRequiresPreProcess,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Inputs for creating a run. Model and data keys reference blobs already
/// uploaded to the blob store by the request layer.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: RunId,
    pub model_key: String,
    pub data_key: String,
    pub pre_process: bool,
    pub post_process: bool,
}

/// One optimization job: the submitted model and data, the processing flags,
/// the artifacts staged so far, and the machine tracking its lifecycle.
#[derive(Debug, Clone)]
pub struct Run {
    id: RunId,
    model_key: String,
    data_key: String,
    pre_process: bool,
    post_process: bool,
    result_artifact: Option<BlobHandle>,
    csv_artifact: Option<BlobHandle>,
    log_artifact: Option<BlobHandle>,
    res_artifact: Option<BlobHandle>,
    machine: RunStateMachine,
}

impl Run {
    /// Create a fresh run in the `new` state. Post-processing consumes the
    /// preprocessed data file, so it cannot be enabled on its own.
    pub fn create(new_run: NewRun) -> Result<Self, ValidationError> {
        if new_run.post_process && !new_run.pre_process {
            return Err(ValidationError::PostProcessRequiresPreProcess);
        }
        let machine = RunStateMachine::new(new_run.id);
        Ok(Self {
            id: new_run.id,
            model_key: new_run.model_key,
            data_key: new_run.data_key,
            pre_process: new_run.pre_process,
            post_process: new_run.post_process,
            result_artifact: None,
            csv_artifact: None,
            log_artifact: None,
            res_artifact: None,
            machine,
        })
    }

    /// Rebuild a run from a previously recorded transition history.
    pub fn restore(new_run: NewRun, history: Vec<Transition>) -> Result<Self, RestoreError> {
        let mut run = Self::create(new_run)?;
        run.machine = RunStateMachine::from_history(run.id, history)?;
        Ok(run)
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn model_key(&self) -> &str {
        &self.model_key
    }

    pub fn data_key(&self) -> &str {
        &self.data_key
    }

    pub fn pre_process(&self) -> bool {
        self.pre_process
    }

    pub fn post_process(&self) -> bool {
        self.post_process
    }

    pub fn state(&self) -> RunState {
        self.machine.current_state()
    }

    pub fn can_transition_to(&self, target: RunState) -> bool {
        self.machine.can_transition_to(target)
    }

    pub fn transition_to(&mut self, target: RunState) -> Result<(), TransitionError> {
        self.machine.transition_to(target)
    }

    pub fn history(&self) -> &[Transition] {
        self.machine.history()
    }

    pub fn last_transition(&self) -> Option<&Transition> {
        self.machine.last_transition()
    }

    pub fn is_final(&self) -> bool {
        self.machine.is_final()
    }

    /// Wall-clock time from the first to the last transition. `None` until
    /// the run reaches a terminal state.
    pub fn solving_time(&self) -> Option<chrono::Duration> {
        let last = self.machine.last_transition()?;
        if !last.is_final() {
            return None;
        }
        let first = self.machine.history().first()?;
        Some(last.recorded_at - first.recorded_at)
    }

    /// A run is in progress once it has left `new` and until it reaches a
    /// terminal state.
    pub fn in_progress(&self) -> bool {
        self.machine
            .last_transition()
            .map(|transition| !transition.is_final())
            .unwrap_or(false)
    }

    pub fn can_be_queued(&self) -> bool {
        self.machine.can_transition_to(RunState::Queued)
    }

    pub fn can_be_stopped(&self) -> bool {
        self.machine.can_transition_to(RunState::Failed)
    }

    /// Manual stop: marks the run failed from whatever state it is in.
    pub fn stop(&mut self) -> Result<(), TransitionError> {
        self.machine.transition_to(RunState::Failed)
    }

    pub fn result_artifact(&self) -> Option<&BlobHandle> {
        self.result_artifact.as_ref()
    }

    pub fn csv_artifact(&self) -> Option<&BlobHandle> {
        self.csv_artifact.as_ref()
    }

    pub fn log_artifact(&self) -> Option<&BlobHandle> {
        self.log_artifact.as_ref()
    }

    pub fn res_artifact(&self) -> Option<&BlobHandle> {
        self.res_artifact.as_ref()
    }

    pub fn attach_result(&mut self, handle: BlobHandle) {
        self.result_artifact = Some(handle);
    }

    pub fn attach_csv_results(&mut self, handle: BlobHandle) {
        self.csv_artifact = Some(handle);
    }

    pub fn attach_log(&mut self, handle: BlobHandle) {
        self.log_artifact = Some(handle);
    }

    pub fn attach_res_diagram(&mut self, handle: BlobHandle) {
        self.res_artifact = Some(handle);
    }
}
