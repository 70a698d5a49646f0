//! The solve pipeline: command execution, solver strategies, orchestration,
//! and finalization for one run.

pub mod command;
pub mod finalize;
pub mod log;
pub mod orchestrator;
pub mod res;
pub mod scratch;
pub mod solver;

use thiserror::Error;

use crate::compute::ProvisionError;
use crate::run::TransitionError;
use crate::storage::BlobStoreError;

use self::command::CommandFailure;

/// Everything that can abort a pipeline before the finish hook classifies
/// the run. Transition errors are fatal; all other variants abort the
/// remaining stages and leave classification to the hook.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Command(#[from] CommandFailure),
    #[error(transparent)]
    Storage(#[from] BlobStoreError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("failed to prepare scratch directory '{path}': {message}")]
    Scratch { path: String, message: String },
    #[error("failed to open run log '{path}': {message}")]
    Log { path: String, message: String },
}
