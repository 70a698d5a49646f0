use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::command::SharedCommandRunner;
use crate::pipeline::log::RunLog;
use crate::pipeline::PipelineError;
use crate::run::Run;
use crate::settings::SolveContext;
use crate::storage::SharedBlobStore;

pub mod cbc;
pub mod dry_run;

pub use cbc::CbcSolver;
pub use dry_run::DryRunSolver;

/// A solver strategy drives one run through its stage states and produces
/// the primary output artifact, returning its local path.
pub trait Solver {
    fn execute(
        &self,
        model_path: &Path,
        data_path: &Path,
        run: &mut Run,
    ) -> Result<PathBuf, PipelineError>;
}

/// Closed set of solver strategies. Callers pick one explicitly; nothing in
/// the pipeline consults ambient configuration for the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Cbc,
    DryRun,
}

impl SolverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cbc => "cbc",
            Self::DryRun => "dry_run",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cbc" => Some(Self::Cbc),
            "dry_run" | "dry-run" => Some(Self::DryRun),
            _ => None,
        }
    }

    pub fn build(
        self,
        ctx: &SolveContext,
        blob_store: SharedBlobStore,
        runner: SharedCommandRunner,
        log: RunLog,
    ) -> Box<dyn Solver> {
        match self {
            Self::Cbc => Box::new(CbcSolver::new(ctx.clone(), blob_store, runner, log)),
            Self::DryRun => Box::new(DryRunSolver::new(ctx.dry_run_delay)),
        }
    }
}
