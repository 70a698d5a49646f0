use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::pipeline::command::CommandFailure;
use crate::pipeline::PipelineError;
use crate::run::{Run, RunState};

use super::Solver;

/// Placeholder output of the stub solver. Nothing downstream reads the
/// solution contents, so the null device stands in for it.
pub const DRY_RUN_OUTPUT_PATH: &str = "/dev/null";

/// Stub solver for exercising the lifecycle without GLPK or CBC installed.
/// Walks the matrix and solve states with a synthetic delay and treats a
/// zero-length data file as a solver failure. The pre/post flags are
/// ignored.
pub struct DryRunSolver {
    delay: Duration,
}

impl DryRunSolver {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Solver for DryRunSolver {
    fn execute(
        &self,
        _model_path: &Path,
        data_path: &Path,
        run: &mut Run,
    ) -> Result<PathBuf, PipelineError> {
        let metadata = fs::metadata(data_path).map_err(|source| {
            PipelineError::Command(CommandFailure::Launch {
                command: String::from("dry-run-solver"),
                source,
            })
        })?;
        // Fails exactly like a real solver exiting non-zero, before any
        // state is entered.
        if metadata.len() == 0 {
            return Err(PipelineError::Command(CommandFailure::NonZeroExit {
                command: String::from("dry-run-solver"),
                exit_code: 1,
                captured_output: String::new(),
            }));
        }

        run.transition_to(RunState::GeneratingMatrix)?;
        thread::sleep(self.delay);
        run.transition_to(RunState::FindingSolution)?;

        Ok(PathBuf::from(DRY_RUN_OUTPUT_PATH))
    }
}
