use std::sync::Arc;

use crate::pipeline::command::{path_arg, CommandSpec, SharedCommandRunner, ShellCommandRunner};
use crate::pipeline::log::RunLog;
use crate::pipeline::scratch::ScratchPaths;
use crate::pipeline::PipelineError;
use crate::run::Run;
use crate::settings::SolveContext;
use crate::storage::{BlobHandle, SharedBlobStore};

/// Renders the reference-energy-system diagram for a run's data file and
/// stages it as the run's RES artifact. Runs independently of the solve
/// pipeline and never touches the state machine.
pub struct ResDiagramBuilder {
    ctx: SolveContext,
    blob_store: SharedBlobStore,
    runner_override: Option<SharedCommandRunner>,
}

impl ResDiagramBuilder {
    pub fn new(ctx: SolveContext, blob_store: SharedBlobStore) -> Self {
        Self {
            ctx,
            blob_store,
            runner_override: None,
        }
    }

    pub fn with_command_runner(mut self, runner: SharedCommandRunner) -> Self {
        self.runner_override = Some(runner);
        self
    }

    pub fn build(&self, run: &mut Run) -> Result<BlobHandle, PipelineError> {
        let paths = ScratchPaths::for_run(self.ctx.scratch_root.as_path(), run.id());
        paths.ensure_dirs().map_err(|error| PipelineError::Scratch {
            path: paths.dir().display().to_string(),
            message: error.to_string(),
        })?;
        let log =
            RunLog::to_file(paths.log_file().as_path()).map_err(|error| PipelineError::Log {
                path: paths.log_file().display().to_string(),
                message: error.to_string(),
            })?;

        log.info("Downloading data file...");
        self.blob_store
            .download(run.data_key(), paths.data_file().as_path())?;

        let runner = self
            .runner_override
            .clone()
            .unwrap_or_else(|| Arc::new(ShellCommandRunner::new(log.clone())));
        log.info("Generating the RES diagram");
        // The renderer writes `<base>.pdf` next to the base path it is given.
        runner.run(&CommandSpec {
            program: String::from("python3"),
            args: vec![
                path_arg(self.ctx.res_script.as_path()),
                path_arg(paths.data_file().as_path()),
                path_arg(paths.res_file().as_path()),
            ],
        })?;

        let handle = self.blob_store.upload(paths.res_pdf().as_path())?;
        run.attach_res_diagram(handle.clone());
        Ok(handle)
    }
}
