use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use crate::compute::{InstanceSpec, ProvisionError, SharedWorkerProvisioner, WaitMode};
use crate::pipeline::command::{SharedCommandRunner, ShellCommandRunner};
use crate::pipeline::finalize::FinishHook;
use crate::pipeline::log::{write_pretty_json_with_newline, RunLog};
use crate::pipeline::scratch::ScratchPaths;
use crate::pipeline::solver::SolverKind;
use crate::pipeline::PipelineError;
use crate::run::{Run, RunId, RunState, Transition, TransitionError};
use crate::settings::SolveContext;
use crate::storage::SharedBlobStore;

/// Compute-instance request accompanying a solve.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub spec: InstanceSpec,
    pub wait: WaitMode,
}

/// What one pipeline execution produced. `pipeline_error` holds the abort
/// cause when the stages did not finish; `final_state` is what the finish
/// hook settled on either way.
#[derive(Debug)]
pub struct SolveReport {
    pub final_state: RunState,
    pub pipeline_error: Option<PipelineError>,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: RunId,
    final_state: RunState,
    result_key: Option<&'a str>,
    log_key: Option<&'a str>,
    csv_key: Option<&'a str>,
    transitions: &'a [Transition],
}

/// Drives one run end-to-end: optional worker provisioning, blob downloads,
/// the solver's stages, result upload, then unconditional finalization.
///
/// Dispatch guarantees are the caller's: at most one in-flight execution
/// per run, and zero retries. Nothing here retries anything.
pub struct SolvePipeline {
    ctx: SolveContext,
    solver_kind: SolverKind,
    blob_store: SharedBlobStore,
    provisioner: Option<SharedWorkerProvisioner>,
    runner_override: Option<SharedCommandRunner>,
}

impl SolvePipeline {
    pub fn new(ctx: SolveContext, solver_kind: SolverKind, blob_store: SharedBlobStore) -> Self {
        Self {
            ctx,
            solver_kind,
            blob_store,
            provisioner: None,
            runner_override: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: SharedWorkerProvisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Replace the shell runner, so tests can intercept every tool
    /// invocation.
    pub fn with_command_runner(mut self, runner: SharedCommandRunner) -> Self {
        self.runner_override = Some(runner);
        self
    }

    /// Execute the pipeline for `run` and settle its terminal state. A
    /// stage failure aborts the remaining stages but still reaches the
    /// finish hook; only an unreachable terminal transition escapes as an
    /// error.
    pub fn execute(
        &self,
        run: &mut Run,
        worker: Option<&WorkerRequest>,
    ) -> Result<SolveReport, TransitionError> {
        let paths = ScratchPaths::for_run(self.ctx.scratch_root.as_path(), run.id());

        let outcome = self.run_pipeline(run, worker, &paths);
        if let Err(ref pipeline_error) = outcome {
            error!(run_id = %run.id(), error = %pipeline_error, "solve pipeline aborted");
        }

        let hook = FinishHook::new(Arc::clone(&self.blob_store));
        let final_state = hook.call(run, paths.log_file().as_path(), outcome.as_ref().err())?;

        let (output_path, pipeline_error) = match outcome {
            Ok(path) => (Some(path), None),
            Err(pipeline_error) => (None, Some(pipeline_error)),
        };

        self.write_summary(run, final_state, &paths);

        Ok(SolveReport {
            final_state,
            pipeline_error,
            output_path,
        })
    }

    fn run_pipeline(
        &self,
        run: &mut Run,
        worker: Option<&WorkerRequest>,
        paths: &ScratchPaths,
    ) -> Result<PathBuf, PipelineError> {
        paths.ensure_dirs().map_err(|error| PipelineError::Scratch {
            path: paths.dir().display().to_string(),
            message: error.to_string(),
        })?;
        let log =
            RunLog::to_file(paths.log_file().as_path()).map_err(|error| PipelineError::Log {
                path: paths.log_file().display().to_string(),
                message: error.to_string(),
            })?;

        if let Some(request) = worker {
            run.transition_to(RunState::SpawningWorker)?;
            let provisioner = self
                .provisioner
                .as_ref()
                .ok_or(ProvisionError::NotConfigured)?;
            log.info(format!("Requesting a {} worker", request.spec.instance_type).as_str());
            let address = provisioner.request_worker(run.id(), &request.spec, request.wait)?;
            if let Some(address) = address {
                log.info(format!("Worker running at {address}").as_str());
            }
        }

        log.info("Downloading input files...");
        log.info("Downloading model file...");
        self.blob_store
            .download(run.model_key(), paths.model_file().as_path())?;
        log.info("Downloading data file...");
        self.blob_store
            .download(run.data_key(), paths.data_file().as_path())?;

        let runner = self
            .runner_override
            .clone()
            .unwrap_or_else(|| Arc::new(ShellCommandRunner::new(log.clone())));
        let solver =
            self.solver_kind
                .build(&self.ctx, Arc::clone(&self.blob_store), runner, log.clone());
        let output = solver.execute(
            paths.model_file().as_path(),
            paths.data_file().as_path(),
            run,
        )?;

        log.info("Uploading the output file");
        let handle = self.blob_store.upload(output.as_path())?;
        run.attach_result(handle);

        Ok(output)
    }

    /// Best effort: the summary never decides the run's outcome.
    fn write_summary(&self, run: &Run, final_state: RunState, paths: &ScratchPaths) {
        let summary = RunSummary {
            run_id: run.id(),
            final_state,
            result_key: run.result_artifact().map(|handle| handle.key.as_str()),
            log_key: run.log_artifact().map(|handle| handle.key.as_str()),
            csv_key: run.csv_artifact().map(|handle| handle.key.as_str()),
            transitions: run.history(),
        };
        if let Err(error) =
            write_pretty_json_with_newline(paths.summary_file().as_path(), &summary)
        {
            warn!(run_id = %run.id(), error = %error, "failed to write the run summary");
        }
    }
}
