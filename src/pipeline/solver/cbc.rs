use std::path::{Path, PathBuf};

use crate::pipeline::command::{path_arg, CommandSpec, SharedCommandRunner};
use crate::pipeline::log::RunLog;
use crate::pipeline::scratch::ScratchPaths;
use crate::pipeline::PipelineError;
use crate::run::{Run, RunState};
use crate::settings::SolveContext;
use crate::storage::SharedBlobStore;

use super::Solver;

/// One named step of the solve pipeline. A stage optionally enters a
/// lifecycle state, then runs its commands in order; the first failure
/// aborts every stage after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveStage {
    pub name: &'static str,
    pub log_line: &'static str,
    pub enters: Option<RunState>,
    pub commands: Vec<CommandSpec>,
}

/// Production solver: GLPK generates the matrix, CBC solves it, external
/// tools compress and post-process. The stage list is data, so the set of
/// steps for a given run is inspectable without executing anything.
pub struct CbcSolver {
    ctx: SolveContext,
    blob_store: SharedBlobStore,
    runner: SharedCommandRunner,
    log: RunLog,
}

impl CbcSolver {
    pub fn new(
        ctx: SolveContext,
        blob_store: SharedBlobStore,
        runner: SharedCommandRunner,
        log: RunLog,
    ) -> Self {
        Self {
            ctx,
            blob_store,
            runner,
            log,
        }
    }

    /// Ordered stage list for this run's flags. Preprocessing rewrites the
    /// data file, so the matrix stage reads `data.txt.pre` exactly when
    /// preprocessing is enabled.
    pub fn stage_plan(
        &self,
        run: &Run,
        paths: &ScratchPaths,
        model_path: &Path,
        data_path: &Path,
    ) -> Vec<SolveStage> {
        let matrix_input = if run.pre_process() {
            paths.preprocessed_data_file()
        } else {
            data_path.to_path_buf()
        };

        let mut stages = Vec::new();
        if run.pre_process() {
            stages.push(SolveStage {
                name: "preprocess",
                log_line: "Pre-processing data file",
                enters: Some(RunState::PreprocessingData),
                commands: vec![CommandSpec {
                    program: String::from("python3"),
                    args: vec![
                        path_arg(self.ctx.preprocess_script.as_path()),
                        path_arg(data_path),
                        path_arg(paths.preprocessed_data_file().as_path()),
                    ],
                }],
            });
        }
        stages.push(SolveStage {
            name: "generate_matrix",
            log_line: "Generating input file",
            enters: Some(RunState::GeneratingMatrix),
            commands: vec![CommandSpec {
                program: String::from("glpsol"),
                args: vec![
                    String::from("-m"),
                    path_arg(model_path),
                    String::from("-d"),
                    path_arg(matrix_input.as_path()),
                    String::from("--wlp"),
                    path_arg(paths.matrix_file().as_path()),
                ],
            }],
        });
        stages.push(SolveStage {
            name: "solve",
            log_line: "Solving the model",
            enters: Some(RunState::FindingSolution),
            commands: vec![CommandSpec {
                program: String::from("cbc"),
                args: vec![
                    path_arg(paths.matrix_file().as_path()),
                    String::from("solve"),
                    String::from("solu"),
                    path_arg(paths.solution_file().as_path()),
                ],
            }],
        });
        stages.push(SolveStage {
            name: "compress_solution",
            log_line: "Gzipping the output",
            enters: None,
            // --keep: the postprocess stage still reads the raw solution.
            commands: vec![CommandSpec {
                program: String::from("gzip"),
                args: vec![
                    String::from("--keep"),
                    String::from("--force"),
                    path_arg(paths.solution_file().as_path()),
                ],
            }],
        });
        if run.post_process() {
            stages.push(SolveStage {
                name: "postprocess",
                log_line: "Post-processing results",
                enters: Some(RunState::Postprocessing),
                commands: vec![
                    CommandSpec {
                        program: String::from("python3"),
                        args: vec![
                            path_arg(self.ctx.postprocess_script.as_path()),
                            path_arg(paths.preprocessed_data_file().as_path()),
                            path_arg(paths.solution_file().as_path()),
                            path_arg(paths.csv_dir().as_path()),
                        ],
                    },
                    CommandSpec {
                        program: String::from("zip"),
                        args: vec![
                            String::from("-r"),
                            path_arg(paths.csv_archive().as_path()),
                            path_arg(paths.csv_dir().as_path()),
                        ],
                    },
                ],
            });
        }
        stages
    }
}

impl Solver for CbcSolver {
    fn execute(
        &self,
        model_path: &Path,
        data_path: &Path,
        run: &mut Run,
    ) -> Result<PathBuf, PipelineError> {
        let paths = ScratchPaths::for_run(self.ctx.scratch_root.as_path(), run.id());
        paths.ensure_dirs().map_err(|error| PipelineError::Scratch {
            path: paths.dir().display().to_string(),
            message: error.to_string(),
        })?;

        let stages = self.stage_plan(run, &paths, model_path, data_path);
        for stage in &stages {
            if let Some(state) = stage.enters {
                run.transition_to(state)?;
            }
            self.log.info(stage.log_line);
            for command in &stage.commands {
                self.runner.run(command)?;
            }
        }

        if run.post_process() {
            let handle = self.blob_store.upload(paths.csv_archive().as_path())?;
            run.attach_csv_results(handle);
        }

        self.log.info("Model solved!");
        self.log.info("");
        self.log.info(format!("run_id: {}", run.id()).as_str());

        Ok(paths.compressed_solution_file())
    }
}
