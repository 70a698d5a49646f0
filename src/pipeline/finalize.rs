use std::path::Path;

use tracing::warn;

use crate::pipeline::PipelineError;
use crate::run::{Run, RunState, TransitionError};
use crate::storage::SharedBlobStore;

/// Runs once after every pipeline execution, clean or not, and settles the
/// run's terminal state. Presence of the staged result artifact is the
/// deciding signal; the pipeline's own outcome only corroborates it, and a
/// mismatch is logged.
pub struct FinishHook {
    blob_store: SharedBlobStore,
}

impl FinishHook {
    pub fn new(blob_store: SharedBlobStore) -> Self {
        Self { blob_store }
    }

    pub fn call(
        &self,
        run: &mut Run,
        log_path: &Path,
        pipeline_error: Option<&PipelineError>,
    ) -> Result<RunState, TransitionError> {
        let terminal = if run.result_artifact().is_some() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };

        match (terminal, pipeline_error) {
            (RunState::Succeeded, Some(error)) => {
                warn!(
                    run_id = %run.id(),
                    error = %error,
                    "result artifact staged although the pipeline reported an error"
                );
            }
            (RunState::Failed, None) => {
                warn!(
                    run_id = %run.id(),
                    "pipeline finished cleanly but no result artifact was staged"
                );
            }
            _ => {}
        }

        run.transition_to(terminal)?;
        self.stage_log_file(run, log_path);
        Ok(terminal)
    }

    /// Missing log file is not an error; a failing upload only warns.
    fn stage_log_file(&self, run: &mut Run, log_path: &Path) {
        if !log_path.is_file() {
            return;
        }
        match self.blob_store.upload(log_path) {
            Ok(handle) => run.attach_log(handle),
            Err(error) => {
                warn!(run_id = %run.id(), error = %error, "failed to stage the run log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::command::CommandFailure;
    use crate::run::{NewRun, RunId};
    use crate::storage::FsBlobStore;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(label: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("gridsolve_finish_{label}_{stamp}"))
    }

    fn hook(root: &Path) -> FinishHook {
        FinishHook::new(Arc::new(FsBlobStore::new(root)))
    }

    fn mid_pipeline_run() -> Run {
        let mut run = Run::create(NewRun {
            id: RunId::new(4),
            model_key: "blobs/model.txt".into(),
            data_key: "blobs/data.txt".into(),
            pre_process: false,
            post_process: false,
        })
        .expect("valid run");
        run.transition_to(RunState::GeneratingMatrix)
            .expect("stage entry allowed");
        run.transition_to(RunState::FindingSolution)
            .expect("solve entry allowed");
        run
    }

    fn command_error() -> PipelineError {
        PipelineError::Command(CommandFailure::NonZeroExit {
            command: String::from("cbc"),
            exit_code: 1,
            captured_output: String::new(),
        })
    }

    #[test]
    fn a_staged_result_artifact_means_success() {
        let root = temp_root("success");
        let mut run = mid_pipeline_run();
        run.attach_result(crate::storage::BlobHandle {
            key: "results/output.sol.gz".into(),
            filename: "output.sol.gz".into(),
        });

        let state = hook(root.as_path())
            .call(&mut run, root.join("absent.log").as_path(), None)
            .expect("terminal transition allowed");

        assert_eq!(state, RunState::Succeeded);
        assert_eq!(run.state(), RunState::Succeeded);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn a_missing_result_artifact_means_failure() {
        let root = temp_root("failure");
        let mut run = mid_pipeline_run();

        let state = hook(root.as_path())
            .call(
                &mut run,
                root.join("absent.log").as_path(),
                Some(&command_error()),
            )
            .expect("terminal transition allowed");

        assert_eq!(state, RunState::Failed);
        assert_eq!(run.state(), RunState::Failed);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn the_artifact_decides_even_when_the_pipeline_reported_an_error() {
        let root = temp_root("mismatch");
        let mut run = mid_pipeline_run();
        run.attach_result(crate::storage::BlobHandle {
            key: "results/output.sol.gz".into(),
            filename: "output.sol.gz".into(),
        });

        let state = hook(root.as_path())
            .call(
                &mut run,
                root.join("absent.log").as_path(),
                Some(&command_error()),
            )
            .expect("terminal transition allowed");

        assert_eq!(state, RunState::Succeeded);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn an_existing_log_file_is_staged_as_the_log_artifact() {
        let root = temp_root("log");
        let log_path = root.join("run-4/solve.log");
        fs::create_dir_all(log_path.parent().expect("log path has a parent"))
            .expect("scratch dir should create");
        fs::write(log_path.as_path(), b"Generating input file\n").expect("log should write");

        let mut run = mid_pipeline_run();
        hook(root.as_path())
            .call(&mut run, log_path.as_path(), None)
            .expect("terminal transition allowed");

        let handle = run.log_artifact().expect("log artifact staged");
        assert_eq!(handle.filename, "solve.log");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn a_missing_log_file_is_not_an_error() {
        let root = temp_root("nolog");
        let mut run = mid_pipeline_run();

        hook(root.as_path())
            .call(&mut run, root.join("never-written.log").as_path(), None)
            .expect("terminal transition allowed");

        assert!(run.log_artifact().is_none());

        let _ = fs::remove_dir_all(root);
    }
}
