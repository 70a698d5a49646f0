use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::run::RunId;

/// Deterministic per-run scratch layout. Everything lives under
/// `<root>/run-<id>/`, so concurrent runs on one worker never share paths.
/// The names are an internal contract with the solver stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    dir: PathBuf,
}

impl ScratchPaths {
    pub fn for_run(scratch_root: &Path, run_id: RunId) -> Self {
        Self {
            dir: scratch_root.join(format!("run-{run_id}")),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    pub fn model_file(&self) -> PathBuf {
        self.dir.join("model.txt")
    }

    pub fn data_file(&self) -> PathBuf {
        self.dir.join("data.txt")
    }

    pub fn preprocessed_data_file(&self) -> PathBuf {
        self.dir.join("data.txt.pre")
    }

    pub fn matrix_file(&self) -> PathBuf {
        self.dir.join("input.lp")
    }

    pub fn solution_file(&self) -> PathBuf {
        self.dir.join("output.sol")
    }

    pub fn compressed_solution_file(&self) -> PathBuf {
        self.dir.join("output.sol.gz")
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.dir.join("csv")
    }

    pub fn csv_archive(&self) -> PathBuf {
        self.dir.join("csv.zip")
    }

    /// Base path handed to the RES renderer; the tool writes `<base>.pdf`.
    pub fn res_file(&self) -> PathBuf {
        self.dir.join("res")
    }

    pub fn res_pdf(&self) -> PathBuf {
        self.dir.join("res.pdf")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("solve.log")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.dir.as_path())?;
        fs::create_dir_all(self.csv_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_paths_live_under_the_run_directory() {
        let paths = ScratchPaths::for_run(Path::new("/tmp/gridsolve"), RunId::new(12));

        assert_eq!(paths.dir(), Path::new("/tmp/gridsolve/run-12"));
        for path in [
            paths.model_file(),
            paths.data_file(),
            paths.preprocessed_data_file(),
            paths.matrix_file(),
            paths.solution_file(),
            paths.compressed_solution_file(),
            paths.csv_dir(),
            paths.csv_archive(),
            paths.res_file(),
            paths.res_pdf(),
            paths.log_file(),
            paths.summary_file(),
        ] {
            assert!(path.starts_with(paths.dir()));
        }
    }

    #[test]
    fn distinct_run_ids_produce_disjoint_path_sets() {
        let root = Path::new("/tmp/gridsolve");
        let first = ScratchPaths::for_run(root, RunId::new(1));
        let second = ScratchPaths::for_run(root, RunId::new(2));

        let first_paths = [
            first.model_file(),
            first.data_file(),
            first.preprocessed_data_file(),
            first.matrix_file(),
            first.solution_file(),
            first.compressed_solution_file(),
            first.csv_archive(),
            first.log_file(),
        ];
        let second_paths = [
            second.model_file(),
            second.data_file(),
            second.preprocessed_data_file(),
            second.matrix_file(),
            second.solution_file(),
            second.compressed_solution_file(),
            second.csv_archive(),
            second.log_file(),
        ];

        for path in &first_paths {
            assert!(!second_paths.contains(path));
        }
    }

    #[test]
    fn the_compressed_solution_sits_next_to_the_raw_one() {
        let paths = ScratchPaths::for_run(Path::new("/scratch"), RunId::new(9));
        assert_eq!(
            paths.compressed_solution_file(),
            paths.solution_file().with_extension("sol.gz")
        );
    }
}
