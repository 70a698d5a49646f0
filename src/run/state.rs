use std::fmt;

use serde::{Deserialize, Serialize};

/// States a run moves through while being solved, ending in one of two
/// terminal outcomes. Serialized as the snake_case strings the rest of the
/// platform stores and displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    New,
    Queued,
    SpawningWorker,
    PreprocessingData,
    GeneratingMatrix,
    FindingSolution,
    Postprocessing,
    Succeeded,
    Failed,
}

impl RunState {
    pub const ALL: [Self; 9] = [
        Self::New,
        Self::Queued,
        Self::SpawningWorker,
        Self::PreprocessingData,
        Self::GeneratingMatrix,
        Self::FindingSolution,
        Self::Postprocessing,
        Self::Succeeded,
        Self::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::SpawningWorker => "spawning_worker",
            Self::PreprocessingData => "preprocessing_data",
            Self::GeneratingMatrix => "generating_matrix",
            Self::FindingSolution => "finding_solution",
            Self::Postprocessing => "postprocessing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Display name shown in run listings. Total over the enum.
    pub fn human_label(self) -> &'static str {
        match self {
            Self::New => "Created",
            Self::Queued => "Creating server",
            Self::SpawningWorker => "Preparing server",
            Self::PreprocessingData => "Pre-processing data",
            Self::GeneratingMatrix => "Generating matrix",
            Self::FindingSolution => "Finding solution",
            Self::Postprocessing => "Post-processing results",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Whether `next` is reachable from `self` in a single transition.
    ///
    /// The table is static: the skip edges into `generating_matrix` and from
    /// `finding_solution` straight to `succeeded` always exist, and whether
    /// they are traversed depends on the run's pre/post-processing flags.
    /// Execution may begin before the queue/worker phases, so the early
    /// states also have forward edges into the pipeline stages.
    pub fn can_transition_to(self, next: Self) -> bool {
        use RunState::{
            Failed, FindingSolution, GeneratingMatrix, New, Postprocessing, PreprocessingData,
            Queued, SpawningWorker, Succeeded,
        };

        matches!(
            (self, next),
            (New, Queued)
                | (New, PreprocessingData)
                | (New, GeneratingMatrix)
                | (New, Failed)
                | (Queued, SpawningWorker)
                | (Queued, PreprocessingData)
                | (Queued, GeneratingMatrix)
                | (Queued, Failed)
                | (SpawningWorker, PreprocessingData)
                | (SpawningWorker, GeneratingMatrix)
                | (SpawningWorker, Failed)
                | (PreprocessingData, GeneratingMatrix)
                | (PreprocessingData, Failed)
                | (GeneratingMatrix, FindingSolution)
                | (GeneratingMatrix, Failed)
                | (FindingSolution, Postprocessing)
                | (FindingSolution, Succeeded)
                | (FindingSolution, Failed)
                | (Postprocessing, Succeeded)
                | (Postprocessing, Failed)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
