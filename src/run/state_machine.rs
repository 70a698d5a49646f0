use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::RunState;
use super::RunId;

/// One immutable state change in a run's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub run_id: RunId,
    pub from_state: RunState,
    pub to_state: RunState,
    pub recorded_at: DateTime<Utc>,
}

impl Transition {
    pub fn is_final(&self) -> bool {
        self.to_state.is_final()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: RunState, to: RunState },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history for run {run_id} starts from '{found}', expected 'new'")]
    FirstTransitionNotFromNew { run_id: RunId, found: RunState },
    #[error(
        "history entry {index} starts from '{found}' but the previous entry ended at '{expected}'"
    )]
    BrokenChain {
        index: usize,
        expected: RunState,
        found: RunState,
    },
    #[error("history entry {index} records an invalid transition from '{from}' to '{to}'")]
    InvalidEdge {
        index: usize,
        from: RunState,
        to: RunState,
    },
    #[error("history entry {index} belongs to run {found}, expected run {expected}")]
    ForeignRun {
        index: usize,
        expected: RunId,
        found: RunId,
    },
}

/// Authoritative state machine for one run.
///
/// Holds the ordered, append-only transition history; the current state is
/// the last entry's `to_state`, or `new` before any transition exists.
/// Persistence is an external concern: callers serialize `history()` and
/// rebuild with [`RunStateMachine::from_history`], which re-validates the
/// whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStateMachine {
    run_id: RunId,
    transitions: Vec<Transition>,
}

impl RunStateMachine {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            transitions: Vec::new(),
        }
    }

    /// Rebuild a machine from a previously recorded history.
    pub fn from_history(run_id: RunId, history: Vec<Transition>) -> Result<Self, HistoryError> {
        let mut expected_from = RunState::New;
        for (index, transition) in history.iter().enumerate() {
            if transition.run_id != run_id {
                return Err(HistoryError::ForeignRun {
                    index,
                    expected: run_id,
                    found: transition.run_id,
                });
            }
            if index == 0 && transition.from_state != RunState::New {
                return Err(HistoryError::FirstTransitionNotFromNew {
                    run_id,
                    found: transition.from_state,
                });
            }
            if transition.from_state != expected_from {
                return Err(HistoryError::BrokenChain {
                    index,
                    expected: expected_from,
                    found: transition.from_state,
                });
            }
            if !transition.from_state.can_transition_to(transition.to_state) {
                return Err(HistoryError::InvalidEdge {
                    index,
                    from: transition.from_state,
                    to: transition.to_state,
                });
            }
            expected_from = transition.to_state;
        }
        Ok(Self {
            run_id,
            transitions: history,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn current_state(&self) -> RunState {
        self.transitions
            .last()
            .map(|transition| transition.to_state)
            .unwrap_or(RunState::New)
    }

    pub fn can_transition_to(&self, target: RunState) -> bool {
        self.current_state().can_transition_to(target)
    }

    /// Append a transition to `target`, or report why it is not allowed.
    /// Never a silent no-op: an unreachable target leaves the history
    /// untouched and returns the offending edge.
    pub fn transition_to(&mut self, target: RunState) -> Result<(), TransitionError> {
        let from = self.current_state();
        if !from.can_transition_to(target) {
            return Err(TransitionError::InvalidTransition { from, to: target });
        }
        self.transitions.push(Transition {
            run_id: self.run_id,
            from_state: from,
            to_state: target,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    /// Chronological, append-only transition history.
    pub fn history(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn last_transition(&self) -> Option<&Transition> {
        self.transitions.last()
    }

    pub fn is_final(&self) -> bool {
        self.current_state().is_final()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> RunStateMachine {
        RunStateMachine::new(RunId::new(7))
    }

    fn walk(machine: &mut RunStateMachine, states: &[RunState]) {
        for state in states {
            machine
                .transition_to(*state)
                .expect("transition should be allowed");
        }
    }

    #[test]
    fn starts_in_the_new_state_with_empty_history() {
        let machine = machine();
        assert_eq!(machine.current_state(), RunState::New);
        assert!(machine.history().is_empty());
        assert!(machine.last_transition().is_none());
        assert!(!machine.is_final());
    }

    #[test]
    fn records_a_full_clean_walk() {
        let mut machine = machine();
        walk(
            &mut machine,
            &[
                RunState::Queued,
                RunState::SpawningWorker,
                RunState::PreprocessingData,
                RunState::GeneratingMatrix,
                RunState::FindingSolution,
                RunState::Postprocessing,
                RunState::Succeeded,
            ],
        );

        assert_eq!(machine.current_state(), RunState::Succeeded);
        assert!(machine.is_final());
        assert_eq!(machine.history().len(), 7);
        assert_eq!(machine.history()[0].from_state, RunState::New);
        for pair in machine.history().windows(2) {
            assert_eq!(pair[0].to_state, pair[1].from_state);
        }
    }

    #[test]
    fn rejects_an_unreachable_target_and_leaves_state_unchanged() {
        let mut machine = machine();

        let error = machine
            .transition_to(RunState::Succeeded)
            .expect_err("new cannot jump straight to succeeded");

        assert_eq!(
            error,
            TransitionError::InvalidTransition {
                from: RunState::New,
                to: RunState::Succeeded,
            }
        );
        assert_eq!(machine.current_state(), RunState::New);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn terminal_states_accept_no_further_transitions() {
        let mut machine = machine();
        walk(
            &mut machine,
            &[
                RunState::GeneratingMatrix,
                RunState::FindingSolution,
                RunState::Succeeded,
            ],
        );

        for target in RunState::ALL {
            assert!(machine.transition_to(target).is_err());
        }
        assert_eq!(machine.current_state(), RunState::Succeeded);
        assert_eq!(machine.history().len(), 3);
    }

    #[test]
    fn transitions_carry_the_owning_run_id() {
        let mut machine = RunStateMachine::new(RunId::new(42));
        walk(&mut machine, &[RunState::Queued]);

        let transition = machine.last_transition().expect("one transition recorded");
        assert_eq!(transition.run_id, RunId::new(42));
        assert_eq!(transition.from_state, RunState::New);
        assert_eq!(transition.to_state, RunState::Queued);
    }

    #[test]
    fn from_history_replays_a_recorded_walk() {
        let mut original = machine();
        walk(
            &mut original,
            &[
                RunState::Queued,
                RunState::GeneratingMatrix,
                RunState::FindingSolution,
                RunState::Failed,
            ],
        );

        let replayed = RunStateMachine::from_history(RunId::new(7), original.history().to_vec())
            .expect("recorded history should replay");

        assert_eq!(replayed, original);
        assert_eq!(replayed.current_state(), RunState::Failed);
    }

    #[test]
    fn from_history_rejects_a_first_entry_not_from_new() {
        let transition = Transition {
            run_id: RunId::new(7),
            from_state: RunState::Queued,
            to_state: RunState::SpawningWorker,
            recorded_at: Utc::now(),
        };

        let error = RunStateMachine::from_history(RunId::new(7), vec![transition])
            .expect_err("history must start from new");
        assert_eq!(
            error,
            HistoryError::FirstTransitionNotFromNew {
                run_id: RunId::new(7),
                found: RunState::Queued,
            }
        );
    }

    #[test]
    fn from_history_rejects_a_broken_chain() {
        let now = Utc::now();
        let history = vec![
            Transition {
                run_id: RunId::new(7),
                from_state: RunState::New,
                to_state: RunState::Queued,
                recorded_at: now,
            },
            Transition {
                run_id: RunId::new(7),
                from_state: RunState::SpawningWorker,
                to_state: RunState::GeneratingMatrix,
                recorded_at: now,
            },
        ];

        let error = RunStateMachine::from_history(RunId::new(7), history)
            .expect_err("gap in the chain should be rejected");
        assert_eq!(
            error,
            HistoryError::BrokenChain {
                index: 1,
                expected: RunState::Queued,
                found: RunState::SpawningWorker,
            }
        );
    }

    #[test]
    fn from_history_rejects_an_invalid_edge() {
        let history = vec![Transition {
            run_id: RunId::new(7),
            from_state: RunState::New,
            to_state: RunState::Succeeded,
            recorded_at: Utc::now(),
        }];

        let error = RunStateMachine::from_history(RunId::new(7), history)
            .expect_err("edge outside the table should be rejected");
        assert_eq!(
            error,
            HistoryError::InvalidEdge {
                index: 0,
                from: RunState::New,
                to: RunState::Succeeded,
            }
        );
    }

    #[test]
    fn from_history_rejects_entries_from_another_run() {
        let history = vec![Transition {
            run_id: RunId::new(8),
            from_state: RunState::New,
            to_state: RunState::Queued,
            recorded_at: Utc::now(),
        }];

        let error = RunStateMachine::from_history(RunId::new(7), history)
            .expect_err("foreign transitions should be rejected");
        assert_eq!(
            error,
            HistoryError::ForeignRun {
                index: 0,
                expected: RunId::new(7),
                found: RunId::new(8),
            }
        );
    }

    #[test]
    fn transitions_round_trip_through_json() {
        let mut machine = machine();
        walk(&mut machine, &[RunState::Queued, RunState::GeneratingMatrix]);

        let encoded =
            serde_json::to_string(machine.history()).expect("history should serialize");
        let decoded: Vec<Transition> =
            serde_json::from_str(&encoded).expect("history should deserialize");

        assert_eq!(decoded, machine.history());
    }
}
