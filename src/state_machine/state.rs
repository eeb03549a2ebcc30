use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::Job;
use crate::error::WfeError;

/// Lifecycle states of a job.
///
/// PENDING → ONGOING → {INPUT_REQUIRED, FINISHED, FAILED}
/// INPUT_REQUIRED → INPUT_RECEIVED → ONGOING
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Ongoing,
    InputRequired,
    InputReceived,
    Failed,
    Finished,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Ongoing => write!(f, "ONGOING"),
            JobState::InputRequired => write!(f, "INPUT_REQUIRED"),
            JobState::InputReceived => write!(f, "INPUT_RECEIVED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Finished => write!(f, "FINISHED"),
        }
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Failed | JobState::Finished)
    }

    /// Whether `execute` can make progress from this state without new input.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            JobState::Pending | JobState::Ongoing | JobState::InputReceived
        )
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Failed | Finished, _) => false,
            (_, Failed) => true,
            (Pending, Ongoing | InputRequired) => true,
            (Ongoing, Ongoing | InputRequired | Finished) => true,
            (InputRequired, InputRequired | InputReceived) => true,
            (InputReceived, Ongoing) => true,
            _ => false,
        }
    }
}

/// Applies state changes to a job, refusing moves the lifecycle forbids.
pub struct StateMachine;

impl StateMachine {
    pub fn advance(job: &mut Job, next: JobState) -> Result<(), WfeError> {
        if !job.state.can_transition_to(next) {
            return Err(WfeError::IllegalTransition {
                from: job.state,
                to: next,
            });
        }
        job.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_job() -> Job {
        Job::new(
            "demo.Review".into(),
            Some("wfe.steps.__start__".into()),
            PathBuf::from("review.log"),
        )
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job();
        StateMachine::advance(&mut job, JobState::Ongoing).unwrap();
        StateMachine::advance(&mut job, JobState::Ongoing).unwrap();
        StateMachine::advance(&mut job, JobState::InputRequired).unwrap();
        StateMachine::advance(&mut job, JobState::InputReceived).unwrap();
        StateMachine::advance(&mut job, JobState::Ongoing).unwrap();
        StateMachine::advance(&mut job, JobState::Finished).unwrap();
        assert_eq!(job.state, JobState::Finished);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = make_job();
        StateMachine::advance(&mut job, JobState::Failed).unwrap();
        let err = StateMachine::advance(&mut job, JobState::Ongoing).unwrap_err();
        assert!(matches!(
            err,
            WfeError::IllegalTransition {
                from: JobState::Failed,
                to: JobState::Ongoing
            }
        ));
        assert!(StateMachine::advance(&mut job, JobState::Failed).is_err());
    }

    #[test]
    fn input_cannot_be_skipped() {
        let mut job = make_job();
        assert!(StateMachine::advance(&mut job, JobState::InputReceived).is_err());
        StateMachine::advance(&mut job, JobState::InputRequired).unwrap();
        assert!(StateMachine::advance(&mut job, JobState::Ongoing).is_err());
        assert!(StateMachine::advance(&mut job, JobState::Finished).is_err());
        assert_eq!(job.state, JobState::InputRequired);
    }

    #[test]
    fn any_live_state_can_fail() {
        for state in [
            JobState::Pending,
            JobState::Ongoing,
            JobState::InputRequired,
            JobState::InputReceived,
        ] {
            assert!(state.can_transition_to(JobState::Failed), "{state}");
        }
    }

    #[test]
    fn state_display_and_serde_agree() {
        for state in [
            JobState::Pending,
            JobState::Ongoing,
            JobState::InputRequired,
            JobState::InputReceived,
            JobState::Failed,
            JobState::Finished,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
