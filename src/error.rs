use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::JobState;
use crate::step::ValidationError;

#[derive(Debug, Error)]
pub enum WfeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Workflow not registered: {0}")]
    WorkflowNotFound(String),

    #[error("Step not registered: {0}")]
    StepNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {0} has no current step. Is '__start__' registered?")]
    NoCurrentStep(Uuid),

    #[error("Step '{step}' does not accept external input")]
    InputNotAccepted { step: String },

    #[error("Wrong job state: expected {expected}, found {actual}")]
    InvalidState { expected: JobState, actual: JobState },

    #[error("Illegal state transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Step '{step}' failed during {phase}: {message}")]
    StepFault {
        step: String,
        phase: StepPhase,
        message: String,
    },

    #[error("Step '{step}' chose unknown transition '{transition}'")]
    UnknownTransition { step: String, transition: String },

    #[error("Job {id} is {state} and cannot be executed again")]
    JobTerminal { id: Uuid, state: JobState },

    #[error("Job {0} is already being processed")]
    JobBusy(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl WfeError {
    /// Whether the error originates from a step or from the workflow graph,
    /// as opposed to storage or the caller. Only these mark a job FAILED.
    pub fn is_step_fault(&self) -> bool {
        matches!(
            self,
            WfeError::StepFault { .. }
                | WfeError::UnknownTransition { .. }
                | WfeError::StepNotFound(_)
                | WfeError::WorkflowNotFound(_)
                | WfeError::NoCurrentStep(_)
        )
    }
}

/// The step method a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StepPhase {
    Execute,
    Transition,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepPhase::Execute => write!(f, "execute()"),
            StepPhase::Transition => write!(f, "transition()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_fault_display() {
        let err = WfeError::StepFault {
            step: "demo.Draft".into(),
            phase: StepPhase::Execute,
            message: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'demo.Draft' failed during execute(): boom"
        );
        assert!(err.is_step_fault());
    }

    #[test]
    fn caller_errors_are_not_step_faults() {
        let err = WfeError::InvalidState {
            expected: JobState::InputRequired,
            actual: JobState::Ongoing,
        };
        assert_eq!(
            err.to_string(),
            "Wrong job state: expected INPUT_REQUIRED, found ONGOING"
        );
        assert!(!err.is_step_fault());
        assert!(!WfeError::JobBusy(Uuid::nil()).is_step_fault());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WfeError>();
    }
}
