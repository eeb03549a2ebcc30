mod job;
mod state;

pub use job::{Job, StepRecord};
pub use state::{JobState, StateMachine};
