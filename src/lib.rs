//! Resumable workflow job engine.
//!
//! Jobs walk a [`WorkflowGraph`] one [`Step`] at a time. After every move the
//! job is written to a [`JobStore`], so a run can stop at any point (crash,
//! step budget, or a step waiting for external input) and pick up exactly
//! where it left off. The [`JobOrchestrator`] drives this loop.

pub mod config;
pub mod demo;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod registry;
pub mod state_machine;
pub mod step;
pub mod store;
pub mod workflow;

pub use config::WfeConfig;
pub use error::WfeError;
pub use orchestrator::{JobOrchestrator, RunOptions, RunOutcome};
pub use registry::{Registry, RegistryConfig};
pub use state_machine::{Job, JobState};
pub use step::{Step, StepContext, StepInput};
pub use store::{FileJobStore, InMemoryJobStore, JobStore};
pub use workflow::WorkflowGraph;
