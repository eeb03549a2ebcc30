//! Steps: the units of work a workflow graph connects.
//!
//! A [`Step`] performs its work in [`Step::execute`] and then names the
//! outgoing edge to follow in [`Step::transition`]. Steps never see the
//! [`Job`](crate::state_machine::Job); the orchestrator persists everything
//! they return. Anything a step wants in the job's execution log goes through
//! the [`StepContext`] it is handed.

mod schema;

use std::fmt;
use std::io::{self, Write};

use anyhow::Result;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::log::LogCapture;

pub use schema::{FieldError, FieldKind, FieldSpec, InputSchema, ValidationError};

/// Name of the synthetic entry step every job starts at.
pub const START_STEP: &str = "__start__";

/// Identity the builtin start step is registered under.
pub const START_STEP_REF: &str = "wfe.steps.__start__";

/// Transition the start step always takes into the workflow's entry step.
pub const START_TRANSITION: &str = "default";

/// A single unit of work.
///
/// Only output written through the [`StepContext`] (`ctx.say`, `write!`)
/// reaches the job's execution log. Plain `println!`/`eprintln!` and
/// `tracing` events from step code go to the process streams and are not
/// captured. Errors and panics are always recorded in the log.
pub trait Step: Send {
    /// Performs the work and returns a serializable result.
    fn execute(&self, ctx: &mut StepContext<'_>, input: StepInput) -> Result<Value>;

    /// Chooses the outgoing transition, given the previous step's result.
    fn transition(&self, ctx: &mut StepContext<'_>, previous: Option<&Value>) -> Result<String>;

    /// Whether execution must pause until external input is provided.
    fn requires_input(&self) -> bool {
        false
    }

    /// Fields accepted as external input. Empty means none are accepted.
    fn input_schema(&self) -> InputSchema {
        InputSchema::default()
    }
}

/// Data handed to [`Step::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInput {
    /// Result of the previous step, `None` for the first step.
    pub previous: Option<Value>,
    /// Validated external input, present only for steps requiring input.
    pub external: Option<Map<String, Value>>,
}

impl StepInput {
    /// External input laid over the previous result.
    ///
    /// Object results keep their keys with external fields winning; any other
    /// previous value is kept under `"previous"`.
    pub fn merged(&self) -> Value {
        let mut merged = match &self.previous {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("previous".to_string(), other.clone());
                map
            }
        };
        if let Some(external) = &self.external {
            for (key, value) in external {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }
}

/// Per-invocation view a step gets of its job.
///
/// Writes go through the job's log capture, so anything a step prints with
/// [`StepContext::say`] or `write!` lands in the execution log.
pub struct StepContext<'a> {
    job_id: Uuid,
    step_index: usize,
    step_ref: &'a str,
    result: Option<&'a Value>,
    output: &'a mut LogCapture,
}

impl<'a> StepContext<'a> {
    pub fn new(
        job_id: Uuid,
        step_index: usize,
        step_ref: &'a str,
        output: &'a mut LogCapture,
    ) -> Self {
        Self {
            job_id,
            step_index,
            step_ref,
            result: None,
            output,
        }
    }

    /// Exposes the result `execute` produced, for use while choosing a transition.
    pub fn with_result(mut self, result: Option<&'a Value>) -> Self {
        self.result = result;
        self
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn step_ref(&self) -> &str {
        self.step_ref
    }

    /// This step's own persisted result. Only set during `transition`.
    pub fn result(&self) -> Option<&Value> {
        self.result
    }

    /// Writes one line of step output.
    pub fn say(&mut self, message: impl fmt::Display) -> io::Result<()> {
        writeln!(self.output, "{message}")
    }
}

impl Write for StepContext<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// The synthetic entry step. It does no work; its only edge leads into the
/// workflow's first real step.
#[derive(Debug, Default)]
pub struct StartStep;

impl Step for StartStep {
    fn execute(&self, _ctx: &mut StepContext<'_>, _input: StepInput) -> Result<Value> {
        Ok(Value::Null)
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok(START_TRANSITION.to_string())
    }
}

/// Last path segment of a step or workflow identity.
pub fn short_name(identity: &str) -> &str {
    identity.rsplit('.').next().unwrap_or(identity)
}
