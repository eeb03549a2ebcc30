use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::state::JobState;

/// What one step left behind: its result and, for input steps, the input it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_input: Option<Map<String, Value>>,
}

impl StepRecord {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            result: None,
            external_input: None,
        }
    }
}

/// One persisted, resumable execution of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub workflow_ref: String,
    pub current_step_ref: Option<String>,
    pub current_step_index: usize,
    pub storage: Vec<StepRecord>,
    pub state: JobState,
    pub log_file: PathBuf,
}

impl Job {
    pub fn new(workflow_ref: String, start_step: Option<String>, log_file: PathBuf) -> Self {
        Self::with_id(Uuid::new_v4(), workflow_ref, start_step, log_file)
    }

    pub fn with_id(
        id: Uuid,
        workflow_ref: String,
        start_step: Option<String>,
        log_file: PathBuf,
    ) -> Self {
        Self {
            id,
            workflow_ref,
            current_step_ref: start_step,
            current_step_index: 0,
            storage: Vec::new(),
            state: JobState::Pending,
            log_file,
        }
    }

    /// Result of the step before the current one.
    pub fn previous_result(&self) -> Option<&Value> {
        self.current_step_index
            .checked_sub(1)
            .and_then(|i| self.storage.get(i))
            .and_then(|r| r.result.as_ref())
    }

    /// External input collected for the current step, if any.
    pub fn current_external_input(&self) -> Option<&Map<String, Value>> {
        self.storage
            .get(self.current_step_index)
            .and_then(|r| r.external_input.as_ref())
    }

    /// Writes the current step's result, creating its record on first write.
    pub fn record_result(&mut self, step: &str, result: Value) {
        self.current_record(step).result = Some(result);
    }

    /// Writes external input for the current step, creating its record on first write.
    pub fn record_external_input(&mut self, step: &str, input: Map<String, Value>) {
        self.current_record(step).external_input = Some(input);
    }

    /// Number of records holding a result.
    pub fn completed_steps(&self) -> usize {
        self.storage.iter().filter(|r| r.result.is_some()).count()
    }

    fn current_record(&mut self, step: &str) -> &mut StepRecord {
        let index = self.current_step_index;
        // storage never runs ahead of the index, so this appends at most one record
        while self.storage.len() <= index {
            self.storage.push(StepRecord::new(step));
        }
        &mut self.storage[index]
    }
}
