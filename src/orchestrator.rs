use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashSet;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::WfeConfig;
use crate::error::{StepPhase, WfeError};
use crate::log::ExecutionLog;
use crate::registry::Registry;
use crate::state_machine::{Job, JobState, StateMachine};
use crate::step::{StepContext, StepInput};
use crate::store::JobStore;

/// How a single `execute` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A terminal step was reached.
    Finished,
    /// Waiting for external input on the current step.
    InputRequired,
    /// The per-call step budget ran out; call `execute` again to continue.
    Yielded,
    /// A step or graph fault stopped the job for good.
    Failed(String),
}

impl RunOutcome {
    /// The job state this outcome leaves behind.
    pub fn state(&self) -> JobState {
        match self {
            RunOutcome::Finished => JobState::Finished,
            RunOutcome::InputRequired => JobState::InputRequired,
            RunOutcome::Yielded => JobState::Ongoing,
            RunOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// Knobs for a single orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Steps one `execute` call may complete before yielding.
    pub max_steps_per_run: Option<usize>,
    /// Mirror captured step output onto stdout.
    pub echo_step_output: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps_per_run: None,
            echo_step_output: true,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &WfeConfig) -> Self {
        Self {
            max_steps_per_run: config.max_steps_per_run,
            echo_step_output: config.echo_step_output,
        }
    }
}

/// Drives jobs through their workflow graphs, persisting after every move.
///
/// Within one orchestrator a job is processed by at most one call at a time;
/// a second concurrent `execute` or `provide_external_input` on the same job
/// fails with [`WfeError::JobBusy`]. Exclusion across processes sharing a
/// store is up to the caller.
pub struct JobOrchestrator {
    registry: Arc<Registry>,
    store: Arc<dyn JobStore>,
    options: RunOptions,
    in_flight: DashSet<Uuid>,
}

/// Marks a job in flight until dropped.
struct JobClaim<'a> {
    in_flight: &'a DashSet<Uuid>,
    id: Uuid,
}

impl Drop for JobClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl JobOrchestrator {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn JobStore>) -> Self {
        Self::with_options(registry, store, RunOptions::default())
    }

    pub fn with_options(
        registry: Arc<Registry>,
        store: Arc<dyn JobStore>,
        options: RunOptions,
    ) -> Self {
        Self {
            registry,
            store,
            options,
            in_flight: DashSet::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn job(&self, id: Uuid) -> Result<Job, WfeError> {
        self.store.load(id)
    }

    pub fn jobs(&self) -> Result<Vec<Job>, WfeError> {
        self.store.list()
    }

    /// Jobs `execute` can advance without new input.
    pub fn runnable_jobs(&self) -> Result<Vec<Job>, WfeError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|j| j.state.is_runnable())
            .collect())
    }

    pub fn log_of(&self, job: &Job) -> ExecutionLog {
        ExecutionLog::new(job.log_file.clone())
    }

    /// Creates and persists a PENDING job positioned at the start step.
    ///
    /// A registry without a start step is a configuration fault: the job is
    /// still created, without a current step, and fails on its first run.
    pub fn create_job(&self, workflow_ref: &str) -> Result<Job, WfeError> {
        let workflow = self.registry.workflow(workflow_ref)?;
        let start = self.registry.start_step_ref();
        if start.is_none() {
            tracing::warn!(
                workflow = workflow_ref,
                "start step '__start__' is not registered; job will fail when executed"
            );
        }

        let id = Uuid::new_v4();
        let log_file = ExecutionLog::path_for(&self.registry.config().log_dir, &workflow.name, id);
        let job = Job::with_id(id, workflow_ref.to_string(), start, log_file);
        self.store.save(&job)?;
        tracing::info!(job_id = %job.id, workflow = workflow_ref, "job created");
        Ok(job)
    }

    /// Creates a job and runs it straight away.
    pub fn order_job(&self, workflow_ref: &str) -> Result<(Job, RunOutcome), WfeError> {
        let job = self.create_job(workflow_ref)?;
        let outcome = self.execute(job.id)?;
        Ok((self.store.load(job.id)?, outcome))
    }

    /// Runs the job until it finishes, fails, needs input or exhausts its step budget.
    ///
    /// Finished and failed jobs are rejected. Step and graph faults mark the
    /// job FAILED and come back as [`RunOutcome::Failed`]; results already
    /// persisted are kept.
    pub fn execute(&self, id: Uuid) -> Result<RunOutcome, WfeError> {
        let _claim = self.claim(id)?;
        let mut job = self.store.load(id)?;
        if job.state.is_terminal() {
            return Err(WfeError::JobTerminal { id, state: job.state });
        }

        let log = self.log_of(&job);
        match self.run_next(&mut job, &log) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    step_index = job.current_step_index,
                    error = %e,
                    "job failed"
                );
                StateMachine::advance(&mut job, JobState::Failed)?;
                self.store.save(&job)?;
                if let Err(log_err) = log.append(&format!("---- WORKFLOW FAILED: {e} ----")) {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %log_err,
                        "could not record failure in job log"
                    );
                }
                if e.is_step_fault() {
                    Ok(RunOutcome::Failed(e.to_string()))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Records validated external input for the step the job is waiting on.
    ///
    /// Does not resume the job; see [`JobOrchestrator::submit_input`].
    pub fn provide_external_input(
        &self,
        id: Uuid,
        data: Map<String, Value>,
    ) -> Result<Job, WfeError> {
        let _claim = self.claim(id)?;
        let mut job = self.store.load(id)?;
        let step_ref = job.current_step_ref.clone().ok_or(WfeError::NoCurrentStep(id))?;
        let step = self.registry.step(&step_ref)?;

        let schema = step.input_schema();
        if schema.is_empty() {
            return Err(WfeError::InputNotAccepted { step: step_ref });
        }
        if job.state != JobState::InputRequired {
            return Err(WfeError::InvalidState {
                expected: JobState::InputRequired,
                actual: job.state,
            });
        }
        let input = schema.validate(&data)?;

        job.record_external_input(&step_ref, input);
        StateMachine::advance(&mut job, JobState::InputReceived)?;
        self.store.save(&job)?;

        let name = self.registry.step_name(&step_ref);
        let message = format!("Step #{} '{name}': input received", job.current_step_index);
        self.note(&job, &self.log_of(&job), message)?;
        Ok(job)
    }

    /// Provides input and resumes the job.
    pub fn submit_input(&self, id: Uuid, data: Map<String, Value>) -> Result<RunOutcome, WfeError> {
        self.provide_external_input(id, data)?;
        self.execute(id)
    }

    fn claim(&self, id: Uuid) -> Result<JobClaim<'_>, WfeError> {
        if !self.in_flight.insert(id) {
            return Err(WfeError::JobBusy(id));
        }
        Ok(JobClaim {
            in_flight: &self.in_flight,
            id,
        })
    }

    fn run_next(&self, job: &mut Job, log: &ExecutionLog) -> Result<RunOutcome, WfeError> {
        let workflow = self.registry.workflow(&job.workflow_ref)?;
        let graph = &workflow.graph;
        let mut completed = 0usize;

        loop {
            let step_ref = job.current_step_ref.clone().ok_or(WfeError::NoCurrentStep(job.id))?;
            let step = self.registry.step(&step_ref)?;
            let name = self.registry.step_name(&step_ref).to_string();
            let n = job.current_step_index;

            if self.registry.is_start_step(&step_ref) {
                let phase = StepPhase::Transition;
                let transition = self.invoke(job, log, &step_ref, None, phase, |ctx| {
                    step.transition(ctx, None)
                })?;
                let entry = resolve(graph.next(&step_ref, &transition), &step_ref, &transition)?;
                job.current_step_ref = Some(entry.clone());
                self.store.save(job)?;
                let message = format!("Workflow '{}': entering at '{entry}'", workflow.name);
                self.note(job, log, message)?;
                continue;
            }

            if step.requires_input() && job.state != JobState::InputReceived {
                StateMachine::advance(job, JobState::InputRequired)?;
                self.store.save(job)?;
                self.note(job, log, format!("Step #{n} '{name}': input required"))?;
                return Ok(RunOutcome::InputRequired);
            }

            self.note(job, log, format!("Step #{n} '{name}': processing started"))?;
            StateMachine::advance(job, JobState::Ongoing)?;
            self.store.save(job)?;

            let previous = job.previous_result().cloned();
            let external = if step.requires_input() {
                job.current_external_input().cloned()
            } else {
                None
            };

            self.note(job, log, format!("Step #{n} '{name}': performing execute():"))?;
            let input = StepInput {
                previous: previous.clone(),
                external,
            };
            let result = self.invoke(job, log, &step_ref, None, StepPhase::Execute, |ctx| {
                step.execute(ctx, input)
            })?;
            let message = format!(
                "Step #{n} '{name}': execution finished successfully with a result: {result}"
            );
            self.note(job, log, message)?;

            job.record_result(&step_ref, result);
            self.store.save(job)?;

            self.note(job, log, format!("Step #{n} '{name}': performing transition():"))?;
            let own_result = job.storage.get(n).and_then(|r| r.result.as_ref());
            let phase = StepPhase::Transition;
            let transition = self.invoke(job, log, &step_ref, own_result, phase, |ctx| {
                step.transition(ctx, previous.as_ref())
            })?;
            let message = format!(
                "Step #{n} '{name}': transition finished successfully with a result: {transition}"
            );
            self.note(job, log, message)?;

            if graph.is_terminal(&step_ref) {
                StateMachine::advance(job, JobState::Finished)?;
                self.store.save(job)?;
                self.note(job, log, "---- WORKFLOW FINISHED SUCCESSFULLY ----".to_string())?;
                return Ok(RunOutcome::Finished);
            }

            self.note(job, log, format!("Step #{n} '{name}': step finished"))?;
            let next = resolve(graph.next(&step_ref, &transition), &step_ref, &transition)?;
            job.current_step_ref = Some(next);
            job.current_step_index += 1;
            self.store.save(job)?;

            completed += 1;
            if let Some(budget) = self.options.max_steps_per_run
                && completed >= budget
            {
                self.note(job, log, format!("Step budget of {budget} exhausted, yielding"))?;
                return Ok(RunOutcome::Yielded);
            }
        }
    }

    /// Calls into step code with its output captured into the job log.
    /// Errors and panics are written to the log in full and become step faults.
    fn invoke<T>(
        &self,
        job: &Job,
        log: &ExecutionLog,
        step_ref: &str,
        own_result: Option<&Value>,
        phase: StepPhase,
        call: impl FnOnce(&mut StepContext<'_>) -> anyhow::Result<T>,
    ) -> Result<T, WfeError> {
        let outcome = {
            let mut capture = log.capture(self.options.echo_step_output)?;
            let mut ctx = StepContext::new(job.id, job.current_step_index, step_ref, &mut capture)
                .with_result(own_result);
            panic::catch_unwind(AssertUnwindSafe(|| call(&mut ctx)))
        };

        let (message, trace) = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => (format!("{e:#}"), format!("{e:?}")),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                (message.clone(), format!("panicked: {message}"))
            }
        };

        log.append_raw(&format!(
            "Fault in step #{} '{step_ref}' during {phase}:\n{trace}",
            job.current_step_index
        ))?;
        tracing::error!(job_id = %job.id, step = step_ref, %phase, error = %message, "step fault");
        Err(WfeError::StepFault {
            step: step_ref.to_string(),
            phase,
            message,
        })
    }

    fn note(&self, job: &Job, log: &ExecutionLog, message: String) -> Result<(), WfeError> {
        tracing::info!(job_id = %job.id, step_index = job.current_step_index, "{message}");
        log.append(&message)
    }
}

fn resolve(next: Option<&str>, step: &str, transition: &str) -> Result<String, WfeError> {
    next.map(str::to_string).ok_or_else(|| WfeError::UnknownTransition {
        step: step.to_string(),
        transition: transition.to_string(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
