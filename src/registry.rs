//! Identity-addressed catalogue of steps and workflows.
//!
//! Jobs only ever store identity strings (`<source>.<Name>`); the
//! orchestrator resolves them here on every run and gets a fresh step
//! instance each time. Registrations are accepted only from the sources
//! enumerated in [`RegistryConfig`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::WfeError;
use crate::step::{START_STEP, START_STEP_REF, StartStep, Step, short_name};
use crate::workflow::{WorkflowDefinition, WorkflowGraph};

/// Source namespace of the builtin steps.
pub const BUILTIN_STEP_SOURCE: &str = "wfe.steps";

pub type StepFactory = Box<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Where definitions may come from and where job logs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub step_sources: Vec<String>,
    pub workflow_sources: Vec<String>,
    pub log_dir: PathBuf,
}

struct StepEntry {
    name: String,
    factory: StepFactory,
}

pub struct Registry {
    config: RegistryConfig,
    steps: HashMap<String, StepEntry>,
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("steps", &self.steps())
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// A registry holding the builtin start step.
    pub fn new(config: RegistryConfig) -> Self {
        let mut registry = Self::empty(config);
        let identity = registry.insert_step(
            BUILTIN_STEP_SOURCE,
            START_STEP,
            Box::new(|| Box::new(StartStep) as Box<dyn Step>),
        );
        debug_assert_eq!(identity, START_STEP_REF);
        registry
    }

    /// A registry with nothing in it, not even the start step.
    pub fn empty(config: RegistryConfig) -> Self {
        Self {
            config,
            steps: HashMap::new(),
            workflows: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers a `Default`-constructible step as `<source>.<name>`.
    pub fn register_step<S>(&mut self, source: &str, name: &str) -> Option<String>
    where
        S: Step + Default + 'static,
    {
        self.register_step_with(source, name, Box::new(|| Box::new(S::default()) as Box<dyn Step>))
    }

    /// Registers a step factory as `<source>.<name>`. Returns the identity,
    /// or `None` if `source` is not a configured step source or the name is
    /// reserved for the builtin start step.
    pub fn register_step_with(
        &mut self,
        source: &str,
        name: &str,
        factory: StepFactory,
    ) -> Option<String> {
        if !self.config.step_sources.iter().any(|s| s == source) {
            tracing::warn!(source, step = name, "skipping step from unlisted source");
            return None;
        }
        if name == START_STEP && source != BUILTIN_STEP_SOURCE {
            tracing::warn!(source, step = name, "step name is reserved for the builtin start step");
            return None;
        }
        Some(self.insert_step(source, name, factory))
    }

    /// Registers a workflow as `<source>.<name>`. Returns the identity,
    /// or `None` if `source` is not a configured workflow source.
    pub fn register_workflow(
        &mut self,
        source: &str,
        name: &str,
        graph: WorkflowGraph,
    ) -> Option<String> {
        if !self.config.workflow_sources.iter().any(|s| s == source) {
            tracing::warn!(source, workflow = name, "skipping workflow from unlisted source");
            return None;
        }
        let identity = format!("{source}.{name}");
        let missing: Vec<&str> = graph
            .steps()
            .into_iter()
            .filter(|s| !self.steps.contains_key(*s))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                workflow = %identity,
                ?missing,
                "workflow references unregistered steps"
            );
        }
        tracing::debug!(workflow = %identity, "registered workflow");
        self.workflows.insert(
            identity.clone(),
            Arc::new(WorkflowDefinition::new(identity.clone(), name, graph)),
        );
        Some(identity)
    }

    fn insert_step(&mut self, source: &str, name: &str, factory: StepFactory) -> String {
        let identity = format!("{source}.{name}");
        if self.steps.contains_key(&identity) {
            tracing::debug!(step = %identity, "replacing step registration");
        }
        self.steps.insert(
            identity.clone(),
            StepEntry {
                name: name.to_string(),
                factory,
            },
        );
        identity
    }

    /// A fresh instance of the step registered under `identity`.
    pub fn step(&self, identity: &str) -> Result<Box<dyn Step>, WfeError> {
        self.steps
            .get(identity)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| WfeError::StepNotFound(identity.to_string()))
    }

    /// Display name of a step: its registered name, or the identity's last segment.
    pub fn step_name<'a>(&'a self, identity: &'a str) -> &'a str {
        self.steps
            .get(identity)
            .map(|entry| entry.name.as_str())
            .unwrap_or_else(|| short_name(identity))
    }

    pub fn workflow(&self, identity: &str) -> Result<Arc<WorkflowDefinition>, WfeError> {
        self.workflows
            .get(identity)
            .cloned()
            .ok_or_else(|| WfeError::WorkflowNotFound(identity.to_string()))
    }

    /// Identity of the builtin start step, if registered.
    pub fn start_step_ref(&self) -> Option<String> {
        self.steps
            .contains_key(START_STEP_REF)
            .then(|| START_STEP_REF.to_string())
    }

    pub fn is_start_step(&self, identity: &str) -> bool {
        identity == START_STEP_REF && self.steps.contains_key(identity)
    }

    /// Registered step identities, sorted.
    pub fn steps(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        steps.sort_unstable();
        steps
    }

    /// Registered workflows, sorted by identity.
    pub fn workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut workflows: Vec<_> = self.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.identity.cmp(&b.identity));
        workflows
    }
}

static WATCHDOG_RUNNING: AtomicBool = AtomicBool::new(false);

/// Process-wide claim on registry population. At most one lease exists at a
/// time; dropping it releases the claim.
#[derive(Debug)]
pub struct WatchdogLease {
    _private: (),
}

impl WatchdogLease {
    pub fn acquire() -> Option<Self> {
        WATCHDOG_RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { _private: () })
    }

    pub fn is_held() -> bool {
        WATCHDOG_RUNNING.load(Ordering::Acquire)
    }
}

impl Drop for WatchdogLease {
    fn drop(&mut self) {
        WATCHDOG_RUNNING.store(false, Ordering::Release);
    }
}
