//! Engine configuration loaded from `wfe.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! The `WFE_LOG_DIR` environment variable takes precedence over the file
//! for the log directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::WfeError;
use crate::registry::RegistryConfig;

pub const CONFIG_FILE: &str = "wfe.toml";
pub const LOG_DIR_ENV: &str = "WFE_LOG_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct WfeConfig {
    /// Directory holding one execution log per job.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory holding one JSON record per job.
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,

    /// Namespaces step identities may be registered under.
    #[serde(default = "default_sources")]
    pub step_sources: Vec<String>,

    /// Namespaces workflow identities may be registered under.
    #[serde(default = "default_sources")]
    pub workflow_sources: Vec<String>,

    /// Steps one `execute` call may complete before yielding. Unbounded if unset.
    #[serde(default)]
    pub max_steps_per_run: Option<usize>,

    /// Mirror captured step output to stdout as well as the job log.
    #[serde(default = "default_echo_step_output")]
    pub echo_step_output: bool,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".wfe/logs")
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from(".wfe/jobs")
}

fn default_sources() -> Vec<String> {
    vec!["wfe.demo".to_string()]
}

fn default_echo_step_output() -> bool {
    true
}

impl Default for WfeConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            jobs_dir: default_jobs_dir(),
            step_sources: default_sources(),
            workflow_sources: default_sources(),
            max_steps_per_run: None,
            echo_step_output: default_echo_step_output(),
        }
    }
}

impl WfeConfig {
    /// Loads the file at `path`, or defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, WfeError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<WfeConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.check()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(LOG_DIR_ENV)
            && !dir.is_empty()
        {
            self.log_dir = PathBuf::from(dir);
        }
    }

    fn check(&self) -> Result<(), WfeError> {
        if self.max_steps_per_run == Some(0) {
            return Err(WfeError::Config("max_steps_per_run must be at least 1".into()));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            step_sources: self.step_sources.clone(),
            workflow_sources: self.workflow_sources.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}
