//! Command line interface built on clap.
//!
//! [`Cli`] carries the global flags (`--config`, `-v`) and one [`Command`].

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use uuid::Uuid;
use wfe::config::CONFIG_FILE;

/// wfe: run resumable workflow jobs.
#[derive(Debug, Parser)]
#[command(name = "wfe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Increase log verbosity (-v info, -vv trace).
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a job for a workflow and runs it until it stops.
    Create {
        /// Workflow identity, e.g. `wfe.demo.Review`.
        workflow: String,

        /// Only create the job, do not run it.
        #[arg(long)]
        no_run: bool,
    },

    /// Runs one job, or every runnable job when no id is given.
    Run {
        job: Option<Uuid>,
    },

    /// Submits external input (a JSON object) to a waiting job and resumes it.
    Input {
        job: Uuid,

        /// JSON object, e.g. '{"comment": "ok", "approved": true}'.
        data: String,
    },

    /// Shows one job in full, or a summary of all jobs.
    Status {
        job: Option<Uuid>,
    },

    /// Prints a job's execution log.
    Log {
        job: Uuid,
    },

    /// Lists registered workflows and steps.
    Workflows,
}
