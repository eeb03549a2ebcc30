mod cli;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cli::{Cli, Command};
use ui::JobProgress;
use wfe::registry::WatchdogLease;
use wfe::{FileJobStore, JobOrchestrator, Registry, RunOptions, RunOutcome, WfeConfig, demo};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,wfe=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = WfeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let registry = populate_registry(&config)?;
    let store = FileJobStore::open(&config.jobs_dir)
        .with_context(|| format!("opening job store at {}", config.jobs_dir.display()))?;
    let orchestrator = Arc::new(JobOrchestrator::with_options(
        Arc::new(registry),
        Arc::new(store),
        RunOptions::from_config(&config),
    ));

    match cli.command {
        Command::Create { workflow, no_run } => {
            let job = orchestrator.create_job(&workflow)?;
            println!("Created job {} for {workflow}", job.id);
            if !no_run {
                run_one(&orchestrator, job.id, !config.echo_step_output)?;
            }
        }
        Command::Run { job: Some(id) } => {
            run_one(&orchestrator, id, !config.echo_step_output)?;
        }
        Command::Run { job: None } => run_all(orchestrator).await?,
        Command::Input { job, data } => {
            let data: Value = serde_json::from_str(&data).context("input is not valid JSON")?;
            let data = match data {
                Value::Object(map) => map,
                other => bail!("input must be a JSON object, got {other}"),
            };
            orchestrator.provide_external_input(job, data)?;
            println!("Input accepted for job {job}");
            run_one(&orchestrator, job, !config.echo_step_output)?;
        }
        Command::Status { job: Some(id) } => ui::print_job(&orchestrator.job(id)?)?,
        Command::Status { job: None } => ui::print_summary(&orchestrator.jobs()?),
        Command::Log { job } => {
            let job = orchestrator.job(job)?;
            print!("{}", orchestrator.log_of(&job).read()?);
        }
        Command::Workflows => ui::print_registry(orchestrator.registry()),
    }

    Ok(())
}

/// Builds the registry while holding the process-wide population lease.
fn populate_registry(config: &WfeConfig) -> Result<Registry> {
    let Some(_lease) = WatchdogLease::acquire() else {
        bail!("registry population is already in progress");
    };
    let mut registry = Registry::new(config.registry_config());
    demo::register(&mut registry);
    tracing::debug!(
        steps = registry.steps().len(),
        workflows = registry.workflows().len(),
        "registry populated"
    );
    Ok(registry)
}

fn run_one(orchestrator: &JobOrchestrator, id: Uuid, spinner: bool) -> Result<RunOutcome> {
    let label = format!("job {id}");
    let progress = spinner.then(|| JobProgress::start(&label));
    match orchestrator.execute(id) {
        Ok(outcome) => {
            match &progress {
                Some(p) => p.complete(&outcome),
                None => println!("{}", ui::outcome_line(&label, &outcome)),
            }
            Ok(outcome)
        }
        Err(e) => {
            if let Some(p) = &progress {
                p.abort(&e);
            }
            Err(e.into())
        }
    }
}

/// Executes every runnable job on the blocking pool, one task per job.
async fn run_all(orchestrator: Arc<JobOrchestrator>) -> Result<()> {
    let jobs = orchestrator.runnable_jobs()?;
    if jobs.is_empty() {
        println!("No runnable jobs.");
        return Ok(());
    }

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let orchestrator = Arc::clone(&orchestrator);
            let id = job.id;
            (id, tokio::task::spawn_blocking(move || orchestrator.execute(id)))
        })
        .collect();

    let mut failures = 0usize;
    for (id, handle) in handles {
        let label = format!("job {id}");
        match handle.await? {
            Ok(outcome) => {
                if matches!(outcome, RunOutcome::Failed(_)) {
                    failures += 1;
                }
                println!("{}", ui::outcome_line(&label, &outcome));
            }
            Err(e) => {
                failures += 1;
                tracing::error!(job_id = %id, error = %e, "job could not be run");
                println!("{}", ui::outcome_line(&label, &RunOutcome::Failed(e.to_string())));
            }
        }
    }

    if failures > 0 {
        bail!("{failures} job(s) failed");
    }
    Ok(())
}
