//! Terminal output: spinners and colored job summaries.
//!
//! Uses `indicatif` for the progress spinner and `console` for styling.
//! [`JobProgress`] follows one job run in the terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use wfe::{Job, JobState, Registry, RunOutcome};

/// Spinner shown while a job runs, replaced by a colored outcome line.
pub struct JobProgress {
    pb: ProgressBar,
    label: String,
}

impl JobProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("RUNNING: {label}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            label: label.to_string(),
        }
    }

    pub fn complete(&self, outcome: &RunOutcome) {
        self.pb.finish_and_clear();
        println!("{}", outcome_line(&self.label, outcome));
    }

    pub fn abort(&self, error: &dyn std::fmt::Display) {
        self.pb.finish_and_clear();
        println!("  {} {}: {error}", Style::new().red().bold().apply_to("✗"), self.label);
    }
}

fn state_style(state: JobState) -> Style {
    match state {
        JobState::Finished => Style::new().green().bold(),
        JobState::Failed => Style::new().red().bold(),
        JobState::InputRequired => Style::new().yellow().bold(),
        JobState::Pending | JobState::Ongoing | JobState::InputReceived => Style::new().cyan(),
    }
}

pub fn outcome_line(label: &str, outcome: &RunOutcome) -> String {
    let style = state_style(outcome.state());
    let (mark, text) = match outcome {
        RunOutcome::Finished => ("✓", "finished".to_string()),
        RunOutcome::InputRequired => ("⏸", "is waiting for input".to_string()),
        RunOutcome::Yielded => ("↻", "yielded, run again to continue".to_string()),
        RunOutcome::Failed(reason) => ("✗", format!("failed: {reason}")),
    };
    format!("  {} {label} {text}", style.apply_to(mark))
}

/// One line per job: id, state, position, workflow.
pub fn summary_line(job: &Job) -> String {
    format!(
        "{}  {:<14}  #{:<3} {:<28} {}",
        job.id,
        state_style(job.state).apply_to(job.state.to_string()),
        job.current_step_index,
        job.current_step_ref.as_deref().unwrap_or("-"),
        job.workflow_ref
    )
}

pub fn print_summary(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs yet.");
        return;
    }
    for job in jobs {
        println!("{}", summary_line(job));
    }
}

/// The full job record as pretty JSON under a state-colored header.
pub fn print_job(job: &Job) -> Result<(), serde_json::Error> {
    let style = state_style(job.state);
    println!("{}", style.apply_to(format!("─── Job {} ({}) ───", job.id, job.state)));
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}

pub fn print_registry(registry: &Registry) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("Workflows"));
    for workflow in registry.workflows() {
        println!("  {}", workflow.identity);
    }
    println!("{}", bold.apply_to("Steps"));
    for step in registry.steps() {
        println!("  {step}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn outcome_line_names_the_job() {
        console::set_colors_enabled(false);
        assert_eq!(outcome_line("job 1", &RunOutcome::Finished), "  ✓ job 1 finished");
        assert_eq!(
            outcome_line("job 1", &RunOutcome::Failed("boom".into())),
            "  ✗ job 1 failed: boom"
        );
    }

    #[test]
    fn summary_line_shows_position() {
        console::set_colors_enabled(false);
        let job = Job::new(
            "wfe.demo.Review".into(),
            Some("wfe.steps.__start__".into()),
            PathBuf::from("review.log"),
        );
        let line = summary_line(&job);
        assert!(line.starts_with(&job.id.to_string()));
        assert!(line.contains("PENDING"));
        assert!(line.contains("#0"));
        assert!(line.ends_with("wfe.demo.Review"));
    }
}
