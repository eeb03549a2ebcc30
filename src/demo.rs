//! Built-in example definitions registered by the CLI under `wfe.demo`.
//!
//! `wfe.demo.Review` drafts a document, waits for a reviewer's verdict and
//! then publishes or archives it. `wfe.demo.Hello` is a two-step linear flow
//! that never pauses.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::{Value, json};

use crate::registry::Registry;
use crate::step::{FieldKind, InputSchema, Step, StepContext, StepInput};
use crate::workflow::WorkflowGraph;

pub const DEMO_SOURCE: &str = "wfe.demo";

#[derive(Debug, Default)]
pub struct Draft;

impl Step for Draft {
    fn execute(&self, ctx: &mut StepContext<'_>, _input: StepInput) -> Result<Value> {
        let title = format!("Report {}", &ctx.job_id().simple().to_string()[..8]);
        ctx.say(format_args!("drafted '{title}'"))?;
        Ok(json!({
            "title": title,
            "body": "Quarterly numbers look fine.",
            "drafted_at": Utc::now().to_rfc3339(),
        }))
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok("next".into())
    }
}

/// Pauses until a reviewer submits `{comment, approved}`.
#[derive(Debug, Default)]
pub struct Review;

impl Step for Review {
    fn execute(&self, ctx: &mut StepContext<'_>, input: StepInput) -> Result<Value> {
        let verdict = input.merged();
        let approved = verdict["approved"].as_bool().context("review verdict missing 'approved'")?;
        ctx.say(format_args!(
            "review {}: {}",
            if approved { "approved" } else { "rejected" },
            verdict["comment"]
        ))?;
        Ok(verdict)
    }

    fn transition(&self, ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        match ctx.result().and_then(|r| r["approved"].as_bool()) {
            Some(true) => Ok("approve".into()),
            Some(false) => Ok("reject".into()),
            None => bail!("no verdict recorded for {} (#{})", ctx.step_ref(), ctx.step_index()),
        }
    }

    fn requires_input(&self) -> bool {
        true
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field("comment", FieldKind::String)
            .field("approved", FieldKind::Boolean)
    }
}

#[derive(Debug, Default)]
pub struct Publish;

impl Step for Publish {
    fn execute(&self, ctx: &mut StepContext<'_>, input: StepInput) -> Result<Value> {
        let title = input
            .previous
            .as_ref()
            .and_then(|p| p["title"].as_str())
            .context("nothing to publish")?
            .to_string();
        ctx.say(format_args!("published '{title}'"))?;
        Ok(json!({ "published": title }))
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok("done".into())
    }
}

#[derive(Debug, Default)]
pub struct Archive;

impl Step for Archive {
    fn execute(&self, _ctx: &mut StepContext<'_>, input: StepInput) -> Result<Value> {
        Ok(json!({
            "archived": true,
            "reason": input.previous.as_ref().map(|p| p["comment"].clone()).unwrap_or(Value::Null),
        }))
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok("done".into())
    }
}

#[derive(Debug, Default)]
pub struct Greet;

impl Step for Greet {
    fn execute(&self, ctx: &mut StepContext<'_>, _input: StepInput) -> Result<Value> {
        ctx.say("hello")?;
        Ok(json!("hello"))
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok("next".into())
    }
}

#[derive(Debug, Default)]
pub struct Farewell;

impl Step for Farewell {
    fn execute(&self, _ctx: &mut StepContext<'_>, input: StepInput) -> Result<Value> {
        let greeting = input.previous.as_ref().and_then(Value::as_str).unwrap_or("hi");
        Ok(json!(format!("{greeting}, and goodbye")))
    }

    fn transition(&self, _ctx: &mut StepContext<'_>, _previous: Option<&Value>) -> Result<String> {
        Ok("done".into())
    }
}

fn id(name: &str) -> String {
    format!("{DEMO_SOURCE}.{name}")
}

/// Registers the demo steps and workflows. Skipped with a warning if
/// `wfe.demo` is not a configured source.
pub fn register(registry: &mut Registry) {
    registry.register_step::<Draft>(DEMO_SOURCE, "Draft");
    registry.register_step::<Review>(DEMO_SOURCE, "Review");
    registry.register_step::<Publish>(DEMO_SOURCE, "Publish");
    registry.register_step::<Archive>(DEMO_SOURCE, "Archive");
    registry.register_step::<Greet>(DEMO_SOURCE, "Greet");
    registry.register_step::<Farewell>(DEMO_SOURCE, "Farewell");

    let review = WorkflowGraph::builder()
        .start(&id("Draft"))
        .edge(&id("Draft"), "next", &id("Review"))
        .edge(&id("Review"), "approve", &id("Publish"))
        .edge(&id("Review"), "reject", &id("Archive"))
        .terminal(&id("Publish"))
        .terminal(&id("Archive"))
        .build();
    registry.register_workflow(DEMO_SOURCE, "Review", review);

    let hello = WorkflowGraph::builder()
        .start(&id("Greet"))
        .edge(&id("Greet"), "next", &id("Farewell"))
        .build();
    registry.register_workflow(DEMO_SOURCE, "Hello", hello);
}
