// Materialized job steps. The workflow's declarative `Step` entries become
// `JobStep`s with ids, display names, effective timeouts, and a resolved
// execution kind, in declaration order.

use crate::workflow::{ActionRef, Job, WorkflowError};
use flowrun_common::constants::DEFAULT_STEP_TIMEOUT_MINUTES;
use std::collections::HashMap;
use std::time::Duration;

/// How a step executes.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// An inline `run:` script.
    Script {
        script: String,
        shell: Option<String>,
        working_directory: Option<String>,
    },
    /// A `uses:` reference to a built-in action.
    Action {
        reference: ActionRef,
        inputs: HashMap<String, String>,
    },
}

/// A step ready for execution.
#[derive(Debug, Clone)]
pub struct JobStep {
    pub id: String,
    pub display_name: String,
    /// The raw `if:` expression; empty means the default `success()` gate.
    pub condition: String,
    pub timeout: Duration,
    pub continue_on_error: bool,
    pub env: HashMap<String, String>,
    pub kind: StepKind,
}

/// Build the ordered step list for a job.
pub fn build_step_list(job: &Job) -> Result<Vec<JobStep>, WorkflowError> {
    let mut steps = Vec::with_capacity(job.steps.len());

    for (index, step) in job.steps.iter().enumerate() {
        let number = index + 1;

        let kind = match (&step.uses, &step.run) {
            (Some(uses), None) => StepKind::Action {
                reference: ActionRef::parse(uses)?,
                inputs: step.inputs(),
            },
            (None, Some(run)) => StepKind::Script {
                script: run.clone(),
                shell: step.shell.clone(),
                working_directory: step.working_directory.clone(),
            },
            _ => {
                return Err(WorkflowError::Validation(format!(
                    "step {} must declare exactly one of 'uses' and 'run'",
                    number
                )));
            }
        };

        let id = step
            .id
            .clone()
            .unwrap_or_else(|| format!("__step_{}", number));

        let display_name = step.name.clone().unwrap_or_else(|| match &kind {
            StepKind::Action { reference, .. } => format!("Run {}", reference.slug()),
            StepKind::Script { script, .. } => {
                format!("Run {}", first_line(script))
            }
        });

        let timeout_minutes = step
            .timeout_minutes
            .or(job.timeout_minutes)
            .unwrap_or(DEFAULT_STEP_TIMEOUT_MINUTES);

        steps.push(JobStep {
            id,
            display_name,
            condition: step.condition.clone().unwrap_or_default(),
            timeout: Duration::from_secs(u64::from(timeout_minutes) * 60),
            continue_on_error: step.continue_on_error,
            env: step.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            kind,
        });
    }

    Ok(steps)
}

fn first_line(script: &str) -> &str {
    script.lines().next().unwrap_or("").trim()
}
