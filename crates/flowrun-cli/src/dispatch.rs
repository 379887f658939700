// Workflow dispatch: decide which jobs a push event triggers, either as a dry
// run plan or by actually running them.

use anyhow::Result;
use flowrun_common::{RunResult, RunnerHome, TraceWriter};
use flowrun_engine::expressions::evaluate_condition;
use flowrun_engine::trigger::{evaluate_push_trigger, TriggerDecision};
use flowrun_engine::{contexts, JobOptions, JobRunner, PushEvent, Workflow};
use std::collections::HashMap;
use std::sync::Arc;

/// Why a job will or will not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDecision {
    Run,
    MissingLabels(Vec<String>),
    ConditionFalse(String),
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub job_id: String,
    pub display_name: String,
    pub decision: JobDecision,
}

/// The dry-run plan for one workflow and event.
#[derive(Debug, Clone)]
pub struct Plan {
    pub trigger: TriggerDecision,
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn runnable_jobs(&self) -> usize {
        if !self.trigger.is_run() {
            return 0;
        }
        self.entries
            .iter()
            .filter(|e| e.decision == JobDecision::Run)
            .count()
    }
}

/// Decide, without running anything, what this event would do.
pub fn plan(workflow: &Workflow, event: &PushEvent, labels: &[String]) -> Plan {
    let trigger = evaluate_push_trigger(workflow, event);

    let mut entries = Vec::new();
    for (job_id, job) in workflow.jobs.iter() {
        let decision = if !job.runs_on.satisfied_by(labels) {
            JobDecision::MissingLabels(job.runs_on.missing_labels(labels))
        } else {
            let condition = job.condition.as_deref().unwrap_or("");
            let github = contexts::GithubContext::for_push(workflow.display_name(), job_id, event);
            let runner = contexts::RunnerContext::new("plan", labels.to_vec());
            let context = contexts::build_expression_context(
                &github,
                &runner,
                &HashMap::new(),
                RunResult::Succeeded,
            );
            if evaluate_condition(condition, RunResult::Succeeded, false, &context) {
                JobDecision::Run
            } else {
                JobDecision::ConditionFalse(condition.to_string())
            }
        };

        entries.push(PlanEntry {
            job_id: job_id.to_string(),
            display_name: job.display_name(job_id).to_string(),
            decision,
        });
    }

    Plan { trigger, entries }
}

/// Render the plan the way `flowrun plan` prints it.
pub fn render_plan(plan: &Plan, workflow: &Workflow) -> String {
    let mut out = String::new();
    out.push_str(&format!("Workflow: {}\n", workflow.display_name()));

    match &plan.trigger {
        TriggerDecision::Skip(reason) => {
            out.push_str(&format!("Trigger: skipped ({})\n", reason));
            return out;
        }
        TriggerDecision::Run => out.push_str("Trigger: push matches\n"),
    }

    for entry in &plan.entries {
        let line = match &entry.decision {
            JobDecision::Run => format!("  {} [{}]: run", entry.job_id, entry.display_name),
            JobDecision::MissingLabels(missing) => format!(
                "  {} [{}]: skip (missing labels: {})",
                entry.job_id,
                entry.display_name,
                missing.join(", ")
            ),
            JobDecision::ConditionFalse(condition) => format!(
                "  {} [{}]: skip (if: {})",
                entry.job_id, entry.display_name, condition
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Run every triggered job in declaration order.
///
/// Returns the worst job outcome; skipped jobs do not affect it.
pub async fn run(
    workflow: &Workflow,
    event: &PushEvent,
    home: &RunnerHome,
    trace: Arc<dyn TraceWriter>,
    options: &JobOptions,
) -> Result<RunResult> {
    match evaluate_push_trigger(workflow, event) {
        TriggerDecision::Skip(reason) => {
            trace.info(&format!("Nothing to run: {}", reason));
            return Ok(RunResult::Skipped);
        }
        TriggerDecision::Run => {}
    }

    let runner = JobRunner::new(home.clone(), Arc::clone(&trace));
    let mut outcome = RunResult::Skipped;

    for (job_id, job) in workflow.jobs.iter() {
        if options.cancel_token.is_cancelled() {
            trace.info(&format!("Skipping job '{}' due to cancellation.", job_id));
            outcome = worst(outcome, RunResult::Canceled);
            continue;
        }

        let result = runner.run_job(workflow, job_id, job, event, options).await?;
        outcome = worst(outcome, result);
    }

    Ok(outcome)
}

/// Worst-of for job outcomes; `Skipped` never outranks a real result.
fn worst(current: RunResult, coming: RunResult) -> RunResult {
    match (current, coming) {
        (RunResult::Skipped, other) => other,
        (current, RunResult::Skipped) => current,
        (current, coming) if coming > current => coming,
        (current, _) => current,
    }
}
