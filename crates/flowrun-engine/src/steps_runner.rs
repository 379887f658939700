// Runs a job's steps in declaration order, evaluating `if:` conditions,
// enforcing per-step timeouts, and folding step outcomes into the job result.

use anyhow::Result;
use flowrun_common::{merge_run_results, RunResult};

use crate::execution_context::ExecutionContext;
use crate::expressions::evaluate_condition;
use crate::handlers::create_handler;
use crate::job_steps::JobStep;
use crate::step_host::StepHost;

pub struct StepsRunner;

impl StepsRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run all steps. Returns the merged job result.
    pub async fn run_async(
        &self,
        context: &mut ExecutionContext,
        steps: Vec<JobStep>,
        host: &dyn StepHost,
    ) -> Result<RunResult> {
        let cancel = context.cancel_token();
        let mut job_result: Option<RunResult> = None;

        for (index, step) in steps.into_iter().enumerate() {
            let step_number = (index + 1) as u32;

            let is_cancelled = cancel.is_cancelled();
            let status = if is_cancelled {
                RunResult::Canceled
            } else {
                job_result.unwrap_or(RunResult::Succeeded)
            };

            let expression_context = context.build_expression_context(status);
            let should_run =
                evaluate_condition(&step.condition, status, is_cancelled, &expression_context);

            if !should_run {
                if is_cancelled {
                    context.info(&format!(
                        "Skipping step '{}' due to job cancellation.",
                        step.display_name
                    ));
                } else {
                    context.info(&format!(
                        "Skipping step '{}' (condition evaluated to false).",
                        step.display_name
                    ));
                }
                continue;
            }

            context.info(&format!("Starting step: {}", step.display_name));
            if let Some(log) = context.job_log() {
                log.lock().begin_step(step_number, &step.display_name);
            }

            let mut step_context =
                context.create_step_context(step.id.clone(), step.display_name.clone());

            let mut step_result = match create_handler(&step.kind) {
                Err(error) => {
                    step_context.error(&format!("{:#}", error));
                    RunResult::Failed
                }
                Ok(handler) => {
                    // Processes the step starts honor this token, so a timed
                    // out step can be torn down without cancelling the job.
                    let step_cancel = cancel.child_token();
                    step_context.set_step_cancel_token(step_cancel.clone());
                    let outcome = tokio::select! {
                        _ = tokio::time::sleep(step.timeout) => None,
                        result = handler.run_async(&mut step_context, &step, host) => Some(result),
                    };
                    match outcome {
                        None => {
                            step_cancel.cancel();
                            step_context.error(&format!(
                                "Step '{}' exceeded its timeout of {} seconds.",
                                step.display_name,
                                step.timeout.as_secs()
                            ));
                            RunResult::Failed
                        }
                        Some(Err(error)) => {
                            step_context.error(&format!("Step failed: {:#}", error));
                            RunResult::Failed
                        }
                        Some(Ok(())) => step_context.result().unwrap_or(RunResult::Succeeded),
                    }
                }
            };

            // A failure while the job is being cancelled counts as cancelled.
            if cancel.is_cancelled() && step_result == RunResult::Failed {
                step_result = RunResult::Canceled;
            }

            if step_result == RunResult::Failed && step.continue_on_error {
                step_context.info("Step failed, but continue-on-error is set.");
                step_result = RunResult::SucceededWithIssues;
            }

            if !step_context.is_completed() {
                step_context.complete(step_result, None);
            }

            if let Some(log) = context.job_log() {
                log.lock().end_step();
            }

            job_result = Some(merge_run_results(job_result, step_result));
        }

        let mut final_result = job_result.unwrap_or(RunResult::Succeeded);
        if cancel.is_cancelled() {
            final_result = merge_run_results(Some(final_result), RunResult::Canceled);
        }
        Ok(final_result)
    }
}

impl Default for StepsRunner {
    fn default() -> Self {
        Self::new()
    }
}
