// Runs a single job end to end: label matching, the job-level `if:` guard,
// directory provisioning, context setup, and step execution.

use anyhow::{Context, Result};
use flowrun_common::constants::{env_vars, WellKnownDirectory};
use flowrun_common::{JobLogWriter, RunResult, RunnerHome, TraceWriter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::contexts::{self, GithubContext, RunnerContext};
use crate::event::PushEvent;
use crate::execution_context::{ExecutionContext, Global};
use crate::expressions::evaluate_condition;
use crate::job_steps::build_step_list;
use crate::step_host::DefaultStepHost;
use crate::steps_runner::StepsRunner;
use crate::workflow::{Job, Workflow};

/// Per-invocation settings for running jobs.
#[derive(Clone)]
pub struct JobOptions {
    pub runner_name: String,
    pub labels: Vec<String>,
    /// Local directory the checkout handler copies from.
    pub repository_source: Option<String>,
    pub write_debug: bool,
    pub cancel_token: CancellationToken,
}

pub struct JobRunner {
    home: RunnerHome,
    trace: Arc<dyn TraceWriter>,
}

impl JobRunner {
    pub fn new(home: RunnerHome, trace: Arc<dyn TraceWriter>) -> Self {
        Self { home, trace }
    }

    /// Run one job of the workflow against a push event.
    ///
    /// Returns `RunResult::Skipped` when the runner's labels do not satisfy
    /// `runs-on` or the job's `if:` guard evaluates to false.
    pub async fn run_job(
        &self,
        workflow: &Workflow,
        job_id: &str,
        job: &Job,
        event: &PushEvent,
        options: &JobOptions,
    ) -> Result<RunResult> {
        let display_name = job.display_name(job_id).to_string();

        if !job.runs_on.satisfied_by(&options.labels) {
            let missing = job.runs_on.missing_labels(&options.labels);
            self.trace.info(&format!(
                "Skipping job '{}': runner is missing labels [{}]",
                display_name,
                missing.join(", ")
            ));
            return Ok(RunResult::Skipped);
        }

        // Stable per-repository workspace so `clean: false` checkouts persist
        // across runs.
        let repository_name = event
            .repository
            .full_name
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("repository")
            .to_string();

        let work_directory = self.home.ensure(WellKnownDirectory::Work)?;
        let temp_directory = self.home.ensure(WellKnownDirectory::Temp)?;
        let tool_cache_directory = self.home.ensure(WellKnownDirectory::Tools)?;
        let pipeline_directory = work_directory.join(&repository_name);
        let workspace_directory = pipeline_directory.join(&repository_name);
        std::fs::create_dir_all(&workspace_directory).with_context(|| {
            format!(
                "Failed to create workspace at {}",
                workspace_directory.display()
            )
        })?;

        let workspace = workspace_directory.to_string_lossy().into_owned();
        let temp = temp_directory.to_string_lossy().into_owned();
        let tool_cache = tool_cache_directory.to_string_lossy().into_owned();

        let github_context = GithubContext::for_push(workflow.display_name(), job_id, event)
            .with_workspace(&workspace);
        let runner_context = RunnerContext::new(&options.runner_name, options.labels.clone())
            .with_directories(&temp, &tool_cache, &workspace);

        // Environment baseline: workflow env, then job env, then the
        // GITHUB_*/RUNNER_* variables.
        let mut environment: HashMap<String, String> = HashMap::new();
        for (key, value) in &workflow.env {
            environment.insert(key.clone(), value.clone());
        }
        for (key, value) in &job.env {
            environment.insert(key.clone(), value.clone());
        }
        environment.extend(github_context.to_environment());
        environment.extend(runner_context.to_environment());
        environment.insert(env_vars::CI.to_string(), "true".to_string());

        // Job-level `if:` guard.
        let expression_context = contexts::build_expression_context(
            &github_context,
            &runner_context,
            &environment,
            RunResult::Succeeded,
        );
        let condition = job.condition.as_deref().unwrap_or("");
        if !evaluate_condition(
            condition,
            RunResult::Succeeded,
            options.cancel_token.is_cancelled(),
            &expression_context,
        ) {
            self.trace.info(&format!(
                "Skipping job '{}' (condition '{}' evaluated to false).",
                display_name, condition
            ));
            return Ok(RunResult::Skipped);
        }

        let run_id = Uuid::new_v4();
        let global = Global {
            workflow_name: workflow.display_name().to_string(),
            job_id: job_id.to_string(),
            job_display_name: display_name.clone(),
            run_id,
            pipeline_directory: pipeline_directory.to_string_lossy().into_owned(),
            workspace_directory: workspace,
            temp_directory: temp,
            tool_cache_directory: tool_cache,
            repository_source: options.repository_source.clone(),
            environment_variables: environment,
            prepend_path: Vec::new(),
            cancel_token: options.cancel_token.clone(),
            write_debug: options.write_debug,
        };

        let job_log = JobLogWriter::new(&self.home.logs_directory(), run_id)
            .context("Failed to create the job log")?;

        let mut context = ExecutionContext::new_root(
            Arc::clone(&self.trace),
            global,
            display_name.clone(),
        )
        .with_job_log(Arc::new(Mutex::new(job_log)));
        context.set_github_context(github_context);
        context.set_runner_context(runner_context);

        context.info(&format!(
            "Running job: {} (workflow: {}, run: {})",
            display_name,
            workflow.display_name(),
            run_id.as_simple()
        ));

        let steps = build_step_list(job)?;
        let host = DefaultStepHost::new(Arc::clone(&self.trace));
        let result = StepsRunner::new()
            .run_async(&mut context, steps, &host)
            .await?;

        context.complete(result, None);
        Ok(result)
    }
}
