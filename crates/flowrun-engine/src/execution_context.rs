// The central mutable state for a running job: shared global state, per-step
// contexts, logging fan-out, and result tracking.

use crate::contexts::{self, GithubContext, RunnerContext};
use flowrun_common::{JobLogWriter, RunResult, TraceWriter};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared mutable state for the entire job, visible from all step contexts.
pub struct Global {
    pub workflow_name: String,
    pub job_id: String,
    pub job_display_name: String,
    pub run_id: Uuid,

    /// Root of this run's directories under the work folder.
    pub pipeline_directory: String,
    /// The checkout target; preserved across runs.
    pub workspace_directory: String,
    pub temp_directory: String,
    pub tool_cache_directory: String,

    /// Local directory the checkout handler copies from, when configured.
    pub repository_source: Option<String>,

    /// Merged workflow and job environment plus the runner baseline.
    pub environment_variables: HashMap<String, String>,

    /// Directories prepended to PATH by earlier steps (setup-runtime).
    pub prepend_path: Vec<String>,

    pub cancel_token: CancellationToken,
    pub write_debug: bool,
}

/// Execution context for a job or a single step.
///
/// Step contexts share the job's `Global` and log writer; their result and
/// log lines are their own.
pub struct ExecutionContext {
    global: Arc<RwLock<Global>>,
    trace: Arc<dyn TraceWriter>,
    job_log: Option<Arc<Mutex<JobLogWriter>>>,

    display_name: String,
    current_step_id: Option<String>,

    result: Option<RunResult>,
    result_message: Option<String>,
    is_completed: bool,

    github_context: Option<GithubContext>,
    runner_context: Option<RunnerContext>,

    /// Step-scoped cancellation, linked to the job token. Set by the steps
    /// runner so a timed-out step can stop its own processes without
    /// cancelling the job.
    step_cancel: Option<CancellationToken>,

    /// Step-level environment overrides (includes injected `INPUT_*`).
    pub step_environment: HashMap<String, String>,

    log_lines: Vec<String>,
}

impl ExecutionContext {
    /// Create the root context for a job.
    pub fn new_root(trace: Arc<dyn TraceWriter>, global: Global, display_name: String) -> Self {
        Self {
            global: Arc::new(RwLock::new(global)),
            trace,
            job_log: None,
            display_name,
            current_step_id: None,
            result: None,
            result_message: None,
            is_completed: false,
            github_context: None,
            runner_context: None,
            step_cancel: None,
            step_environment: HashMap::new(),
            log_lines: Vec::new(),
        }
    }

    /// Attach a job log writer; step output fans out to it.
    pub fn with_job_log(mut self, job_log: Arc<Mutex<JobLogWriter>>) -> Self {
        self.job_log = Some(job_log);
        self
    }

    /// Create a child context for one step.
    pub fn create_step_context(&self, step_id: String, display_name: String) -> Self {
        Self {
            global: Arc::clone(&self.global),
            trace: Arc::clone(&self.trace),
            job_log: self.job_log.clone(),
            display_name,
            current_step_id: Some(step_id),
            result: None,
            result_message: None,
            is_completed: false,
            github_context: self.github_context.clone(),
            runner_context: self.runner_context.clone(),
            step_cancel: None,
            step_environment: HashMap::new(),
            log_lines: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn global(&self) -> parking_lot::RwLockReadGuard<'_, Global> {
        self.global.read()
    }

    pub fn global_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Global> {
        self.global.write()
    }

    pub fn trace(&self) -> Arc<dyn TraceWriter> {
        Arc::clone(&self.trace)
    }

    pub fn job_log(&self) -> Option<Arc<Mutex<JobLogWriter>>> {
        self.job_log.clone()
    }

    /// The cancellation token processes started from this context should
    /// honor: the step token when one is set, otherwise the job token.
    pub fn cancel_token(&self) -> CancellationToken {
        match &self.step_cancel {
            Some(token) => token.clone(),
            None => self.global.read().cancel_token.clone(),
        }
    }

    pub fn result(&self) -> Option<RunResult> {
        self.result
    }

    pub fn result_message(&self) -> Option<&str> {
        self.result_message.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn github_context(&self) -> Option<&GithubContext> {
        self.github_context.as_ref()
    }

    pub fn runner_context(&self) -> Option<&RunnerContext> {
        self.runner_context.as_ref()
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    pub fn set_github_context(&mut self, ctx: GithubContext) {
        self.github_context = Some(ctx);
    }

    pub fn set_runner_context(&mut self, ctx: RunnerContext) {
        self.runner_context = Some(ctx);
    }

    pub fn set_result(&mut self, result: RunResult) {
        self.result = Some(result);
    }

    pub fn set_step_cancel_token(&mut self, token: CancellationToken) {
        self.step_cancel = Some(token);
    }

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------

    /// Write a plain output line, fanning out to the trace writer and the
    /// job log.
    pub fn write(&mut self, message: &str) {
        self.log_lines.push(message.to_string());
        self.trace.info(&format!("[{}] {}", self.display_name, message));
        if let Some(ref log) = self.job_log {
            log.lock().write(message);
        }
    }

    pub fn info(&mut self, message: &str) {
        self.write(message);
    }

    pub fn debug(&mut self, message: &str) {
        if self.global.read().write_debug {
            let line = format!("##[debug]{}", message);
            self.log_lines.push(line.clone());
            self.trace
                .verbose(&format!("[{}] {}", self.display_name, message));
            if let Some(ref log) = self.job_log {
                log.lock().write(&line);
            }
        }
    }

    pub fn warning(&mut self, message: &str) {
        let line = format!("##[warning]{}", message);
        self.log_lines.push(line.clone());
        self.trace
            .warning(&format!("[{}] {}", self.display_name, message));
        if let Some(ref log) = self.job_log {
            log.lock().write(&line);
        }
    }

    pub fn error(&mut self, message: &str) {
        let line = format!("##[error]{}", message);
        self.log_lines.push(line.clone());
        self.trace
            .error(&format!("[{}] {}", self.display_name, message));
        if let Some(ref log) = self.job_log {
            log.lock().write(&line);
        }
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Mark this context complete; the first completion wins.
    pub fn complete(&mut self, result: RunResult, message: Option<&str>) {
        if self.is_completed {
            tracing::warn!(
                "Attempted to complete already-completed context: {}",
                self.display_name
            );
            return;
        }

        self.result = Some(result);
        self.result_message = message.map(|s| s.to_string());
        self.is_completed = true;

        let summary = format!(
            "Finishing: {} (Result: {}{})",
            self.display_name,
            result,
            message
                .map(|m| format!(", Message: {}", m))
                .unwrap_or_default()
        );
        match result {
            RunResult::Succeeded | RunResult::SucceededWithIssues | RunResult::Skipped => {
                self.trace.info(&summary)
            }
            _ => self.trace.error(&summary),
        }
    }

    // -----------------------------------------------------------------------
    // Expression context
    // -----------------------------------------------------------------------

    /// The merged environment for this context: job-level variables with
    /// step-level overrides winning.
    pub fn merged_environment(&self) -> HashMap<String, String> {
        let global = self.global.read();
        flowrun_common::util::merge_env(&global.environment_variables, &self.step_environment)
    }

    /// Build the expression context for evaluating `if:` conditions.
    pub fn build_expression_context(&self, job_status: RunResult) -> serde_json::Value {
        let github = self.github_context.clone().unwrap_or_default();
        let runner = self.runner_context.clone().unwrap_or_default();
        contexts::build_expression_context(&github, &runner, &self.merged_environment(), job_status)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use flowrun_common::NullTraceWriter;

    pub fn make_global(cancel_token: CancellationToken) -> Global {
        Global {
            workflow_name: "test workflow".to_string(),
            job_id: "tests".to_string(),
            job_display_name: "tests".to_string(),
            run_id: Uuid::new_v4(),
            pipeline_directory: "/tmp/flowrun/pipeline".to_string(),
            workspace_directory: "/tmp/flowrun/pipeline/workspace".to_string(),
            temp_directory: "/tmp/flowrun/temp".to_string(),
            tool_cache_directory: "/tmp/flowrun/tool".to_string(),
            repository_source: None,
            environment_variables: HashMap::new(),
            prepend_path: Vec::new(),
            cancel_token,
            write_debug: true,
        }
    }

    pub fn make_context() -> ExecutionContext {
        ExecutionContext::new_root(
            Arc::new(NullTraceWriter),
            make_global(CancellationToken::new()),
            "tests".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_context;
    use super::*;

    #[test]
    fn logging_accumulates_lines() {
        let mut ctx = make_context();
        ctx.write("plain");
        ctx.debug("dbg");
        ctx.warning("warn");
        ctx.error("err");
        assert_eq!(ctx.log_lines().len(), 4);
        assert_eq!(ctx.log_lines()[1], "##[debug]dbg");
        assert_eq!(ctx.log_lines()[2], "##[warning]warn");
        assert_eq!(ctx.log_lines()[3], "##[error]err");
    }

    #[test]
    fn first_completion_wins() {
        let mut ctx = make_context();
        assert!(!ctx.is_completed());
        ctx.complete(RunResult::Succeeded, None);
        ctx.complete(RunResult::Failed, Some("ignored"));
        assert_eq!(ctx.result(), Some(RunResult::Succeeded));
        assert_eq!(ctx.result_message(), None);
    }

    #[test]
    fn step_context_shares_global() {
        let ctx = make_context();
        let step = ctx.create_step_context("step-1".to_string(), "Run tests".to_string());
        assert_eq!(step.current_step_id(), Some("step-1"));
        assert_eq!(step.display_name(), "Run tests");
        assert_eq!(
            step.global().workspace_directory,
            ctx.global().workspace_directory
        );
    }

    #[test]
    fn merged_environment_step_wins() {
        let mut ctx = make_context();
        ctx.global_mut()
            .environment_variables
            .insert("A".to_string(), "job".to_string());
        ctx.step_environment
            .insert("A".to_string(), "step".to_string());
        ctx.step_environment
            .insert("B".to_string(), "only".to_string());

        let merged = ctx.merged_environment();
        assert_eq!(merged.get("A").unwrap(), "step");
        assert_eq!(merged.get("B").unwrap(), "only");
    }

    #[test]
    fn expression_context_reflects_job_status() {
        let ctx = make_context();
        let value = ctx.build_expression_context(RunResult::Failed);
        assert_eq!(value["job"]["status"], "failure");
    }
}
