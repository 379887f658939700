// Expression contexts: the `github` and `runner` namespaces available to
// `if:` conditions, and the baseline environment derived from them.

use crate::event::PushEvent;
use flowrun_common::constants::{env_vars, CURRENT_ARCHITECTURE, CURRENT_PLATFORM};
use serde::Serialize;
use std::collections::HashMap;

/// Default value for `github.server_url` when the payload names none.
pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// The `github` expression context, built from the push event plus workflow
/// metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GithubContext {
    pub workflow: String,
    pub job: String,
    pub repository: String,
    pub repository_owner: String,
    pub event_name: String,
    /// The raw event payload.
    pub event: serde_json::Value,
    pub sha: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_name: String,
    pub ref_type: String,
    pub server_url: String,
    pub workspace: String,
}

impl GithubContext {
    /// Build the context for a push-dispatched job.
    pub fn for_push(workflow_name: &str, job_id: &str, event: &PushEvent) -> Self {
        Self {
            workflow: workflow_name.to_string(),
            job: job_id.to_string(),
            repository: event.repository.full_name.clone(),
            repository_owner: event.repository_owner().to_string(),
            event_name: "push".to_string(),
            event: event.payload().clone(),
            sha: event.sha().to_string(),
            git_ref: event.git_ref.clone(),
            ref_name: extract_ref_name(&event.git_ref),
            ref_type: extract_ref_type(&event.git_ref),
            server_url: DEFAULT_SERVER_URL.to_string(),
            workspace: String::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = workspace.to_string();
        self
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The `GITHUB_*` baseline exported to every step's environment.
    pub fn to_environment(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(env_vars::GITHUB_WORKFLOW.to_string(), self.workflow.clone());
        env.insert(env_vars::GITHUB_JOB.to_string(), self.job.clone());
        env.insert(env_vars::GITHUB_REPOSITORY.to_string(), self.repository.clone());
        env.insert(
            env_vars::GITHUB_REPOSITORY_OWNER.to_string(),
            self.repository_owner.clone(),
        );
        env.insert(env_vars::GITHUB_EVENT_NAME.to_string(), self.event_name.clone());
        env.insert(env_vars::GITHUB_SHA.to_string(), self.sha.clone());
        env.insert(env_vars::GITHUB_REF.to_string(), self.git_ref.clone());
        env.insert(env_vars::GITHUB_REF_NAME.to_string(), self.ref_name.clone());
        env.insert(env_vars::GITHUB_SERVER_URL.to_string(), self.server_url.clone());
        env.insert(env_vars::GITHUB_WORKSPACE.to_string(), self.workspace.clone());
        env
    }
}

/// The `runner` expression context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerContext {
    pub os: String,
    pub arch: String,
    pub name: String,
    pub labels: Vec<String>,
    pub temp: String,
    pub tool_cache: String,
    pub workspace: String,
}

impl RunnerContext {
    pub fn new(name: &str, labels: Vec<String>) -> Self {
        Self {
            os: CURRENT_PLATFORM.context_name().to_string(),
            arch: CURRENT_ARCHITECTURE.label_name().to_string(),
            name: name.to_string(),
            labels,
            temp: String::new(),
            tool_cache: String::new(),
            workspace: String::new(),
        }
    }

    pub fn with_directories(mut self, temp: &str, tool_cache: &str, workspace: &str) -> Self {
        self.temp = temp.to_string();
        self.tool_cache = tool_cache.to_string();
        self.workspace = workspace.to_string();
        self
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The `RUNNER_*` baseline exported to every step's environment.
    pub fn to_environment(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(env_vars::RUNNER_NAME.to_string(), self.name.clone());
        env.insert(env_vars::RUNNER_OS.to_string(), self.os.clone());
        env.insert(env_vars::RUNNER_ARCH.to_string(), self.arch.clone());
        env.insert(env_vars::RUNNER_TEMP.to_string(), self.temp.clone());
        env.insert(env_vars::RUNNER_TOOL_CACHE.to_string(), self.tool_cache.clone());
        env.insert(env_vars::RUNNER_WORKSPACE.to_string(), self.workspace.clone());
        env
    }
}

/// Assemble the full expression context for condition evaluation.
pub fn build_expression_context(
    github: &GithubContext,
    runner: &RunnerContext,
    env: &HashMap<String, String>,
    job_status: flowrun_common::RunResult,
) -> serde_json::Value {
    serde_json::json!({
        "github": github.to_value(),
        "runner": runner.to_value(),
        "env": env,
        "job": { "status": job_status.conclusion_str() },
    })
}

/// `refs/heads/main` becomes `main`; `refs/tags/v1.0` becomes `v1.0`.
pub fn extract_ref_name(git_ref: &str) -> String {
    git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(git_ref)
        .to_string()
}

/// `branch`, `tag`, or empty for anything else.
pub fn extract_ref_type(git_ref: &str) -> String {
    if git_ref.starts_with("refs/heads/") {
        "branch".to_string()
    } else if git_ref.starts_with("refs/tags/") {
        "tag".to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrun_common::RunResult;

    fn push_event() -> PushEvent {
        PushEvent::from_json(
            r#"{
                "ref": "refs/heads/randomized-tests-runner",
                "after": "abc123",
                "repository": {
                    "full_name": "zed-industries/zed",
                    "owner": { "login": "zed-industries" }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn github_context_from_push() {
        let ctx = GithubContext::for_push("Randomized Tests", "tests", &push_event());
        assert_eq!(ctx.repository, "zed-industries/zed");
        assert_eq!(ctx.repository_owner, "zed-industries");
        assert_eq!(ctx.event_name, "push");
        assert_eq!(ctx.ref_name, "randomized-tests-runner");
        assert_eq!(ctx.ref_type, "branch");
        assert_eq!(ctx.sha, "abc123");
        assert_eq!(ctx.server_url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn ref_helpers() {
        assert_eq!(extract_ref_name("refs/heads/main"), "main");
        assert_eq!(extract_ref_name("refs/tags/v1.0.0"), "v1.0.0");
        assert_eq!(extract_ref_type("refs/heads/main"), "branch");
        assert_eq!(extract_ref_type("refs/tags/v1.0"), "tag");
        assert_eq!(extract_ref_type("something"), "");
    }

    #[test]
    fn expression_context_shape() {
        let github = GithubContext::for_push("wf", "job", &push_event());
        let runner = RunnerContext::new("local", vec!["self-hosted".to_string()]);
        let mut env = HashMap::new();
        env.insert("RUST_BACKTRACE".to_string(), "1".to_string());

        let ctx = build_expression_context(&github, &runner, &env, RunResult::Succeeded);
        assert_eq!(ctx["github"]["repository_owner"], "zed-industries");
        assert_eq!(ctx["github"]["ref"], "refs/heads/randomized-tests-runner");
        assert_eq!(ctx["runner"]["labels"][0], "self-hosted");
        assert_eq!(ctx["env"]["RUST_BACKTRACE"], "1");
        assert_eq!(ctx["job"]["status"], "success");
    }

    #[test]
    fn environment_baselines() {
        let github = GithubContext::for_push("wf", "job", &push_event()).with_workspace("/w/workspace");
        let env = github.to_environment();
        assert_eq!(env.get("GITHUB_REF_NAME").unwrap(), "randomized-tests-runner");
        assert_eq!(env.get("GITHUB_WORKSPACE").unwrap(), "/w/workspace");

        let runner = RunnerContext::new("local", vec![]).with_directories("/t", "/tc", "/w");
        let env = runner.to_environment();
        assert_eq!(env.get("RUNNER_TEMP").unwrap(), "/t");
        assert_eq!(env.get("RUNNER_TOOL_CACHE").unwrap(), "/tc");
    }
}
