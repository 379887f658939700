// Executes inline `run:` scripts by writing them to a temp file and invoking
// them through the configured shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use flowrun_common::RunResult;
use std::path::Path;

use crate::execution_context::ExecutionContext;
use crate::handlers::Handler;
use crate::job_steps::{JobStep, StepKind};
use crate::step_host::StepHost;

pub struct ScriptHandler;

impl ScriptHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScriptHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    async fn run_async(
        &self,
        context: &mut ExecutionContext,
        step: &JobStep,
        host: &dyn StepHost,
    ) -> Result<()> {
        self.prepare_execution(context, step);

        let (script, shell, working_directory) = match &step.kind {
            StepKind::Script {
                script,
                shell,
                working_directory,
            } => (script.clone(), shell.clone(), working_directory.clone()),
            _ => anyhow::bail!("script handler invoked for a non-script step"),
        };

        if script.trim().is_empty() {
            context.debug("Script body is empty, skipping.");
            return Ok(());
        }

        let shell = shell.unwrap_or_else(default_shell);
        let (shell_command, shell_args, file_extension) = parse_shell_option_string(&shell);

        let temp_dir = context.global().temp_directory.clone();
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("Failed to create temp directory: {}", temp_dir))?;

        let script_file = format!(
            "{}/script_{}.{}",
            temp_dir,
            uuid::Uuid::new_v4().as_simple(),
            file_extension
        );
        let body = if script.ends_with('\n') {
            script.clone()
        } else {
            format!("{}\n", script)
        };
        std::fs::write(&script_file, body)
            .with_context(|| format!("Failed to write script file: {}", script_file))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            let _ = std::fs::set_permissions(&script_file, perms);
        }

        context.debug(&format!("Script file: {}", script_file));
        context.debug(&format!(
            "Shell: {} {}",
            shell_command,
            shell_args.join(" ")
        ));

        let mut args = shell_args;
        // Quoted so a temp path containing spaces survives argument splitting.
        args.push(format!("\"{}\"", script_file));
        let arguments = args.join(" ");

        let mut env = context.merged_environment();
        let prepend = context.global().prepend_path.clone();
        flowrun_common::util::prepend_path(&mut env, &prepend);

        let working_directory = resolve_working_directory(
            working_directory.as_deref(),
            &context.global().workspace_directory.clone(),
        );

        let step_output = host
            .execute_async(
                &working_directory,
                &shell_command,
                &arguments,
                &env,
                context.cancel_token(),
            )
            .await?;

        for line in &step_output.output_lines {
            context.write(line);
        }

        let _ = std::fs::remove_file(&script_file);

        if step_output.exit_code != 0 {
            context.error(&format!(
                "Process completed with exit code {}.",
                step_output.exit_code
            ));
            context.complete(
                RunResult::Failed,
                Some(&format!("Exit code {}", step_output.exit_code)),
            );
        } else {
            context.debug("Process completed successfully.");
        }

        Ok(())
    }
}

/// The default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "pwsh".to_string()
    } else {
        "bash".to_string()
    }
}

/// Resolve the step's working directory against the workspace.
fn resolve_working_directory(working_directory: Option<&str>, workspace: &str) -> String {
    match working_directory {
        None => workspace.to_string(),
        Some(dir) if Path::new(dir).is_absolute() => dir.to_string(),
        Some(dir) => format!("{}/{}", workspace.trim_end_matches('/'), dir),
    }
}

/// Parse a shell option string into (command, args, file extension).
fn parse_shell_option_string(shell: &str) -> (String, Vec<String>, String) {
    match shell.to_lowercase().as_str() {
        "bash" => (
            "bash".to_string(),
            vec![
                "--noprofile".to_string(),
                "--norc".to_string(),
                "-e".to_string(),
                "-o".to_string(),
                "pipefail".to_string(),
            ],
            "sh".to_string(),
        ),
        "sh" => ("sh".to_string(), vec!["-e".to_string()], "sh".to_string()),
        "pwsh" => (
            "pwsh".to_string(),
            vec!["-command".to_string(), ".".to_string()],
            "ps1".to_string(),
        ),
        "python" => ("python".to_string(), Vec::new(), "py".to_string()),
        _ => {
            // Custom shell string: first token is the command, the rest are
            // fixed arguments.
            let mut parts = shell.split_whitespace();
            let command = parts.next().unwrap_or("sh").to_string();
            let args = parts.map(|s| s.to_string()).collect();
            (command, args, "sh".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_context::test_support::make_context;
    use crate::step_host::DefaultStepHost;
    use flowrun_common::NullTraceWriter;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn script_step(script: &str) -> JobStep {
        JobStep {
            id: "s1".to_string(),
            display_name: "script".to_string(),
            condition: String::new(),
            timeout: Duration::from_secs(60),
            continue_on_error: false,
            env: HashMap::new(),
            kind: StepKind::Script {
                script: script.to_string(),
                shell: None,
                working_directory: None,
            },
        }
    }

    fn host() -> DefaultStepHost {
        DefaultStepHost::new(Arc::new(NullTraceWriter))
    }

    async fn run_in_tempdir(script: &str) -> (ExecutionContext, Option<RunResult>) {
        let dir = tempfile::tempdir().unwrap();
        let mut context = make_context();
        {
            let mut global = context.global_mut();
            global.temp_directory = dir.path().join("temp").to_string_lossy().into_owned();
            global.workspace_directory = dir.path().to_string_lossy().into_owned();
        }
        let step = script_step(script);
        ScriptHandler::new()
            .run_async(&mut context, &step, &host())
            .await
            .unwrap();
        let result = context.result();
        (context, result)
    }

    #[tokio::test]
    async fn successful_script_leaves_context_incomplete() {
        let (context, result) = run_in_tempdir("echo from-script").await;
        assert_eq!(result, None);
        assert!(context
            .log_lines()
            .iter()
            .any(|l| l.contains("from-script")));
    }

    #[tokio::test]
    async fn failing_script_completes_with_failure() {
        let (context, result) = run_in_tempdir("exit 7").await;
        assert_eq!(result, Some(RunResult::Failed));
        assert!(context
            .log_lines()
            .iter()
            .any(|l| l.contains("exit code 7")));
    }

    #[tokio::test]
    async fn bash_errexit_stops_on_first_failure() {
        let (context, result) = run_in_tempdir("false\necho unreachable").await;
        assert_eq!(result, Some(RunResult::Failed));
        assert!(!context
            .log_lines()
            .iter()
            .any(|l| l.contains("unreachable")));
    }

    #[tokio::test]
    async fn script_runs_from_a_temp_path_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = make_context();
        {
            let mut global = context.global_mut();
            global.temp_directory = dir
                .path()
                .join("temp dir")
                .to_string_lossy()
                .into_owned();
            global.workspace_directory = dir.path().to_string_lossy().into_owned();
        }

        ScriptHandler::new()
            .run_async(&mut context, &script_step("echo spaced-ok"), &host())
            .await
            .unwrap();

        assert_eq!(context.result(), None);
        assert!(context.log_lines().iter().any(|l| l.contains("spaced-ok")));
    }

    #[tokio::test]
    async fn step_environment_reaches_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = make_context();
        {
            let mut global = context.global_mut();
            global.temp_directory = dir.path().to_string_lossy().into_owned();
            global.workspace_directory = dir.path().to_string_lossy().into_owned();
        }
        let mut step = script_step("echo \"value=$STEP_VALUE\"");
        step.env
            .insert("STEP_VALUE".to_string(), "42".to_string());

        ScriptHandler::new()
            .run_async(&mut context, &step, &host())
            .await
            .unwrap();

        assert!(context.log_lines().iter().any(|l| l.contains("value=42")));
    }

    #[test]
    fn shell_option_parsing() {
        let (cmd, args, ext) = parse_shell_option_string("bash");
        assert_eq!(cmd, "bash");
        assert!(args.contains(&"pipefail".to_string()));
        assert_eq!(ext, "sh");

        let (cmd, args, _) = parse_shell_option_string("sh");
        assert_eq!(cmd, "sh");
        assert_eq!(args, vec!["-e"]);

        let (cmd, args, _) = parse_shell_option_string("zsh -eu");
        assert_eq!(cmd, "zsh");
        assert_eq!(args, vec!["-eu"]);
    }

    #[test]
    fn working_directory_resolution() {
        assert_eq!(resolve_working_directory(None, "/ws"), "/ws");
        assert_eq!(resolve_working_directory(Some("sub"), "/ws"), "/ws/sub");
        assert_eq!(resolve_working_directory(Some("/abs"), "/ws"), "/abs");
    }
}
