// StepHost: the seam between step handlers and real process execution.
// Handlers stay testable by taking `&dyn StepHost`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use flowrun_common::{ProcessInvoker, TraceWriter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a hosted process produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub exit_code: i32,
    /// Captured stdout lines followed by captured stderr lines.
    pub output_lines: Vec<String>,
}

/// Executes processes on behalf of step handlers.
#[async_trait]
pub trait StepHost: Send + Sync {
    async fn execute_async(
        &self,
        working_directory: &str,
        file_name: &str,
        arguments: &str,
        environment: &HashMap<String, String>,
        cancel_token: CancellationToken,
    ) -> Result<StepOutput>;
}

/// Runs processes directly on the host OS through the process invoker.
pub struct DefaultStepHost {
    trace: Arc<dyn TraceWriter>,
}

impl DefaultStepHost {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }
}

#[async_trait]
impl StepHost for DefaultStepHost {
    async fn execute_async(
        &self,
        working_directory: &str,
        file_name: &str,
        arguments: &str,
        environment: &HashMap<String, String>,
        cancel_token: CancellationToken,
    ) -> Result<StepOutput> {
        let mut invoker = ProcessInvoker::new(Arc::clone(&self.trace));
        let mut stdout_rx = invoker
            .take_stdout_receiver()
            .context("stdout receiver already taken")?;
        let mut stderr_rx = invoker
            .take_stderr_receiver()
            .context("stderr receiver already taken")?;

        let working_directory = working_directory.to_string();
        let file_name_owned = file_name.to_string();
        let arguments = arguments.to_string();
        let environment = environment.clone();

        // The invoker moves into the task so the output channels close when
        // the process finishes.
        let execute = tokio::spawn(async move {
            invoker
                .execute(
                    &working_directory,
                    &file_name_owned,
                    &arguments,
                    Some(&environment),
                    false,
                    false,
                    cancel_token,
                )
                .await
        });

        let mut output_lines = Vec::new();
        while let Some(line) = stdout_rx.recv().await {
            output_lines.push(line);
        }
        while let Some(line) = stderr_rx.recv().await {
            output_lines.push(line);
        }

        let exit_code = execute
            .await
            .context("process execution task panicked")?
            .with_context(|| format!("Process execution failed: {}", file_name))?;

        Ok(StepOutput {
            exit_code,
            output_lines,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use flowrun_common::NullTraceWriter;

    fn host() -> DefaultStepHost {
        DefaultStepHost::new(Arc::new(NullTraceWriter))
    }

    #[tokio::test]
    async fn captures_stdout() {
        let output = host()
            .execute_async("", "echo", "captured", &HashMap::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.output_lines, vec!["captured"]);
    }

    #[tokio::test]
    async fn captures_stderr_and_exit_code() {
        let output = host()
            .execute_async(
                "",
                "sh",
                "-c 'echo oops >&2; exit 3'",
                &HashMap::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.output_lines, vec!["oops"]);
    }
}
