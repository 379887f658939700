// Child process execution with streamed output and graceful cancellation.

use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The duration to wait after sending SIGINT before escalating to SIGTERM.
const SIGINT_TIMEOUT: Duration = Duration::from_millis(7500);
/// The duration to wait after sending SIGTERM before escalating to SIGKILL.
const SIGTERM_TIMEOUT: Duration = Duration::from_millis(2500);

/// Error type for non-zero process exit codes.
#[derive(Debug, thiserror::Error)]
#[error(
    "Exit code {exit_code} returned from process: file name '{file_name}', arguments '{arguments}'."
)]
pub struct ProcessExitCodeError {
    pub exit_code: i32,
    pub file_name: String,
    pub arguments: String,
}

/// Spawns a child process, reads stdout/stderr on separate tasks, supports
/// graceful cancellation (SIGINT, then SIGTERM, then SIGKILL), and delivers
/// output lines through channels.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
    stdout_tx: mpsc::UnboundedSender<String>,
    stdout_rx: Option<mpsc::UnboundedReceiver<String>>,
    stderr_tx: mpsc::UnboundedSender<String>,
    stderr_rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl ProcessInvoker {
    /// Create a new `ProcessInvoker` with the given trace writer.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        Self {
            trace,
            stdout_tx,
            stdout_rx: Some(stdout_rx),
            stderr_tx,
            stderr_rx: Some(stderr_rx),
        }
    }

    /// Take the stdout line receiver. Can only be called once; subsequent
    /// calls return `None`.
    pub fn take_stdout_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.stdout_rx.take()
    }

    /// Take the stderr line receiver. Can only be called once; subsequent
    /// calls return `None`.
    pub fn take_stderr_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.stderr_rx.take()
    }

    /// Execute a process and wait for it to exit.
    ///
    /// `arguments` is a single string split shell-style (quotes respected).
    /// If `require_exit_code_zero` is set, a non-zero exit becomes a
    /// `ProcessExitCodeError`. If `kill_process_on_cancel` is set,
    /// cancellation skips the signal ladder and kills immediately.
    ///
    /// Returns the process exit code.
    pub async fn execute(
        &self,
        working_directory: &str,
        file_name: &str,
        arguments: &str,
        environment: Option<&HashMap<String, String>>,
        require_exit_code_zero: bool,
        kill_process_on_cancel: bool,
        cancellation_token: CancellationToken,
    ) -> Result<i32> {
        assert!(!file_name.is_empty(), "file_name must not be empty");

        self.trace.verbose("Starting process:");
        self.trace.verbose(&format!("  File name: '{file_name}'"));
        self.trace.verbose(&format!("  Arguments: '{arguments}'"));
        self.trace
            .verbose(&format!("  Working directory: '{working_directory}'"));

        let mut cmd = Command::new(file_name);

        if !arguments.is_empty() {
            for arg in shell_split(arguments) {
                cmd.arg(arg);
            }
        }

        if !working_directory.is_empty() && Path::new(working_directory).is_dir() {
            cmd.current_dir(working_directory);
        }

        if let Some(env) = environment {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        // Every child runs under CI conventions.
        cmd.env(crate::constants::env_vars::GITHUB_ACTIONS, "true");
        let ci_declared = environment.map(|e| e.contains_key("CI")).unwrap_or(false);
        if std::env::var("CI").is_err() && !ci_declared {
            cmd.env(crate::constants::env_vars::CI, "true");
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        let start = std::time::Instant::now();
        let mut child = cmd.spawn().with_context(|| {
            format!("Failed to start process '{file_name}' with arguments '{arguments}'")
        })?;

        let pid = child.id().unwrap_or(0);
        self.trace.verbose(&format!(
            "Process started with process id {pid}, waiting for process exit."
        ));

        let stdout = child.stdout.take();
        let stdout_tx = self.stdout_tx.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stdout_tx.send(line);
                }
            }
        });

        let stderr = child.stderr.take();
        let stderr_tx = self.stderr_tx.clone();
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stderr_tx.send(line);
                }
            }
        });

        let exit_code: i32;
        let was_cancelled;

        tokio::select! {
            status = child.wait() => {
                was_cancelled = false;
                match status {
                    Ok(s) => {
                        exit_code = s.code().unwrap_or(-1);
                    }
                    Err(e) => {
                        return Err(e).context("Failed to wait for process");
                    }
                }
            }
            _ = cancellation_token.cancelled() => {
                was_cancelled = true;
                self.trace.info("Cancellation requested.");
                exit_code = self.cancel_and_kill_process(&mut child, kill_process_on_cancel).await;
            }
        }

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let elapsed = start.elapsed();
        self.trace.verbose(&format!(
            "Finished process {pid} with exit code {exit_code}, and elapsed time {elapsed:.2?}."
        ));

        if was_cancelled {
            anyhow::bail!("Process was cancelled");
        }

        if exit_code != 0 && require_exit_code_zero {
            return Err(ProcessExitCodeError {
                exit_code,
                file_name: file_name.to_string(),
                arguments: arguments.to_string(),
            }
            .into());
        }

        Ok(exit_code)
    }

    /// Attempt graceful cancellation: SIGINT, SIGTERM, then SIGKILL.
    async fn cancel_and_kill_process(
        &self,
        child: &mut tokio::process::Child,
        kill_immediately: bool,
    ) -> i32 {
        if !kill_immediately {
            if self
                .send_signal_and_wait(child, Signal::Int, SIGINT_TIMEOUT)
                .await
            {
                self.trace
                    .info("Process cancelled successfully through SIGINT.");
                return wait_exit_code(child).await;
            }

            if self
                .send_signal_and_wait(child, Signal::Term, SIGTERM_TIMEOUT)
                .await
            {
                self.trace
                    .info("Process terminated successfully through SIGTERM.");
                return wait_exit_code(child).await;
            }
        }

        self.trace
            .info("Killing process since both cancel and terminate signals have been ignored.");
        let _ = child.kill().await;
        wait_exit_code(child).await
    }

    /// Send a signal to the child process and wait up to `timeout` for it to
    /// exit. Returns `true` if the process exited within the timeout.
    #[cfg(unix)]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        signal: Signal,
        timeout: Duration,
    ) -> bool {
        let pid = match child.id() {
            Some(id) => id,
            // Process already exited.
            None => return true,
        };

        let sig = match signal {
            Signal::Int => nix::sys::signal::Signal::SIGINT,
            Signal::Term => nix::sys::signal::Signal::SIGTERM,
        };

        self.trace.verbose(&format!("Sending {sig:?} to process {pid}."));

        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig).is_err() {
            self.trace
                .verbose(&format!("{sig:?} signal failed to send to process {pid}."));
            return false;
        }

        tokio::select! {
            result = child.wait() => {
                result.is_ok()
            }
            _ = tokio::time::sleep(timeout) => {
                self.trace.verbose(&format!(
                    "Process did not honor {sig:?} within {:.1}s.",
                    timeout.as_secs_f64()
                ));
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        _signal: Signal,
        timeout: Duration,
    ) -> bool {
        // No POSIX signals here; wait out the grace window then let the
        // caller force kill.
        tokio::select! {
            result = child.wait() => {
                result.is_ok()
            }
            _ = tokio::time::sleep(timeout) => {
                false
            }
        }
    }
}

async fn wait_exit_code(child: &mut tokio::process::Child) -> i32 {
    child
        .wait()
        .await
        .map(|s| s.code().unwrap_or(-1))
        .unwrap_or(-1)
}

/// Internal signal type for cross-platform abstraction.
#[derive(Debug, Clone, Copy)]
enum Signal {
    Int,
    Term,
}

/// Split an argument string on whitespace, respecting single quotes, double
/// quotes, and backslash escapes.
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ' ' | '\t' if !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}
