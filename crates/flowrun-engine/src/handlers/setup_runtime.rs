// Native handler for `actions/setup-node`. Resolves a Node.js toolchain from
// the tool cache or the host PATH and exposes it to later steps.

use anyhow::Result;
use async_trait::async_trait;
use flowrun_common::RunResult;
use std::path::{Path, PathBuf};

use crate::execution_context::ExecutionContext;
use crate::handlers::Handler;
use crate::job_steps::{JobStep, StepKind};
use crate::step_host::StepHost;

pub struct SetupRuntimeHandler;

impl SetupRuntimeHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SetupRuntimeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for SetupRuntimeHandler {
    async fn run_async(
        &self,
        context: &mut ExecutionContext,
        step: &JobStep,
        host: &dyn StepHost,
    ) -> Result<()> {
        self.prepare_execution(context, step);

        let inputs = match &step.kind {
            StepKind::Action { inputs, .. } => inputs.clone(),
            _ => anyhow::bail!("setup-node handler invoked for a non-action step"),
        };

        let requested = inputs.get("node-version").cloned();
        let requested_major = requested.as_deref().and_then(parse_major);

        if let Some(version) = &requested {
            if requested_major.is_none() {
                context.warning(&format!(
                    "Unrecognized node-version '{}'; falling back to the system Node.js",
                    version
                ));
            }
        }

        // Tool cache first.
        let tool_cache = context.global().tool_cache_directory.clone();
        if let Some(hit) = find_in_tool_cache(Path::new(&tool_cache), requested_major) {
            context.info(&format!(
                "Found Node.js {} in tool cache: {}",
                hit.version,
                hit.bin.display()
            ));
            context
                .global_mut()
                .prepend_path
                .push(hit.bin.to_string_lossy().into_owned());
            return Ok(());
        }

        // Fall back to whatever the host PATH provides.
        if let Ok(path) = which::which("node") {
            context.debug(&format!("Probing Node.js from PATH: {}", path.display()));
        }

        let env = context.merged_environment();
        let probe = host
            .execute_async("", "node", "--version", &env, context.cancel_token())
            .await;

        let reported = match probe {
            Ok(output) if output.exit_code == 0 => output
                .output_lines
                .first()
                .map(|l| l.trim().to_string())
                .unwrap_or_default(),
            _ => {
                context.error("Unable to locate a Node.js installation in the tool cache or on PATH.");
                context.complete(RunResult::Failed, Some("Node.js not found"));
                return Ok(());
            }
        };

        match (requested_major, parse_major(&reported)) {
            (Some(wanted), Some(found)) if wanted != found => {
                context.error(&format!(
                    "System Node.js is {} but the step requested version {}; populate the tool cache with the requested version.",
                    reported, wanted
                ));
                context.complete(RunResult::Failed, Some("Node.js version mismatch"));
            }
            _ => {
                context.info(&format!("Using system Node.js {}", reported));
            }
        }

        Ok(())
    }
}

struct ToolCacheHit {
    version: String,
    bin: PathBuf,
}

/// Extract the major version number from strings like `18`, `18.20.4`, or
/// `v18.17.0`.
fn parse_major(version: &str) -> Option<u32> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// Look for a cached Node.js under `<tool_cache>/node/<version>/bin`,
/// preferring the highest matching version.
fn find_in_tool_cache(tool_cache: &Path, requested_major: Option<u32>) -> Option<ToolCacheHit> {
    let node_root = tool_cache.join("node");
    let entries = std::fs::read_dir(&node_root).ok()?;

    let mut best: Option<(Vec<u32>, ToolCacheHit)> = None;
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let version = entry.file_name().to_string_lossy().into_owned();
        let Some(major) = parse_major(&version) else {
            continue;
        };
        if let Some(wanted) = requested_major {
            if major != wanted {
                continue;
            }
        }
        let bin = entry.path().join("bin");
        if !bin.is_dir() {
            continue;
        }
        let key: Vec<u32> = version
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect();
        if best.as_ref().map(|(k, _)| key > *k).unwrap_or(true) {
            best = Some((key, ToolCacheHit { version, bin }));
        }
    }
    best.map(|(_, hit)| hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_context::test_support::make_context;
    use crate::step_host::testing::ScriptedStepHost;
    use crate::step_host::StepOutput;
    use crate::workflow::ActionRef;
    use std::collections::HashMap;
    use std::time::Duration;

    fn setup_step(version: Option<&str>) -> JobStep {
        let mut inputs = HashMap::new();
        if let Some(version) = version {
            inputs.insert("node-version".to_string(), version.to_string());
        }
        JobStep {
            id: "setup".to_string(),
            display_name: "Install Node".to_string(),
            condition: String::new(),
            timeout: Duration::from_secs(60),
            continue_on_error: false,
            env: HashMap::new(),
            kind: StepKind::Action {
                reference: ActionRef::parse("actions/setup-node@v4").unwrap(),
                inputs,
            },
        }
    }

    #[test]
    fn parses_major_versions() {
        assert_eq!(parse_major("18"), Some(18));
        assert_eq!(parse_major("18.20.4"), Some(18));
        assert_eq!(parse_major("v18.17.0"), Some(18));
        assert_eq!(parse_major("latest"), None);
    }

    #[tokio::test]
    async fn resolves_from_tool_cache_and_prepends_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("node/18.20.4/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(dir.path().join("node/20.11.0/bin")).unwrap();

        let mut context = make_context();
        context.global_mut().tool_cache_directory = dir.path().to_string_lossy().into_owned();

        let host = ScriptedStepHost::default();
        SetupRuntimeHandler::new()
            .run_async(&mut context, &setup_step(Some("18")), &host)
            .await
            .unwrap();

        assert_eq!(context.result(), None);
        let prepend = context.global().prepend_path.clone();
        assert_eq!(prepend, vec![bin.to_string_lossy().into_owned()]);
        // No probe needed when the cache hits.
        assert!(host.invocations.lock().is_empty());
    }

    #[tokio::test]
    async fn tool_cache_prefers_highest_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node/18.17.0/bin")).unwrap();
        std::fs::create_dir_all(dir.path().join("node/18.20.4/bin")).unwrap();

        let hit = find_in_tool_cache(dir.path(), Some(18)).unwrap();
        assert_eq!(hit.version, "18.20.4");
    }

    #[tokio::test]
    async fn falls_back_to_system_node() {
        let mut context = make_context();
        context.global_mut().tool_cache_directory = "/nonexistent".to_string();

        let host = ScriptedStepHost::respond_with(vec![StepOutput {
            exit_code: 0,
            output_lines: vec!["v18.17.0".to_string()],
        }]);
        SetupRuntimeHandler::new()
            .run_async(&mut context, &setup_step(Some("18")), &host)
            .await
            .unwrap();

        assert_eq!(context.result(), None);
        assert!(context
            .log_lines()
            .iter()
            .any(|l| l.contains("Using system Node.js v18.17.0")));
    }

    #[tokio::test]
    async fn version_mismatch_fails_the_step() {
        let mut context = make_context();
        context.global_mut().tool_cache_directory = "/nonexistent".to_string();

        let host = ScriptedStepHost::respond_with(vec![StepOutput {
            exit_code: 0,
            output_lines: vec!["v20.11.0".to_string()],
        }]);
        SetupRuntimeHandler::new()
            .run_async(&mut context, &setup_step(Some("18")), &host)
            .await
            .unwrap();

        assert_eq!(context.result(), Some(RunResult::Failed));
    }

    #[tokio::test]
    async fn probe_failure_fails_the_step() {
        let mut context = make_context();
        context.global_mut().tool_cache_directory = "/nonexistent".to_string();

        let host = ScriptedStepHost::respond_with(vec![StepOutput {
            exit_code: 127,
            output_lines: Vec::new(),
        }]);
        SetupRuntimeHandler::new()
            .run_async(&mut context, &setup_step(None), &host)
            .await
            .unwrap();

        assert_eq!(context.result(), Some(RunResult::Failed));
    }
}
