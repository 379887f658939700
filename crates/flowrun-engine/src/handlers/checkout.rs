// Native handler for `actions/checkout`. Copies the configured local
// repository source into the workspace instead of talking to git.

use anyhow::{Context, Result};
use async_trait::async_trait;
use flowrun_common::RunResult;
use std::path::Path;
use walkdir::WalkDir;

use crate::execution_context::ExecutionContext;
use crate::handlers::Handler;
use crate::job_steps::{JobStep, StepKind};
use crate::step_host::StepHost;

pub struct CheckoutHandler;

impl CheckoutHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CheckoutHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for CheckoutHandler {
    async fn run_async(
        &self,
        context: &mut ExecutionContext,
        step: &JobStep,
        _host: &dyn StepHost,
    ) -> Result<()> {
        self.prepare_execution(context, step);

        let inputs = match &step.kind {
            StepKind::Action { inputs, .. } => inputs.clone(),
            _ => anyhow::bail!("checkout handler invoked for a non-action step"),
        };

        // `clean: false` preserves whatever is already in the workspace and
        // overlays the fresh copy on top of it.
        let clean = inputs
            .get("clean")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        for ignored in ["ref", "fetch-depth", "token", "repository"] {
            if let Some(value) = inputs.get(ignored) {
                context.debug(&format!(
                    "Ignoring checkout input '{}: {}' (local source checkout)",
                    ignored, value
                ));
            }
        }

        let (source, workspace) = {
            let global = context.global();
            (
                global.repository_source.clone(),
                global.workspace_directory.clone(),
            )
        };

        let source = match source {
            Some(source) => source,
            None => {
                context.error(
                    "No repository source configured; pass --repository or set RepositorySource in the runner settings.",
                );
                context.complete(RunResult::Failed, Some("No repository source"));
                return Ok(());
            }
        };

        if !Path::new(&source).is_dir() {
            context.error(&format!("Repository source is not a directory: {}", source));
            context.complete(RunResult::Failed, Some("Invalid repository source"));
            return Ok(());
        }

        if clean {
            context.debug(&format!("Cleaning workspace: {}", workspace));
            clean_directory(Path::new(&workspace))
                .with_context(|| format!("Failed to clean workspace: {}", workspace))?;
        } else {
            context.debug("Skipping workspace clean (clean: false)");
        }

        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("Failed to create workspace: {}", workspace))?;

        let copied = copy_tree(Path::new(&source), Path::new(&workspace))
            .with_context(|| format!("Failed to copy repository from {}", source))?;

        context.info(&format!(
            "Checked out {} files from {} into {}",
            copied, source, workspace
        ));

        Ok(())
    }
}

/// Remove the contents of `directory` without removing the directory itself.
fn clean_directory(directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Recursively copy `source` into `target`, returning the file count.
fn copy_tree(source: &Path, target: &Path) -> Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .context("walked entry outside the source root")?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
        // Symlinks are skipped; a local source tree should not need them.
    }
    Ok(copied)
}
