// Runner settings: a JSON file next to the runner root, with CLI flags
// layered on top.

use anyhow::{Context, Result};
use flowrun_common::constants::{
    SELF_HOSTED_LABEL, CURRENT_ARCHITECTURE, CURRENT_PLATFORM,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the settings file under the runner root.
pub const SETTINGS_FILE: &str = ".flowrun";

/// Persisted runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// The runner's display name. Defaults to the hostname.
    #[serde(default, rename = "RunnerName")]
    pub runner_name: String,

    /// Labels matched against each job's `runs-on`.
    #[serde(default, rename = "Labels")]
    pub labels: Vec<String>,

    /// The work directory; relative paths resolve against the root.
    #[serde(default, rename = "WorkFolder")]
    pub work_folder: String,

    /// Local directory the checkout action copies from.
    #[serde(default, rename = "RepositorySource")]
    pub repository_source: Option<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            runner_name: default_runner_name(),
            labels: default_labels(),
            work_folder: flowrun_common::constants::path::WORK_DIRECTORY.to_string(),
            repository_source: None,
        }
    }
}

impl RunnerSettings {
    /// Load settings from `<root>/.flowrun`, or the defaults when the file
    /// does not exist. A present but malformed file is an error.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_file(&root.join(SETTINGS_FILE))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let mut settings: RunnerSettings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        settings.fill_defaults();
        Ok(settings)
    }

    /// Replace empty fields with their defaults.
    fn fill_defaults(&mut self) {
        if self.runner_name.is_empty() {
            self.runner_name = default_runner_name();
        }
        if self.labels.is_empty() {
            self.labels = default_labels();
        }
        if self.work_folder.is_empty() {
            self.work_folder = flowrun_common::constants::path::WORK_DIRECTORY.to_string();
        }
    }
}

fn default_runner_name() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "flowrun".to_string())
}

/// The implicit label set: `self-hosted` plus the OS and architecture labels.
fn default_labels() -> Vec<String> {
    vec![
        SELF_HOSTED_LABEL.to_string(),
        CURRENT_PLATFORM.label_name().to_string(),
        CURRENT_ARCHITECTURE.label_name().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_platform_labels() {
        let settings = RunnerSettings::default();
        assert!(!settings.runner_name.is_empty());
        assert_eq!(settings.labels[0], SELF_HOSTED_LABEL);
        assert_eq!(settings.labels.len(), 3);
        assert_eq!(settings.work_folder, "_work");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunnerSettings::load(dir.path()).unwrap();
        assert_eq!(settings.labels.len(), 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"RunnerName": "ci-box", "Labels": ["self-hosted", "buildfarm"], "RepositorySource": "/srv/zed"}"#,
        )
        .unwrap();

        let settings = RunnerSettings::load(dir.path()).unwrap();
        assert_eq!(settings.runner_name, "ci-box");
        assert_eq!(settings.labels, vec!["self-hosted", "buildfarm"]);
        assert_eq!(settings.repository_source.as_deref(), Some("/srv/zed"));
        // Unset fields still fall back.
        assert_eq!(settings.work_folder, "_work");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "not-json").unwrap();
        assert!(RunnerSettings::load(dir.path()).is_err());
    }
}
