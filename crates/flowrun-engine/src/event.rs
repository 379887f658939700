// Push-event payload model: the subset of the webhook shape the runner
// consults, plus the raw payload for the `github.event` context.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// A push event read from a JSON payload file.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    /// Full ref, e.g. `refs/heads/randomized-tests-runner`.
    #[serde(rename = "ref")]
    pub git_ref: String,

    #[serde(default)]
    pub before: Option<String>,

    /// The commit SHA after the push; becomes `github.sha`.
    #[serde(default)]
    pub after: Option<String>,

    pub repository: Repository,

    #[serde(default)]
    pub pusher: Option<Pusher>,

    /// The full payload, preserved verbatim for `github.event`.
    #[serde(skip)]
    payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// `owner/name`.
    pub full_name: String,

    #[serde(default)]
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    /// Webhook payloads carry `login`; some fixtures carry `name`.
    #[serde(alias = "name")]
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    #[serde(alias = "login")]
    pub name: String,
}

impl PushEvent {
    /// Load a push event from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file '{}'", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse event file '{}'", path.display()))
    }

    /// Parse a push event from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let payload: serde_json::Value =
            serde_json::from_str(text).context("Event payload is not valid JSON")?;
        let mut event: PushEvent =
            serde_json::from_value(payload.clone()).context("Event payload is not a push event")?;
        event.payload = payload;
        Ok(event)
    }

    /// The raw payload for the `github.event` expression context.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// The short branch name, if the ref names a branch.
    ///
    /// `refs/heads/main` becomes `main`; tag refs return `None`.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    /// The repository owner, from `repository.owner` or the slug.
    pub fn repository_owner(&self) -> &str {
        if let Some(ref owner) = self.repository.owner {
            return &owner.login;
        }
        self.repository
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or("")
    }

    /// The SHA after the push, or an empty string when absent.
    pub fn sha(&self) -> &str {
        self.after.as_deref().unwrap_or("")
    }
}
