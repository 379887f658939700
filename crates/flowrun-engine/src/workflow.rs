// Typed model for workflow YAML files, plus validation.
//
// The model is deliberately a subset of the hosted workflow schema: push
// triggers with branch filters, an inert schedule list, workflow/job/step
// environment, and `uses`/`run` steps.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Errors produced while loading or validating a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid workflow: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A parsed workflow definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: Option<String>,

    pub on: Triggers,

    /// Workflow-level environment mapping. Held verbatim after parse.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Parsed and surfaced, never enforced by a single-process runner.
    #[serde(default)]
    pub concurrency: Option<String>,

    pub jobs: Jobs,
}

impl Workflow {
    /// Load and parse a workflow from a YAML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, WorkflowError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse a workflow from YAML text. Does not validate.
    pub fn from_yaml(text: &str) -> Result<Self, WorkflowError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// The workflow display name, falling back to "workflow".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Check shape invariants that serde alone cannot express.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.on.push.is_none() && self.on.schedule.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow declares no triggers".to_string(),
            ));
        }

        for schedule in &self.on.schedule {
            let fields = schedule.cron.split_whitespace().count();
            if fields != 5 {
                return Err(WorkflowError::Validation(format!(
                    "schedule cron '{}' must have 5 fields, found {}",
                    schedule.cron, fields
                )));
            }
        }

        if self.jobs.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow declares no jobs".to_string(),
            ));
        }

        for (job_id, job) in self.jobs.iter() {
            if job.steps.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "job '{}' declares no steps",
                    job_id
                )));
            }

            for (index, step) in job.steps.iter().enumerate() {
                match (&step.uses, &step.run) {
                    (Some(_), Some(_)) => {
                        return Err(WorkflowError::Validation(format!(
                            "job '{}' step {} declares both 'uses' and 'run'",
                            job_id,
                            index + 1
                        )));
                    }
                    (None, None) => {
                        return Err(WorkflowError::Validation(format!(
                            "job '{}' step {} declares neither 'uses' nor 'run'",
                            job_id,
                            index + 1
                        )));
                    }
                    _ => {}
                }

                if let Some(ref uses) = step.uses {
                    ActionRef::parse(uses).map_err(|e| {
                        WorkflowError::Validation(format!(
                            "job '{}' step {}: {}",
                            job_id,
                            index + 1,
                            e
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Jobs (order-preserving map)
// ---------------------------------------------------------------------------

/// The workflow's jobs, in the order they are written.
#[derive(Debug, Clone, Default)]
pub struct Jobs(Vec<(String, Job)>);

impl Jobs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Job)> {
        self.0.iter().map(|(id, job)| (id.as_str(), job))
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.0
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, job)| job)
    }
}

impl<'de> Deserialize<'de> for Jobs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct JobsVisitor;

        impl<'de> serde::de::Visitor<'de> for JobsVisitor {
            type Value = Jobs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of job id to job definition")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Jobs, M::Error>
            where
                M: serde::de::MapAccess<'de>,
            {
                let mut jobs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, job)) = access.next_entry::<String, Job>()? {
                    jobs.push((id, job));
                }
                Ok(Jobs(jobs))
            }
        }

        deserializer.deserialize_map(JobsVisitor)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// The workflow's trigger surface.
///
/// Push is the only dispatchable event; schedule entries are parsed and
/// validated but never fire.
#[derive(Debug, Clone, Default)]
pub struct Triggers {
    pub push: Option<PushTrigger>,
    pub schedule: Vec<ScheduleTrigger>,
}

/// A push trigger with optional branch filters. An empty filter list matches
/// any branch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushTrigger {
    #[serde(default)]
    pub branches: Vec<String>,
}

/// An inert schedule entry, kept for validation and planning output only.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleTrigger {
    pub cron: String,
}

impl<'de> Deserialize<'de> for Triggers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // `on:` accepts a bare event name, a list of event names, or a map
        // with per-event configuration.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Names(Vec<String>),
            Map(TriggerMap),
        }

        #[derive(Deserialize)]
        struct TriggerMap {
            #[serde(default, deserialize_with = "null_as_default")]
            push: Option<PushTrigger>,
            #[serde(default, deserialize_with = "null_as_empty")]
            schedule: Vec<ScheduleTrigger>,
        }

        let repr = Repr::deserialize(deserializer)?;
        let triggers = match repr {
            Repr::Name(name) => Triggers {
                push: (name == "push").then(PushTrigger::default),
                schedule: Vec::new(),
            },
            Repr::Names(names) => Triggers {
                push: names
                    .iter()
                    .any(|n| n == "push")
                    .then(PushTrigger::default),
                schedule: Vec::new(),
            },
            Repr::Map(map) => Triggers {
                push: map.push,
                schedule: map.schedule,
            },
        };
        Ok(triggers)
    }
}

/// `push:` with no body still declares the trigger.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let value = Option::<T>::deserialize(deserializer)?;
    Ok(Some(value.unwrap_or_default()))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single job definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    #[serde(default)]
    pub name: Option<String>,

    /// The job guard. Evaluated before any step runs; a false guard skips
    /// the job without failing it.
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    pub runs_on: RunsOn,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl Job {
    /// Display name, falling back to the job id.
    pub fn display_name<'a>(&'a self, job_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(job_id)
    }
}

/// `runs-on`: a single label or a list of labels, all of which the runner
/// must carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RunsOn {
    One(String),
    Many(Vec<String>),
}

impl RunsOn {
    pub fn labels(&self) -> Vec<&str> {
        match self {
            RunsOn::One(label) => vec![label.as_str()],
            RunsOn::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }

    /// Whether every required label is present in the runner's label set.
    /// Matching is case-insensitive.
    pub fn satisfied_by(&self, runner_labels: &[String]) -> bool {
        self.labels().iter().all(|required| {
            runner_labels
                .iter()
                .any(|have| have.eq_ignore_ascii_case(required))
        })
    }

    /// Required labels missing from the runner's label set.
    pub fn missing_labels(&self, runner_labels: &[String]) -> Vec<String> {
        self.labels()
            .iter()
            .filter(|required| {
                !runner_labels
                    .iter()
                    .any(|have| have.eq_ignore_ascii_case(required))
            })
            .map(|s| s.to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single step: exactly one of `uses` or `run` (enforced by
/// `Workflow::validate`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub uses: Option<String>,

    #[serde(default)]
    pub run: Option<String>,

    #[serde(default, rename = "with")]
    pub with: BTreeMap<String, ScalarValue>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl Step {
    /// The step's `with:` inputs flattened to strings.
    pub fn inputs(&self) -> HashMap<String, String> {
        self.with
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// A YAML scalar input value (`with:` entries may be strings, booleans, or
/// numbers).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::String(s) => write!(f, "{}", s),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRef
// ---------------------------------------------------------------------------

/// A parsed `uses:` reference, `owner/repo@ref`. The ref is typically a
/// pinned commit SHA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
}

impl ActionRef {
    pub fn parse(reference: &str) -> Result<Self, WorkflowError> {
        let (slug, git_ref) = reference.split_once('@').ok_or_else(|| {
            WorkflowError::Validation(format!(
                "action reference '{}' is missing a '@ref' pin",
                reference
            ))
        })?;

        let (owner, repo) = slug.split_once('/').ok_or_else(|| {
            WorkflowError::Validation(format!(
                "action reference '{}' is not of the form owner/repo@ref",
                reference
            ))
        })?;

        if owner.is_empty() || repo.is_empty() || git_ref.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "action reference '{}' has an empty component",
                reference
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
        })
    }

    /// The `owner/repo` part, used to dispatch to built-in action handlers.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.git_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANDOMIZED_TESTS_WORKFLOW: &str = r#"
name: Randomized Tests
on:
  push:
    branches:
      - randomized-tests-runner
  # schedule:
  #   - cron: '0 * * * *'

env:
  CARGO_TERM_COLOR: always
  CARGO_INCREMENTAL: "0"
  RUST_BACKTRACE: "1"
  ZED_SERVER_URL: https://zed.dev

jobs:
  tests:
    name: Run randomized tests
    if: github.repository_owner == 'zed-industries'
    runs-on:
      - self-hosted
      - randomized-tests
    steps:
      - name: Install Node
        uses: actions/setup-node@b39b52d1213e96004bfcb1c61a8a6fa8ab84f3e8
        with:
          node-version: "18"

      - name: Checkout repo
        uses: actions/checkout@8ade135a41bc03ea155e62e844d188df1ea18608
        with:
          clean: false

      - name: Run randomized tests
        run: script/randomized-test-ci
"#;

    #[test]
    fn parses_full_workflow() {
        let workflow = Workflow::from_yaml(RANDOMIZED_TESTS_WORKFLOW).unwrap();
        workflow.validate().unwrap();

        assert_eq!(workflow.display_name(), "Randomized Tests");
        let push = workflow.on.push.as_ref().unwrap();
        assert_eq!(push.branches, vec!["randomized-tests-runner"]);
        assert!(workflow.on.schedule.is_empty());

        assert_eq!(workflow.env.len(), 4);
        assert_eq!(workflow.env.get("CARGO_TERM_COLOR").unwrap(), "always");
        assert_eq!(workflow.env.get("CARGO_INCREMENTAL").unwrap(), "0");
        assert_eq!(workflow.env.get("RUST_BACKTRACE").unwrap(), "1");
        assert_eq!(workflow.env.get("ZED_SERVER_URL").unwrap(), "https://zed.dev");

        assert_eq!(workflow.jobs.len(), 1);
        let job = workflow.jobs.get("tests").unwrap();
        assert_eq!(
            job.condition.as_deref(),
            Some("github.repository_owner == 'zed-industries'")
        );
        assert_eq!(job.runs_on.labels(), vec!["self-hosted", "randomized-tests"]);
        assert_eq!(job.steps.len(), 3);

        // `clean: false` survives as the string "false".
        let checkout = &job.steps[1];
        assert_eq!(checkout.inputs().get("clean").unwrap(), "false");

        let run = &job.steps[2];
        assert_eq!(run.run.as_deref(), Some("script/randomized-test-ci"));
    }

    #[test]
    fn jobs_preserve_declaration_order() {
        let yaml = r#"
on: push
jobs:
  zebra:
    runs-on: linux
    steps: [{run: "true"}]
  alpha:
    runs-on: linux
    steps: [{run: "true"}]
  middle:
    runs-on: linux
    steps: [{run: "true"}]
"#;
        let workflow = Workflow::from_yaml(yaml).unwrap();
        let ids: Vec<&str> = workflow.jobs.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn bare_push_trigger_forms() {
        let workflow = Workflow::from_yaml("on: push\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}").unwrap();
        assert!(workflow.on.push.is_some());
        assert!(workflow.on.push.unwrap().branches.is_empty());

        let workflow = Workflow::from_yaml("on: [push]\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}").unwrap();
        assert!(workflow.on.push.is_some());

        let workflow = Workflow::from_yaml("on:\n  push:\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}").unwrap();
        assert!(workflow.on.push.is_some());
    }

    #[test]
    fn schedule_parses_but_requires_five_fields() {
        let workflow = Workflow::from_yaml(
            "on:\n  schedule:\n    - cron: '0 * * * *'\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}",
        )
        .unwrap();
        workflow.validate().unwrap();
        assert_eq!(workflow.on.schedule.len(), 1);

        let workflow = Workflow::from_yaml(
            "on:\n  schedule:\n    - cron: '0 * *'\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}",
        )
        .unwrap();
        let err = workflow.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn validation_rejects_no_triggers() {
        let workflow = Workflow::from_yaml(
            "on: pull_request\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}",
        )
        .unwrap();
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_steps() {
        let both = Workflow::from_yaml(
            "on: push\njobs: {j: {runs-on: linux, steps: [{run: ls, uses: 'a/b@c'}]}}",
        )
        .unwrap();
        assert!(both.validate().is_err());

        let neither =
            Workflow::from_yaml("on: push\njobs: {j: {runs-on: linux, steps: [{name: empty}]}}")
                .unwrap();
        assert!(neither.validate().is_err());

        let no_steps = Workflow::from_yaml("on: push\njobs: {j: {runs-on: linux, steps: []}}").unwrap();
        assert!(no_steps.validate().is_err());
    }

    #[test]
    fn action_ref_parsing() {
        let r = ActionRef::parse("actions/checkout@8ade135a41bc03ea155e62e844d188df1ea18608").unwrap();
        assert_eq!(r.owner, "actions");
        assert_eq!(r.repo, "checkout");
        assert_eq!(r.slug(), "actions/checkout");
        assert_eq!(r.git_ref, "8ade135a41bc03ea155e62e844d188df1ea18608");

        assert!(ActionRef::parse("actions/checkout").is_err());
        assert!(ActionRef::parse("checkout@v4").is_err());
        assert!(ActionRef::parse("actions/checkout@").is_err());
    }

    #[test]
    fn runs_on_label_matching_is_case_insensitive() {
        let runs_on = RunsOn::Many(vec!["self-hosted".to_string(), "Linux".to_string()]);
        let labels = vec!["Self-Hosted".to_string(), "linux".to_string(), "X64".to_string()];
        assert!(runs_on.satisfied_by(&labels));

        let missing = RunsOn::Many(vec!["self-hosted".to_string(), "gpu".to_string()]);
        assert!(!missing.satisfied_by(&labels));
        assert_eq!(missing.missing_labels(&labels), vec!["gpu"]);
    }
}
