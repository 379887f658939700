// Trigger evaluation: decides whether a push event dispatches a workflow.
//
// Branch filters use the Actions pattern subset: `*` matches any run of
// non-slash characters, `**` matches anything, `?` matches one non-slash
// character. An empty filter list matches every branch.

use crate::event::PushEvent;
use crate::workflow::Workflow;
use regex::Regex;

/// The outcome of trigger evaluation for one workflow and event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Run,
    /// Skipped, not failed; carries a human-readable reason for logging.
    Skip(String),
}

impl TriggerDecision {
    pub fn is_run(&self) -> bool {
        matches!(self, TriggerDecision::Run)
    }
}

/// Evaluate the workflow's push trigger against a push event.
///
/// A workflow dispatches iff it declares a push trigger, the event's ref
/// names a branch, and the branch matches at least one filter. Schedule
/// triggers are inert configuration and never dispatch.
pub fn evaluate_push_trigger(workflow: &Workflow, event: &PushEvent) -> TriggerDecision {
    let push = match workflow.on.push {
        Some(ref push) => push,
        None => {
            return TriggerDecision::Skip(
                "workflow declares no push trigger (schedule entries never fire)".to_string(),
            );
        }
    };

    let branch = match event.branch() {
        Some(branch) => branch,
        None => {
            return TriggerDecision::Skip(format!(
                "event ref '{}' does not name a branch",
                event.git_ref
            ));
        }
    };

    if branch_matches(&push.branches, branch) {
        TriggerDecision::Run
    } else {
        TriggerDecision::Skip(format!(
            "branch '{}' matches none of the push branch filters {:?}",
            branch, push.branches
        ))
    }
}

/// Whether a branch name matches any of the filter patterns. An empty
/// pattern list matches everything.
pub fn branch_matches(patterns: &[String], branch: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns
        .iter()
        .any(|pattern| match pattern_to_regex(pattern) {
            Ok(regex) => regex.is_match(branch),
            Err(_) => {
                tracing::warn!("Ignoring unparseable branch filter '{}'", pattern);
                false
            }
        })
}

/// Translate one filter pattern into an anchored regex.
fn pattern_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    translated.push_str(".*");
                } else {
                    translated.push_str("[^/]*");
                }
            }
            '?' => translated.push_str("[^/]"),
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }

    translated.push('$');
    Regex::new(&translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PushEvent;
    use crate::workflow::Workflow;

    fn push_event(git_ref: &str) -> PushEvent {
        PushEvent::from_json(&format!(
            r#"{{"ref": "{}", "repository": {{"full_name": "zed-industries/zed"}}}}"#,
            git_ref
        ))
        .unwrap()
    }

    fn workflow(yaml: &str) -> Workflow {
        Workflow::from_yaml(yaml).unwrap()
    }

    #[test]
    fn literal_branch_filter() {
        let wf = workflow(
            "on:\n  push:\n    branches: [randomized-tests-runner]\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}",
        );

        let matching = push_event("refs/heads/randomized-tests-runner");
        assert!(evaluate_push_trigger(&wf, &matching).is_run());

        let other = push_event("refs/heads/main");
        match evaluate_push_trigger(&wf, &other) {
            TriggerDecision::Skip(reason) => assert!(reason.contains("main")),
            TriggerDecision::Run => panic!("should not run"),
        }
    }

    #[test]
    fn empty_filter_list_matches_any_branch() {
        let wf = workflow("on: push\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}");
        assert!(evaluate_push_trigger(&wf, &push_event("refs/heads/anything")).is_run());
    }

    #[test]
    fn tag_pushes_do_not_dispatch() {
        let wf = workflow("on: push\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}");
        let decision = evaluate_push_trigger(&wf, &push_event("refs/tags/v1.0"));
        assert!(!decision.is_run());
    }

    #[test]
    fn schedule_only_workflow_never_dispatches() {
        let wf = workflow(
            "on:\n  schedule:\n    - cron: '0 * * * *'\njobs: {j: {runs-on: linux, steps: [{run: ls}]}}",
        );
        let decision = evaluate_push_trigger(&wf, &push_event("refs/heads/main"));
        match decision {
            TriggerDecision::Skip(reason) => assert!(reason.contains("schedule")),
            TriggerDecision::Run => panic!("schedule must be inert"),
        }
    }

    #[test]
    fn single_star_does_not_cross_slashes() {
        let patterns = vec!["releases/*".to_string()];
        assert!(branch_matches(&patterns, "releases/v1"));
        assert!(!branch_matches(&patterns, "releases/v1/hotfix"));
        assert!(!branch_matches(&patterns, "releases"));
    }

    #[test]
    fn double_star_crosses_slashes() {
        let patterns = vec!["releases/**".to_string()];
        assert!(branch_matches(&patterns, "releases/v1"));
        assert!(branch_matches(&patterns, "releases/v1/hotfix"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let patterns = vec!["v?".to_string()];
        assert!(branch_matches(&patterns, "v1"));
        assert!(!branch_matches(&patterns, "v12"));
        assert!(!branch_matches(&patterns, "v/"));
    }

    #[test]
    fn literal_regex_characters_are_escaped() {
        let patterns = vec!["release.1".to_string()];
        assert!(branch_matches(&patterns, "release.1"));
        assert!(!branch_matches(&patterns, "releaseX1"));
    }
}
