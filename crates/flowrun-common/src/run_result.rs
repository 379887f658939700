// Run results for steps and jobs, plus worst-result-wins merging.

use serde::{Deserialize, Serialize};

/// Outcome of a step or a job.
///
/// The variant order is severity order, best to worst; `merge_run_results`
/// relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RunResult {
    Succeeded,
    SucceededWithIssues,
    Failed,
    Canceled,
    Skipped,
    Abandoned,
}

impl RunResult {
    /// Whether this result counts as a success when gating later steps.
    pub fn is_succeeded(self) -> bool {
        matches!(self, RunResult::Succeeded | RunResult::SucceededWithIssues)
    }

    /// The conclusion string exposed in expression contexts (`job.status`,
    /// step outcomes).
    pub fn conclusion_str(self) -> &'static str {
        match self {
            RunResult::Succeeded | RunResult::SucceededWithIssues => "success",
            RunResult::Failed | RunResult::Abandoned => "failure",
            RunResult::Canceled => "cancelled",
            RunResult::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunResult::Succeeded => write!(f, "Succeeded"),
            RunResult::SucceededWithIssues => write!(f, "SucceededWithIssues"),
            RunResult::Failed => write!(f, "Failed"),
            RunResult::Canceled => write!(f, "Canceled"),
            RunResult::Skipped => write!(f, "Skipped"),
            RunResult::Abandoned => write!(f, "Abandoned"),
        }
    }
}

/// Merge two results, keeping the "worst" (highest severity) one.
///
/// Severity order from best to worst:
/// `Succeeded`, `SucceededWithIssues`, `Failed`, `Canceled`, `Skipped`,
/// `Abandoned`.
///
/// Once the current result is worse than `Failed` (cancelled, skipped,
/// abandoned) it is final and later results cannot change it.
pub fn merge_run_results(current: Option<RunResult>, coming: RunResult) -> RunResult {
    match current {
        None => coming,
        Some(current) => {
            if current > RunResult::Failed {
                return current;
            }
            if coming >= current {
                return coming;
            }
            current
        }
    }
}
