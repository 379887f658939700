// flowrun-common: foundation layer shared by the engine and the CLI.
// This crate has no dependencies on other flowrun crates.

pub mod constants;
pub mod job_log;
pub mod process_invoker;
pub mod run_result;
pub mod runner_home;
pub mod trace;
pub mod util;

// Re-export commonly used items at crate root
pub use constants::{
    Architecture, OsPlatform, WellKnownDirectory, CURRENT_ARCHITECTURE, CURRENT_PLATFORM,
};
pub use job_log::JobLogWriter;
pub use process_invoker::{ProcessExitCodeError, ProcessInvoker};
pub use run_result::{merge_run_results, RunResult};
pub use runner_home::RunnerHome;
pub use trace::{CollectingTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter};
