// flowrun-engine: the core of the local workflow runner.
//
// Parses workflow definitions and push-event payloads, decides whether jobs
// should run (trigger, guard condition, labels), and executes job steps
// strictly in order with fail-fast semantics.

pub mod contexts;
pub mod event;
pub mod execution_context;
pub mod expressions;
pub mod handlers;
pub mod job_runner;
pub mod job_steps;
pub mod step_host;
pub mod steps_runner;
pub mod trigger;
pub mod workflow;

pub use event::PushEvent;
pub use job_runner::{JobOptions, JobRunner};
pub use trigger::TriggerDecision;
pub use workflow::{Workflow, WorkflowError};
