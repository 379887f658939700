// Entry point for the flowrun command line.
//
// Parses arguments, wires up tracing and Ctrl-C handling, and dispatches to
// the engine. Exit codes: 0 success (including "nothing matched"), 1 a job
// ran and failed, 2 configuration problems.

mod dispatch;
mod settings;

use clap::{Parser, Subcommand};
use flowrun_common::constants::exit_code;
use flowrun_common::{RunResult, RunnerHome, TracingTraceWriter};
use flowrun_engine::{JobOptions, PushEvent, Workflow};
use settings::RunnerSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "flowrun", version, about = "Run GitHub-style workflows on the local machine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the jobs a push event triggers.
    Run {
        /// Path to the workflow YAML file.
        workflow: PathBuf,

        /// Path to the push event payload (JSON).
        #[arg(long)]
        event: PathBuf,

        /// Local repository directory for the checkout action.
        #[arg(long)]
        repository: Option<PathBuf>,

        /// Runner name (default: hostname).
        #[arg(long)]
        name: Option<String>,

        /// Additional runner labels; repeatable.
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Work directory (default: _work under the current directory).
        #[arg(long)]
        work_folder: Option<PathBuf>,

        /// Emit ##[debug] lines in step logs.
        #[arg(long)]
        debug: bool,
    },

    /// Show which jobs a push event would trigger, without running them.
    Plan {
        /// Path to the workflow YAML file.
        workflow: PathBuf,

        /// Path to the push event payload (JSON).
        #[arg(long)]
        event: PathBuf,

        /// Additional runner labels; repeatable.
        #[arg(long = "label")]
        labels: Vec<String>,
    },

    /// Parse and validate a workflow file.
    Check {
        /// Path to the workflow YAML file.
        workflow: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit = runtime.block_on(execute(cli.command));
    std::process::exit(exit);
}

async fn execute(command: Command) -> i32 {
    match command {
        Command::Check { workflow } => check(&workflow),
        Command::Plan {
            workflow,
            event,
            labels,
        } => plan(&workflow, &event, labels),
        Command::Run {
            workflow,
            event,
            repository,
            name,
            labels,
            work_folder,
            debug,
        } => run(&workflow, &event, repository, name, labels, work_folder, debug).await,
    }
}

fn load_workflow(path: &PathBuf) -> Result<Workflow, i32> {
    let workflow = Workflow::from_file(path).map_err(|error| {
        tracing::error!("{:#}", anyhow::Error::new(error));
        exit_code::CONFIG_ERROR
    })?;
    workflow.validate().map_err(|error| {
        tracing::error!("Workflow validation failed: {}", error);
        exit_code::CONFIG_ERROR
    })?;
    Ok(workflow)
}

fn load_event(path: &PathBuf) -> Result<PushEvent, i32> {
    PushEvent::from_file(path).map_err(|error| {
        tracing::error!("{:#}", error);
        exit_code::CONFIG_ERROR
    })
}

fn check(workflow_path: &PathBuf) -> i32 {
    match load_workflow(workflow_path) {
        Ok(workflow) => {
            println!(
                "OK: workflow '{}' with {} job(s)",
                workflow.display_name(),
                workflow.jobs.len()
            );
            exit_code::SUCCESS
        }
        Err(code) => code,
    }
}

fn plan(workflow_path: &PathBuf, event_path: &PathBuf, extra_labels: Vec<String>) -> i32 {
    let workflow = match load_workflow(workflow_path) {
        Ok(workflow) => workflow,
        Err(code) => return code,
    };
    let event = match load_event(event_path) {
        Ok(event) => event,
        Err(code) => return code,
    };

    let mut labels = RunnerSettings::default().labels;
    labels.extend(extra_labels);

    let plan = dispatch::plan(&workflow, &event, &labels);
    print!("{}", dispatch::render_plan(&plan, &workflow));
    exit_code::SUCCESS
}

async fn run(
    workflow_path: &PathBuf,
    event_path: &PathBuf,
    repository: Option<PathBuf>,
    name: Option<String>,
    extra_labels: Vec<String>,
    work_folder: Option<PathBuf>,
    debug: bool,
) -> i32 {
    let workflow = match load_workflow(workflow_path) {
        Ok(workflow) => workflow,
        Err(code) => return code,
    };
    let event = match load_event(event_path) {
        Ok(event) => event,
        Err(code) => return code,
    };

    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(error) => {
            tracing::error!("Failed to resolve the current directory: {}", error);
            return exit_code::CONFIG_ERROR;
        }
    };

    let mut settings = match RunnerSettings::load(&root) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!("{:#}", error);
            return exit_code::CONFIG_ERROR;
        }
    };

    // CLI flags override the settings file.
    if let Some(name) = name {
        settings.runner_name = name;
    }
    settings.labels.extend(extra_labels);
    if let Some(repository) = repository {
        settings.repository_source = Some(repository.to_string_lossy().into_owned());
    }
    if let Some(work_folder) = work_folder {
        settings.work_folder = work_folder.to_string_lossy().into_owned();
    }

    let home = RunnerHome::new(&root).with_work_folder(&settings.work_folder);

    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        if let Err(error) = ctrlc::set_handler(move || {
            tracing::info!("Cancellation requested; stopping after the current process exits.");
            cancel_token.cancel();
        }) {
            tracing::warn!("Failed to install the Ctrl-C handler: {}", error);
        }
    }

    let options = JobOptions {
        runner_name: settings.runner_name.clone(),
        labels: settings.labels.clone(),
        repository_source: settings.repository_source.clone(),
        write_debug: debug,
        cancel_token,
    };

    let trace = Arc::new(TracingTraceWriter);
    match dispatch::run(&workflow, &event, &home, trace, &options).await {
        Ok(result) => {
            tracing::info!("Run finished: {}", result);
            match result {
                RunResult::Succeeded | RunResult::SucceededWithIssues | RunResult::Skipped => {
                    exit_code::SUCCESS
                }
                _ => exit_code::JOB_FAILURE,
            }
        }
        Err(error) => {
            tracing::error!("Run failed: {:#}", error);
            exit_code::JOB_FAILURE
        }
    }
}
