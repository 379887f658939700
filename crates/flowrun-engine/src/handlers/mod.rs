// Step execution handlers. Scripts run through a shell; the two built-in
// actions (checkout, setup-node) have native handlers.

pub mod checkout;
pub mod script;
pub mod setup_runtime;

use crate::execution_context::ExecutionContext;
use crate::job_steps::{JobStep, StepKind};
use crate::step_host::StepHost;
use anyhow::{bail, Result};
use async_trait::async_trait;

pub const CHECKOUT_ACTION: &str = "actions/checkout";
pub const SETUP_NODE_ACTION: &str = "actions/setup-node";

/// Executes one materialized step.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run_async(
        &self,
        context: &mut ExecutionContext,
        step: &JobStep,
        host: &dyn StepHost,
    ) -> Result<()>;

    /// Populate the step environment: `INPUT_*` variables for action inputs,
    /// then the step's own `env:` entries.
    fn prepare_execution(&self, context: &mut ExecutionContext, step: &JobStep) {
        if let StepKind::Action { inputs, .. } = &step.kind {
            for (key, value) in inputs {
                let env_name = format!("INPUT_{}", key.to_uppercase().replace([' ', '-'], "_"));
                context.step_environment.insert(env_name, value.clone());
            }
        }
        for (key, value) in &step.env {
            context.step_environment.insert(key.clone(), value.clone());
        }
    }
}

/// Create the handler for a step.
///
/// `uses:` references outside the built-in set are an error; the step that
/// carries one fails rather than being silently skipped.
pub fn create_handler(kind: &StepKind) -> Result<Box<dyn Handler>> {
    match kind {
        StepKind::Script { .. } => Ok(Box::new(script::ScriptHandler::new())),
        StepKind::Action { reference, .. } => match reference.slug().as_str() {
            CHECKOUT_ACTION => Ok(Box::new(checkout::CheckoutHandler::new())),
            SETUP_NODE_ACTION => Ok(Box::new(setup_runtime::SetupRuntimeHandler::new())),
            other => bail!(
                "unsupported action '{}'; built-in actions are {} and {}",
                other,
                CHECKOUT_ACTION,
                SETUP_NODE_ACTION
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ActionRef;
    use std::collections::HashMap;

    #[test]
    fn factory_resolves_built_in_actions() {
        let script = StepKind::Script {
            script: "echo hi".to_string(),
            shell: None,
            working_directory: None,
        };
        assert!(create_handler(&script).is_ok());

        for slug in ["actions/checkout@v4", "actions/setup-node@v4"] {
            let kind = StepKind::Action {
                reference: ActionRef::parse(slug).unwrap(),
                inputs: HashMap::new(),
            };
            assert!(create_handler(&kind).is_ok());
        }
    }

    #[test]
    fn factory_rejects_unknown_action() {
        let kind = StepKind::Action {
            reference: ActionRef::parse("actions/cache@v4").unwrap(),
            inputs: HashMap::new(),
        };
        let err = create_handler(&kind).map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("actions/cache"));
    }

    #[test]
    fn prepare_execution_injects_input_environment() {
        let mut context = crate::execution_context::test_support::make_context();
        let mut inputs = HashMap::new();
        inputs.insert("node-version".to_string(), "18".to_string());
        let mut env = HashMap::new();
        env.insert("STEP_VAR".to_string(), "1".to_string());

        let step = JobStep {
            id: "s".to_string(),
            display_name: "s".to_string(),
            condition: String::new(),
            timeout: std::time::Duration::from_secs(60),
            continue_on_error: false,
            env,
            kind: StepKind::Action {
                reference: ActionRef::parse("actions/setup-node@v4").unwrap(),
                inputs,
            },
        };

        let handler = create_handler(&step.kind).unwrap();
        handler.prepare_execution(&mut context, &step);

        assert_eq!(
            context.step_environment.get("INPUT_NODE_VERSION").unwrap(),
            "18"
        );
        assert_eq!(context.step_environment.get("STEP_VAR").unwrap(), "1");
    }
}
