//! Workflow definitions
//!
//! A workflow is an ordered list of phases, each binding an agent persona
//! to an approval policy, pre-phase hooks and an optional retry override.
//! The catalogue is data; the driver is the machine that runs it.

mod driver;

pub use driver::{RunOutcome, WorkflowDriver};

use std::collections::HashMap;

/// One step of a workflow
#[derive(Debug, Clone)]
pub struct WorkflowPhase {
    /// Agent persona name
    pub agent: String,

    /// Human-facing label; also the source of checkpoint tag slugs
    pub display_name: String,

    /// Whether a human gate runs after this phase
    pub approval_required: bool,

    /// Hooks that must pass before the phase may execute
    pub pre_phase_hooks: Vec<String>,

    /// Override of the global retry ceiling
    pub max_retries: Option<u32>,
}

impl WorkflowPhase {
    fn new(agent: &str, display_name: &str) -> Self {
        Self {
            agent: agent.to_string(),
            display_name: display_name.to_string(),
            approval_required: false,
            pre_phase_hooks: Vec::new(),
            max_retries: None,
        }
    }

    fn with_approval(mut self) -> Self {
        self.approval_required = true;
        self
    }

    fn with_hook(mut self, hook: &str) -> Self {
        self.pre_phase_hooks.push(hook.to_string());
        self
    }
}

/// An ordered sequence of phases with a name
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub phases: Vec<WorkflowPhase>,
}

/// The builtin workflow catalogue
pub fn builtin_workflows() -> HashMap<String, Workflow> {
    let mut workflows = HashMap::new();

    workflows.insert(
        "new-feature".to_string(),
        Workflow {
            name: "new-feature".to_string(),
            phases: vec![
                WorkflowPhase::new("architect", "Design Review").with_approval(),
                WorkflowPhase::new("spec", "Specification"),
                WorkflowPhase::new("test-gen", "Test Generation"),
                WorkflowPhase::new("dev", "Implementation").with_hook("tdd-enforcement"),
                WorkflowPhase::new("qa", "Quality Assurance").with_hook("coverage-threshold"),
                WorkflowPhase::new("review", "Code Review").with_approval(),
                WorkflowPhase::new("docs", "Documentation"),
            ],
        },
    );

    workflows.insert(
        "bug-fix".to_string(),
        Workflow {
            name: "bug-fix".to_string(),
            phases: vec![
                WorkflowPhase::new("architect", "Root Cause Analysis"),
                WorkflowPhase::new("test-gen", "Regression Test"),
                WorkflowPhase::new("dev", "Fix Implementation").with_hook("tdd-enforcement"),
                WorkflowPhase::new("qa", "Verification"),
                WorkflowPhase::new("review", "Code Review").with_approval(),
            ],
        },
    );

    workflows.insert(
        "refactor".to_string(),
        Workflow {
            name: "refactor".to_string(),
            phases: vec![
                WorkflowPhase::new("architect", "Refactor Plan").with_approval(),
                WorkflowPhase::new("dev", "Refactor Implementation").with_hook("test-passing-enforcement"),
                WorkflowPhase::new("qa", "Behavior Verification").with_hook("test-passing-enforcement"),
                WorkflowPhase::new("review", "Code Review").with_approval(),
            ],
        },
    );

    workflows
}
