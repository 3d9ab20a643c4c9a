//! Phase executor with retry
//!
//! Wraps the agent loop: runs pre-phase hooks, executes the agent,
//! validates the structured output, and on recoverable failure retries
//! with a feedback preamble. Files, cost and turns accumulate across
//! attempts; `retry_attempts` is 0 on first-try success.

pub mod hooks;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::cost::CostTracker;
use crate::events::{EventBus, WorkflowEvent};
use crate::learnings::LearningsLoader;
use crate::llm::LlmClient;
use crate::personas::AgentPersona;
use crate::prompts::{PromptContext, PromptLoader};
use crate::r#loop::AgentLoop;
use crate::session::{PhaseResult, PhaseStatus, WorkflowState};
use crate::tools::{ToolContext, ToolExecutor};
use crate::workflow::WorkflowPhase;

pub use hooks::{HookKind, HookOutcome, run_hook};

/// Non-recoverable phase termination; these never retry
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{message}")]
    HookFailed { hook: String, message: String },

    #[error("{0}")]
    NonRecoverable(String),

    #[error("Unknown agent persona: {0}")]
    UnknownPersona(String),
}

/// Executes one phase against the shared dependencies
pub struct PhaseRunner {
    pub config: Config,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolExecutor>,
    pub personas: Arc<HashMap<&'static str, AgentPersona>>,
    pub prompts: Arc<PromptLoader>,
    pub learnings: LearningsLoader,
    pub events: Arc<EventBus>,

    /// Where the agent operates (sandbox clone when one is active)
    pub work_dir: PathBuf,

    /// Containment boundary for tool calls
    pub sandbox_boundary: Option<PathBuf>,
}

impl PhaseRunner {
    /// Execute one phase, retrying recoverable failures
    ///
    /// Returns a completed-or-failed `PhaseResult` (failed = retries
    /// exhausted); hook failures and budget/LLM-independent terminal
    /// conditions surface as `PhaseError`.
    pub async fn execute_phase(
        &self,
        phase: &WorkflowPhase,
        phase_index: usize,
        state: &WorkflowState,
        cost: &mut CostTracker,
    ) -> Result<PhaseResult, PhaseError> {
        let persona = self
            .personas
            .get(phase.agent.as_str())
            .ok_or_else(|| PhaseError::UnknownPersona(phase.agent.clone()))?;

        let model = self.resolve_model(persona);
        let max_attempts = 1 + phase.max_retries.unwrap_or(self.config.orchestrator.max_retries_per_phase);

        let mut accumulated = PhaseResult {
            agent: phase.agent.clone(),
            status: PhaseStatus::Failed,
            output: serde_json::Value::Null,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            commits: Vec::new(),
            cost_usd: 0.0,
            turns: 0,
            retry_attempts: 0,
            error: None,
        };
        let mut last_failure: Option<String> = None;

        for attempt in 1..=max_attempts {
            // Hooks run on every attempt; a failure is terminal
            for hook_name in &phase.pre_phase_hooks {
                let Some(kind) = HookKind::from_name(hook_name) else {
                    return Err(PhaseError::HookFailed {
                        hook: hook_name.clone(),
                        message: format!("Unknown pre-phase hook: {}", hook_name),
                    });
                };

                let outcome = run_hook(kind, state, &self.work_dir, &self.config.hooks).await;
                self.events.emit(WorkflowEvent::PrePhaseHook {
                    phase_index,
                    hook: kind.as_str().to_string(),
                    passed: outcome.passed,
                    message: outcome.message.clone(),
                });

                if !outcome.passed {
                    return Err(PhaseError::HookFailed {
                        hook: kind.as_str().to_string(),
                        message: outcome.message,
                    });
                }
            }

            let feedback = last_failure
                .as_deref()
                .map(|reason| build_retry_feedback(reason, &accumulated));
            let prompt = self.build_prompt(state, feedback);

            let tool_ctx = match &self.sandbox_boundary {
                Some(boundary) => ToolContext::sandboxed(self.work_dir.clone(), boundary.clone()),
                None => ToolContext::new(self.work_dir.clone()),
            };

            let agent_loop = AgentLoop::new(self.llm.clone(), &self.tools, &self.config);
            let run = agent_loop.run(persona, &model, &prompt, &tool_ctx, cost).await;

            merge_run(&mut accumulated, &run);

            let output = match run.outcome {
                Ok(output) => output,
                Err(failure) => {
                    if !failure.is_recoverable() {
                        return Err(PhaseError::NonRecoverable(failure.message()));
                    }
                    last_failure = Some(failure.message());
                    self.emit_retry(phase_index, phase, attempt, max_attempts, &failure.message());
                    continue;
                }
            };

            let validation = (persona.validator)(&output, state);
            if !validation.ok {
                let reason = format!("Validation failed: {}", validation.reason);
                last_failure = Some(reason.clone());
                self.emit_retry(phase_index, phase, attempt, max_attempts, &reason);
                continue;
            }

            accumulated.status = PhaseStatus::Completed;
            accumulated.output = output;
            accumulated.retry_attempts = attempt - 1;
            info!(
                "Phase {} completed (attempt {}, cost ${:.4})",
                phase.display_name, attempt, accumulated.cost_usd
            );
            return Ok(accumulated);
        }

        accumulated.retry_attempts = max_attempts.saturating_sub(1);
        accumulated.error = last_failure.or_else(|| Some("Phase failed".to_string()));
        Ok(accumulated)
    }

    /// Per-workflow model override beats the persona's default tier
    fn resolve_model(&self, persona: &AgentPersona) -> String {
        match &self.config.orchestrator.model_override {
            Some(model) => model.clone(),
            None => crate::personas::model_id(persona.default_model).to_string(),
        }
    }

    fn build_prompt(&self, state: &WorkflowState, retry_feedback: Option<String>) -> String {
        let context = PromptContext {
            description: state.description.clone(),
            prior_results: render_prior_results(state),
            retry_feedback,
            // Re-read every time so learnings captured mid-session apply
            learnings: self.learnings.load_preamble(),
            working_directory: self.work_dir.display().to_string(),
        };

        self.prompts.render_user_prompt(&context).unwrap_or_else(|e| {
            tracing::warn!("Prompt template rendering failed, using plain description: {}", e);
            state.description.clone()
        })
    }

    fn emit_retry(&self, phase_index: usize, phase: &WorkflowPhase, attempt: u32, max_attempts: u32, reason: &str) {
        // No retry event after the final attempt; nothing follows it
        if attempt < max_attempts {
            self.events.emit(WorkflowEvent::PhaseRetry {
                phase_index,
                agent: phase.agent.clone(),
                attempt,
                reason: reason.to_string(),
            });
        }
    }
}

/// Fold one attempt's artifacts into the accumulated result
fn merge_run(accumulated: &mut PhaseResult, run: &crate::r#loop::AgentRun) {
    for file in &run.files_created {
        if !accumulated.files_created.contains(file) {
            accumulated.files_created.push(file.clone());
        }
    }
    for file in &run.files_modified {
        if !accumulated.files_modified.contains(file) && !accumulated.files_created.contains(file) {
            accumulated.files_modified.push(file.clone());
        }
    }
    for commit in &run.commits {
        if !accumulated.commits.contains(commit) {
            accumulated.commits.push(commit.clone());
        }
    }
    accumulated.cost_usd += run.cost_usd;
    accumulated.turns += run.turns;
}

/// The feedback preamble prepended on attempt >= 2
fn build_retry_feedback(reason: &str, accumulated: &PhaseResult) -> String {
    let mut feedback = format!("**PHASE RETRY**\n\nThe previous attempt failed: {}\n", reason);

    if !accumulated.files_created.is_empty() {
        feedback.push_str(&format!(
            "\nFiles already created: {}\n",
            accumulated.files_created.join(", ")
        ));
    }
    if !accumulated.files_modified.is_empty() {
        feedback.push_str(&format!(
            "Files already modified: {}\n",
            accumulated.files_modified.join(", ")
        ));
    }

    feedback.push_str("\nDo NOT start over; continue from where you stopped.");
    feedback
}

/// Compact rendering of prior phase results for the next prompt
fn render_prior_results(state: &WorkflowState) -> Option<String> {
    if state.phase_results.is_empty() {
        return None;
    }

    let mut sections = Vec::new();
    for (agent, result) in &state.phase_results {
        let output = serde_json::to_string(&result.output).unwrap_or_default();
        sections.push(format!("## {}\n{}", agent, output));
    }
    Some(sections.join("\n\n"))
}
