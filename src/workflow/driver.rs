//! Workflow driver - the orchestrator state machine
//!
//! Iterates phases in order, enforces workflow-wide budget and time caps,
//! emits the event stream, suspends at approval gates and finalizes on
//! completion. Exactly one workflow runs per driver instance; the driver
//! exclusively owns the `WorkflowState` and persists it at every
//! transition, so a session survives the process.
//!
//! The approval gate is a suspend point: `run_workflow` returns
//! `AwaitingApproval` and the caller feeds the decision back through
//! `continue_workflow`. Consumers observe progress by subscribing to the
//! event bus before driving.

use chrono::Utc;
use eyre::{Result, eyre};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::checkpoint::CheckpointManager;
use crate::config::{ApprovalMode, Config};
use crate::cost::CostTracker;
use crate::events::{EventBus, EventEnvelope, WorkflowEvent, spawn_event_logger};
use crate::learnings::LearningsLoader;
use crate::llm::LlmClient;
use crate::personas::{AgentPersona, builtin_personas};
use crate::phase::PhaseRunner;
use crate::prompts::PromptLoader;
use crate::sandbox::{Sandbox, install_signal_cleanup};
use crate::session::{PhaseStatus, SessionStatus, SessionStore, WorkflowState};
use crate::tools::{McpClient, ToolExecutor};

use super::{Workflow, builtin_workflows};

/// How a driver call ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// All phases done, finalization succeeded
    Completed,
    /// Terminal failure; the session file holds the error too
    Failed { error: String },
    /// Approval denied or operator abort
    Cancelled { reason: String },
    /// Suspended at an approval gate; resume via `continue_workflow`
    AwaitingApproval { phase: String },
}

/// Drives one workflow session
pub struct WorkflowDriver {
    config: Config,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    personas: Arc<HashMap<&'static str, AgentPersona>>,
    workflows: HashMap<String, Workflow>,
    prompts: Arc<PromptLoader>,
    learnings: LearningsLoader,
    store: SessionStore,
    events: Arc<EventBus>,
    cost: CostTracker,
    state: Option<WorkflowState>,
    sandbox: Option<Sandbox>,
    working_directory: PathBuf,
}

impl WorkflowDriver {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>, working_directory: PathBuf) -> Result<Self> {
        let cost = CostTracker::new(config.orchestrator.max_budget_usd);
        Ok(Self {
            store: SessionStore::new(&working_directory),
            learnings: LearningsLoader::new(&working_directory),
            prompts: Arc::new(PromptLoader::new()?),
            personas: Arc::new(builtin_personas()),
            workflows: builtin_workflows(),
            tools: Arc::new(ToolExecutor::standard()),
            events: Arc::new(EventBus::with_default_capacity()),
            cost,
            state: None,
            sandbox: None,
            config,
            llm,
            working_directory,
        })
    }

    /// Register the forwarded MCP tool family
    ///
    /// Must be called before the first phase runs (the executor is shared
    /// once phases start).
    pub fn register_mcp(&mut self, client: Arc<McpClient>) -> Result<()> {
        let tools = Arc::get_mut(&mut self.tools).ok_or_else(|| eyre!("tool executor already shared"))?;
        tools.register_mcp(client);
        Ok(())
    }

    /// Subscribe to the event stream; call before driving
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Current session state, if a workflow is active
    pub fn state(&self) -> Option<&WorkflowState> {
        self.state.as_ref()
    }

    /// Session store backing this driver
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a new workflow session
    pub async fn run_workflow(
        &mut self,
        workflow_name: &str,
        description: &str,
        session_id: Option<String>,
    ) -> Result<RunOutcome> {
        let workflow = self
            .workflows
            .get(workflow_name)
            .ok_or_else(|| eyre!("Unknown workflow: {}", workflow_name))?
            .clone();

        let session_id = session_id.unwrap_or_else(WorkflowState::generate_session_id);
        let state = WorkflowState::new(session_id.clone(), workflow_name, description);

        self.cost = CostTracker::new(self.config.orchestrator.max_budget_usd);
        self.store.save(&state).await?;

        if self.config.orchestrator.autonomous {
            let log_path = self
                .working_directory
                .join(".feature-factory")
                .join(format!("autonomous-{}.log", session_id));
            spawn_event_logger(&self.events, log_path);
        }

        self.events.emit(WorkflowEvent::WorkflowStarted {
            session_id,
            workflow: workflow_name.to_string(),
            total_phases: workflow.phases.len(),
        });

        self.state = Some(state);
        self.run_phases().await
    }

    /// Feed back an approval decision; precondition: awaiting approval
    pub async fn continue_workflow(&mut self, approved: bool, reason: Option<&str>) -> Result<RunOutcome> {
        let mut state = self.state.take().ok_or_else(|| eyre!("no active workflow"))?;

        if state.status != SessionStatus::AwaitingApproval {
            let status = state.status;
            self.state = Some(state);
            return Err(eyre!("Workflow is not awaiting approval (status: {:?})", status));
        }

        self.events.emit(WorkflowEvent::ApprovalReceived {
            approved,
            reason: reason.map(str::to_string),
        });

        if !approved {
            let reason = reason.unwrap_or("Approval denied").to_string();
            state.cancel(reason.clone());
            self.store.save(&state).await?;
            self.events.emit(WorkflowEvent::WorkflowError {
                session_id: state.session_id.clone(),
                error: reason.clone(),
                recoverable: false,
            });
            self.discard_sandbox().await;
            self.state = Some(state);
            return Ok(RunOutcome::Cancelled { reason });
        }

        state.status = SessionStatus::Running;
        state.current_phase_index += 1;
        state.updated_at = Utc::now();
        self.store.save(&state).await?;
        self.state = Some(state);
        self.run_phases().await
    }

    /// Rehydrate a suspended session into this driver
    ///
    /// The session stays at its approval gate; the caller decides via
    /// `continue_workflow` exactly as an uninterrupted driver would.
    pub async fn resume_workflow(&mut self, session_id: &str) -> Result<RunOutcome> {
        let state = self.store.load_resumable(session_id).await?;

        let workflow = self
            .workflows
            .get(&state.workflow)
            .ok_or_else(|| eyre!("Unknown workflow: {}", state.workflow))?;
        let phase_name = workflow
            .phases
            .get(state.current_phase_index)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();

        self.cost = CostTracker::new(self.config.orchestrator.max_budget_usd);
        self.cost.add_cost(state.cumulative_cost_usd);

        self.events.emit(WorkflowEvent::WorkflowResumed {
            session_id: state.session_id.clone(),
            phase_index: state.current_phase_index,
        });

        info!("Resumed session {} at phase {}", state.session_id, state.current_phase_index);
        self.state = Some(state);
        Ok(RunOutcome::AwaitingApproval { phase: phase_name })
    }

    /// Run phases from `current_phase_index` until done, failed or gated
    async fn run_phases(&mut self) -> Result<RunOutcome> {
        let mut state = self.state.take().ok_or_else(|| eyre!("no active workflow"))?;
        let outcome = self.drive(&mut state).await;
        self.state = Some(state);
        outcome
    }

    async fn drive(&mut self, state: &mut WorkflowState) -> Result<RunOutcome> {
        let workflow = self
            .workflows
            .get(&state.workflow)
            .ok_or_else(|| eyre!("Unknown workflow: {}", state.workflow))?
            .clone();

        self.ensure_sandbox().await?;
        let work_dir = match &self.sandbox {
            Some(sandbox) => sandbox.sandbox_directory.clone(),
            None => self.working_directory.clone(),
        };
        let boundary = self.sandbox.as_ref().map(|s| s.sandbox_directory.clone());
        let checkpoints = self
            .config
            .orchestrator
            .checkpoints_enabled
            .then(|| CheckpointManager::new(work_dir.clone()));

        while state.current_phase_index < workflow.phases.len() {
            let idx = state.current_phase_index;
            let phase = workflow.phases[idx].clone();

            // Workflow-wide caps are checked at the top of every phase
            let elapsed_ms = (Utc::now() - state.started_at).num_milliseconds().max(0) as u64;
            if elapsed_ms >= self.config.orchestrator.max_workflow_duration_ms {
                return self.fail_workflow(state, "Workflow time exceeded").await;
            }
            if let Err(e) = self.cost.check_budget() {
                return self.fail_workflow(state, &e.to_string()).await;
            }

            self.events.emit(WorkflowEvent::PhaseStarted {
                phase_index: idx,
                agent: phase.agent.clone(),
                display_name: phase.display_name.clone(),
            });

            // One checkpoint per phase, before the first attempt; retries
            // reuse it so the tag always marks the pre-phase state
            if let Some(manager) = &checkpoints
                && !state.checkpoints.contains_key(&phase.agent)
            {
                match manager.create_checkpoint(&state.session_id, idx, &phase.display_name).await {
                    Ok(checkpoint) => {
                        state.checkpoints.insert(phase.agent.clone(), checkpoint.tag_name.clone());
                        self.events.emit(WorkflowEvent::CheckpointCreated {
                            phase_index: idx,
                            tag: checkpoint.tag_name,
                        });
                    }
                    Err(e) => warn!("Checkpoint creation failed for phase {}: {}", phase.display_name, e),
                }
            }

            let runner = self.phase_runner(work_dir.clone(), boundary.clone());
            let result = runner.execute_phase(&phase, idx, state, &mut self.cost).await;

            match result {
                Err(e) => return self.fail_workflow(state, &e.to_string()).await,
                Ok(result) if result.status == PhaseStatus::Failed => {
                    let error = result.error.clone().unwrap_or_else(|| "Phase failed".to_string());
                    state.record_phase_result(result);
                    return self.fail_workflow(state, &error).await;
                }
                Ok(result) => {
                    let phase_cost = result.cost_usd;
                    let retry_attempts = result.retry_attempts;
                    state.record_phase_result(result);
                    self.store.save(state).await?;

                    self.events.emit(WorkflowEvent::PhaseCompleted {
                        phase_index: idx,
                        agent: phase.agent.clone(),
                        retry_attempts,
                    });
                    self.events.emit(WorkflowEvent::CostUpdate {
                        phase_cost_usd: phase_cost,
                        cumulative_cost_usd: state.cumulative_cost_usd,
                    });

                    if phase.approval_required && self.config.orchestrator.approval_mode == ApprovalMode::AfterEachPhase
                    {
                        state.status = SessionStatus::AwaitingApproval;
                        state.updated_at = Utc::now();
                        self.store.save(state).await?;
                        self.events.emit(WorkflowEvent::ApprovalRequested {
                            phase_index: idx,
                            phase: phase.display_name.clone(),
                        });
                        return Ok(RunOutcome::AwaitingApproval {
                            phase: phase.display_name,
                        });
                    }

                    state.current_phase_index += 1;
                    self.store.save(state).await?;
                }
            }
        }

        self.finalize(state, &work_dir).await
    }

    /// Cleanup checkpoints, copy the sandbox back, mark completed
    async fn finalize(&mut self, state: &mut WorkflowState, work_dir: &PathBuf) -> Result<RunOutcome> {
        if self.config.orchestrator.checkpoints_enabled {
            let manager = CheckpointManager::new(work_dir.clone());
            if let Err(e) = manager.cleanup_checkpoints(&state.session_id).await {
                warn!("Checkpoint cleanup failed: {}", e);
            }
            state.checkpoints.clear();
        }

        if let Some(sandbox) = self.sandbox.take() {
            match sandbox.copy_results_back().await {
                Ok(report) => {
                    info!(
                        "Sandbox results copied back ({} files, {} skipped)",
                        report.files_copied.len(),
                        report.skipped.len()
                    );
                    let _ = sandbox.cleanup().await;
                }
                Err(e) => {
                    // Work stays in the sandbox for manual recovery
                    let error = format!("Sandbox copy-back failed: {}", e);
                    warn!("{} (sandbox kept at {})", error, sandbox.sandbox_directory.display());
                    state.fail(error.clone());
                    self.store.save(state).await?;
                    self.events.emit(WorkflowEvent::WorkflowError {
                        session_id: state.session_id.clone(),
                        error: error.clone(),
                        recoverable: false,
                    });
                    return Ok(RunOutcome::Failed { error });
                }
            }
        }

        state.complete();
        self.store.save(state).await?;
        self.events.emit(WorkflowEvent::WorkflowCompleted {
            session_id: state.session_id.clone(),
            success: true,
            total_cost_usd: state.cumulative_cost_usd,
        });

        Ok(RunOutcome::Completed)
    }

    async fn fail_workflow(&mut self, state: &mut WorkflowState, error: &str) -> Result<RunOutcome> {
        state.fail(error);
        self.store.save(state).await?;
        self.events.emit(WorkflowEvent::WorkflowError {
            session_id: state.session_id.clone(),
            error: error.to_string(),
            recoverable: false,
        });
        // The clone is disposable; the user's tree was never touched.
        // Checkpoints are retained (when no sandbox) for manual rollback.
        self.discard_sandbox().await;
        Ok(RunOutcome::Failed {
            error: error.to_string(),
        })
    }

    async fn ensure_sandbox(&mut self) -> Result<()> {
        if self.config.sandbox.enabled && self.sandbox.is_none() {
            let sandbox = Sandbox::create(&self.working_directory, self.config.sandbox.base_dir.as_deref()).await?;
            install_signal_cleanup(sandbox.sandbox_directory.clone());
            self.sandbox = Some(sandbox);
        }
        Ok(())
    }

    async fn discard_sandbox(&mut self) {
        if let Some(sandbox) = self.sandbox.take()
            && let Err(e) = sandbox.cleanup().await
        {
            warn!("Sandbox cleanup failed: {}", e);
        }
    }

    fn phase_runner(&self, work_dir: PathBuf, sandbox_boundary: Option<PathBuf>) -> PhaseRunner {
        PhaseRunner {
            config: self.config.clone(),
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            personas: self.personas.clone(),
            prompts: self.prompts.clone(),
            learnings: self.learnings.clone(),
            events: self.events.clone(),
            work_dir,
            sandbox_boundary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use tempfile::tempdir;

    fn text_response(text: &str, input_tokens: u64, output_tokens: u64) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens,
                output_tokens,
            },
        }
    }

    /// Valid outputs for the full new-feature phase sequence
    fn happy_path_responses() -> Vec<CompletionResponse> {
        vec![
            text_response(r#"{"design": "plan", "approved": true}"#, 1000, 100),
            text_response(r#"{"requirements": ["r1"], "acceptanceCriteria": ["a1"]}"#, 1000, 100),
            text_response(r#"{"testsCreated": 3, "allTestsFailing": true, "testFiles": ["t.rs"]}"#, 1000, 100),
            text_response(r#"{"summary": "implemented", "testsPassing": true}"#, 1000, 100),
            text_response(r#"{"passed": true, "issues": []}"#, 1000, 100),
            text_response(r#"{"approved": true, "comments": []}"#, 1000, 100),
            text_response(r#"{"filesUpdated": ["README.md"], "summary": "docs"}"#, 1000, 100),
        ]
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.orchestrator.approval_mode = ApprovalMode::None;
        config.orchestrator.checkpoints_enabled = false;
        // The qa phase's coverage hook must pass without a real test suite
        config.hooks.coverage_command = "echo '100%'".to_string();
        config.hooks.test_command = "true".to_string();
        config
    }

    fn driver(responses: Vec<CompletionResponse>, config: Config, dir: &std::path::Path) -> WorkflowDriver {
        WorkflowDriver::new(config, Arc::new(MockLlmClient::new(responses)), dir.to_path_buf()).unwrap()
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<EventEnvelope>) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            events.push(envelope.event.event_type().to_string());
        }
        events
    }

    #[tokio::test]
    async fn test_happy_path_event_sequence() {
        let temp = tempdir().unwrap();
        let mut driver = driver(happy_path_responses(), test_config(), temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed));

        let events = drain(&mut rx);
        // Passing hook events (dev, qa) are interleaved; everything else is
        // the canonical sequence
        let core: Vec<&String> = events.iter().filter(|e| e.as_str() != "pre-phase-hook").collect();
        let mut expected = vec!["workflow-started".to_string()];
        for _ in 0..7 {
            expected.push("phase-started".to_string());
            expected.push("phase-completed".to_string());
            expected.push("cost-update".to_string());
        }
        expected.push("workflow-completed".to_string());
        assert_eq!(core, expected.iter().collect::<Vec<_>>());
        assert!(!events.contains(&"phase-retry".to_string()));
        assert!(!events.contains(&"approval-requested".to_string()));

        let state = driver.state().unwrap();
        assert_eq!(state.status, SessionStatus::Completed);
        assert_eq!(state.current_phase_index, 7);
        assert_eq!(state.phase_results.len(), 7);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_an_error() {
        let temp = tempdir().unwrap();
        let mut driver = driver(vec![], test_config(), temp.path());

        let result = driver.run_workflow("no-such-workflow", "x", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_budget_exceeded_before_any_phase() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        config.orchestrator.max_budget_usd = 0.0;
        let mut driver = driver(happy_path_responses(), config, temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        match outcome {
            RunOutcome::Failed { error } => assert!(error.contains("Budget exceeded")),
            other => panic!("Expected Failed, got {:?}", other),
        }

        let events = drain(&mut rx);
        assert_eq!(events, vec!["workflow-started", "workflow-error"]);
        assert_eq!(driver.state().unwrap().status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_budget_exceeded_mid_workflow() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        // First phase costs ~$4.50 at sonnet rates with these token counts
        config.orchestrator.max_budget_usd = 0.01;
        let responses = vec![text_response(
            r#"{"design": "plan", "approved": true}"#,
            500_000,
            200_000,
        )];
        let mut driver = driver(responses, config, temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        match outcome {
            RunOutcome::Failed { error } => assert!(error.contains("Budget exceeded")),
            other => panic!("Expected Failed, got {:?}", other),
        }

        let events = drain(&mut rx);
        // Phase 1 completes; the pre-phase check for phase 2 fires
        assert_eq!(
            events,
            vec![
                "workflow-started",
                "phase-started",
                "phase-completed",
                "cost-update",
                "workflow-error"
            ]
        );
        // No retries on budget failure
        assert!(!events.contains(&"phase-retry".to_string()));
    }

    #[tokio::test]
    async fn test_approval_gate_suspends_and_rejection_cancels() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        config.orchestrator.approval_mode = ApprovalMode::AfterEachPhase;
        let mut driver = driver(happy_path_responses(), config, temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        match &outcome {
            RunOutcome::AwaitingApproval { phase } => assert_eq!(phase, "Design Review"),
            other => panic!("Expected AwaitingApproval, got {:?}", other),
        }

        let events = drain(&mut rx);
        assert_eq!(events.last().unwrap(), "approval-requested");
        assert_eq!(driver.state().unwrap().status, SessionStatus::AwaitingApproval);

        let outcome = driver.continue_workflow(false, Some("Need changes")).await.unwrap();
        match outcome {
            RunOutcome::Cancelled { reason } => assert_eq!(reason, "Need changes"),
            other => panic!("Expected Cancelled, got {:?}", other),
        }

        let events = drain(&mut rx);
        assert_eq!(events, vec!["approval-received", "workflow-error"]);
        let state = driver.state().unwrap();
        assert_eq!(state.status, SessionStatus::Cancelled);
        assert_eq!(state.error.as_deref(), Some("Need changes"));
    }

    #[tokio::test]
    async fn test_approval_then_continue_to_completion() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        config.orchestrator.approval_mode = ApprovalMode::AfterEachPhase;
        let mut driver = driver(happy_path_responses(), config, temp.path());

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::AwaitingApproval { .. }));

        // Approve the architect gate; next stop is the review gate
        let outcome = driver.continue_workflow(true, None).await.unwrap();
        match &outcome {
            RunOutcome::AwaitingApproval { phase } => assert_eq!(phase, "Code Review"),
            other => panic!("Expected review gate, got {:?}", other),
        }

        // Approve the review gate; docs runs and the workflow completes
        let outcome = driver.continue_workflow(true, None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed));
        assert_eq!(driver.state().unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_continue_without_gate_is_an_error() {
        let temp = tempdir().unwrap();
        let mut driver = driver(happy_path_responses(), test_config(), temp.path());

        driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        // Workflow already completed; no gate to answer
        assert!(driver.continue_workflow(true, None).await.is_err());
    }

    #[tokio::test]
    async fn test_session_round_trip_through_resume() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        config.orchestrator.approval_mode = ApprovalMode::AfterEachPhase;

        // Driver A runs to the first gate, then is dropped
        let session_id = {
            let mut driver = driver(happy_path_responses(), config.clone(), temp.path());
            let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
            assert!(matches!(outcome, RunOutcome::AwaitingApproval { .. }));
            driver.state().unwrap().session_id.clone()
        };

        // Driver B resumes the session from disk with the remaining script
        let remaining: Vec<CompletionResponse> = happy_path_responses().into_iter().skip(1).collect();
        let mut driver = driver(remaining, config, temp.path());

        let outcome = driver.resume_workflow(&session_id).await.unwrap();
        match &outcome {
            RunOutcome::AwaitingApproval { phase } => assert_eq!(phase, "Design Review"),
            other => panic!("Expected gate after resume, got {:?}", other),
        }

        let outcome = driver.continue_workflow(true, None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::AwaitingApproval { .. }));
        let outcome = driver.continue_workflow(true, None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed));

        let state = driver.state().unwrap();
        assert_eq!(state.status, SessionStatus::Completed);
        assert_eq!(state.phase_results.len(), 7);
        // Costs from before the suspension carried over
        assert!(state.cumulative_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_resume_rejects_non_resumable_session() {
        let temp = tempdir().unwrap();
        let mut driver = driver(happy_path_responses(), test_config(), temp.path());

        driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        let session_id = driver.state().unwrap().session_id.clone();

        let mut fresh = WorkflowDriver::new(
            test_config(),
            Arc::new(MockLlmClient::new(vec![])),
            temp.path().to_path_buf(),
        )
        .unwrap();
        assert!(fresh.resume_workflow(&session_id).await.is_err());
    }

    #[tokio::test]
    async fn test_validation_retry_appears_in_stream() {
        let temp = tempdir().unwrap();
        let mut responses = happy_path_responses();
        // First architect output is rejected by the validator, second passes
        responses.insert(0, text_response(r#"{"design": "plan", "approved": false}"#, 1000, 100));
        let mut driver = driver(responses, test_config(), temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed));

        let events = drain(&mut rx);
        let retry_pos = events.iter().position(|e| e == "phase-retry").unwrap();
        let completed_pos = events.iter().position(|e| e == "phase-completed").unwrap();
        assert!(retry_pos < completed_pos);

        let state = driver.state().unwrap();
        assert_eq!(state.phase_results["architect"].retry_attempts, 1);
    }

    #[tokio::test]
    async fn test_tdd_violation_fails_workflow() {
        let temp = tempdir().unwrap();
        let mut responses = happy_path_responses();
        // test-gen reports passing tests; the tdd hook before dev must fire
        responses[2] = text_response(r#"{"testsCreated": 3, "allTestsFailing": false, "testFiles": []}"#, 1000, 100);
        let mut driver = driver(responses, test_config(), temp.path());
        let mut rx = driver.subscribe();

        let outcome = driver.run_workflow("new-feature", "Test feature", None).await.unwrap();
        match outcome {
            RunOutcome::Failed { error } => assert!(error.contains("TDD VIOLATION")),
            other => panic!("Expected Failed, got {:?}", other),
        }

        let events = drain(&mut rx);
        let hook_pos = events.iter().position(|e| e == "pre-phase-hook").unwrap();
        let error_pos = events.iter().position(|e| e == "workflow-error").unwrap();
        assert!(hook_pos < error_pos);
        // The hook failure is not retried
        assert!(!events.contains(&"phase-retry".to_string()));
    }

    #[tokio::test]
    async fn test_cost_updates_are_monotonic() {
        let temp = tempdir().unwrap();
        let mut driver = driver(happy_path_responses(), test_config(), temp.path());
        let mut rx = driver.subscribe();

        driver.run_workflow("new-feature", "Test feature", None).await.unwrap();

        let mut last = 0.0;
        while let Ok(envelope) = rx.try_recv() {
            if let WorkflowEvent::CostUpdate {
                cumulative_cost_usd, ..
            } = envelope.event
            {
                assert!(cumulative_cost_usd >= last);
                last = cumulative_cost_usd;
            }
        }
        assert!(last > 0.0);
    }

    #[tokio::test]
    async fn test_session_persisted_after_every_phase() {
        let temp = tempdir().unwrap();
        let mut driver = driver(happy_path_responses(), test_config(), temp.path());

        driver.run_workflow("new-feature", "Test feature", None).await.unwrap();

        let sessions = driver.store().list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.phase_results.len(), 7);
        assert!(session.completed_at.is_some());
    }
}
