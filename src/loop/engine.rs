//! AgentLoop - executes one phase's agentic loop
//!
//! prompt -> model reply -> tool dispatch -> repeat, until the persona
//! produces structured output or a cap fires. The loop is strictly serial:
//! every model call and every tool call completes before the next
//! iteration begins. Conversation state lives here for the duration of the
//! phase and is dropped when it ends; the structured output is the only
//! cross-phase carrier.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Config, StallConfig};
use crate::context::{ContextManager, truncate_tool_output};
use crate::cost::CostTracker;
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, StopReason};
use crate::personas::AgentPersona;
use crate::stall::{StallAction, StallTracker};
use crate::tools::{ToolContext, ToolExecutor};

use super::output::parse_structured_output;

/// Why a phase attempt did not produce structured output
#[derive(Debug, Clone)]
pub enum AgentFailure {
    /// Turn cap hit (recoverable)
    MaxTurns(u32),
    /// Wall-clock cap hit (recoverable)
    TimeExceeded(u64),
    /// Stall tracker hard stop (recoverable); message begins `STALLED:`
    Stalled(String),
    /// Budget gate fired mid-phase (non-recoverable)
    BudgetExceeded(String),
    /// LLM API error (recoverable via phase retry)
    Llm(String),
}

impl AgentFailure {
    /// Budget exhaustion is the only in-loop failure that must not retry
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AgentFailure::BudgetExceeded(_))
    }

    pub fn message(&self) -> String {
        match self {
            AgentFailure::MaxTurns(cap) => format!("Max turns ({}) exceeded", cap),
            AgentFailure::TimeExceeded(ms) => format!("Time exceeded ({}ms)", ms),
            AgentFailure::Stalled(msg) => msg.clone(),
            AgentFailure::BudgetExceeded(msg) => msg.clone(),
            AgentFailure::Llm(msg) => msg.clone(),
        }
    }
}

/// Everything one attempt produced, success or not
///
/// Files, commits, cost and turns are reported even on failure so the
/// phase executor can accumulate them across attempts.
#[derive(Debug)]
pub struct AgentRun {
    pub outcome: Result<serde_json::Value, AgentFailure>,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub commits: Vec<String>,
    pub cost_usd: f64,
    pub turns: u32,
    pub duration_ms: u64,
}

/// One phase's inner loop runner
pub struct AgentLoop<'a> {
    llm: Arc<dyn LlmClient>,
    tools: &'a ToolExecutor,
    context: ContextManager,
    stall_config: StallConfig,
    max_tokens: u32,
    max_turns: u32,
    max_duration: Duration,
}

impl<'a> AgentLoop<'a> {
    pub fn new(llm: Arc<dyn LlmClient>, tools: &'a ToolExecutor, config: &Config) -> Self {
        Self {
            llm,
            tools,
            context: ContextManager::new(config.context.clone()),
            stall_config: config.stall.clone(),
            max_tokens: config.llm.max_tokens,
            max_turns: config.orchestrator.max_turns_per_agent,
            max_duration: Duration::from_millis(config.orchestrator.max_duration_ms_per_agent),
        }
    }

    /// Run the loop for one phase attempt
    pub async fn run(
        &self,
        persona: &AgentPersona,
        model: &str,
        initial_prompt: &str,
        tool_ctx: &ToolContext,
        cost: &mut CostTracker,
    ) -> AgentRun {
        let started = Instant::now();
        let work_dir = tool_ctx
            .sandbox_boundary
            .clone()
            .unwrap_or_else(|| tool_ctx.working_directory.clone());
        let start_head = git_head(&work_dir).await;
        let start_status: std::collections::HashSet<String> =
            git_status_porcelain(&work_dir).await.into_iter().collect();

        let mut messages = vec![Message::user(initial_prompt)];
        let mut tracker = StallTracker::new(self.stall_config.clone());
        let mut run = AgentRun {
            outcome: Err(AgentFailure::MaxTurns(self.max_turns)),
            files_created: Vec::new(),
            files_modified: Vec::new(),
            commits: Vec::new(),
            cost_usd: 0.0,
            turns: 0,
            duration_ms: 0,
        };

        let tool_defs = self.tools.definitions_for(&persona.allowed_tools);

        info!(
            "Agent loop starting: persona={} model={} tools={}",
            persona.name,
            model,
            tool_defs.len()
        );

        let outcome = loop {
            if run.turns >= self.max_turns {
                break Err(AgentFailure::MaxTurns(self.max_turns));
            }
            if started.elapsed() >= self.max_duration {
                break Err(AgentFailure::TimeExceeded(self.max_duration.as_millis() as u64));
            }
            if let Err(e) = cost.check_budget() {
                break Err(AgentFailure::BudgetExceeded(e.to_string()));
            }

            self.context.compact_if_needed(persona.system_prompt, &mut messages);

            run.turns += 1;
            let request = CompletionRequest {
                system_prompt: persona.system_prompt.to_string(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.max_tokens,
                model: model.to_string(),
            };

            let response = match self.llm.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("LLM call failed in turn {}: {}", run.turns, e);
                    break Err(AgentFailure::Llm(e.to_string()));
                }
            };

            run.cost_usd += cost.record(response.usage, model);

            match response.stop_reason {
                StopReason::ToolUse => {
                    messages.push(build_assistant_message(&response));
                    match self.dispatch_tools(&response, tool_ctx, &mut tracker, &mut run).await {
                        Ok(tool_message) => messages.push(tool_message),
                        Err(failure) => break Err(failure),
                    }
                }
                StopReason::EndTurn | StopReason::StopSequence => {
                    let text = response.content.clone().unwrap_or_default();
                    messages.push(build_assistant_message(&response));
                    match parse_structured_output(&text) {
                        Ok(output) => break Ok(output),
                        Err(e) => {
                            debug!("Structured output parse failed: {}", e);
                            messages.push(Message::user(format!(
                                "Your reply could not be parsed as structured output ({}). \
                                 Reply with ONLY the JSON object described in your instructions.",
                                e
                            )));
                        }
                    }
                }
                StopReason::MaxTokens => {
                    messages.push(build_assistant_message(&response));
                    messages.push(Message::user(
                        "Continue from where you left off. Your previous response was truncated.",
                    ));
                }
            }
        };

        run.outcome = outcome;
        run.duration_ms = started.elapsed().as_millis() as u64;

        // Post-phase git status catches files the model touched via bash;
        // the phase-start baseline keeps earlier phases' uncommitted work out
        self.merge_git_observations(&work_dir, start_head.as_deref(), &start_status, &mut run)
            .await;

        match &run.outcome {
            Ok(_) => info!(
                "Agent loop finished: persona={} turns={} cost=${:.4}",
                persona.name, run.turns, run.cost_usd
            ),
            Err(failure) => warn!(
                "Agent loop failed: persona={} turns={} reason={}",
                persona.name,
                run.turns,
                failure.message()
            ),
        }

        run
    }

    /// Execute the turn's tool calls serially
    ///
    /// Each result is truncated per its family before entering the
    /// conversation, and each call feeds the stall tracker. Interventions
    /// ride along as an extra text block on the tool-result message so the
    /// user/assistant alternation is preserved.
    async fn dispatch_tools(
        &self,
        response: &CompletionResponse,
        tool_ctx: &ToolContext,
        tracker: &mut StallTracker,
        run: &mut AgentRun,
    ) -> Result<Message, AgentFailure> {
        let mut blocks = Vec::with_capacity(response.tool_calls.len());
        let mut intervention: Option<String> = None;

        for call in &response.tool_calls {
            let result = self.tools.execute(call, tool_ctx).await;

            if result.success {
                if let Some(path) = call.input["file_path"].as_str() {
                    match call.name.as_str() {
                        "write" => run.files_created.push(path.to_string()),
                        "edit" => run.files_modified.push(path.to_string()),
                        _ => {}
                    }
                }
            }

            let truncated = truncate_tool_output(&call.name, result.content(), self.context.config());
            blocks.push(ContentBlock::tool_result(&call.id, truncated, result.is_error()));

            match tracker.record(&call.name, &call.input) {
                Some(StallAction::Intervene(nudge)) => {
                    info!("Stall intervention: {}", nudge);
                    intervention = Some(nudge);
                }
                Some(StallAction::HardStop(message)) => {
                    return Err(AgentFailure::Stalled(message));
                }
                None => {}
            }
        }

        if let Some(nudge) = intervention {
            blocks.push(ContentBlock::text(nudge));
        }

        Ok(Message::user_blocks(blocks))
    }

    /// Merge post-phase git observations into the run record
    async fn merge_git_observations(
        &self,
        work_dir: &Path,
        start_head: Option<&str>,
        start_status: &std::collections::HashSet<String>,
        run: &mut AgentRun,
    ) {
        for line in git_status_porcelain(work_dir).await {
            if start_status.contains(&line) {
                continue;
            }
            let (status, path) = match line.split_at_checked(3) {
                Some((s, p)) => (s.trim(), p.trim().to_string()),
                None => continue,
            };
            if path.is_empty() {
                continue;
            }
            if status == "??" || status == "A" {
                run.files_created.push(path);
            } else {
                run.files_modified.push(path);
            }
        }

        if let Some(start) = start_head {
            run.commits = git_commits_since(work_dir, start).await;
        }

        run.files_created.sort();
        run.files_created.dedup();
        run.files_modified.sort();
        run.files_modified.dedup();
        // A file both created and modified counts as created
        let created = run.files_created.clone();
        run.files_modified.retain(|f| !created.contains(f));
    }
}

/// Build the assistant message echoing text and tool_use blocks
fn build_assistant_message(response: &CompletionResponse) -> Message {
    let mut blocks = Vec::new();

    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }

    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }

    Message::assistant_blocks(blocks)
}

async fn git_head(dir: &Path) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .await
        .ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}

async fn git_status_porcelain(dir: &Path) -> Vec<String> {
    let output = tokio::process::Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(dir)
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

async fn git_commits_since(dir: &Path, start: &str) -> Vec<String> {
    let range = format!("{}..HEAD", start);
    let output = tokio::process::Command::new("git")
        .args(["rev-list", "--reverse", &range])
        .current_dir(dir)
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
