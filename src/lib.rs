//! Feature Factory - autonomous multi-phase workflow orchestrator
//!
//! Drives an LLM through a sequence of specialized agent personas to
//! produce a software change. Each workflow is an ordered list of phases;
//! each phase binds a persona to pre-phase quality gates, an output
//! validator, a retry policy, an approval policy and a checkpoint policy.
//!
//! # Core Concepts
//!
//! - **Phases over one conversation**: every phase runs a fresh agentic
//!   loop; structured JSON output is the only cross-phase carrier
//! - **Durable sessions**: state persists to disk after every transition,
//!   so a session survives the process and resumes at its approval gate
//! - **Disposable sandboxes**: the whole workflow can run inside a git
//!   clone; failures never touch the user's working tree
//! - **Hard budgets**: token cost, turns and wall-clock are enforced at
//!   every layer
//!
//! # Modules
//!
//! - [`workflow`] - workflow catalogue and the driver state machine
//! - [`phase`] - phase executor with hooks and retry
//! - [`r#loop`] - the inner agentic loop
//! - [`tools`] - tool runtime with sandbox containment
//! - [`llm`] - LLM client trait and Anthropic implementation
//! - [`context`] - truncation and conversation compaction
//! - [`stall`] - behavioral stall detection
//! - [`checkpoint`] / [`sandbox`] - git checkpoint tags and clone lifecycle
//! - [`session`] - durable session state
//! - [`cost`] - pricing and budget enforcement
//! - [`events`] - the typed event stream
//! - [`worksource`] - work discovery providers and cycle metrics

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod cost;
pub mod events;
pub mod learnings;
pub mod llm;
pub mod personas;
pub mod phase;
pub mod prompts;
pub mod sandbox;
pub mod session;
pub mod stall;
pub mod tools;
pub mod workflow;
pub mod worksource;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager, slugify};
pub use config::{ApprovalMode, Config, LlmConfig};
pub use context::{ContextManager, estimate_tokens, truncate_tool_output};
pub use cost::{BudgetExceeded, CostTracker, ModelTier, invocation_cost};
pub use events::{EventBus, EventEnvelope, WorkflowEvent, spawn_event_logger};
pub use learnings::LearningsLoader;
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, create_client};
pub use personas::{AgentPersona, PersonaName, Validation, builtin_personas};
pub use phase::{HookKind, HookOutcome, PhaseError, PhaseRunner};
pub use prompts::{PromptContext, PromptLoader};
pub use r#loop::{AgentFailure, AgentLoop, AgentRun, parse_structured_output};
pub use sandbox::{CopyBackReport, Sandbox, SandboxError};
pub use session::{PhaseResult, PhaseStatus, SessionStatus, SessionStore, WorkflowState};
pub use stall::{StallAction, StallKind, StallTracker};
pub use tools::{McpClient, Tool, ToolContext, ToolError, ToolExecutor, ToolResult};
pub use workflow::{RunOutcome, Workflow, WorkflowDriver, WorkflowPhase, builtin_workflows};
pub use worksource::{CycleMetrics, DebuggerAlertSource, FileQueueSource, Priority, WorkItem, WorkSource, poll_all};
