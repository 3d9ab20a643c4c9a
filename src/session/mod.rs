//! Session state: the durable record of one workflow execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod store;

pub use store::{SessionError, SessionStore};

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Outcome status of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Completed,
    Failed,
}

/// Immutable record of one executed phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    /// Agent persona that ran the phase
    pub agent: String,

    pub status: PhaseStatus,

    /// Structured JSON output from the agent
    pub output: serde_json::Value,

    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub commits: Vec<String>,

    pub cost_usd: f64,
    pub turns: u32,

    /// 0 on first-try success
    pub retry_attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The orchestrator-owned state of one workflow session
///
/// Persisted after workflow start, every phase completion, every approval
/// gate entry and every terminal transition. The serialized field names
/// are the on-disk contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Unique across a host
    pub session_id: String,

    /// Workflow name
    pub workflow: String,

    /// User-supplied task description
    pub description: String,

    pub status: SessionStatus,

    /// Index of the next phase to execute (== phases.len() when complete)
    pub current_phase_index: usize,

    /// Agent persona name -> result
    pub phase_results: BTreeMap<String, PhaseResult>,

    /// Agent persona name -> checkpoint tag
    pub checkpoints: BTreeMap<String, String>,

    pub cumulative_cost_usd: f64,
    pub cumulative_turns: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Terminal error when failed or cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    /// Create a fresh running state
    pub fn new(session_id: impl Into<String>, workflow: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            workflow: workflow.into(),
            description: description.into(),
            status: SessionStatus::Running,
            current_phase_index: 0,
            phase_results: BTreeMap::new(),
            checkpoints: BTreeMap::new(),
            cumulative_cost_usd: 0.0,
            cumulative_turns: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    /// Generate a host-unique session id
    pub fn generate_session_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    /// A session can be picked up again only while it waits for approval
    pub fn is_resumable(&self) -> bool {
        self.status == SessionStatus::AwaitingApproval
    }

    /// Record a phase result and roll its totals into the session
    pub fn record_phase_result(&mut self, result: PhaseResult) {
        self.cumulative_cost_usd += result.cost_usd;
        self.cumulative_turns += result.turns as u64;
        self.phase_results.insert(result.agent.clone(), result);
        self.touch();
    }

    /// Mark a terminal failure
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    /// Mark a cancellation (approval denied or operator abort)
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Cancelled;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    /// Mark successful completion
    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
