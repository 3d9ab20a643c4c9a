//! Workflow event stream
//!
//! Every state-machine transition is emitted as a typed event over a
//! broadcast channel. Events carry a monotonically increasing sequence
//! number and a timestamp so logs from multiple consumers merge and
//! replay deterministically. Emission is fire-and-forget: a workflow
//! never blocks on slow or absent consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// The typed event vocabulary of the workflow driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        session_id: String,
        workflow: String,
        total_phases: usize,
    },
    WorkflowResumed {
        session_id: String,
        phase_index: usize,
    },
    WorkflowCompleted {
        session_id: String,
        success: bool,
        total_cost_usd: f64,
    },
    WorkflowError {
        session_id: String,
        error: String,
        recoverable: bool,
    },
    PhaseStarted {
        phase_index: usize,
        agent: String,
        display_name: String,
    },
    PhaseCompleted {
        phase_index: usize,
        agent: String,
        retry_attempts: u32,
    },
    PhaseRetry {
        phase_index: usize,
        agent: String,
        attempt: u32,
        reason: String,
    },
    PrePhaseHook {
        phase_index: usize,
        hook: String,
        passed: bool,
        message: String,
    },
    CheckpointCreated {
        phase_index: usize,
        tag: String,
    },
    ApprovalRequested {
        phase_index: usize,
        phase: String,
    },
    ApprovalReceived {
        approved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    CostUpdate {
        phase_cost_usd: f64,
        cumulative_cost_usd: f64,
    },
}

impl WorkflowEvent {
    /// Short name for logs and rendering
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow-started",
            WorkflowEvent::WorkflowResumed { .. } => "workflow-resumed",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow-completed",
            WorkflowEvent::WorkflowError { .. } => "workflow-error",
            WorkflowEvent::PhaseStarted { .. } => "phase-started",
            WorkflowEvent::PhaseCompleted { .. } => "phase-completed",
            WorkflowEvent::PhaseRetry { .. } => "phase-retry",
            WorkflowEvent::PrePhaseHook { .. } => "pre-phase-hook",
            WorkflowEvent::CheckpointCreated { .. } => "checkpoint-created",
            WorkflowEvent::ApprovalRequested { .. } => "approval-requested",
            WorkflowEvent::ApprovalReceived { .. } => "approval-received",
            WorkflowEvent::CostUpdate { .. } => "cost-update",
        }
    }
}

/// An event with its position in the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonically increasing within one driver
    pub seq: u64,

    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub event: WorkflowEvent,
}

/// Broadcast bus; the driver emits, any number of consumers subscribe
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Stamp and emit an event
    ///
    /// Fire-and-forget: no subscribers is fine, and the envelope is
    /// returned for callers that record the stream themselves.
    pub fn emit(&self, event: WorkflowEvent) -> EventEnvelope {
        let envelope = EventEnvelope {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            event,
        };
        let _ = self.tx.send(envelope.clone());
        envelope
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Append every event to a JSONL audit log
///
/// Used for the autonomous-mode audit trail
/// (`.feature-factory/autonomous-<sessionId>.log`). Returns a handle that
/// stops when the bus is dropped.
pub fn spawn_event_logger(bus: &EventBus, log_path: PathBuf) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    let line = match serde_json::to_string(&envelope) {
                        Ok(l) => l,
                        Err(e) => {
                            warn!("Failed to serialize event for audit log: {}", e);
                            continue;
                        }
                    };
                    if let Some(parent) = log_path.parent() {
                        let _ = tokio::fs::create_dir_all(parent).await;
                    }
                    let write = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_path)
                        .await;
                    match write {
                        Ok(mut file) => {
                            use tokio::io::AsyncWriteExt;
                            let _ = file.write_all(line.as_bytes()).await;
                            let _ = file.write_all(b"\n").await;
                        }
                        Err(e) => warn!("Failed to open audit log {}: {}", log_path.display(), e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Audit logger lagged, missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_assigns_increasing_sequence_numbers() {
        let bus = EventBus::new(16);

        let first = bus.emit(WorkflowEvent::CostUpdate {
            phase_cost_usd: 0.1,
            cumulative_cost_usd: 0.1,
        });
        let second = bus.emit(WorkflowEvent::CostUpdate {
            phase_cost_usd: 0.2,
            cumulative_cost_usd: 0.3,
        });

        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn test_subscribe_receives_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(WorkflowEvent::WorkflowStarted {
            session_id: "s1".to_string(),
            workflow: "new-feature".to_string(),
            total_phases: 7,
        });
        bus.emit(WorkflowEvent::PhaseStarted {
            phase_index: 0,
            agent: "architect".to_string(),
            display_name: "Architecture".to_string(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event.event_type(), "workflow-started");
        assert_eq!(second.event.event_type(), "phase-started");
        assert!(first.seq < second.seq);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.emit(WorkflowEvent::ApprovalReceived {
            approved: false,
            reason: Some("Need changes".to_string()),
        });
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let envelope = EventEnvelope {
            seq: 7,
            timestamp: Utc::now(),
            event: WorkflowEvent::PhaseRetry {
                phase_index: 2,
                agent: "dev".to_string(),
                attempt: 1,
                reason: "Validation failed: incomplete".to_string(),
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["type"], "phase-retry");
        assert_eq!(json["agent"], "dev");
        assert!(json["ts"].is_string());
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EventEnvelope {
            seq: 1,
            timestamp: Utc::now(),
            event: WorkflowEvent::WorkflowError {
                session_id: "s1".to_string(),
                error: "Budget exceeded".to_string(),
                recoverable: false,
            },
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seq, 1);
        match parsed.event {
            WorkflowEvent::WorkflowError { error, recoverable, .. } => {
                assert_eq!(error, "Budget exceeded");
                assert!(!recoverable);
            }
            other => panic!("Expected workflow-error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_logger_appends_jsonl() {
        let temp = tempfile::tempdir().unwrap();
        let log_path = temp.path().join("audit.log");
        let bus = EventBus::new(16);
        let handle = spawn_event_logger(&bus, log_path.clone());

        bus.emit(WorkflowEvent::CostUpdate {
            phase_cost_usd: 0.5,
            cumulative_cost_usd: 0.5,
        });

        // Give the logger task a moment to drain
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if log_path.exists() {
                break;
            }
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        let line: EventEnvelope = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(line.event.event_type(), "cost-update");

        handle.abort();
    }
}
