//! Work sources
//!
//! Pluggable providers that discover work items for the external queue.
//! Sources feed automation around the orchestrator; they never drive the
//! workflow state machine directly.

mod debugger;
mod file_queue;
mod metrics;

pub use debugger::DebuggerAlertSource;
pub use file_queue::FileQueueSource;
pub use metrics::{CycleMetrics, CycleRecord};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Priority of a discovered work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// A discovered unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Which source produced it
    pub source: String,

    pub summary: String,
    pub priority: Priority,

    /// Escalation tier 1-4
    pub tier: u8,

    /// Workflow the source suggests for this item
    pub suggested_workflow: String,

    /// External resource identifiers tied to the item
    #[serde(default)]
    pub resource_sids: Vec<String>,

    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".to_string()
}

/// Poll every enabled source concurrently
///
/// Items come back grouped in registration order; a failing source
/// contributes an empty list (see the `poll` contract).
pub async fn poll_all(sources: &mut [Box<dyn WorkSource>]) -> Vec<WorkItem> {
    let polls = sources.iter_mut().filter(|s| s.enabled()).map(|s| s.poll());
    futures::future::join_all(polls).await.into_iter().flatten().collect()
}

/// A pluggable provider of work items
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Source name for logs and item attribution
    fn name(&self) -> &str;

    /// Kind of source (e.g. "debugger-alert", "user-request")
    fn source_type(&self) -> &str;

    /// Disabled sources are registered but never polled
    fn enabled(&self) -> bool;

    /// Discover new work items
    ///
    /// Must swallow upstream failures and return an empty list; a flaky
    /// alerts API or a corrupt queue file never takes the poller down.
    async fn poll(&mut self) -> Vec<WorkItem>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_serialization_shape() {
        let item = WorkItem {
            source: "debugger-alert".to_string(),
            summary: "HTTP retrieval failure".to_string(),
            priority: Priority::High,
            tier: 2,
            suggested_workflow: "bug-fix".to_string(),
            resource_sids: vec!["NT0000000000000000000000000000000a".to_string()],
            status: "pending".to_string(),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["priority"], "high");
        assert_eq!(json["suggestedWorkflow"], "bug-fix");
        assert_eq!(json["resourceSids"][0], "NT0000000000000000000000000000000a");
    }

    #[tokio::test]
    async fn test_poll_all_skips_disabled_sources() {
        struct Fixed {
            enabled: bool,
        }

        #[async_trait]
        impl WorkSource for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            fn source_type(&self) -> &str {
                "user-request"
            }
            fn enabled(&self) -> bool {
                self.enabled
            }
            async fn poll(&mut self) -> Vec<WorkItem> {
                vec![WorkItem {
                    source: "fixed".to_string(),
                    summary: "item".to_string(),
                    priority: Priority::Low,
                    tier: 4,
                    suggested_workflow: "bug-fix".to_string(),
                    resource_sids: vec![],
                    status: "pending".to_string(),
                }]
            }
        }

        let mut sources: Vec<Box<dyn WorkSource>> =
            vec![Box::new(Fixed { enabled: true }), Box::new(Fixed { enabled: false })];

        let items = poll_all(&mut sources).await;
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_work_item_default_status() {
        let json = r#"{
            "source": "user-request",
            "summary": "x",
            "priority": "low",
            "tier": 4,
            "suggestedWorkflow": "bug-fix"
        }"#;
        let item: WorkItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.status, "pending");
        assert!(item.resource_sids.is_empty());
    }
}
