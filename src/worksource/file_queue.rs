//! File-queue work source
//!
//! Reads `manual-queue.json` from the project data directory, emits
//! entries not yet consumed and rewrites the file marking them consumed,
//! so the same item never emits twice. Corrupt JSON yields an empty poll.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{Priority, WorkItem, WorkSource};

/// One entry of the manual queue file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueEntry {
    #[serde(default)]
    id: String,
    summary: String,
    #[serde(default = "default_priority")]
    priority: Priority,
    #[serde(default = "default_tier")]
    tier: u8,
    #[serde(default = "default_workflow")]
    suggested_workflow: String,
    #[serde(default)]
    consumed: bool,
}

fn default_priority() -> Priority {
    Priority::Medium
}

fn default_tier() -> u8 {
    3
}

fn default_workflow() -> String {
    "new-feature".to_string()
}

/// Work source over a user-maintained queue file
pub struct FileQueueSource {
    name: String,
    queue_path: PathBuf,
    enabled: bool,
}

impl FileQueueSource {
    /// Source over `<working_directory>/.feature-factory/manual-queue.json`
    pub fn new(working_directory: &Path) -> Self {
        Self {
            name: "manual-queue".to_string(),
            queue_path: working_directory.join(".feature-factory").join("manual-queue.json"),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[async_trait]
impl WorkSource for FileQueueSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "user-request"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn poll(&mut self) -> Vec<WorkItem> {
        let content = match tokio::fs::read_to_string(&self.queue_path).await {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let mut entries: Vec<QueueEntry> = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                warn!("Ignoring corrupt queue file {}: {}", self.queue_path.display(), e);
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for entry in entries.iter_mut().filter(|e| !e.consumed) {
            items.push(WorkItem {
                source: "user-request".to_string(),
                summary: entry.summary.clone(),
                priority: entry.priority,
                tier: entry.tier,
                suggested_workflow: entry.suggested_workflow.clone(),
                resource_sids: Vec::new(),
                status: "pending".to_string(),
            });
            entry.consumed = true;
        }

        if !items.is_empty() {
            match serde_json::to_string_pretty(&entries) {
                Ok(json) => {
                    if let Err(e) = tokio::fs::write(&self.queue_path, json).await {
                        warn!("Failed to mark queue entries consumed: {}", e);
                    }
                }
                Err(e) => warn!("Failed to serialize queue file: {}", e),
            }
        }

        items
    }
}
