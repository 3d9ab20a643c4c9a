//! Debugger-alert work source
//!
//! Polls an external alerts API and maps platform error codes to work
//! items via a static table. Alerts are deduplicated by identifier across
//! polls for the lifetime of the source. API errors are swallowed; a
//! flaky upstream yields an empty poll, not a crash.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Priority, WorkItem, WorkSource};

/// error code -> (priority, tier, suggested workflow)
///
/// The table is data; extend it as new codes show up in production.
const ERROR_CODE_MAP: &[(u32, Priority, u8, &str)] = &[
    (11200, Priority::High, 2, "bug-fix"),
    (11205, Priority::High, 2, "bug-fix"),
    (13224, Priority::Medium, 3, "bug-fix"),
    (13227, Priority::High, 2, "bug-fix"),
    (30003, Priority::Medium, 3, "bug-fix"),
    (30008, Priority::High, 2, "bug-fix"),
    (32011, Priority::Critical, 1, "bug-fix"),
];

const DEFAULT_PRIORITY: (Priority, u8, &str) = (Priority::Low, 4, "bug-fix");

/// One alert as reported by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Alert {
    sid: String,
    #[serde(default)]
    error_code: Option<u32>,
    #[serde(default)]
    alert_text: String,
    #[serde(default)]
    resource_sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    alerts: Vec<Alert>,
}

/// Work source over the platform debugger alerts API
pub struct DebuggerAlertSource {
    name: String,
    base_url: String,
    http: reqwest::Client,
    enabled: bool,
    /// Alert sids already emitted; carried across polls
    seen: HashSet<String>,
}

impl DebuggerAlertSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            name: "debugger-alerts".to_string(),
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            enabled: true,
            seen: HashSet::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn classify(error_code: Option<u32>) -> (Priority, u8, &'static str) {
        match error_code {
            Some(code) => ERROR_CODE_MAP
                .iter()
                .find(|(c, _, _, _)| *c == code)
                .map(|(_, priority, tier, workflow)| (*priority, *tier, *workflow))
                .unwrap_or(DEFAULT_PRIORITY),
            None => DEFAULT_PRIORITY,
        }
    }

    fn item_from_alert(&self, alert: &Alert) -> WorkItem {
        let (priority, tier, workflow) = Self::classify(alert.error_code);
        WorkItem {
            source: "debugger-alert".to_string(),
            summary: if alert.alert_text.is_empty() {
                format!("Alert {} (code {:?})", alert.sid, alert.error_code)
            } else {
                alert.alert_text.clone()
            },
            priority,
            tier,
            suggested_workflow: workflow.to_string(),
            resource_sids: alert.resource_sid.iter().cloned().collect(),
            status: "pending".to_string(),
        }
    }
}

#[async_trait]
impl WorkSource for DebuggerAlertSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "debugger-alert"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn poll(&mut self) -> Vec<WorkItem> {
        let url = format!("{}/alerts", self.base_url);
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Alerts API unreachable: {}", e);
                return Vec::new();
            }
        };

        let alerts: AlertsResponse = match response.json().await {
            Ok(a) => a,
            Err(e) => {
                warn!("Alerts API returned invalid payload: {}", e);
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for alert in &alerts.alerts {
            if !self.seen.insert(alert.sid.clone()) {
                debug!("Skipping already-seen alert {}", alert.sid);
                continue;
            }
            items.push(self.item_from_alert(alert));
        }
        items
    }
}
