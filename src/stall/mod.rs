//! Stall detection for the agent loop
//!
//! A per-phase behavioral detector over a bounded window of recent tool
//! calls. Classification priority: repetition > oscillation > idle. The
//! first detections produce intervention nudges injected into the
//! conversation; past the intervention budget the phase is hard-stopped.

use serde_json::Value;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::StallConfig;

/// What the tracker saw in the latest call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallKind {
    /// Same (tool, input) repeated N times consecutively
    Repetition { tool: String },
    /// Two distinct calls alternating A-B-A-B within the window
    Oscillation { first: String, second: String },
    /// No Write/Edit/Bash call for too many turns
    Idle,
}

/// What the agent loop should do about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallAction {
    /// Inject this nudge as a user message and continue
    Intervene(String),
    /// Abort the phase; the message is the phase error
    HardStop(String),
}

/// Per-phase stall tracker
pub struct StallTracker {
    config: StallConfig,
    records: VecDeque<(String, u64)>,
    turns_since_mutation: usize,
    interventions: u32,
}

impl StallTracker {
    pub fn new(config: StallConfig) -> Self {
        Self {
            config,
            records: VecDeque::new(),
            turns_since_mutation: 0,
            interventions: 0,
        }
    }

    /// Record a tool call and classify the agent's behavior
    ///
    /// Returns None while behavior is normal (or detection is disabled).
    pub fn record(&mut self, tool_name: &str, input: &Value) -> Option<StallAction> {
        if !self.config.enabled {
            return None;
        }

        let hash = canonical_hash(input);
        self.records.push_back((tool_name.to_string(), hash));

        // Window only needs to cover the largest lookback
        let window = self.config.oscillation_window.max(self.config.repetition_threshold);
        while self.records.len() > window {
            self.records.pop_front();
        }

        if matches!(tool_name, "write" | "edit" | "bash") {
            self.turns_since_mutation = 0;
        } else {
            self.turns_since_mutation += 1;
        }

        let kind = self.classify(tool_name)?;
        Some(self.escalate(kind))
    }

    fn classify(&self, tool_name: &str) -> Option<StallKind> {
        if let Some(kind) = self.detect_repetition(tool_name) {
            return Some(kind);
        }
        if let Some(kind) = self.detect_oscillation() {
            return Some(kind);
        }
        if self.turns_since_mutation >= self.config.idle_turns {
            return Some(StallKind::Idle);
        }
        None
    }

    fn detect_repetition(&self, tool_name: &str) -> Option<StallKind> {
        let threshold = self.config.repetition_threshold;
        if threshold == 0 || self.records.len() < threshold {
            return None;
        }

        let tail: Vec<&(String, u64)> = self.records.iter().rev().take(threshold).collect();
        let newest = tail[0];
        if tail.iter().all(|r| *r == newest) {
            Some(StallKind::Repetition {
                tool: tool_name.to_string(),
            })
        } else {
            None
        }
    }

    fn detect_oscillation(&self) -> Option<StallKind> {
        // A-B-A-B needs at least four records
        if self.records.len() < 4 {
            return None;
        }

        let window: Vec<&(String, u64)> = self
            .records
            .iter()
            .rev()
            .take(self.config.oscillation_window)
            .collect();

        let a = window[0];
        let b = window[1];
        if a == b {
            return None;
        }

        if window.len() >= 4 && window[2] == a && window[3] == b {
            Some(StallKind::Oscillation {
                first: b.0.clone(),
                second: a.0.clone(),
            })
        } else {
            None
        }
    }

    fn escalate(&mut self, kind: StallKind) -> StallAction {
        let description = match &kind {
            StallKind::Repetition { tool } => format!(
                "You called `{}` {} times in a row with identical input.",
                tool, self.config.repetition_threshold
            ),
            StallKind::Oscillation { first, second } => format!(
                "You are alternating between the same `{}` and `{}` calls without making progress.",
                first, second
            ),
            StallKind::Idle => format!(
                "You have made no Write, Edit or Bash call for {} turns.",
                self.config.idle_turns
            ),
        };

        if self.interventions < self.config.max_interventions {
            self.interventions += 1;
            StallAction::Intervene(format!(
                "{} Change approach, or summarize what you have and continue with the task.",
                description
            ))
        } else {
            StallAction::HardStop(format!("STALLED: {}", description))
        }
    }

    /// Interventions issued so far this phase
    pub fn interventions(&self) -> u32 {
        self.interventions
    }
}

/// Stable hash of a JSON value
///
/// Object keys are visited in sorted order so two inputs that differ only
/// in key order hash identically.
pub fn canonical_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

fn hash_value(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            n.to_string().hash(hasher);
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(hasher);
                hash_value(&map[key], hasher);
            }
        }
    }
}
