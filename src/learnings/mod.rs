//! Learnings loader
//!
//! Reads the project's optional learnings file and known-failure-pattern
//! records and turns them into a bounded preamble injected into every
//! agent prompt. Parse errors are swallowed: a malformed local artifact
//! must never block workflow startup. The preamble keeps its tail when
//! truncated because recent learnings are the informative ones.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Preamble size cap in characters
const MAX_PREAMBLE_CHARS: usize = 2_000;

/// Failure patterns kept after filtering
const MAX_PATTERNS: usize = 10;

/// A known failure pattern record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub occurrence_count: u64,
    #[serde(default)]
    pub resolved: bool,
}

/// Loads learnings from the project data directory
#[derive(Debug, Clone)]
pub struct LearningsLoader {
    learnings_path: PathBuf,
    patterns_path: PathBuf,
}

impl LearningsLoader {
    /// Loader over `<working_directory>/.feature-factory/`
    pub fn new(working_directory: &Path) -> Self {
        let data_dir = working_directory.join(".feature-factory");
        Self {
            learnings_path: data_dir.join("learnings.md"),
            patterns_path: data_dir.join("failure-patterns.json"),
        }
    }

    /// Build the preamble, or None when there is nothing to inject
    ///
    /// Re-read on every call so learnings captured while a session waited
    /// at an approval gate are picked up on resume.
    pub fn load_preamble(&self) -> Option<String> {
        let mut sections: Vec<String> = Vec::new();

        if let Some(learnings) = self.read_learnings() {
            sections.push(learnings);
        }

        let patterns = self.read_patterns();
        if !patterns.is_empty() {
            let lines: Vec<String> = patterns
                .iter()
                .map(|p| format!("- {} (seen {}x)", p.summary, p.occurrence_count))
                .collect();
            sections.push(format!("Known failure patterns:\n{}", lines.join("\n")));
        }

        if sections.is_empty() {
            return None;
        }

        let body = sections.join("\n\n");
        Some(truncate_tail(&format!("# Prior Learnings\n\n{}", body), MAX_PREAMBLE_CHARS))
    }

    fn read_learnings(&self) -> Option<String> {
        match std::fs::read_to_string(&self.learnings_path) {
            Ok(content) if !content.trim().is_empty() => Some(content.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!("No learnings file at {}: {}", self.learnings_path.display(), e);
                None
            }
        }
    }

    /// Unresolved patterns, most frequent first, capped
    fn read_patterns(&self) -> Vec<FailurePattern> {
        let content = match std::fs::read_to_string(&self.patterns_path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let mut patterns: Vec<FailurePattern> = match serde_json::from_str(&content) {
            Ok(p) => p,
            Err(e) => {
                debug!("Ignoring malformed failure patterns file: {}", e);
                return Vec::new();
            }
        };

        patterns.retain(|p| !p.resolved);
        patterns.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        patterns.truncate(MAX_PATTERNS);
        patterns
    }
}

/// Keep the tail of `text`, marking the cut with a leading ellipsis
fn truncate_tail(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }

    let marker = "…";
    let keep = max_chars - marker.len();
    let mut start = text.len() - keep;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("{}{}", marker, &text[start..])
}
