//! Pre-phase hooks
//!
//! Named, declarative preconditions that must pass before a phase may
//! execute. A hook failure is never retried: the previous phase's work is
//! the problem, not this attempt.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::config::HookConfig;
use crate::personas::PersonaName;
use crate::session::WorkflowState;

/// The named hooks phases may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Test-gen must have produced failing tests (red before green)
    TddEnforcement,
    /// Line coverage must meet the configured threshold
    CoverageThreshold,
    /// Every test must pass (behavioral preservation for refactors)
    TestPassingEnforcement,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TddEnforcement => "tdd-enforcement",
            Self::CoverageThreshold => "coverage-threshold",
            Self::TestPassingEnforcement => "test-passing-enforcement",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tdd-enforcement" => Some(Self::TddEnforcement),
            "coverage-threshold" => Some(Self::CoverageThreshold),
            "test-passing-enforcement" => Some(Self::TestPassingEnforcement),
            _ => None,
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of running one hook
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub hook: HookKind,
    pub passed: bool,
    pub message: String,
}

impl HookOutcome {
    fn pass(hook: HookKind) -> Self {
        Self {
            hook,
            passed: true,
            message: String::new(),
        }
    }

    fn fail(hook: HookKind, message: impl Into<String>) -> Self {
        Self {
            hook,
            passed: false,
            message: message.into(),
        }
    }
}

/// Run one hook against the current state and working directory
pub async fn run_hook(kind: HookKind, state: &WorkflowState, work_dir: &Path, config: &HookConfig) -> HookOutcome {
    match kind {
        HookKind::TddEnforcement => run_tdd_enforcement(state),
        HookKind::CoverageThreshold => run_coverage_threshold(work_dir, config).await,
        HookKind::TestPassingEnforcement => run_test_passing(work_dir, config).await,
    }
}

/// Red-green gate: the prior test-gen phase must report failing tests
fn run_tdd_enforcement(state: &WorkflowState) -> HookOutcome {
    let kind = HookKind::TddEnforcement;

    let Some(result) = state.phase_results.get(PersonaName::TestGen.as_str()) else {
        return HookOutcome::fail(kind, "TDD VIOLATION: no test-gen phase result found");
    };

    let tests_created = result.output["testsCreated"].as_u64().unwrap_or(0);
    if tests_created == 0 {
        return HookOutcome::fail(kind, "TDD VIOLATION: test-gen created no tests");
    }

    match result.output["allTestsFailing"].as_bool() {
        Some(true) => HookOutcome::pass(kind),
        _ => HookOutcome::fail(
            kind,
            "TDD VIOLATION: new tests must fail before implementation (allTestsFailing=false)",
        ),
    }
}

async fn run_coverage_threshold(work_dir: &Path, config: &HookConfig) -> HookOutcome {
    let kind = HookKind::CoverageThreshold;

    let output = match run_command(&config.coverage_command, work_dir, config.timeout_ms).await {
        Ok(o) => o,
        Err(e) => return HookOutcome::fail(kind, format!("Coverage command failed: {}", e)),
    };

    match parse_coverage_percent(&output) {
        Some(percent) if percent >= config.coverage_threshold => HookOutcome::pass(kind),
        Some(percent) => HookOutcome::fail(
            kind,
            format!(
                "Coverage {:.1}% is below the {:.0}% threshold",
                percent, config.coverage_threshold
            ),
        ),
        None => HookOutcome::fail(kind, "Could not find a coverage percentage in the command output"),
    }
}

async fn run_test_passing(work_dir: &Path, config: &HookConfig) -> HookOutcome {
    let kind = HookKind::TestPassingEnforcement;

    match run_command_status(&config.test_command, work_dir, config.timeout_ms).await {
        Ok(0) => HookOutcome::pass(kind),
        Ok(code) => HookOutcome::fail(kind, format!("Test command exited with code {}", code)),
        Err(e) => HookOutcome::fail(kind, format!("Test command failed: {}", e)),
    }
}

static COVERAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("coverage pattern must compile"));

/// Last percentage in the output; coverage tools print the total last
fn parse_coverage_percent(output: &str) -> Option<f64> {
    COVERAGE_RE
        .captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

async fn run_command(command: &str, work_dir: &Path, timeout_ms: u64) -> Result<String, String> {
    debug!("Running hook command: {}", command);
    let output = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(work_dir)
            .output(),
    )
    .await
    .map_err(|_| format!("timed out after {}ms", timeout_ms))?
    .map_err(|e| e.to_string())?;

    Ok(format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    ))
}

async fn run_command_status(command: &str, work_dir: &Path, timeout_ms: u64) -> Result<i32, String> {
    debug!("Running hook command: {}", command);
    let output = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(work_dir)
            .output(),
    )
    .await
    .map_err(|_| format!("timed out after {}ms", timeout_ms))?
    .map_err(|e| e.to_string())?;

    Ok(output.status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PhaseResult, PhaseStatus};
    use tempfile::tempdir;

    fn state_with_test_gen(output: serde_json::Value) -> WorkflowState {
        let mut state = WorkflowState::new("s1", "new-feature", "x");
        state.record_phase_result(PhaseResult {
            agent: "test-gen".to_string(),
            status: PhaseStatus::Completed,
            output,
            files_created: vec![],
            files_modified: vec![],
            commits: vec![],
            cost_usd: 0.0,
            turns: 1,
            retry_attempts: 0,
            error: None,
        });
        state
    }

    #[test]
    fn test_hook_kind_round_trip() {
        for name in ["tdd-enforcement", "coverage-threshold", "test-passing-enforcement"] {
            assert_eq!(HookKind::from_name(name).unwrap().as_str(), name);
        }
        assert!(HookKind::from_name("unknown").is_none());
    }

    #[test]
    fn test_tdd_passes_with_failing_tests() {
        let state = state_with_test_gen(serde_json::json!({"testsCreated": 5, "allTestsFailing": true}));
        let outcome = run_tdd_enforcement(&state);
        assert!(outcome.passed);
    }

    #[test]
    fn test_tdd_fails_when_tests_pass_early() {
        let state = state_with_test_gen(serde_json::json!({"testsCreated": 5, "allTestsFailing": false}));
        let outcome = run_tdd_enforcement(&state);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("TDD VIOLATION"));
    }

    #[test]
    fn test_tdd_fails_with_no_tests() {
        let state = state_with_test_gen(serde_json::json!({"testsCreated": 0, "allTestsFailing": true}));
        assert!(!run_tdd_enforcement(&state).passed);
    }

    #[test]
    fn test_tdd_fails_without_test_gen_result() {
        let state = WorkflowState::new("s1", "new-feature", "x");
        let outcome = run_tdd_enforcement(&state);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("TDD VIOLATION"));
    }

    #[test]
    fn test_parse_coverage_percent_takes_last() {
        let output = "branch: 60.5%\nlines: 85.2%\n";
        assert_eq!(parse_coverage_percent(output), Some(85.2));
        assert_eq!(parse_coverage_percent("no numbers here"), None);
    }

    #[tokio::test]
    async fn test_coverage_hook_with_fake_command() {
        let temp = tempdir().unwrap();
        let state = WorkflowState::new("s1", "new-feature", "x");
        let config = HookConfig {
            coverage_command: "echo 'All files | 92.4% |'".to_string(),
            ..HookConfig::default()
        };

        let outcome = run_hook(HookKind::CoverageThreshold, &state, temp.path(), &config).await;
        assert!(outcome.passed, "{}", outcome.message);
    }

    #[tokio::test]
    async fn test_coverage_hook_below_threshold() {
        let temp = tempdir().unwrap();
        let state = WorkflowState::new("s1", "new-feature", "x");
        let config = HookConfig {
            coverage_command: "echo 'All files | 42.0% |'".to_string(),
            ..HookConfig::default()
        };

        let outcome = run_hook(HookKind::CoverageThreshold, &state, temp.path(), &config).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("below"));
    }

    #[tokio::test]
    async fn test_test_passing_hook() {
        let temp = tempdir().unwrap();
        let state = WorkflowState::new("s1", "new-feature", "x");

        let passing = HookConfig {
            test_command: "true".to_string(),
            ..HookConfig::default()
        };
        assert!(run_hook(HookKind::TestPassingEnforcement, &state, temp.path(), &passing).await.passed);

        let failing = HookConfig {
            test_command: "false".to_string(),
            ..HookConfig::default()
        };
        let outcome = run_hook(HookKind::TestPassingEnforcement, &state, temp.path(), &failing).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("exited with code 1"));
    }
}
