//! Feature Factory configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Orchestration limits and policies
    pub orchestrator: OrchestratorConfig,

    /// Context window management
    pub context: ContextConfig,

    /// Stall detection
    pub stall: StallConfig,

    /// Sandbox behavior
    pub sandbox: SandboxConfig,

    /// Pre-phase hook commands
    pub hooks: HookConfig,

    /// MCP tool forwarding
    pub mcp: McpConfig,
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .feature-factory.yml
        let local_config = PathBuf::from(".feature-factory.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/feature-factory/feature-factory.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("feature-factory").join("feature-factory.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `FEATURE_FACTORY_*` environment variable overrides
    ///
    /// Autonomous mode raises caps, disables approvals and enables the
    /// sandbox; the remaining variables override individual knobs.
    pub fn apply_env_overrides(&mut self) {
        if env_truthy("FEATURE_FACTORY_AUTONOMOUS") {
            self.orchestrator.autonomous = true;
            self.orchestrator.approval_mode = ApprovalMode::None;
            self.orchestrator.max_turns_per_agent = self.orchestrator.max_turns_per_agent.max(100);
            self.orchestrator.max_workflow_duration_ms = self.orchestrator.max_workflow_duration_ms.max(8 * 3_600_000);
            self.sandbox.enabled = true;
        }

        if env_truthy("FEATURE_FACTORY_AUTONOMOUS_ACKNOWLEDGED") {
            self.orchestrator.autonomous_acknowledged = true;
        }

        if let Ok(v) = std::env::var("FEATURE_FACTORY_CONTEXT_COMPACTION_THRESHOLD")
            && let Ok(n) = v.parse::<usize>()
        {
            self.context.compaction_threshold_tokens = n;
        }

        if let Ok(v) = std::env::var("FEATURE_FACTORY_GIT_CHECKPOINTS")
            && v.eq_ignore_ascii_case("false")
        {
            self.orchestrator.checkpoints_enabled = false;
        }

        if let Ok(v) = std::env::var("FEATURE_FACTORY_MAX_RETRIES_PER_PHASE")
            && let Ok(n) = v.parse::<u32>()
        {
            self.orchestrator.max_retries_per_phase = n;
        }
    }
}

fn env_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            !v.is_empty() && v != "0" && v != "false" && v != "no"
        }
        Err(_) => false,
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// How approval gates behave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Never pause for approval
    None,
    /// Pause after every phase that declares `approval_required`
    AfterEachPhase,
}

/// Orchestration limits and policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Workflow budget in USD; "unlimited" lifts the cap
    #[serde(rename = "max-budget-usd", deserialize_with = "deserialize_budget")]
    pub max_budget_usd: f64,

    /// Turn cap per agent phase attempt
    #[serde(rename = "max-turns-per-agent")]
    pub max_turns_per_agent: u32,

    /// Wall-clock cap per agent phase attempt, in milliseconds
    #[serde(rename = "max-duration-ms-per-agent")]
    pub max_duration_ms_per_agent: u64,

    /// Wall-clock cap for the whole workflow, in milliseconds
    #[serde(rename = "max-workflow-duration-ms")]
    pub max_workflow_duration_ms: u64,

    /// Global retry ceiling per phase (phases may override)
    #[serde(rename = "max-retries-per-phase")]
    pub max_retries_per_phase: u32,

    /// Approval gate behavior
    #[serde(rename = "approval-mode")]
    pub approval_mode: ApprovalMode,

    /// Whether git checkpoint tags are created
    #[serde(rename = "checkpoints-enabled")]
    pub checkpoints_enabled: bool,

    /// Autonomous mode: raised caps, no approvals, audit log
    pub autonomous: bool,

    /// Suppress the autonomous-mode acknowledgement prompt
    #[serde(rename = "autonomous-acknowledged")]
    pub autonomous_acknowledged: bool,

    /// Per-model override applied to every persona
    #[serde(rename = "model-override")]
    pub model_override: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_budget_usd: 10.0,
            max_turns_per_agent: 40,
            max_duration_ms_per_agent: 1_800_000,
            max_workflow_duration_ms: 4 * 3_600_000,
            max_retries_per_phase: 2,
            approval_mode: ApprovalMode::AfterEachPhase,
            checkpoints_enabled: true,
            autonomous: false,
            autonomous_acknowledged: false,
            model_override: None,
        }
    }
}

/// Accepts either a number or the string "unlimited"
fn deserialize_budget<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Budget {
        Number(f64),
        Text(String),
    }

    match Budget::deserialize(deserializer)? {
        Budget::Number(n) => Ok(n),
        Budget::Text(s) if s.eq_ignore_ascii_case("unlimited") => Ok(f64::INFINITY),
        Budget::Text(s) => s
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid budget: {}", s))),
    }
}

/// Context window management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Estimated token count that triggers conversation compaction
    #[serde(rename = "compaction-threshold-tokens")]
    pub compaction_threshold_tokens: usize,

    /// Turn pairs kept verbatim when compacting
    #[serde(rename = "keep-recent-pairs")]
    pub keep_recent_pairs: usize,

    /// Bash output cap in chars (head+tail split)
    #[serde(rename = "bash-output-cap")]
    pub bash_output_cap: usize,

    /// Read output cap in chars (middle cut)
    #[serde(rename = "read-output-cap")]
    pub read_output_cap: usize,

    /// Grep output cap in chars (first matches kept)
    #[serde(rename = "grep-output-cap")]
    pub grep_output_cap: usize,

    /// Glob result cap in paths
    #[serde(rename = "glob-max-paths")]
    pub glob_max_paths: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            compaction_threshold_tokens: 120_000,
            keep_recent_pairs: 8,
            bash_output_cap: 30_000,
            read_output_cap: 40_000,
            grep_output_cap: 20_000,
            glob_max_paths: 200,
        }
    }
}

/// Stall detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StallConfig {
    /// Master switch; when off, only turn/time caps bound execution
    pub enabled: bool,

    /// Identical consecutive calls counted as repetition
    #[serde(rename = "repetition-threshold")]
    pub repetition_threshold: usize,

    /// Window inspected for A-B-A-B oscillation
    #[serde(rename = "oscillation-window")]
    pub oscillation_window: usize,

    /// Turns without Write/Edit/Bash counted as idle
    #[serde(rename = "idle-turns")]
    pub idle_turns: usize,

    /// Interventions before a hard stop
    #[serde(rename = "max-interventions")]
    pub max_interventions: u32,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repetition_threshold: 3,
            oscillation_window: 6,
            idle_turns: 15,
            max_interventions: 2,
        }
    }
}

/// Sandbox behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Run the workflow inside a disposable clone
    pub enabled: bool,

    /// Base directory for sandbox clones (default: system temp)
    #[serde(rename = "base-dir")]
    pub base_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_dir: None,
        }
    }
}

/// Commands the pre-phase hooks shell out to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Test command for test-passing-enforcement
    #[serde(rename = "test-command")]
    pub test_command: String,

    /// Coverage command for coverage-threshold
    #[serde(rename = "coverage-command")]
    pub coverage_command: String,

    /// Minimum line coverage percentage
    #[serde(rename = "coverage-threshold")]
    pub coverage_threshold: f64,

    /// Hook command timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            test_command: "npm test".to_string(),
            coverage_command: "npm test -- --coverage".to_string(),
            coverage_threshold: 80.0,
            timeout_ms: 600_000,
        }
    }
}

/// MCP tool forwarding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Enable the forwarded tool family
    pub enabled: bool,

    /// Forwarding endpoint base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "auth-token-env")]
    pub auth_token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://127.0.0.1:8732".to_string(),
            auth_token_env: "FEATURE_FACTORY_MCP_TOKEN".to_string(),
            timeout_ms: 60_000,
        }
    }
}
