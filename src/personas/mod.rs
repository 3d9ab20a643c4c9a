//! Agent personas
//!
//! The seven personas are data handed to the core: a system prompt, the
//! shape of the structured reply, the tool allowlist, a model tier and a
//! pure validator. The orchestrator only relies on the validator contract
//! (ok + reason); everything persona-specific lives in this module.

use serde_json::Value;
use std::collections::HashMap;

use crate::cost::ModelTier;
use crate::prompts::embedded;
use crate::session::WorkflowState;

/// Closed set of persona names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonaName {
    Architect,
    Spec,
    TestGen,
    Dev,
    Qa,
    Review,
    Docs,
}

impl PersonaName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Spec => "spec",
            Self::TestGen => "test-gen",
            Self::Dev => "dev",
            Self::Qa => "qa",
            Self::Review => "review",
            Self::Docs => "docs",
        }
    }

    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "architect" => Some(Self::Architect),
            "spec" => Some(Self::Spec),
            "test-gen" => Some(Self::TestGen),
            "dev" => Some(Self::Dev),
            "qa" => Some(Self::Qa),
            "review" => Some(Self::Review),
            "docs" => Some(Self::Docs),
            _ => None,
        }
    }
}

impl std::fmt::Display for PersonaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a persona validator
#[derive(Debug, Clone)]
pub struct Validation {
    pub ok: bool,
    pub reason: String,
}

impl Validation {
    pub fn pass() -> Self {
        Self {
            ok: true,
            reason: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// Pure validator over the agent's structured output
pub type Validator = fn(&Value, &WorkflowState) -> Validation;

/// One configured agent persona
#[derive(Clone)]
pub struct AgentPersona {
    pub name: PersonaName,
    pub system_prompt: &'static str,
    pub output_schema: Value,
    pub allowed_tools: Vec<String>,
    pub default_model: ModelTier,
    pub validator: Validator,
}

impl std::fmt::Debug for AgentPersona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPersona")
            .field("name", &self.name)
            .field("allowed_tools", &self.allowed_tools)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Model identifier for a pricing tier
pub fn model_id(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Opus => "claude-opus-4-20250514",
        ModelTier::Sonnet => "claude-sonnet-4-20250514",
        ModelTier::Haiku => "claude-3-5-haiku-20241022",
    }
}

fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// The builtin persona registry, keyed by persona name
pub fn builtin_personas() -> HashMap<&'static str, AgentPersona> {
    let mut registry = HashMap::new();

    registry.insert(
        PersonaName::Architect.as_str(),
        AgentPersona {
            name: PersonaName::Architect,
            system_prompt: embedded::ARCHITECT_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "design": { "type": "string" },
                    "approved": { "type": "boolean" },
                    "risks": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["design", "approved"]
            }),
            allowed_tools: tools(&["read", "glob", "grep"]),
            default_model: ModelTier::Opus,
            validator: validate_architect,
        },
    );

    registry.insert(
        PersonaName::Spec.as_str(),
        AgentPersona {
            name: PersonaName::Spec,
            system_prompt: embedded::SPEC_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "requirements": { "type": "array", "items": { "type": "string" } },
                    "acceptanceCriteria": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["requirements", "acceptanceCriteria"]
            }),
            allowed_tools: tools(&["read", "write", "glob", "grep"]),
            default_model: ModelTier::Sonnet,
            validator: validate_spec,
        },
    );

    registry.insert(
        PersonaName::TestGen.as_str(),
        AgentPersona {
            name: PersonaName::TestGen,
            system_prompt: embedded::TEST_GEN_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "testsCreated": { "type": "integer" },
                    "allTestsFailing": { "type": "boolean" },
                    "testFiles": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["testsCreated", "allTestsFailing"]
            }),
            allowed_tools: tools(&["read", "write", "edit", "glob", "grep", "bash"]),
            default_model: ModelTier::Sonnet,
            validator: validate_test_gen,
        },
    );

    registry.insert(
        PersonaName::Dev.as_str(),
        AgentPersona {
            name: PersonaName::Dev,
            system_prompt: embedded::DEV_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "testsPassing": { "type": "boolean" }
                },
                "required": ["summary", "testsPassing"]
            }),
            allowed_tools: tools(&["read", "write", "edit", "glob", "grep", "bash"]),
            default_model: ModelTier::Sonnet,
            validator: validate_dev,
        },
    );

    registry.insert(
        PersonaName::Qa.as_str(),
        AgentPersona {
            name: PersonaName::Qa,
            system_prompt: embedded::QA_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "passed": { "type": "boolean" },
                    "issues": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["passed"]
            }),
            allowed_tools: tools(&["read", "glob", "grep", "bash"]),
            default_model: ModelTier::Sonnet,
            validator: validate_qa,
        },
    );

    registry.insert(
        PersonaName::Review.as_str(),
        AgentPersona {
            name: PersonaName::Review,
            system_prompt: embedded::REVIEW_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "approved": { "type": "boolean" },
                    "comments": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["approved"]
            }),
            allowed_tools: tools(&["read", "glob", "grep"]),
            default_model: ModelTier::Opus,
            validator: validate_review,
        },
    );

    registry.insert(
        PersonaName::Docs.as_str(),
        AgentPersona {
            name: PersonaName::Docs,
            system_prompt: embedded::DOCS_SYSTEM_PROMPT,
            output_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "filesUpdated": { "type": "array", "items": { "type": "string" } },
                    "summary": { "type": "string" }
                },
                "required": ["filesUpdated"]
            }),
            allowed_tools: tools(&["read", "write", "edit", "glob", "grep"]),
            default_model: ModelTier::Haiku,
            validator: validate_docs,
        },
    );

    registry
}

fn validate_architect(output: &Value, _state: &WorkflowState) -> Validation {
    let design = output["design"].as_str().unwrap_or("");
    if design.trim().is_empty() {
        return Validation::fail("design is empty");
    }
    match output["approved"].as_bool() {
        Some(true) => Validation::pass(),
        Some(false) => Validation::fail("architect did not approve the design (approved=false)"),
        None => Validation::fail("approved flag missing"),
    }
}

fn validate_spec(output: &Value, _state: &WorkflowState) -> Validation {
    match output["requirements"].as_array() {
        Some(reqs) if !reqs.is_empty() => Validation::pass(),
        Some(_) => Validation::fail("requirements list is empty"),
        None => Validation::fail("requirements missing"),
    }
}

fn validate_test_gen(output: &Value, _state: &WorkflowState) -> Validation {
    if output["testsCreated"].as_u64().is_none() {
        return Validation::fail("testsCreated missing or not a number");
    }
    if output["allTestsFailing"].as_bool().is_none() {
        return Validation::fail("allTestsFailing missing");
    }
    Validation::pass()
}

fn validate_dev(output: &Value, _state: &WorkflowState) -> Validation {
    let summary = output["summary"].as_str().unwrap_or("");
    if summary.trim().is_empty() {
        return Validation::fail("summary is empty");
    }
    match output["testsPassing"].as_bool() {
        Some(true) => Validation::pass(),
        Some(false) => Validation::fail("implementation reports failing tests (testsPassing=false)"),
        None => Validation::fail("testsPassing flag missing"),
    }
}

fn validate_qa(output: &Value, _state: &WorkflowState) -> Validation {
    match output["passed"].as_bool() {
        Some(true) => Validation::pass(),
        Some(false) => {
            let issues = output["issues"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            Validation::fail(format!("QA found issues: {}", issues))
        }
        None => Validation::fail("passed flag missing"),
    }
}

fn validate_review(output: &Value, _state: &WorkflowState) -> Validation {
    match output["approved"].as_bool() {
        Some(true) => Validation::pass(),
        Some(false) => Validation::fail("review rejected the change (approved=false)"),
        None => Validation::fail("approved flag missing"),
    }
}

fn validate_docs(output: &Value, _state: &WorkflowState) -> Validation {
    match output["filesUpdated"].as_array() {
        Some(_) => Validation::pass(),
        None => Validation::fail("filesUpdated missing"),
    }
}
