//! ToolExecutor - registry and dispatch for agent tools

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{BashTool, EditTool, GlobTool, GrepTool, ReadTool, WriteTool};
use super::mcp::{McpClient, McpTool};
use super::{Tool, ToolContext, ToolResult};

/// Registry-dispatched tool runtime
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
    mcp_names: HashSet<String>,
}

impl ToolExecutor {
    /// Create executor with the builtin tool catalogue
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        tools.insert("read".into(), Box::new(ReadTool));
        tools.insert("write".into(), Box::new(WriteTool));
        tools.insert("edit".into(), Box::new(EditTool));
        tools.insert("glob".into(), Box::new(GlobTool));
        tools.insert("grep".into(), Box::new(GrepTool));
        tools.insert("bash".into(), Box::new(BashTool));

        Self {
            tools,
            mcp_names: HashSet::new(),
        }
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            mcp_names: HashSet::new(),
        }
    }

    /// Register the forwarded MCP family discovered at startup
    pub fn register_mcp(&mut self, client: Arc<McpClient>) {
        for definition in client.tool_definitions().to_vec() {
            self.mcp_names.insert(definition.name.clone());
            self.tools
                .insert(definition.name.clone(), Box::new(McpTool::new(client.clone(), definition)));
        }
    }

    /// Add a tool to the executor
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Whether a name belongs to the forwarded MCP family
    pub fn is_mcp_tool(&self, name: &str) -> bool {
        self.mcp_names.contains(name)
    }

    /// Get tool definitions for the LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Get definitions for a subset of tools by name
    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolDefinition> {
        tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool call
    ///
    /// Never returns Err: unknown tools, invalid input and execution
    /// failures all surface as error results the model can react to.
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(&tool_call.name) else {
            return ToolResult::error(format!("Unknown tool: {}", tool_call.name));
        };

        if let Err(message) = validate_input(&tool.input_schema(), &tool_call.input) {
            return ToolResult::error(message);
        }

        tool.execute(tool_call.input.clone(), ctx).await
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

/// Check required properties and rudimentary types against a JSON schema
fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(obj) = input.as_object() else {
        return Err("Tool input must be a JSON object".to_string());
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("Missing required parameter: {}", key));
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (key, value) in obj {
            let Some(spec) = properties.get(key) else { continue };
            let ok = match spec["type"].as_str() {
                Some("string") => value.is_string(),
                Some("integer") | Some("number") => value.is_number(),
                Some("boolean") => value.is_boolean(),
                Some("array") => value.is_array(),
                Some("object") => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!(
                    "Parameter {} has wrong type (expected {})",
                    key,
                    spec["type"].as_str().unwrap_or("unknown")
                ));
            }
        }
    }

    Ok(())
}
