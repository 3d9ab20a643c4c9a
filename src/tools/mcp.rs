//! MCP tool forwarding
//!
//! The MCP family (send_sms, make_call, get_debugger_logs, validate_*, ...)
//! is opaque to the orchestrator: tool names and input schemas are
//! discovered from the forwarding service in a single initialization call
//! at process start, and every execution is forwarded verbatim. Failures
//! surface as error results, never as panics or Err into the agent loop.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::McpConfig;
use crate::llm::ToolDefinition;

use super::{Tool, ToolContext, ToolResult};

/// Client for the MCP forwarding service, shared by all forwarded tools
pub struct McpClient {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
    tools: Vec<ToolDefinition>,
}

/// Wire format of the initialization response
#[derive(Debug, Deserialize)]
struct InitializeResponse {
    tools: Vec<McpToolSpec>,
}

#[derive(Debug, Deserialize)]
struct McpToolSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input_schema: Value,
}

/// Wire format of a forwarded call response
#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    output: String,
    #[serde(default)]
    is_error: bool,
}

impl McpClient {
    /// Discover the forwarded tool catalogue
    ///
    /// Called once at startup; subsequent executions share the client.
    pub async fn initialize(config: &McpConfig) -> Result<Arc<Self>, super::ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| super::ToolError::InvalidArgument(format!("MCP client build failed: {}", e)))?;

        let auth_token = std::env::var(&config.auth_token_env).ok();

        let mut request = http.post(format!("{}/initialize", config.base_url));
        if let Some(token) = &auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| super::ToolError::InvalidArgument(format!("MCP initialization failed: {}", e)))?;

        let init: InitializeResponse = response
            .json()
            .await
            .map_err(|e| super::ToolError::InvalidArgument(format!("MCP initialization response invalid: {}", e)))?;

        let tools: Vec<ToolDefinition> = init
            .tools
            .into_iter()
            .map(|spec| ToolDefinition::new(spec.name, spec.description, spec.input_schema))
            .collect();

        info!("MCP initialized with {} forwarded tools", tools.len());

        Ok(Arc::new(Self {
            base_url: config.base_url.clone(),
            auth_token,
            http,
            tools,
        }))
    }

    /// Discovered tool definitions
    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Whether `name` belongs to the forwarded family
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Forward one tool call
    pub async fn call(&self, name: &str, input: Value) -> ToolResult {
        let mut request = self.http.post(format!("{}/tools/{}", self.base_url, name)).json(&input);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("MCP call {} failed: {}", name, e);
                return ToolResult::error(format!("MCP call failed: {}", e));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return ToolResult::error(format!("MCP call {} returned {}: {}", name, status, body));
        }

        match response.json::<CallResponse>().await {
            Ok(call) if call.is_error => ToolResult::error(call.output),
            Ok(call) => ToolResult::success(call.output),
            Err(e) => ToolResult::error(format!("MCP response invalid: {}", e)),
        }
    }
}

/// One forwarded tool, registered into the executor like any builtin
pub struct McpTool {
    client: Arc<McpClient>,
    definition: ToolDefinition,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, definition: ToolDefinition) -> Self {
        Self { client, definition }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn input_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        self.client.call(&self.definition.name, input).await
    }
}
