//! Anthropic Claude API client implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, StopReason,
    TokenUsage, ToolCall,
};
use crate::config::LlmConfig;

/// Anthropic Claude API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable specified in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": convert_messages(&request.messages),
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(
                request
                    .tools
                    .iter()
                    .map(|t| t.to_anthropic_schema())
                    .collect::<Vec<_>>()
            );
        }

        body
    }

    /// Parse the Anthropic API response
    fn parse_response(&self, api_response: AnthropicResponse) -> CompletionResponse {
        let mut content = None;
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                AnthropicContentBlock::Text { text } => {
                    content = Some(text);
                }
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input });
                }
            }
        }

        CompletionResponse {
            content,
            tool_calls,
            stop_reason: StopReason::from_anthropic(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        }
    }
}

/// Convert internal Message types to Anthropic API format
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            let content = match &msg.content {
                MessageContent::Text(text) => serde_json::json!(text),
                MessageContent::Blocks(blocks) => {
                    serde_json::json!(blocks.iter().map(convert_content_block).collect::<Vec<_>>())
                }
            };

            serde_json::json!({
                "role": msg.role,
                "content": content,
            })
        })
        .collect()
}

/// Convert a ContentBlock to Anthropic API format
fn convert_content_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => {
            serde_json::json!({
                "type": "text",
                "text": text,
            })
        }
        ContentBlock::ToolUse { id, name, input } => {
            serde_json::json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            })
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            })
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let api_response: AnthropicResponse = response.json().await?;
        Ok(self.parse_response(api_response))
    }
}

/// Wire format of the Anthropic Messages API response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    fn test_client() -> AnthropicClient {
        AnthropicClient {
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens: 8192,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let client = test_client();
        let request = CompletionRequest {
            system_prompt: "You are an architect.".to_string(),
            messages: vec![Message::user("Design a thing")],
            tools: vec![],
            max_tokens: 4096,
            model: "claude-sonnet-4".to_string(),
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "You are an architect.");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_body_caps_max_tokens() {
        let client = test_client();
        let request = CompletionRequest {
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![],
            max_tokens: 1_000_000,
            model: "claude-sonnet-4".to_string(),
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["max_tokens"], 8192);
    }

    #[test]
    fn test_build_request_body_includes_tools() {
        let client = test_client();
        let request = CompletionRequest {
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![ToolDefinition::new("read", "Read a file", serde_json::json!({"type": "object"}))],
            max_tokens: 1024,
            model: "claude-haiku-3-5".to_string(),
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["tools"][0]["name"], "read");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let client = test_client();
        let api_response = AnthropicResponse {
            content: vec![
                AnthropicContentBlock::Text {
                    text: "Let me read that file.".to_string(),
                },
                AnthropicContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "read".to_string(),
                    input: serde_json::json!({"file_path": "src/lib.rs"}),
                },
            ],
            stop_reason: "tool_use".to_string(),
            usage: AnthropicUsage {
                input_tokens: 120,
                output_tokens: 40,
            },
        };

        let response = client.parse_response(api_response);
        assert_eq!(response.content.as_deref(), Some("Let me read that file."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "read");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.input_tokens, 120);
    }

    #[test]
    fn test_convert_messages_tool_result_round_trip() {
        let messages = vec![Message::user_blocks(vec![ContentBlock::tool_result(
            "toolu_1",
            "file contents",
            false,
        )])];

        let converted = convert_messages(&messages);
        assert_eq!(converted[0]["role"], "user");
        assert_eq!(converted[0]["content"][0]["type"], "tool_result");
        assert_eq!(converted[0]["content"][0]["tool_use_id"], "toolu_1");
    }
}
