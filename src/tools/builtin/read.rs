//! read tool - read file contents with line numbers

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Read a file's contents with line numbers
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file's contents with line numbers."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max lines to read (default: 2000)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let offset = input["offset"].as_u64().unwrap_or(1) as usize;
        let limit = input["limit"].as_u64().unwrap_or(2000) as usize;

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let bytes = match tokio::fs::read(&full_path).await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let content = match String::from_utf8(bytes) {
            Ok(c) => c,
            Err(_) => return ToolResult::error(format!("{} is not a text file", path)),
        };

        // Format with line numbers (cat -n style)
        let lines: Vec<String> = content
            .lines()
            .skip(offset.saturating_sub(1))
            .take(limit)
            .enumerate()
            .map(|(i, line)| {
                let line_num = offset + i;
                let truncated = if line.len() > 2000 {
                    format!("{}...", &line[..2000])
                } else {
                    line.to_string()
                };
                format!("{:>6}│{}", line_num, truncated)
            })
            .collect();

        ToolResult::success(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_basic() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool.execute(serde_json::json!({"file_path": "test.txt"}), &ctx).await;

        assert!(result.success);
        assert!(result.output.contains("line 1"));
        assert!(result.output.contains("line 3"));
    }

    #[tokio::test]
    async fn test_read_with_offset_and_limit() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3\nline 4").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool
            .execute(serde_json::json!({"file_path": "test.txt", "offset": 2, "limit": 2}), &ctx)
            .await;

        assert!(result.success);
        assert!(!result.output.contains("│line 1"));
        assert!(result.output.contains("line 2"));
        assert!(result.output.contains("line 3"));
        assert!(!result.output.contains("line 4"));
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool
            .execute(serde_json::json!({"file_path": "nonexistent.txt"}), &ctx)
            .await;

        assert!(result.is_error());
        assert!(result.content().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_read_binary_rejected() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("blob.bin"), [0u8, 159, 146, 150, 255]).unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool.execute(serde_json::json!({"file_path": "blob.bin"}), &ctx).await;

        assert!(result.is_error());
        assert!(result.content().contains("not a text file"));
    }

    #[tokio::test]
    async fn test_read_outside_sandbox() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::sandboxed(temp.path().to_path_buf(), temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool.execute(serde_json::json!({"file_path": "/etc/hosts"}), &ctx).await;

        assert!(result.is_error());
        assert!(result.content().starts_with("SANDBOX VIOLATION"));
    }

    #[tokio::test]
    async fn test_read_missing_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = ReadTool;

        let result = tool.execute(serde_json::json!({}), &ctx).await;

        assert!(result.is_error());
        assert!(result.content().contains("file_path is required"));
    }
}
