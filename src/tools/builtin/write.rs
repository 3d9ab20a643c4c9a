//! write tool - create a new file

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult, credentials};

/// Create a new file. Write creates, edit mutates.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create a new file. Fails if the file already exists; use edit for existing files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if full_path.exists() {
            return ToolResult::error(format!(
                "File already exists: {}. Write creates new files; use edit to modify existing ones.",
                path
            ));
        }

        if let Err(e) = credentials::scan(Path::new(path), content) {
            return ToolResult::error(e.to_string());
        }

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories: {}", e));
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(serde_json::json!({"file_path": "hello.txt", "content": "hi"}), &ctx)
            .await;

        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("hello.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(
                serde_json::json!({"file_path": "a/b/c.txt", "content": "nested"}),
                &ctx,
            )
            .await;

        assert!(result.success);
        assert!(temp.path().join("a/b/c.txt").exists());
    }

    #[tokio::test]
    async fn test_write_refuses_overwrite() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("exists.txt"), "original").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(
                serde_json::json!({"file_path": "exists.txt", "content": "clobber"}),
                &ctx,
            )
            .await;

        assert!(result.is_error());
        assert!(result.content().contains("already exists"));
        assert_eq!(fs::read_to_string(temp.path().join("exists.txt")).unwrap(), "original");
    }

    #[tokio::test]
    async fn test_write_rejects_credentials() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": "src/config.js",
                    "content": "const sid = 'ACaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa';"
                }),
                &ctx,
            )
            .await;

        assert!(result.is_error());
        assert!(result.content().contains("Credential detected"));
        assert!(!temp.path().join("src/config.js").exists());
    }

    #[tokio::test]
    async fn test_write_allows_credentials_in_test_dir() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": "tests/fixtures/sid.js",
                    "content": "const sid = 'ACaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa';"
                }),
                &ctx,
            )
            .await;

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_write_outside_sandbox() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::sandboxed(temp.path().to_path_buf(), temp.path().to_path_buf());
        let tool = WriteTool;

        let result = tool
            .execute(
                serde_json::json!({"file_path": "/tmp/escape.txt", "content": "x"}),
                &ctx,
            )
            .await;

        assert!(result.is_error());
        assert!(result.content().starts_with("SANDBOX VIOLATION"));
    }
}
