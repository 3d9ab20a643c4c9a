//! edit tool - replace strings in an existing file

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult, credentials};

/// Replace a specific string in a file
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace a specific string in an existing file. old_string must match exactly once unless replace_all is set."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let old_string = match input["old_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("old_string is required"),
        };

        let new_string = match input["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("new_string is required"),
        };

        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let count = content.matches(old_string).count();
        if count == 0 {
            return ToolResult::error("old_string not found in file. Make sure it matches exactly including whitespace.");
        }
        if count > 1 && !replace_all {
            return ToolResult::error(format!(
                "old_string found {} times, expected exactly 1 (use replace_all=true for multiple)",
                count
            ));
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        if let Err(e) = credentials::scan(Path::new(path), &updated) {
            return ToolResult::error(e.to_string());
        }

        if let Err(e) = tokio::fs::write(&full_path, &updated).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        let replacements = if replace_all { count } else { 1 };
        ToolResult::success(format!("Made {} replacement(s) in {}", replacements, path))
    }
}
