//! glob tool - find files matching a pattern

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Result cap; larger result sets are reported as truncated
const MAX_PATHS: usize = 200;

/// Find files matching a glob pattern
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g., **/*.rs)"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                },
                "path": {
                    "type": "string",
                    "description": "Base directory (default: working directory root)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = match input["pattern"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("pattern is required"),
        };

        let base = input["path"].as_str().unwrap_or(".");

        let base_path = match ctx.validate_path(Path::new(base)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let full_pattern = base_path.join(pattern);
        let pattern_str = match full_pattern.to_str() {
            Some(s) => s,
            None => return ToolResult::error("Invalid pattern path"),
        };

        let boundary = ctx.sandbox_boundary.clone();
        let mut matches: Vec<String> = match glob::glob(pattern_str) {
            Ok(paths) => paths
                .filter_map(|r| r.ok())
                .filter(|p| match &boundary {
                    Some(b) => p.starts_with(b),
                    None => true,
                })
                .filter_map(|p| {
                    p.strip_prefix(&ctx.working_directory)
                        .map(|rel| rel.to_string_lossy().to_string())
                        .or_else(|_| p.to_str().map(str::to_string).ok_or(()))
                        .ok()
                })
                .take(MAX_PATHS + 1)
                .collect(),
            Err(e) => return ToolResult::error(format!("Invalid glob pattern: {}", e)),
        };

        if matches.is_empty() {
            return ToolResult::success("No matches found");
        }

        let truncated = matches.len() > MAX_PATHS;
        matches.truncate(MAX_PATHS);

        let mut output = matches.join("\n");
        if truncated {
            output.push_str(&format!("\n... (truncated, first {} paths shown)", MAX_PATHS));
        }
        ToolResult::success(output)
    }
}
