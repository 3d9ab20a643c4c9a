//! grep tool - line-match search across files

use async_trait::async_trait;
use grep_regex::RegexMatcherBuilder;
use grep_searcher::SearcherBuilder;
use grep_searcher::sinks::UTF8;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Search for a regex pattern in files
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a regex pattern in files. Returns file:line:content matches."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Path to search in (default: '.')"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of matches to return (default: 50)"
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

        let path = input["path"].as_str().unwrap_or(".");
        let case_insensitive = input["case_insensitive"].as_bool().unwrap_or(false);
        let max_results = input["max_results"].as_u64().unwrap_or(50) as usize;

        let search_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let matcher = match RegexMatcherBuilder::new().case_insensitive(case_insensitive).build(pattern) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("Invalid pattern: {}", e)),
        };

        let working_directory = ctx.working_directory.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut searcher = SearcherBuilder::new().line_number(true).build();
            let mut matches: Vec<String> = Vec::new();

            let walker = WalkDir::new(&search_path)
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git");

            for entry in walker.filter_map(|e| e.ok()) {
                if matches.len() >= max_results {
                    break;
                }
                if !entry.file_type().is_file() {
                    continue;
                }

                let display_path = entry
                    .path()
                    .strip_prefix(&working_directory)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();

                let sink_matches = &mut matches;
                let _ = searcher.search_path(
                    &matcher,
                    entry.path(),
                    UTF8(|line_number, line| {
                        sink_matches.push(format!("{}:{}:{}", display_path, line_number, line.trim_end()));
                        // Stop searching once the budget is spent
                        Ok(sink_matches.len() < max_results)
                    }),
                );
            }

            matches
        })
        .await;

        let matches = match result {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("Search failed: {}", e)),
        };

        if matches.is_empty() {
            ToolResult::success("No matches found.")
        } else {
            let truncated = matches.len() >= max_results;
            let mut output = matches.join("\n");
            if truncated {
                output.push_str(&format!("\n... (truncated, first {} matches shown)", max_results));
            }
            ToolResult::success(output)
        }
    }
}
