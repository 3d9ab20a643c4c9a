//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
///
/// These never propagate out of the runtime as Err values the agent loop
/// must handle; they are rendered into an error `ToolResult` so the model
/// sees the failure and can adapt.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("SANDBOX VIOLATION: {path} resolves outside the sandbox {boundary}")]
    SandboxViolation { path: PathBuf, boundary: PathBuf },

    #[error("Credential detected ({pattern}); refusing to write. Use a placeholder or an environment variable.")]
    CredentialDetected { pattern: &'static str },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("File already exists: {path}. Write creates new files; use edit to modify existing ones.")]
    FileExists { path: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("old_string not found in file. Make sure it matches exactly including whitespace.")]
    PatternNotFound,

    #[error("old_string found {count} times, expected exactly 1 (use replace_all=true for multiple)")]
    PatternNotUnique { count: usize },
}
