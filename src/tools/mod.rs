//! Tool system for file and command operations
//!
//! Tools are registered by name and dispatched from the agent loop. Every
//! failure mode is folded into the returned `ToolResult`; the runtime
//! never raises into the caller.

mod builtin;
mod context;
pub mod credentials;
mod error;
mod executor;
pub mod mcp;
mod traits;

pub use builtin::{BashTool, EditTool, GlobTool, GrepTool, ReadTool, WriteTool};
pub use context::ToolContext;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use mcp::{McpClient, McpTool};
pub use traits::{Tool, ToolResult};
