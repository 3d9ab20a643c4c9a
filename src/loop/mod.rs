//! Agent loop - one phase's inner agentic execution

mod engine;
mod output;

pub use engine::{AgentFailure, AgentLoop, AgentRun};
pub use output::parse_structured_output;
