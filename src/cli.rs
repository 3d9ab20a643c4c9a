//! CLI command definitions and event rendering
//!
//! The CLI is a thin consumer of the driver: it subscribes to the event
//! stream, renders progress and feeds approval decisions back. The
//! interactive approval experience is intentionally minimal; a session
//! waiting at a gate is picked up again with `ff resume`.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::events::{EventEnvelope, WorkflowEvent};
use crate::session::WorkflowState;

/// Feature Factory - autonomous multi-phase workflow orchestrator
#[derive(Parser)]
#[command(name = "ff", about = "Autonomous multi-phase workflow orchestrator", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory (default: current directory)
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a workflow against the working directory
    Run {
        /// Workflow name (new-feature, bug-fix, refactor)
        workflow: String,

        /// Task description
        description: String,

        /// Approve every gate without pausing
        #[arg(long)]
        approve_all: bool,

        /// Run inside a disposable sandbox clone
        #[arg(long)]
        sandbox: bool,
    },

    /// Resume a session waiting at an approval gate
    Resume {
        /// Session id (defaults to the most recent resumable session)
        session_id: Option<String>,

        /// Approve the pending gate
        #[arg(long, conflicts_with = "reject")]
        approve: bool,

        /// Reject the pending gate (cancels the workflow)
        #[arg(long)]
        reject: bool,

        /// Reason recorded with a rejection
        #[arg(long)]
        reason: Option<String>,
    },

    /// List persisted sessions
    Sessions,

    /// Delete old sessions
    Cleanup {
        /// Delete sessions older than this many days
        #[arg(long, default_value = "14")]
        days: i64,

        /// Also delete failed sessions regardless of age
        #[arg(long)]
        failed: bool,
    },
}

/// Render one event to the terminal
pub fn render_event(envelope: &EventEnvelope) {
    let ts = envelope.timestamp.format("%H:%M:%S");
    match &envelope.event {
        WorkflowEvent::WorkflowStarted {
            workflow,
            total_phases,
            ..
        } => {
            println!("{} {} {} ({} phases)", ts, "▶".cyan(), workflow.bold(), total_phases);
        }
        WorkflowEvent::WorkflowResumed { phase_index, .. } => {
            println!("{} {} resumed at phase {}", ts, "▶".cyan(), phase_index);
        }
        WorkflowEvent::WorkflowCompleted { total_cost_usd, .. } => {
            println!("{} {} workflow completed (${:.2})", ts, "✓".green(), total_cost_usd);
        }
        WorkflowEvent::WorkflowError { error, .. } => {
            println!("{} {} {}", ts, "✗".red(), error.red());
        }
        WorkflowEvent::PhaseStarted {
            phase_index,
            display_name,
            agent,
        } => {
            println!("{} {} [{}] {} ({})", ts, "●".blue(), phase_index, display_name.bold(), agent);
        }
        WorkflowEvent::PhaseCompleted {
            agent, retry_attempts, ..
        } => {
            if *retry_attempts > 0 {
                println!("{} {} {} done ({} retries)", ts, "✓".green(), agent, retry_attempts);
            } else {
                println!("{} {} {} done", ts, "✓".green(), agent);
            }
        }
        WorkflowEvent::PhaseRetry { agent, attempt, reason, .. } => {
            println!("{} {} {} attempt {} failed: {}", ts, "↻".yellow(), agent, attempt, reason);
        }
        WorkflowEvent::PrePhaseHook { hook, passed, message, .. } => {
            if *passed {
                println!("{} {} hook {} passed", ts, "·".dimmed(), hook);
            } else {
                println!("{} {} hook {} failed: {}", ts, "✗".red(), hook, message);
            }
        }
        WorkflowEvent::CheckpointCreated { tag, .. } => {
            println!("{} {} checkpoint {}", ts, "·".dimmed(), tag.dimmed());
        }
        WorkflowEvent::ApprovalRequested { phase, .. } => {
            println!("{} {} approval required after {}", ts, "⏸".yellow(), phase.bold());
        }
        WorkflowEvent::ApprovalReceived { approved, .. } => {
            let verdict = if *approved { "approved".green() } else { "rejected".red() };
            println!("{} {} gate {}", ts, "·".dimmed(), verdict);
        }
        WorkflowEvent::CostUpdate {
            cumulative_cost_usd, ..
        } => {
            println!("{} {} cumulative cost ${:.4}", ts, "$".dimmed(), cumulative_cost_usd);
        }
    }
}

/// Render the session list
pub fn render_sessions(sessions: &[WorkflowState]) {
    if sessions.is_empty() {
        println!("No sessions.");
        return;
    }

    for session in sessions {
        let status = format!("{:?}", session.status).to_lowercase();
        println!(
            "{}  {}  {}  phase {}  ${:.2}  {}",
            session.session_id.dimmed(),
            session.workflow.bold(),
            status,
            session.current_phase_index,
            session.cumulative_cost_usd,
            session.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
}
