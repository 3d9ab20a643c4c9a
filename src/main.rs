//! Feature Factory CLI entry point

use clap::Parser;
use eyre::{Context, Result, eyre};
use std::path::PathBuf;
use tracing::info;

use feature_factory::cli::{Cli, Command, render_event, render_sessions};
use feature_factory::config::Config;
use feature_factory::llm::create_client;
use feature_factory::session::SessionStore;
use feature_factory::tools::McpClient;
use feature_factory::workflow::{RunOutcome, WorkflowDriver};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feature_factory=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let working_directory = match &cli.directory {
        Some(dir) => dir.canonicalize().context("Invalid working directory")?,
        None => std::env::current_dir()?,
    };

    let mut config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            workflow,
            description,
            approve_all,
            sandbox,
        } => {
            if sandbox {
                config.sandbox.enabled = true;
            }
            run(config, working_directory, &workflow, &description, approve_all).await
        }
        Command::Resume {
            session_id,
            approve,
            reject,
            reason,
        } => resume(config, working_directory, session_id, approve, reject, reason).await,
        Command::Sessions => {
            let store = SessionStore::new(&working_directory);
            let sessions = store.list().await?;
            render_sessions(&sessions);
            Ok(())
        }
        Command::Cleanup { days, failed } => {
            let store = SessionStore::new(&working_directory);
            let deleted = store.cleanup(chrono::Duration::days(days), failed).await?;
            println!("Deleted {} sessions", deleted.len());
            Ok(())
        }
    }
}

async fn build_driver(config: Config, working_directory: PathBuf) -> Result<WorkflowDriver> {
    if config.orchestrator.autonomous && !config.orchestrator.autonomous_acknowledged {
        return Err(eyre!(
            "Autonomous mode runs without approval gates. Set \
             FEATURE_FACTORY_AUTONOMOUS_ACKNOWLEDGED=1 to acknowledge."
        ));
    }

    let llm = create_client(&config.llm)?;
    let mut driver = WorkflowDriver::new(config.clone(), llm, working_directory)?;

    // The MCP client is initialized once; all phases share it
    if config.mcp.enabled {
        let client = McpClient::initialize(&config.mcp)
            .await
            .map_err(|e| eyre!("MCP initialization failed: {}", e))?;
        driver.register_mcp(client)?;
    }

    Ok(driver)
}

/// Drain and render events until the bus is momentarily quiet
fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<feature_factory::events::EventEnvelope>) {
    while let Ok(envelope) = rx.try_recv() {
        render_event(&envelope);
    }
}

/// On failure, surface the per-phase checkpoints for manual rollback
///
/// Rollback is never applied automatically, and is only offered when no
/// sandbox was in use (the sandbox already isolated the damage).
fn offer_rollback(driver: &WorkflowDriver, sandbox_active: bool) {
    if sandbox_active {
        return;
    }
    let Some(state) = driver.state() else { return };
    if state.checkpoints.is_empty() {
        return;
    }

    println!("Checkpoints from this session (apply manually if you want to roll back):");
    for (agent, tag) in &state.checkpoints {
        println!("  {}: git reset --hard '{}' && git clean -fd", agent, tag);
    }
}

async fn run(
    config: Config,
    working_directory: PathBuf,
    workflow: &str,
    description: &str,
    approve_all: bool,
) -> Result<()> {
    let sandbox_active = config.sandbox.enabled;
    let mut driver = build_driver(config, working_directory).await?;
    let mut rx = driver.subscribe();

    let mut outcome = driver.run_workflow(workflow, description, None).await?;
    drain_events(&mut rx);

    // Auto-approve gates when asked; otherwise leave the session resumable
    while let RunOutcome::AwaitingApproval { ref phase } = outcome {
        if !approve_all {
            let session_id = driver
                .state()
                .map(|s| s.session_id.clone())
                .unwrap_or_default();
            println!(
                "Session {} is waiting for approval after {}. \
                 Continue with: ff resume {} --approve",
                session_id, phase, session_id
            );
            return Ok(());
        }
        info!("Auto-approving gate after {}", phase);
        outcome = driver.continue_workflow(true, None).await?;
        drain_events(&mut rx);
    }

    if matches!(outcome, RunOutcome::Failed { .. }) {
        offer_rollback(&driver, sandbox_active);
    }
    finish(outcome)
}

async fn resume(
    config: Config,
    working_directory: PathBuf,
    session_id: Option<String>,
    approve: bool,
    reject: bool,
    reason: Option<String>,
) -> Result<()> {
    let sandbox_active = config.sandbox.enabled;
    let mut driver = build_driver(config, working_directory).await?;
    let mut rx = driver.subscribe();

    let session_id = match session_id {
        Some(id) => id,
        None => driver
            .store()
            .get_resumable_session()
            .await?
            .map(|s| s.session_id)
            .ok_or_else(|| eyre!("No resumable session found"))?,
    };

    let outcome = driver.resume_workflow(&session_id).await?;
    drain_events(&mut rx);

    let outcome = match outcome {
        RunOutcome::AwaitingApproval { .. } if reject => {
            driver.continue_workflow(false, reason.as_deref()).await?
        }
        RunOutcome::AwaitingApproval { ref phase } if !approve => {
            println!("Session {} is waiting for approval after {}.", session_id, phase);
            println!("Pass --approve to continue or --reject to cancel.");
            return Ok(());
        }
        RunOutcome::AwaitingApproval { .. } => driver.continue_workflow(true, None).await?,
        other => other,
    };
    drain_events(&mut rx);

    if matches!(outcome, RunOutcome::Failed { .. }) {
        offer_rollback(&driver, sandbox_active);
    }
    finish(outcome)
}

fn finish(outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::AwaitingApproval { phase } => {
            println!("Waiting for approval after {}.", phase);
            Ok(())
        }
        RunOutcome::Cancelled { reason } => Err(eyre!("Workflow cancelled: {}", reason)),
        RunOutcome::Failed { error } => Err(eyre!("Workflow failed: {}", error)),
    }
}
