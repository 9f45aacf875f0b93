/// Spinoza CLI - launch tool providers, inspect the registry, call tools.
use clap::{Parser, Subcommand};
use spinoza_core::{SessionManager, SessionOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;

/// Total budget for tearing the fleet down at exit.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

/// Extra slack past the budget before the process exits regardless.
const EXIT_MARGIN: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "spinoza")]
#[command(about = "Tool provider orchestrator", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Provider configuration file
    #[arg(short, long, global = true, default_value = "spinoza.json")]
    config: PathBuf,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Shortcut for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured provider and print the merged tool registry
    List {
        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Call a tool by name
    Call {
        /// Tool name as it appears in the registry
        tool: String,

        /// JSON arguments object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Invocation timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let descriptors = config::load_descriptors(&args.config)?;
    let manager = Arc::new(SessionManager::new(descriptors)?);

    spawn_signal_task(&manager);

    let summary = manager.initialize_all().await;
    info!(
        ready = summary.ready,
        failed = summary.failed,
        "Providers started"
    );

    let exit_code = match args.command {
        Commands::List { json } => {
            run_list(&manager, &summary.sessions, json);
            0
        }
        Commands::Call {
            tool,
            args: call_args,
            timeout_ms,
        } => run_call(&manager, &tool, &call_args, timeout_ms).await,
    };

    teardown(&manager).await;
    std::process::exit(exit_code);
}

fn run_list(manager: &SessionManager, sessions: &[(String, SessionOutcome)], json: bool) {
    if json {
        let payload = serde_json::json!({
            "sessions": sessions
                .iter()
                .map(|(id, outcome)| serde_json::json!({ "id": id, "outcome": outcome }))
                .collect::<Vec<_>>(),
            "tools": manager.list_tools(),
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        return;
    }

    for (id, outcome) in sessions {
        match outcome {
            SessionOutcome::Ready { tool_count } => {
                println!("session {:<20} ready   {} tools", id, tool_count)
            }
            SessionOutcome::Failed { reason } => {
                println!("session {:<20} failed  {}", id, reason)
            }
        }
    }
    println!();
    for tool in manager.list_tools() {
        println!("tool    {:<30} owner {}", tool.name, tool.owner);
    }
}

async fn run_call(manager: &SessionManager, tool: &str, raw_args: &str, timeout_ms: u64) -> i32 {
    let call_args: serde_json::Value = match serde_json::from_str(raw_args) {
        Ok(v) => v,
        Err(e) => {
            error!("--args is not valid JSON: {}", e);
            return 2;
        }
    };

    match manager
        .invoke(tool, call_args, Duration::from_millis(timeout_ms))
        .await
    {
        Ok(result) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
            0
        }
        Err(e) => {
            error!(tool = %tool, "Invocation failed: {}", e);
            1
        }
    }
}

/// Wire Ctrl-C and SIGTERM into a coordinated teardown. The signal path
/// and the normal exit path share one teardown pass.
fn spawn_signal_task(manager: &Arc<SessionManager>) {
    let coordinator = manager.coordinator();
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Shutdown signal received, stopping providers");
        let report = coordinator.shutdown_all(SHUTDOWN_BUDGET).await;
        if !report.complete {
            for id in report.unresponsive() {
                warn!(session = %id, "Provider not confirmed dead at exit");
            }
        }
        std::process::exit(130);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Bounded teardown at normal exit. The margin past the budget is the
/// last resort: if teardown itself stalls the process exits anyway.
async fn teardown(manager: &SessionManager) {
    match tokio::time::timeout(
        SHUTDOWN_BUDGET + EXIT_MARGIN,
        manager.shutdown_all(SHUTDOWN_BUDGET),
    )
    .await
    {
        Ok(report) => {
            if !report.complete {
                for id in report.unresponsive() {
                    warn!(session = %id, "Provider not confirmed dead at exit");
                }
            }
        }
        Err(_) => {
            error!("Teardown stalled past its budget, exiting");
            std::process::exit(1);
        }
    }
}
