//! Mindloop daemon - runs the autonomous agent loop

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mindloop::agent::Agent;
use mindloop::channel::{ChannelHandle, InboundMessage, LogNotifier, Notifier, local_channel};
use mindloop::config::{Config, LoggingConfig};
use mindloop::error::Result;

/// Capacity of the local stdin channel
const CHANNEL_CAPACITY: usize = 64;

/// Mindloop - an autonomous observe, think, act agent with durable memory
#[derive(Parser)]
#[command(name = "mindloop")]
#[command(about = "An autonomous agent loop with durable, self-summarizing memory")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Goal to pursue (replaces any saved goal)
    #[arg(long, short = 'g')]
    pub goal: Option<String>,

    /// Read operator messages from stdin and print notifications to stdout
    #[arg(long)]
    pub stdin: bool,

    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Log level for mindloop (overridden by RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(max_cycles) = cli.max_cycles {
        config.agent.max_cycles = Some(max_cycles);
    }
    init_logging(&config.logging);
    tracing::debug!("Config loaded: {:?}", config);

    let (notifier, inbox, handle) = if cli.stdin {
        let (inbox, notifier, handle) = local_channel(CHANNEL_CAPACITY);
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        (notifier, Some(inbox), Some(handle))
    } else {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        (notifier, None, None)
    };

    let mut agent = Agent::start(config, notifier, inbox).await?;
    if let Some(goal) = cli.goal.as_deref() {
        if let Err(e) = agent.set_goal(goal).await {
            tracing::warn!("Failed to record goal: {}", e);
        }
    }

    if let Some(handle) = handle {
        spawn_stdin_bridge(handle);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, finishing current cycle");
        let _ = shutdown_tx.send(true);
    });

    let state = agent.run(shutdown_rx).await?;
    tracing::info!(
        cycles = state.cycles,
        actions = state.actions_executed,
        failed = state.actions_failed,
        "Mindloop stopped"
    );
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,mindloop={}", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Forward stdin lines to the agent and print its notifications
fn spawn_stdin_bridge(handle: ChannelHandle) {
    let ChannelHandle {
        inbound,
        mut outbound,
    } = handle;

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if inbound.send(InboundMessage::new("stdin", line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            println!("{}", message.render());
        }
    });
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
