use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mindloop::config::Config;
use mindloop::memory::MemoryEngine;
use mindloop::provider::LlmProvider;
use mindloop_cli::commands::{
    ConfigCommand, MemoryCommand, ProbeCommand, StatsCommand, SummarizeCommand,
};
use mindloop_cli::error::CliResult;
use mindloop_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mindloop-cli")]
#[command(about = "Mindloop CLI - inspect and maintain an agent's memory")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'm', global = true, help = "Path to the memory file")]
    pub memory_path: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory inspection commands")]
    Memory(MemoryCommand),

    #[clap(about = "Show memory and agent statistics")]
    Stats(StatsCommand),

    #[clap(about = "Condense old memories (stop the daemon first)")]
    Summarize(SummarizeCommand),

    #[clap(about = "Check that the configured backends answer")]
    Probe(ProbeCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.memory_path.clone() {
        config.memory.path = path;
    }
    tracing::debug!(path = %config.memory.path.display(), "Using memory store");

    match &cli.command {
        Command::Config(cmd) => cmd.execute(&config, cli.config.as_deref(), format).await,
        Command::Probe(cmd) => cmd.execute(&config, format).await,
        Command::Memory(_) | Command::Stats(_) | Command::Summarize(_) => {
            let engine = MemoryEngine::open(&config.memory).await?;

            match &cli.command {
                Command::Memory(cmd) => cmd.execute(&engine, format).await,
                Command::Stats(cmd) => cmd.execute(&engine, &config, format).await,
                Command::Summarize(cmd) => {
                    let provider = LlmProvider::from_config(&config)?;
                    cmd.execute(&engine, &provider, format).await
                }
                Command::Config(_) | Command::Probe(_) => Ok(()),
            }
        }
    }
}

/// Library logs go to stderr and stay quiet unless RUST_LOG asks otherwise
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
