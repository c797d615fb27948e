use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mindloop::agent::{AgentState, format_uptime};
use mindloop::config::Config;
use mindloop::memory::MemoryEngine;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(
        &self,
        engine: &MemoryEngine,
        config: &Config,
        format: OutputFormat,
    ) -> CliResult<()> {
        let stats = engine.stats().await;
        let agent = AgentState::load(&config.agent.state_path).await?;
        let ceiling = config.memory.summarize_threshold_tokens;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "memory": stats,
                    "summarize_threshold_tokens": ceiling,
                    "agent": agent,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Mindloop Statistics");
                println!("===================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Kind", "Active"]);
                for (kind, count) in &stats.by_kind {
                    table.add_row([kind.to_string(), count.to_string()]);
                }
                println!("{table}\n");

                println!(
                    "Entries: {} total, {} active, {} archived",
                    stats.total, stats.active, stats.archived
                );
                println!(
                    "Active tokens: {} of {} ({:.0}%)",
                    stats.active_tokens,
                    ceiling,
                    stats.active_tokens as f64 * 100.0 / ceiling.max(1) as f64
                );
                println!("Average importance: {:.2}", stats.average_importance);
                if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                    println!(
                        "Span: {} to {}",
                        format_timestamp(&oldest),
                        format_timestamp(&newest)
                    );
                }

                match agent {
                    Some(state) => {
                        println!("\nAgent");
                        println!("-----");
                        println!("Cycles: {}", state.cycles);
                        println!(
                            "Actions: {} ({} failed)",
                            state.actions_executed, state.actions_failed
                        );
                        println!("Errors: {}", state.errors);
                        println!(
                            "Last action: {}",
                            state.last_action.as_deref().unwrap_or("none")
                        );
                        if let Some(at) = state.last_action_at {
                            println!(
                                "Last active: {} ({} ago)",
                                format_timestamp(&at),
                                format_uptime(chrono::Utc::now() - at)
                            );
                        }
                        println!(
                            "Goal: {}",
                            state.current_goal.as_deref().unwrap_or("none")
                        );
                    }
                    None => println!("\nNo saved agent state."),
                }
            }
        }

        Ok(())
    }
}
