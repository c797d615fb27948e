use clap::Parser;
use mindloop::memory::{MemoryEngine, SummarizeOutcome};
use mindloop::provider::LlmProvider;

use crate::error::CliResult;
use crate::output::OutputFormat;

/// Run a summarization pass against the configured providers
///
/// The daemon rewrites the same store file; stop it first.
#[derive(Parser)]
pub struct SummarizeCommand {
    #[clap(long, short, help = "Summarize even when under the token ceiling")]
    pub force: bool,
}

impl SummarizeCommand {
    pub async fn execute(
        &self,
        engine: &MemoryEngine,
        provider: &LlmProvider,
        format: OutputFormat,
    ) -> CliResult<()> {
        let outcome = if self.force {
            engine.force_summarize(provider).await?
        } else {
            engine.summarize_if_needed(provider).await?
        };

        match format {
            OutputFormat::Json => {
                let output = match &outcome {
                    SummarizeOutcome::NotNeeded => serde_json::json!({ "outcome": "not_needed" }),
                    SummarizeOutcome::Summarized {
                        summary_id,
                        consumed,
                        tokens_before,
                        tokens_after,
                    } => serde_json::json!({
                        "outcome": "summarized",
                        "summary_id": summary_id,
                        "consumed": consumed,
                        "tokens_before": tokens_before,
                        "tokens_after": tokens_after,
                    }),
                    SummarizeOutcome::Skipped { reason } => {
                        serde_json::json!({ "outcome": "skipped", "reason": reason })
                    }
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => match outcome {
                SummarizeOutcome::NotNeeded => {
                    println!("Active memory is under the ceiling; nothing to do.");
                    println!("Use --force to summarize anyway.");
                }
                SummarizeOutcome::Summarized {
                    summary_id,
                    consumed,
                    tokens_before,
                    tokens_after,
                } => {
                    println!("Summarized {consumed} entries into {summary_id}");
                    println!("Active tokens: {tokens_before} -> {tokens_after}");
                }
                SummarizeOutcome::Skipped { reason } => {
                    println!("Summarization skipped: {reason}");
                }
            },
        }

        Ok(())
    }
}
