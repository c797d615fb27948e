use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mindloop::memory::{MemoryEngine, MemoryKind, MemoryRecord};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List memories, newest first")]
    List(ListArgs),

    #[clap(about = "Search active memories by text")]
    Search(SearchArgs),

    #[clap(about = "Show memory details")]
    Show(ShowArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,

    #[clap(
        long,
        short,
        help = "Filter by kind (observation, reflection, action-result, summary, goal)"
    )]
    pub kind: Option<String>,

    #[clap(long, short, help = "Include entries archived by summarization")]
    pub all: bool,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Text to look for (case-insensitive)")]
    pub query: String,

    #[clap(long, short, default_value = "10", help = "Maximum number of results")]
    pub limit: usize,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,
}

#[derive(Serialize)]
struct Row<'a> {
    id: String,
    kind: MemoryKind,
    content: &'a str,
    importance: f32,
    timestamp: String,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl<'a> Row<'a> {
    fn from_record(record: &'a MemoryRecord) -> Self {
        Self {
            id: record.entry.id().to_string(),
            kind: record.entry.kind(),
            content: record.entry.content(),
            importance: record.entry.importance(),
            timestamp: record.entry.timestamp().to_rfc3339(),
            active: record.is_active(),
            score: None,
        }
    }
}

impl MemoryCommand {
    pub async fn execute(&self, engine: &MemoryEngine, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(engine, args, format).await,
            MemorySubcommand::Search(args) => Self::search(engine, args, format).await,
            MemorySubcommand::Show(args) => Self::show(engine, args, format).await,
        }
    }

    async fn list(engine: &MemoryEngine, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let kind_filter: Option<MemoryKind> = match args.kind.as_deref() {
            Some(kind) => Some(kind.parse().map_err(|_| {
                format!(
                    "Unknown memory kind: {kind}. Use observation, reflection, action-result, summary, or goal."
                )
            })?),
            None => None,
        };

        let mut records = engine.history().await;
        if !args.all {
            records.retain(MemoryRecord::is_active);
        }
        if let Some(kind) = kind_filter {
            records.retain(|r| r.entry.kind() == kind);
        }
        // Stable sort keeps insertion order for equal timestamps; reverse for newest first
        records.sort_by_key(|r| r.entry.timestamp());
        records.reverse();
        records.truncate(args.limit);

        match format {
            OutputFormat::Json => {
                let rows: Vec<Row<'_>> = records.iter().map(Row::from_record).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Kind", "Content", "Importance", "Created", "Status"]);

                for record in &records {
                    table.add_row([
                        truncate_string(&record.entry.id().to_string(), 8),
                        record.entry.kind().to_string(),
                        truncate_string(record.entry.content(), 50),
                        format!("{:.2}", record.entry.importance()),
                        format_timestamp(&record.entry.timestamp()),
                        if record.is_active() { "active" } else { "archived" }.to_string(),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} memories", records.len());
            }
        }

        Ok(())
    }

    async fn search(
        engine: &MemoryEngine,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let results = engine.search(&args.query, args.limit).await;

        match format {
            OutputFormat::Json => {
                let rows: Vec<Row<'_>> = results
                    .iter()
                    .map(|s| Row {
                        id: s.entry.id().to_string(),
                        kind: s.entry.kind(),
                        content: s.entry.content(),
                        importance: s.entry.importance(),
                        timestamp: s.entry.timestamp().to_rfc3339(),
                        active: true,
                        score: Some(s.score),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            OutputFormat::Table => {
                if results.is_empty() {
                    println!("No memories match '{}'.", args.query);
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Kind", "Content", "Score", "Created"]);

                for scored in &results {
                    table.add_row([
                        truncate_string(&scored.entry.id().to_string(), 8),
                        scored.entry.kind().to_string(),
                        truncate_string(scored.entry.content(), 60),
                        format!("{:.3}", scored.score),
                        format_timestamp(&scored.entry.timestamp()),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn show(engine: &MemoryEngine, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let id = Uuid::parse_str(&args.id).map_err(|e| format!("Invalid UUID format: {e}"))?;

        let record = engine
            .get(id)
            .await
            .ok_or_else(|| format!("Memory not found: {}", args.id))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            OutputFormat::Table => {
                let entry = &record.entry;
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID".to_string(), entry.id().to_string()]);
                table.add_row(["Kind".to_string(), entry.kind().to_string()]);
                table.add_row(["Content".to_string(), entry.content().to_string()]);
                table.add_row(["Importance".to_string(), format!("{:.2}", entry.importance())]);
                table.add_row(["Created".to_string(), entry.timestamp().to_rfc3339()]);
                table.add_row(["Tokens".to_string(), entry.token_estimate().to_string()]);
                table.add_row([
                    "Archived By".to_string(),
                    record
                        .archived_by
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
                for (key, value) in entry.metadata() {
                    table.add_row([format!("meta.{key}"), value.to_string()]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}
