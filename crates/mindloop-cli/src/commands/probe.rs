use std::time::Instant;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mindloop::config::Config;
use mindloop::provider::{Backend, ConnectionReport, build_backend};

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

/// Check that configured backends answer
#[derive(Parser)]
pub struct ProbeCommand {
    #[clap(long, short, help = "Probe every backend, not only the primary")]
    pub all: bool,
}

impl ProbeCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let count = if self.all { config.providers.len() } else { 1 };
        let mut reports = Vec::new();

        for backend_config in config.providers.iter().take(count) {
            let report = match build_backend(backend_config) {
                Ok(backend) => {
                    let started = Instant::now();
                    let result = backend.test_connection().await;
                    ConnectionReport {
                        backend: backend.name().to_string(),
                        model: backend.model().to_string(),
                        reachable: result.is_ok(),
                        latency_ms: u64::try_from(started.elapsed().as_millis())
                            .unwrap_or(u64::MAX),
                        error: result.err().map(|e| e.to_string()),
                    }
                }
                Err(e) => ConnectionReport {
                    backend: backend_config.display_name(),
                    model: backend_config.model.clone(),
                    reachable: false,
                    latency_ms: 0,
                    error: Some(e.to_string()),
                },
            };
            reports.push(report);
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Backend", "Model", "Status", "Latency", "Error"]);

                for report in &reports {
                    table.add_row([
                        report.backend.clone(),
                        report.model.clone(),
                        if report.reachable { "✅ reachable" } else { "❌ unreachable" }
                            .to_string(),
                        format!("{} ms", report.latency_ms),
                        truncate_string(report.error.as_deref().unwrap_or("-"), 60),
                    ]);
                }

                println!("{table}");
            }
        }

        if reports.iter().any(|r| !r.reachable) {
            return Err("one or more backends are unreachable".into());
        }
        Ok(())
    }
}
