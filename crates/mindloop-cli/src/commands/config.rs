use std::path::Path;

use clap::{Parser, Subcommand};
use mindloop::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Print the effective configuration")]
    Show,

    #[clap(about = "List the locations searched for a config file")]
    Paths,
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config: &Config,
        explicit: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match self.command {
            ConfigSubcommand::Show => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
                OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
            },
            ConfigSubcommand::Paths => {
                let paths = match explicit {
                    Some(path) => vec![path.to_path_buf()],
                    None => Config::default_paths(),
                };
                match format {
                    OutputFormat::Json => {
                        let output: Vec<_> = paths
                            .iter()
                            .map(|p| {
                                serde_json::json!({
                                    "path": p.display().to_string(),
                                    "exists": p.exists(),
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Table => {
                        for path in paths {
                            let marker = if path.exists() { "found" } else { "missing" };
                            println!("{:<8} {}", marker, path.display());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
