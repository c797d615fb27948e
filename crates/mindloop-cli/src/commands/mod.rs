pub mod config;
pub mod memory;
pub mod probe;
pub mod stats;
pub mod summarize;

pub use config::ConfigCommand;
pub use memory::MemoryCommand;
pub use probe::ProbeCommand;
pub use stats::StatsCommand;
pub use summarize::SummarizeCommand;
