use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stance",
    version,
    about = "Chain-ensemble stance labeling: cheap models first, escalate the uncertain"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Label a JSONL file through the configured chain
    ///
    /// An input with no rows (empty or blank lines only) is not an error: it
    /// records a completed batch with zero records and writes an empty output.
    Run(RunArgs),
    /// Dump one link's persisted table for a batch as JSONL
    Export(ExportArgs),
    /// List batches in a result store
    Batches(BatchesArgs),
    /// Check a chain config, optionally probing every link's endpoint
    Validate(ValidateArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long, default_value = "chain.yaml")]
    pub config: PathBuf,

    /// JSONL rows with `text`/`target` (or `Tweet`/`Target`) fields; blank
    /// lines are skipped and an empty file yields an empty batch
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: PathBuf,

    #[arg(long, default_value = ".stance/results.db")]
    pub db: PathBuf,

    /// Minimum confidence for rows resolved at each link, in link order.
    /// Repeat per link; replaces the config's `filters` when given.
    #[arg(long = "filter")]
    pub filters: Vec<f64>,
}

#[derive(Parser, Clone, Debug)]
pub struct ExportArgs {
    #[arg(long, default_value = ".stance/results.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub batch: String,

    /// 0-based link position
    #[arg(long)]
    pub link: usize,

    /// Write here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct BatchesArgs {
    #[arg(long, default_value = ".stance/results.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    #[arg(long, default_value = "chain.yaml")]
    pub config: PathBuf,

    /// Contact every link's endpoint (model listing, credentials)
    #[arg(long)]
    pub probe: bool,
}
