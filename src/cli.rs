use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "logmend")]
#[command(version)]
#[command(about = "Analyze operational logs and suggest ranked remediation solutions")]
pub struct Args {
    /// Log file to analyze ("-" reads stdin). Optional when only managing
    /// the knowledge store.
    pub log: Option<String>,

    /// Maximum number of solutions to suggest
    #[arg(long, short)]
    pub limit: Option<usize>,

    /// Knowledge store file (overrides the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, default_value = "logmend.toml")]
    pub config: PathBuf,

    /// Free-text feedback to learn from alongside the analysis
    #[arg(long)]
    pub feedback: Option<String>,

    /// Solution text that was applied to this error
    #[arg(long)]
    pub solution_applied: Option<String>,

    /// Whether the applied solution worked (use with --solution-applied)
    #[arg(long)]
    pub solution_worked: Option<bool>,

    /// JSON file holding an array of knowledge items to harvest
    #[arg(long)]
    pub add_knowledge: Option<PathBuf>,

    /// Export the knowledge store to a JSON file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Import a previously exported JSON payload
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Print store statistics
    #[arg(long)]
    pub stats: bool,

    /// Analyze only, skip the learning pass
    #[arg(long)]
    pub no_learn: bool,

    /// Emit analysis and solutions as JSON instead of colored text
    #[arg(long)]
    pub json: bool,
}
