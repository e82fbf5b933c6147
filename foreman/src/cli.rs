use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(about = "Runs and supervises the services declared in a Procfile", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log service lifecycle events
    #[arg(short, long)]
    pub verbose: bool,

    /// Procfile to load (YAML, or JSON with a .json extension)
    #[arg(short, long, default_value = "Procfile", env = "FOREMAN_PROCFILE")]
    pub file: PathBuf,

    /// Health check interval in milliseconds
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    pub check_interval_ms: u64,

    /// Shell used to run service and check commands
    #[arg(long, default_value = "bash")]
    pub shell: String,
}
