mod cli;

use clap::Parser;
use foreman_core::SupervisorConfig;
use foreman_supervisor::Foreman;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SupervisorConfig {
        check_interval: Duration::from_millis(cli.check_interval_ms),
        shell: cli.shell,
        ..Default::default()
    };

    let foreman = Foreman::load(&cli.file, config).await?;
    tracing::info!(
        "Loaded {} services from {}",
        foreman.registry().len(),
        cli.file.display()
    );

    foreman.start().await?;
    Ok(())
}
