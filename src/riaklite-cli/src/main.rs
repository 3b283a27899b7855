use anyhow::Result;
use clap::Parser;

mod cli;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = telemetry::init_telemetry(&cli.log_dir)?;

    if let Err(e) = cli::run(cli.command, &cli.connection).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}
