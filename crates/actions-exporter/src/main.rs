//! Binary running the GitHub Actions exporter.

use actions_exporter::{Cli, Command, Exporter, ExporterConfig};
use anyhow::Context as _;
use clap::Parser as _;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed installing Ctrl+C handler")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed installing Ctrl+C handler")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Command::Server(args) = cli.command;
    init_tracing(args.verbose);

    let config = ExporterConfig::try_from(args).context("invalid exporter configuration")?;
    tracing::debug!(?config, "Parsed exporter configuration");

    let mut exporter = Exporter::bind(&config).await?;
    exporter.start();

    wait_for_shutdown_signal().await?;
    tracing::info!("Attempt to shutdown instance...");
    exporter.shutdown().await;
    Ok(())
}
