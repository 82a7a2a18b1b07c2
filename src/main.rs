use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use serial_proxy::{
    cli,
    config::{self, Config},
    logging,
    registry::Registry,
    server,
};
use tracing::{debug, error, info, Level};

#[cfg(unix)]
async fn hangup() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::hangup())?.recv().await;

    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    futures::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command)?;

        return Ok(());
    }

    logging::init(cli.log_level, cli.log_dir.map(|dir| (Level::DEBUG, dir))).await;

    let config_path = cli.config.unwrap_or_else(config::default_path);
    debug!(?config_path, "Config from path");

    let config = Config::new_from_path(&config_path)?;
    let registry = Registry::from_config(&config)
        .await
        .wrap_err("Could not set up the serial ports")?;

    println!(
        "Serial Proxy v{} - Waiting for clients",
        env!("CARGO_PKG_VERSION")
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        hung_up = hangup() => {
            hung_up.wrap_err("Could not listen for hangups")?;
            info!("Told to hang up, quitting")
        }
        _ = server::run(registry) => {
            error!("Server returned");
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn hangup_waits_for_the_signal() {
        let waited = tokio::time::timeout(Duration::from_millis(50), hangup()).await;

        // Registering succeeded, so nothing resolves until a SIGHUP arrives.
        assert!(waited.is_err());
    }
}
