use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{config::Config, error::Error};

/// The command line interface for serial proxy.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file.
    /// Defaults to `/etc/serial-proxy.ron` on unix, `serial-proxy.ron` elsewhere.
    pub config: Option<PathBuf>,

    /// How verbose diagnostics on stderr should be.
    /// `RUST_LOG` overrides this.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also write debug level logs to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}

/// Run a subcommand, printing its output to stdout.
pub fn handle_command(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Examples(Examples::Config) => {
            println!("{}", Config::example().serialize_pretty()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "serial-proxy",
            "proxy.ron",
            "--log-level",
            "debug",
            "--log-dir",
            "logs",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("proxy.ron")));
        assert_eq!(cli.log_level, Level::DEBUG);
        assert_eq!(cli.log_dir, Some(PathBuf::from("logs")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn examples_config() {
        let cli = Cli::parse_from(["serial-proxy", "examples", "config"]);

        assert!(matches!(
            cli.command,
            Some(Commands::Examples(Examples::Config))
        ));
    }
}
