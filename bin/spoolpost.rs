#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spoolpost::Spoolpost;
use spoolpost_common::{Config, config};

/// Relay queued mail files through an authenticated SMTP server
#[derive(Parser, Debug)]
#[command(name = "spoolpost", version, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(required = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print a sample configuration file
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match (cli.command, cli.config) {
        (Some(Command::Config), _) => {
            print!("{}", config::SAMPLE);
            Ok(())
        }
        (None, Some(path)) => Spoolpost::new(Config::load(&path)?).run().await,
        (None, None) => anyhow::bail!("A configuration file is required"),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::try_parse_from(["spoolpost", "/etc/spoolpost.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/spoolpost.yaml")));
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::try_parse_from(["spoolpost", "config"]).unwrap();
        assert_eq!(cli.command, Some(Command::Config));
    }

    #[test]
    fn test_exactly_one_argument() {
        assert!(Cli::try_parse_from(["spoolpost"]).is_err());
        assert!(Cli::try_parse_from(["spoolpost", "a.yaml", "b.yaml"]).is_err());
    }

    #[test]
    fn test_help_subcommand() {
        let err = Cli::try_parse_from(["spoolpost", "help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
