use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use strum_macros::Display;

use crate::STORAGECTL_VERSION;

#[derive(Parser, Debug)]
#[clap(version = STORAGECTL_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Debug)]
    pub verbosity: LevelFilter,

    /// Configuration file, defaults apply when missing
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Commands {
    /// Probe the system and print the devicegraph
    Probe {
        /// Save the devicegraph to this file instead of printing it
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a devicegraph and check its consistency
    Check {
        #[clap(index = 1)]
        file: PathBuf,
    },

    /// Print the actions that turn the probed devicegraph into staging
    Plan {
        /// The staging devicegraph
        #[clap(short, long)]
        staging: PathBuf,

        /// Write the action graph in Graphviz format to this file
        #[clap(long)]
        graphviz: Option<PathBuf>,
    },

    /// Make the system look like the staging devicegraph
    Commit {
        /// The staging devicegraph
        #[clap(short, long)]
        staging: PathBuf,

        /// Log the actions instead of running them
        #[clap(long)]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cli = Cli::parse_from(["storagectl", "plan", "--staging", "staging.yaml", "-v", "info"]);
        assert_eq!(cli.verbosity, LevelFilter::Info);
        assert_eq!(cli.config, None);
        match cli.command {
            Commands::Plan { staging, graphviz } => {
                assert_eq!(staging, PathBuf::from("staging.yaml"));
                assert_eq!(graphviz, None);
            }
            other => panic!("unexpected command {other}"),
        }

        let cli = Cli::parse_from([
            "storagectl",
            "--config",
            "/etc/storagectl.yaml",
            "commit",
            "-s",
            "staging.yaml",
            "--dry-run",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/storagectl.yaml")));
        assert!(matches!(cli.command, Commands::Commit { dry_run: true, .. }));
        assert_eq!(cli.command.to_string(), "commit");
    }

    #[test]
    fn test_missing_staging() {
        Cli::try_parse_from(["storagectl", "plan"]).unwrap_err();
    }
}
