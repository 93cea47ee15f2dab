//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Camera QR check-in scanner: lifecycle simulator and check-in client
#[derive(Parser, Debug)]
#[command(name = "checkin-scanner")]
#[command(author = "Vihaan Reddy M")]
#[command(version = "1.0.0")]
#[command(about = "Scan attendee QR codes and check them in to an event", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Base URL of the events API (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scanner lifecycle scenarios against mock hardware
    ///
    /// No camera or server is needed. Without names, every scenario runs.
    Simulate {
        /// Scenario names to run (comma-separated or multiple values)
        #[arg(value_delimiter = ',')]
        names: Vec<String>,

        /// Only run scenarios carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Stop on first failure
        #[arg(long)]
        fail_fast: bool,

        /// Verbose output showing per-scenario results
        #[arg(short, long)]
        verbose: bool,
    },

    /// List available scenarios
    Scenarios,

    /// Submit one check-in using the configured API
    CheckIn {
        /// Event to check in to
        #[arg(short, long)]
        event_id: String,

        /// Decoded QR payload
        #[arg(short, long)]
        payload: String,
    },

    /// Show the configuration file location, creating a default one if missing
    ///
    /// The config file is stored at:
    /// - Linux: ~/.config/checkin_scanner/config.toml
    /// - macOS: ~/Library/Application Support/checkin_scanner/config.toml
    /// - Windows: %APPDATA%\checkin_scanner\config.toml
    Config {
        /// Only print the path of the active config file
        #[arg(long)]
        path: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let args = Args::parse_from([
            "checkin-scanner",
            "simulate",
            "accepted_check_in,burst_dedup",
            "--verbose",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Some(Commands::Simulate { names, verbose, .. }) => {
                assert_eq!(names, vec!["accepted_check_in", "burst_dedup"]);
                assert!(verbose);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_in() {
        let args = Args::parse_from([
            "checkin-scanner",
            "--api-url",
            "https://clubs.example.org/api",
            "check-in",
            "--event-id",
            "E1",
            "--payload",
            "MEMBER-42",
        ]);
        assert_eq!(args.api_url.as_deref(), Some("https://clubs.example.org/api"));
        assert!(matches!(
            args.command,
            Some(Commands::CheckIn { ref event_id, ref payload })
                if event_id == "E1" && payload == "MEMBER-42"
        ));
    }
}
