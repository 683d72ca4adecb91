//! Command-line interface definitions.

use crate::{node::Kind, status::VersionPolicy};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_table::Step;

/// Inspect a strata store
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file (default: strata.toml)
    #[arg(short = 'C', long, default_value = "strata.toml")]
    pub config: PathBuf,

    /// Store root, overriding `[store.root]`
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Suppress log lines
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Date window shared by reading commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// First day or instant to include (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM`)
    #[arg(long)]
    pub start: Option<String>,

    /// Last day or instant to include
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Freshness, gaps and update window of a report
    Status {
        report: String,

        /// Which of several same-dated lake files to keep
        #[arg(long, default_value = "latest")]
        policy: VersionPolicy,

        #[command(flatten)]
        window: WindowArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the node tree of a report
    Tree {
        report: String,

        /// Deepest level to print
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Print the table behind a key
    Show {
        report: String,
        key: String,

        /// Present stamps in this timezone
        #[arg(long)]
        tz: Option<Tz>,

        #[command(flatten)]
        window: WindowArgs,

        /// Rows to print from the end
        #[arg(short = 'n', long, default_value_t = 20)]
        rows: usize,
    },

    /// Fuzzy search over node keys
    Search {
        report: String,

        #[arg(required = true)]
        terms: Vec<String>,

        #[arg(short = 'n', long, default_value_t = 5)]
        best: usize,

        /// Truncate hits to this kind of node
        #[arg(short, long)]
        kind: Option<Kind>,
    },

    /// Write the files behind a key to a destination
    Export {
        report: String,
        key: String,
        destination: PathBuf,

        #[arg(long)]
        tz: Option<Tz>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Integrity report of one leaf file
    Diagnose {
        file: PathBuf,

        /// Index resolution; inferred when omitted
        #[arg(long)]
        resolution: Option<Step>,

        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Whether the command prints machine-readable output.
    pub const fn wants_json(&self) -> bool {
        matches!(
            self.command,
            Commands::Status { json: true, .. } | Commands::Diagnose { json: true, .. }
        )
    }

    /// Whether the command can run without a config file.
    pub const fn is_standalone(&self) -> bool {
        matches!(self.command, Commands::Diagnose { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["strata", "status", "isp", "--policy", "2", "--json"]).unwrap();
        assert!(cli.wants_json());
        let Commands::Status { report, policy, .. } = cli.command else {
            panic!("expected status");
        };
        assert_eq!(report, "isp");
        assert_eq!(policy, VersionPolicy::Exact(2));
    }

    #[test]
    fn test_parse_show_with_timezone() {
        let cli = Cli::try_parse_from([
            "strata",
            "-C",
            "lake.toml",
            "show",
            "dam",
            "dam.prices.results",
            "--tz",
            "Europe/Athens",
            "--start",
            "2024-03-01",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("lake.toml"));
        let Commands::Show { tz, window, rows, .. } = cli.command else {
            panic!("expected show");
        };
        assert_eq!(tz, Some(chrono_tz::Europe::Athens));
        assert_eq!(window.start.as_deref(), Some("2024-03-01"));
        assert_eq!(rows, 20);
    }

    #[test]
    fn test_parse_search_and_diagnose() {
        let cli = Cli::try_parse_from(["strata", "search", "dam", "mcp", "--kind", "file"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { kind: Some(Kind::File), .. }));

        let cli = Cli::try_parse_from(["strata", "diagnose", "x.csv", "--resolution", "30min"]).unwrap();
        assert!(cli.is_standalone());
        assert!(matches!(
            cli.command,
            Commands::Diagnose { resolution: Some(Step::Minutes(30)), .. }
        ));

        assert!(Cli::try_parse_from(["strata", "search", "dam"]).is_err());
    }
}
