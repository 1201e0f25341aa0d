use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (defaults to `core.log_level` from the config)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    /// Read configuration from this file instead of ~/.mvgrid/config.toml
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a snapshot and report topology, geometry and reliability findings
    Validate {
        /// Snapshot JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
        /// Allowed relative deviation of recorded vs. drawn subsection length
        #[arg(long)]
        length_deviation: Option<f64>,
        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },
    /// Cable system metrics
    Metrics {
        /// Snapshot JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
        /// Use the bulk (columnar group-by) evaluation
        #[arg(long)]
        bulk: bool,
        /// Evaluate both ways and fail on any disagreement
        #[arg(long)]
        check_parity: bool,
        /// Only this cable system
        #[arg(long)]
        cable_system: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Link events and static layers to the subsections they overlap
    Link {
        /// Snapshot JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
        /// Write the linked snapshot here (defaults to overwriting the input)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        /// Ignore the service-life check
        #[arg(long)]
        spatial_only: bool,
        /// Skip static layers
        #[arg(long)]
        no_layers: bool,
    },
    /// Write registry tables as columnar files
    Export {
        /// Snapshot JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
        /// Output directory
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = TableFormat::Csv)]
        format: TableFormat,
    },
    /// Show the persisted table catalog
    Schema {
        /// Only this table
        #[arg(long)]
        table: Option<String>,
        /// Print the foreign-key list instead of columns
        #[arg(long)]
        foreign_keys: bool,
        /// Print the aggregate metric query in SQL
        #[arg(long, conflicts_with_all = ["table", "foreign_keys"])]
        metrics_sql: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TableFormat {
    Csv,
    #[cfg(feature = "parquet")]
    Parquet,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mvgrid",
            "metrics",
            "grid.json",
            "--bulk",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(tracing::Level::DEBUG));
        match cli.command {
            Commands::Metrics { bulk, format, .. } => {
                assert!(bulk);
                assert_eq!(format, OutputFormat::Plain);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_metrics_sql_conflicts_with_table() {
        let err = Cli::try_parse_from(["mvgrid", "schema", "--metrics-sql", "--table", "failure"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
