use clap::Parser;
use mvgrid_cli::{Cli, Commands, MvgridConfig};
use tracing::{debug, error};
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::metrics::MetricsArgs;

fn load_config(cli: &Cli) -> anyhow::Result<MvgridConfig> {
    match &cli.config {
        Some(path) => MvgridConfig::load_from(path),
        None => MvgridConfig::load(),
    }
}

fn run(cli: Cli, config: MvgridConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate {
            snapshot,
            length_deviation,
            strict,
        } => commands::validate::handle(&config, &snapshot, length_deviation, strict),
        Commands::Metrics {
            snapshot,
            bulk,
            check_parity,
            cable_system,
            format,
        } => commands::metrics::handle(
            &config,
            &snapshot,
            MetricsArgs {
                bulk,
                check_parity,
                cable_system,
                format,
            },
        ),
        Commands::Link {
            snapshot,
            out,
            spatial_only,
            no_layers,
        } => commands::link::handle(&config, &snapshot, out.as_deref(), spatial_only, no_layers),
        Commands::Export {
            snapshot,
            out_dir,
            format,
        } => commands::export::handle(&config, &snapshot, &out_dir, format),
        Commands::Schema {
            table,
            foreign_keys,
            metrics_sql,
            format,
        } => commands::schema::handle(table.as_deref(), foreign_keys, metrics_sql, format),
        Commands::Completions { shell, out } => {
            commands::completions::handle(shell, out.as_deref())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let level = match cli.log_level {
        Some(level) => level,
        None => config.log_level()?,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    debug!("configuration: {:?}", config);

    run(cli, config).inspect_err(|e| error!("{:#}", e))
}
