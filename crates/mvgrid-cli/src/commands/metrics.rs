use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use mvgrid_algo::{bulk_metrics, check_parity, per_entity_metrics, MetricsByCableSystem};
use mvgrid_cli::{MvgridConfig, OutputFormat};
use mvgrid_core::{CableSystemId, GridError, GridRegistry};
use tabwriter::TabWriter;
use tracing::info;

use super::load_snapshot;

pub struct MetricsArgs {
    pub bulk: bool,
    pub check_parity: bool,
    pub cable_system: Option<usize>,
    pub format: OutputFormat,
}

pub fn handle(config: &MvgridConfig, snapshot: &Path, args: MetricsArgs) -> Result<()> {
    let grid = load_snapshot(config, snapshot)?;
    let use_bulk = args.bulk || config.metrics.bulk;

    let mut metrics = if use_bulk {
        bulk_metrics(&grid)?
    } else {
        per_entity_metrics(&grid)?
    };
    if let Some(raw) = args.cable_system {
        let id = CableSystemId::new(raw);
        let selected = metrics
            .remove(&id)
            .ok_or(GridError::UnknownCableSystem(id))?;
        metrics = MetricsByCableSystem::from([(id, selected)]);
    }

    match args.format {
        OutputFormat::Plain => print_metric_table(&grid, &metrics)?,
        OutputFormat::Json => {
            let rows: Vec<_> = metrics.values().collect();
            serde_json::to_writer_pretty(io::stdout(), &rows)
                .context("serializing metrics to JSON")?;
            println!();
        }
    }

    if args.check_parity {
        let single = per_entity_metrics(&grid)?;
        let bulk = bulk_metrics(&grid)?;
        let mismatches = check_parity(&single, &bulk, config.metrics.parity_tolerance);
        if !mismatches.is_empty() {
            for mismatch in &mismatches {
                eprintln!("{}", mismatch);
            }
            bail!("{} metric mismatch(es) between per-entity and bulk", mismatches.len());
        }
        info!("parity ok for {} cable systems", single.len());
        if args.format == OutputFormat::Plain {
            println!("Parity: per-entity and bulk metrics agree");
        }
    }
    Ok(())
}

fn print_metric_table(grid: &GridRegistry, metrics: &MetricsByCableSystem) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(
        writer,
        "CABLE SYSTEM\tNAME\tSUBSECTIONS\tLENGTH KM\tJOINTS\tREPAIR SECTIONS"
    )?;
    for (id, m) in metrics {
        let name = grid.cable_system(*id).map(|c| c.name.as_str()).unwrap_or("-");
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.3}\t{}\t{}",
            id,
            name,
            m.number_of_subsections,
            m.length.value(),
            m.number_of_joints,
            m.number_of_repairment_sections
        )?;
    }
    writer.flush()?;
    Ok(())
}
