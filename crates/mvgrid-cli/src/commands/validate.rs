use std::path::Path;

use anyhow::{bail, Result};
use mvgrid_cli::MvgridConfig;
use mvgrid_core::continuity;
use tracing::debug;

use super::load_snapshot;

pub fn handle(
    config: &MvgridConfig,
    snapshot: &Path,
    length_deviation: Option<f64>,
    strict: bool,
) -> Result<()> {
    let grid = load_snapshot(config, snapshot)?;
    let mut options = config.diagnostics.options();
    if let Some(deviation) = length_deviation {
        options.length_deviation = deviation;
    }

    for id in grid.cable_system_ids() {
        let report = continuity(&grid, id)?;
        debug!(
            "cable system {}: {} run(s), {} joint(s)",
            id,
            report.runs.len(),
            report.joint_count
        );
    }

    let diagnostics = grid.validate(&options);
    println!("Loaded {}: {}", snapshot.display(), grid.stats());
    print!("{}", diagnostics);
    println!("Diagnostics: {}", diagnostics.summary());

    if diagnostics.has_errors() || (strict && diagnostics.has_issues()) {
        bail!("validation failed: {}", diagnostics.summary());
    }
    Ok(())
}
