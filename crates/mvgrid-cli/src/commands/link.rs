use std::path::Path;

use anyhow::Result;
use mvgrid_algo::link_overlaps;
use mvgrid_cli::MvgridConfig;
use mvgrid_core::PlanarOverlap;
use mvgrid_io::save_registry;

use super::load_snapshot;

pub fn handle(
    config: &MvgridConfig,
    snapshot: &Path,
    out: Option<&Path>,
    spatial_only: bool,
    no_layers: bool,
) -> Result<()> {
    let mut grid = load_snapshot(config, snapshot)?;
    let mut options = config.linking.options();
    if spatial_only {
        options.require_temporal_overlap = false;
    }
    if no_layers {
        options.link_layers = false;
    }

    let report = link_overlaps(&mut grid, &PlanarOverlap::default(), &options)?;
    let target = match out {
        Some(path) => path.to_path_buf(),
        None => config.resolve_snapshot(snapshot),
    };
    save_registry(&grid, &target)?;
    println!("Linked {}", report);
    println!("Wrote {}", target.display());
    Ok(())
}
