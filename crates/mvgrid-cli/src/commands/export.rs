use std::path::Path;

use anyhow::Result;
use mvgrid_cli::{MvgridConfig, TableFormat};
use mvgrid_io::{export_tables, FrameFormat};

use super::load_snapshot;

pub fn handle(
    config: &MvgridConfig,
    snapshot: &Path,
    out_dir: &Path,
    format: TableFormat,
) -> Result<()> {
    let grid = load_snapshot(config, snapshot)?;
    let format = match format {
        TableFormat::Csv => FrameFormat::Csv,
        #[cfg(feature = "parquet")]
        TableFormat::Parquet => FrameFormat::Parquet,
    };
    for path in export_tables(&grid, out_dir, format)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
