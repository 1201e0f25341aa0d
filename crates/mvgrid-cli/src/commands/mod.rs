pub mod completions;
pub mod export;
pub mod link;
pub mod metrics;
pub mod schema;
pub mod validate;

use std::path::Path;

use anyhow::Result;
use mvgrid_cli::MvgridConfig;
use mvgrid_core::GridRegistry;
use tracing::info;

/// Load a snapshot, resolving the path against `core.snapshot_dir`.
pub fn load_snapshot(config: &MvgridConfig, path: &Path) -> Result<GridRegistry> {
    let resolved = config.resolve_snapshot(path);
    info!("loading snapshot {}", resolved.display());
    mvgrid_io::load_registry(&resolved)
}
