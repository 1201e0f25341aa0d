//! # mvgrid-algo: Bulk Analytics over the Grid Model
//!
//! - [`bulk_metrics`]: cable system metrics for every system in one polars
//!   group-by, the parallel per-entity evaluation, parity checking and the SQL
//!   form of the same aggregate
//! - [`linking`]: spatial/temporal overlap linking of external events and
//!   static layers to cable subsections
//!
//! ```rust,no_run
//! use mvgrid_algo::{bulk_metrics, check_parity, per_entity_metrics};
//!
//! fn main() -> anyhow::Result<()> {
//!     let grid = mvgrid_io::load_registry("grid.json".as_ref())?;
//!     let bulk = bulk_metrics(&grid)?;
//!     let single = per_entity_metrics(&grid)?;
//!     assert!(check_parity(&single, &bulk, 1e-9).is_empty());
//!     Ok(())
//! }
//! ```

pub mod bulk_metrics;
pub mod linking;

pub use bulk_metrics::{
    bulk_metrics, bulk_metrics_frame, bulk_metrics_sql, check_parity, per_entity_metrics,
    shared_per_entity_metrics, MetricsByCableSystem, ParityMismatch,
};
pub use linking::{link_overlaps, link_shared, LinkOptions, LinkReport};
