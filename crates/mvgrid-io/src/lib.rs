//! # mvgrid-io: Table Catalog, Snapshots & Frames
//!
//! Persistence-facing side of the grid model.
//!
//! ## Quick Start: Load a Snapshot
//!
//! ```rust,no_run
//! use mvgrid_io::load_registry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let grid = load_registry("grid.json".as_ref())?;
//!     println!("{}", grid.stats());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! ### Table Catalog ([`schema`])
//! - One Arrow schema per persisted table, listed in dependency order
//! - Geometry columns as WKT text with `geometry_shape` / `srid` metadata
//! - Primary keys and the foreign-key list consumed by the schema provisioner
//!
//! ### Snapshots ([`snapshot`])
//! - JSON document with one array per table
//! - Import replays every row through `GridRegistry`, so invariants hold
//!
//! ### Frames (`frames`, feature `native-io`)
//! - polars `DataFrame`s for the cable tables, written as CSV or Parquet
//!
//! ## Feature Flags
//!
//! - `native-io` (default): polars frames and CSV output
//! - `parquet`: Parquet output for frames

pub mod schema;
pub mod snapshot;
pub mod wkt;

#[cfg(feature = "native-io")]
pub mod frames;

pub use schema::{foreign_keys, schema_for_table, table_names, ForeignKey, SCHEMA_VERSION};
pub use snapshot::{load_registry, save_registry, Snapshot, SnapshotError, SubsectionRow};
pub use wkt::to_wkt;

#[cfg(feature = "native-io")]
pub use frames::{export_tables, table_frames, FrameFormat};
