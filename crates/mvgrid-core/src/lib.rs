//! # mvgrid-core: Medium-Voltage Grid Asset Model
//!
//! Domain model for tracking medium-voltage cable assets and their
//! reliability: grid operators, a two-level substation hierarchy, cable
//! systems built from physical subsections spliced by joints, failures and
//! repairs, and external reliability drivers (excavation work, lightning,
//! heatwaves, coldwaves, floods) linked to the cable subsections they affect.
//!
//! ## Design Philosophy
//!
//! - **Invariants live in one place.** [`GridRegistry`] owns every table and is
//!   the only way to mutate them. Each mutation runs all of its checks before
//!   its first write, so a rejected call leaves no partial state.
//! - **Aggregates are computed, never stored.** A cable system's length,
//!   subsection count, joint count and repair-section count come from one
//!   term table in [`metrics`], evaluated in memory here and as a bulk query in
//!   `mvgrid-algo`.
//! - **Polymorphic references are typed.** An event link names its event by
//!   `(kind, id)` ([`EventRef`]) and the registry resolves it on insert.
//!
//! ## Quick Start
//!
//! ```rust
//! use mvgrid_core::*;
//!
//! let mut grid = GridRegistry::new();
//! grid.register_operator(Operator::new(OperatorId::new(1), "Stadtwerke Nord")).unwrap();
//! grid.register_substation(Substation::main(SubstationId::new(1), OperatorId::new(1), "UW Nord")).unwrap();
//! grid.register_substation(Substation::secondary(
//!     SubstationId::new(2),
//!     OperatorId::new(1),
//!     "ONS 12",
//!     SubstationId::new(1),
//! )).unwrap();
//!
//! let cs = CableSystemId::new(1);
//! grid.register_cable_system(CableSystem::new(
//!     cs,
//!     OperatorId::new(1),
//!     "K-101",
//!     SubstationId::new(1),
//!     SubstationId::new(2),
//! )).unwrap();
//! grid.add_subsection(cs, Subsection::new(SubsectionId::new(1), 1.2)).unwrap();
//! grid.add_subsection(cs, Subsection::new(SubsectionId::new(2), 3.4)).unwrap();
//! grid.add_joint(Joint::new(JointId::new(1), SubsectionId::new(1), SubsectionId::new(2))).unwrap();
//!
//! let metrics = grid.metrics(cs).unwrap();
//! assert_eq!(metrics.number_of_subsections, 2);
//! assert_eq!(metrics.number_of_joints, 2);
//! ```
//!
//! ## ID System
//!
//! Every entity kind has its own newtype ID wrapping `usize`. IDs are supplied
//! by the caller (they come from the persisted tables) and must be unique
//! within their kind. External events share [`EventId`] but are unique only
//! within their [`EventKind`].
//!
//! ## Modules
//!
//! - [`spatial`] - geometry values, declared geometry columns, overlap tests
//! - [`assets`] - operators, voltage levels, main/secondary substations
//! - [`network`] - cable systems, subsections, joints
//! - [`events`] - failures, repairs, external events and their links
//! - [`layers`] - static geographic layers and placement conditions
//! - [`metrics`] - the aggregate term table and per-system metrics
//! - [`registry`] - the invariant-enforcing store
//! - [`shared`] - lock-protected registry for concurrent access
//! - [`graph_utils`] - subsection/joint continuity analysis
//! - [`diagnostics`] - soft findings from validation

use serde::{Deserialize, Serialize};

pub mod assets;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod graph_utils;
pub mod layers;
pub mod metrics;
pub mod network;
pub mod registry;
pub mod shared;
pub mod spatial;
pub mod units;

pub use assets::{Operator, Substation, SubstationKind, SubstationVariant, VoltageLevel};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{Dependent, GridError, GridResult};
pub use events::{
    DiggingActivity, DiggingImpact, EventKind, EventLink, EventRef, ExternalEvent, Failure,
    FailureAttribution, Flood, Lightning, Repair, TemperatureWave, TimeWindow,
};
pub use graph_utils::{continuity, ContinuityReport};
pub use layers::{
    GeoLayer, LayerAttributes, LayerKind, LayerRef, PlacementCondition, WeatherStatistics,
};
pub use metrics::{CableSystemMetrics, FactColumn, MetricTerm, SubsectionFacts, TermSource};
pub use network::{CableSystem, Joint, Subsection};
pub use registry::{GridRegistry, RegistryStats, ValidationOptions};
pub use shared::SharedRegistry;
pub use spatial::{
    Coord, Geometry, GeometryKind, PlanarOverlap, Polygon, Shape, Spatial, SpatialAttribute,
    SpatialOverlap, Srid,
};
pub use units::{Celsius, Kilometers, Kilovolts, SquareMillimeters};

/// Declare newtype ID wrappers for type safety.
macro_rules! id_types {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(usize);

            impl $name {
                #[inline]
                pub fn new(value: usize) -> Self {
                    $name(value)
                }
                #[inline]
                pub fn value(&self) -> usize {
                    self.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

id_types!(
    OperatorId,
    VoltageLevelId,
    SubstationId,
    CableSystemId,
    SubsectionId,
    JointId,
    FailureId,
    /// Unique within one [`EventKind`].
    EventId,
    EventLinkId,
    /// Unique within one [`LayerKind`].
    LayerId,
    PlacementConditionId,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_is_bare_number() {
        assert_eq!(SubsectionId::new(42).to_string(), "42");
        assert_eq!(CableSystemId::new(7).value(), 7);
    }

    #[test]
    fn test_id_serializes_transparently() {
        assert_eq!(serde_json::to_string(&JointId::new(3)).unwrap(), "3");
        let id: FailureId = serde_json::from_str("11").unwrap();
        assert_eq!(id, FailureId::new(11));
    }
}
