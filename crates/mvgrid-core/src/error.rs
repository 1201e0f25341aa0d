//! Unified error type for the mvgrid model.
//!
//! Every invariant the registry enforces surfaces as one [`GridError`]
//! variant. Model errors describe invalid input, not transient failure, so
//! callers should never retry them. The last few variants carry ambient
//! failures (I/O, parsing, configuration) for the integration layers.
//!
//! # Example
//!
//! ```
//! use mvgrid_core::{GridError, GridResult, SubsectionId};
//!
//! fn reject(id: SubsectionId) -> GridResult<()> {
//!     Err(GridError::SelfJoint(id))
//! }
//!
//! assert!(reject(SubsectionId::new(4)).is_err());
//! ```

use chrono::NaiveDate;
use thiserror::Error;

use crate::events::{EventRef, Repair};
use crate::layers::LayerRef;
use crate::spatial::{GeometryKind, Srid};
use crate::{
    CableSystemId, EventId, EventLinkId, FailureId, JointId, OperatorId, PlacementConditionId,
    SubsectionId, SubstationId, VoltageLevelId,
};

/// A record that still references a subsection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dependent {
    Joint(JointId),
    Failure(FailureId),
    Repair(Repair),
    EventLink(EventLinkId),
    DiggingImpact(EventId),
    PlacementCondition(PlacementConditionId),
}

impl std::fmt::Display for Dependent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependent::Joint(id) => write!(f, "joint {}", id),
            Dependent::Failure(id) => write!(f, "failure {}", id),
            Dependent::Repair(key) => write!(f, "repair {}", key),
            Dependent::EventLink(id) => write!(f, "event link {}", id),
            Dependent::DiggingImpact(id) => write!(f, "digging impact of activity {}", id),
            Dependent::PlacementCondition(id) => write!(f, "placement condition {}", id),
        }
    }
}

fn list_dependents(dependents: &[Dependent]) -> String {
    dependents
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unified error type for all mvgrid operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// Main/secondary substation rules were broken.
    #[error("invalid substation hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("unknown voltage level {0}")]
    UnknownVoltageLevel(VoltageLevelId),

    /// The subsection id is already attached to a cable system.
    #[error("subsection {subsection} is already attached to cable system {attached_to}")]
    DuplicateSubsection {
        subsection: SubsectionId,
        attached_to: CableSystemId,
    },

    /// Removal rejected; `dependents` lists every record still pointing at it.
    #[error("subsection {subsection} is still referenced by {}", list_dependents(dependents))]
    SubsectionInUse {
        subsection: SubsectionId,
        dependents: Vec<Dependent>,
    },

    #[error("joint would connect subsection {0} to itself")]
    SelfJoint(SubsectionId),

    /// Joints are intra-system only.
    #[error(
        "joint spans cable systems: subsection {first} is in {first_system}, subsection {second} is in {second_system}"
    )]
    CrossSystemJoint {
        first: SubsectionId,
        first_system: CableSystemId,
        second: SubsectionId,
        second_system: CableSystemId,
    },

    /// A repair may not move a failure into another cable system.
    #[error(
        "repair spans cable systems: failed subsection {failed} is in {failed_system}, repairing subsection {repairing} is in {repairing_system}"
    )]
    CrossSystemRepair {
        failed: SubsectionId,
        failed_system: CableSystemId,
        repairing: SubsectionId,
        repairing_system: CableSystemId,
    },

    #[error("unknown event {0}")]
    UnknownEvent(EventRef),

    #[error("unknown subsection {0}")]
    UnknownSubsection(SubsectionId),

    #[error("invalid time window: end {end} is before start {start}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("{entity} requires a {expected} geometry, got {found}")]
    GeometryShapeMismatch {
        entity: &'static str,
        expected: GeometryKind,
        found: GeometryKind,
    },

    #[error("duplicate {table} key {key}")]
    UniquenessViolation { table: &'static str, key: String },

    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),

    #[error("unknown substation {0}")]
    UnknownSubstation(SubstationId),

    #[error("unknown cable system {0}")]
    UnknownCableSystem(CableSystemId),

    #[error("unknown joint {0}")]
    UnknownJoint(JointId),

    #[error("unknown failure {0}")]
    UnknownFailure(FailureId),

    #[error("unknown static layer {0}")]
    UnknownLayer(LayerRef),

    #[error("{entity} expects SRID {expected}, got {found}")]
    SridMismatch {
        entity: &'static str,
        expected: Srid,
        found: Srid,
    },

    /// Structurally broken geometry (too few points, open ring, non-finite coordinate).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Attribute value outside its domain (negative length, non-finite voltage).
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl GridError {
    pub(crate) fn duplicate(table: &'static str, key: impl std::fmt::Display) -> Self {
        GridError::UniquenessViolation {
            table,
            key: key.to_string(),
        }
    }
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsection_in_use_lists_dependents() {
        let err = GridError::SubsectionInUse {
            subsection: SubsectionId::new(3),
            dependents: vec![
                Dependent::Joint(JointId::new(1)),
                Dependent::Failure(FailureId::new(9)),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("subsection 3"));
        assert!(msg.contains("joint 1, failure 9"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = GridError::GeometryShapeMismatch {
            entity: "substation",
            expected: GeometryKind::Point,
            found: GeometryKind::Polygon,
        };
        assert_eq!(
            err.to_string(),
            "substation requires a POINT geometry, got POLYGON"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let grid_err: GridError = io_err.into();
        assert!(matches!(grid_err, GridError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GridResult<()> {
            Err(GridError::UnknownSubsection(SubsectionId::new(1)))
        }

        fn outer() -> GridResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
