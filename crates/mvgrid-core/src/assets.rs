//! Asset hierarchy: grid operators, voltage levels and substations.
//!
//! Substations come in two variants. A *main* substation is the root of the
//! hierarchy; a *secondary* substation hangs off exactly one main substation.
//! There is no deeper nesting. Persisted rows carry a flat
//! `(kind, parent_id)` pair that is turned into [`SubstationVariant`] by a
//! single validating constructor, so an invalid combination never reaches the
//! model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::spatial::{Geometry, GeometryKind, Spatial, SpatialAttribute, Srid};
use crate::units::Kilovolts;
use crate::{OperatorId, SubstationId, VoltageLevelId};

/// A distribution system operator (DSO).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    /// Unique across operators
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_area: Option<Geometry>,
}

impl Operator {
    pub fn new(id: OperatorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            supply_area: None,
        }
    }

    pub fn with_supply_area(mut self, area: Geometry) -> Self {
        self.supply_area = Some(area);
        self
    }
}

impl Spatial for Operator {
    const GEOMETRY: SpatialAttribute = SpatialAttribute::new(
        "operator supply area",
        GeometryKind::MultiPolygon,
        Some(Srid::WGS84),
    );

    fn geometry(&self) -> Option<&Geometry> {
        self.supply_area.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.supply_area.as_mut()
    }
}

/// An allowed nominal voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageLevel {
    pub id: VoltageLevelId,
    pub voltage: Kilovolts,
}

impl VoltageLevel {
    pub fn new(id: VoltageLevelId, voltage_kv: f64) -> Self {
        Self {
            id,
            voltage: Kilovolts(voltage_kv),
        }
    }
}

/// Discriminant stored in the `kind` column of a substation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstationKind {
    Main,
    Secondary,
}

impl std::fmt::Display for SubstationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubstationKind::Main => f.write_str("main"),
            SubstationKind::Secondary => f.write_str("secondary"),
        }
    }
}

/// Variant-specific part of a substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VariantRow", into = "VariantRow")]
pub enum SubstationVariant {
    Main,
    Secondary { parent: SubstationId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct VariantRow {
    kind: SubstationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<SubstationId>,
}

impl SubstationVariant {
    /// Build the variant from its flat storage representation.
    ///
    /// A main substation must not name a parent, a secondary one must.
    /// Whether the parent exists and is itself a main substation is checked
    /// by the registry.
    pub fn from_parts(kind: SubstationKind, parent: Option<SubstationId>) -> GridResult<Self> {
        match (kind, parent) {
            (SubstationKind::Main, None) => Ok(SubstationVariant::Main),
            (SubstationKind::Main, Some(parent)) => Err(GridError::InvalidHierarchy(format!(
                "main substation cannot have a parent (got {})",
                parent
            ))),
            (SubstationKind::Secondary, Some(parent)) => {
                Ok(SubstationVariant::Secondary { parent })
            }
            (SubstationKind::Secondary, None) => Err(GridError::InvalidHierarchy(
                "secondary substation requires a parent main substation".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> SubstationKind {
        match self {
            SubstationVariant::Main => SubstationKind::Main,
            SubstationVariant::Secondary { .. } => SubstationKind::Secondary,
        }
    }

    pub fn parent(&self) -> Option<SubstationId> {
        match self {
            SubstationVariant::Main => None,
            SubstationVariant::Secondary { parent } => Some(*parent),
        }
    }
}

impl TryFrom<VariantRow> for SubstationVariant {
    type Error = GridError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        SubstationVariant::from_parts(row.kind, row.parent_id)
    }
}

impl From<SubstationVariant> for VariantRow {
    fn from(variant: SubstationVariant) -> Self {
        VariantRow {
            kind: variant.kind(),
            parent_id: variant.parent(),
        }
    }
}

/// A physical grid node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substation {
    pub id: SubstationId,
    pub operator: OperatorId,
    pub name: String,
    #[serde(default)]
    pub installation_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
    #[serde(default)]
    pub voltage_high: Option<VoltageLevelId>,
    #[serde(default)]
    pub voltage_low: Option<VoltageLevelId>,
    #[serde(flatten)]
    pub variant: SubstationVariant,
}

impl Substation {
    pub fn main(id: SubstationId, operator: OperatorId, name: impl Into<String>) -> Self {
        Self::with_variant(id, operator, name, SubstationVariant::Main)
    }

    pub fn secondary(
        id: SubstationId,
        operator: OperatorId,
        name: impl Into<String>,
        parent: SubstationId,
    ) -> Self {
        Self::with_variant(id, operator, name, SubstationVariant::Secondary { parent })
    }

    fn with_variant(
        id: SubstationId,
        operator: OperatorId,
        name: impl Into<String>,
        variant: SubstationVariant,
    ) -> Self {
        Self {
            id,
            operator,
            name: name.into(),
            installation_date: None,
            location: None,
            voltage_high: None,
            voltage_low: None,
            variant,
        }
    }

    pub fn with_location(mut self, location: Geometry) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_voltage_levels(
        mut self,
        high: Option<VoltageLevelId>,
        low: Option<VoltageLevelId>,
    ) -> Self {
        self.voltage_high = high;
        self.voltage_low = low;
        self
    }

    pub fn installed_on(mut self, date: NaiveDate) -> Self {
        self.installation_date = Some(date);
        self
    }

    pub fn is_main(&self) -> bool {
        matches!(self.variant, SubstationVariant::Main)
    }

    pub fn parent(&self) -> Option<SubstationId> {
        self.variant.parent()
    }
}

impl Spatial for Substation {
    const GEOMETRY: SpatialAttribute = SpatialAttribute::new(
        "substation location",
        GeometryKind::Point,
        Some(Srid::WGS84),
    );

    fn geometry(&self) -> Option<&Geometry> {
        self.location.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.location.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_with_parent_is_invalid() {
        let err =
            SubstationVariant::from_parts(SubstationKind::Main, Some(SubstationId::new(1)))
                .unwrap_err();
        assert!(matches!(err, GridError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_secondary_without_parent_is_invalid() {
        let err = SubstationVariant::from_parts(SubstationKind::Secondary, None).unwrap_err();
        assert!(matches!(err, GridError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_row_deserializes_into_variant() {
        let json = r#"{
            "id": 7, "operator": 1, "name": "Nord 7",
            "kind": "secondary", "parent_id": 2
        }"#;
        let station: Substation = serde_json::from_str(json).unwrap();
        assert_eq!(
            station.variant,
            SubstationVariant::Secondary {
                parent: SubstationId::new(2)
            }
        );
        assert_eq!(station.voltage_high, None);
    }

    #[test]
    fn test_invalid_row_fails_to_deserialize() {
        let json = r#"{"id": 1, "operator": 1, "name": "Main", "kind": "main", "parent_id": 4}"#;
        let err = serde_json::from_str::<Substation>(json).unwrap_err();
        assert!(err.to_string().contains("main substation cannot have a parent"));
    }

    #[test]
    fn test_variant_serializes_flat() {
        let station = Substation::main(SubstationId::new(3), OperatorId::new(1), "Süd");
        let value = serde_json::to_value(&station).unwrap();
        assert_eq!(value["kind"], "main");
        assert!(value.get("parent_id").is_none());
    }
}
