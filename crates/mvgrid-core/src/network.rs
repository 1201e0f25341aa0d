//! Cable network entities: cable systems, their subsections, and joints.
//!
//! A [`CableSystem`] is a logical medium-voltage run between two substations.
//! It is physically made of [`Subsection`]s (uniform cable segments) spliced
//! together by [`Joint`]s. A cable system never stores its own length or
//! subsection count; see [`crate::metrics`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::spatial::{Geometry, GeometryKind, Spatial, SpatialAttribute};
use crate::units::{Kilometers, SquareMillimeters};
use crate::{CableSystemId, JointId, OperatorId, SubsectionId, SubstationId, VoltageLevelId};

/// A logical cable run between two substations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CableSystem {
    pub id: CableSystemId,
    pub operator: OperatorId,
    pub name: String,
    pub station_from: SubstationId,
    pub station_to: SubstationId,
    #[serde(default)]
    pub operating_voltage: Option<VoltageLevelId>,
    /// Ordered membership, maintained by the registry only.
    #[serde(skip)]
    pub(crate) subsections: Vec<SubsectionId>,
}

impl CableSystem {
    pub fn new(
        id: CableSystemId,
        operator: OperatorId,
        name: impl Into<String>,
        station_from: SubstationId,
        station_to: SubstationId,
    ) -> Self {
        Self {
            id,
            operator,
            name: name.into(),
            station_from,
            station_to,
            operating_voltage: None,
            subsections: Vec::new(),
        }
    }

    pub fn with_operating_voltage(mut self, level: VoltageLevelId) -> Self {
        self.operating_voltage = Some(level);
        self
    }

    /// Subsections in the order they were attached.
    pub fn subsections(&self) -> &[SubsectionId] {
        &self.subsections
    }
}

/// A physical, uniform cable segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsection {
    pub id: SubsectionId,
    #[serde(default)]
    pub number_of_conductors: Option<u32>,
    #[serde(default)]
    pub conductor_size: Option<SquareMillimeters>,
    #[serde(default)]
    pub conductor_material: Option<String>,
    #[serde(default)]
    pub insulation: Option<String>,
    #[serde(default)]
    pub conductor_type: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub in_service_date: Option<NaiveDate>,
    #[serde(rename = "length_km")]
    pub length: Kilometers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    /// Segment inserted during a repair
    #[serde(default)]
    pub repairment_section: bool,
    #[serde(default)]
    pub out_of_service: bool,
}

impl Subsection {
    pub fn new(id: SubsectionId, length_km: f64) -> Self {
        Self {
            id,
            number_of_conductors: None,
            conductor_size: None,
            conductor_material: None,
            insulation: None,
            conductor_type: None,
            manufacturer: None,
            in_service_date: None,
            length: Kilometers(length_km),
            geometry: None,
            repairment_section: false,
            out_of_service: false,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_conductor(
        mut self,
        material: impl Into<String>,
        size_mm2: f64,
        conductors: u32,
    ) -> Self {
        self.conductor_material = Some(material.into());
        self.conductor_size = Some(SquareMillimeters(size_mm2));
        self.number_of_conductors = Some(conductors);
        self
    }

    pub fn made_by(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn in_service_since(mut self, date: NaiveDate) -> Self {
        self.in_service_date = Some(date);
        self
    }

    pub fn as_repairment_section(mut self) -> Self {
        self.repairment_section = true;
        self
    }

    pub fn taken_out_of_service(mut self) -> Self {
        self.out_of_service = true;
        self
    }

    /// Whether the segment existed on `date`. Unknown commissioning dates
    /// count as in service.
    pub fn in_service_on(&self, date: NaiveDate) -> bool {
        self.in_service_date.map_or(true, |since| since <= date)
    }

    pub(crate) fn validate_attributes(&self) -> GridResult<()> {
        if !self.length.is_finite() || self.length.value() < 0.0 {
            return Err(GridError::InvalidAttribute(format!(
                "subsection {} has length {} km",
                self.id,
                self.length.value()
            )));
        }
        if let Some(size) = self.conductor_size {
            if !size.is_finite() || size.value() <= 0.0 {
                return Err(GridError::InvalidAttribute(format!(
                    "subsection {} has conductor size {} mm²",
                    self.id,
                    size.value()
                )));
            }
        }
        Ok(())
    }
}

impl Spatial for Subsection {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("cable subsection", GeometryKind::LineString, None);

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.geometry.as_mut()
    }
}

/// A physical splice between two subsections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub id: JointId,
    pub first: SubsectionId,
    pub second: SubsectionId,
    #[serde(default)]
    pub joint_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
}

impl Joint {
    pub fn new(id: JointId, first: SubsectionId, second: SubsectionId) -> Self {
        Self {
            id,
            first,
            second,
            joint_type: None,
            location: None,
        }
    }

    pub fn of_type(mut self, joint_type: impl Into<String>) -> Self {
        self.joint_type = Some(joint_type.into());
        self
    }

    pub fn at(mut self, location: Geometry) -> Self {
        self.location = Some(location);
        self
    }

    pub fn touches(&self, subsection: SubsectionId) -> bool {
        self.first == subsection || self.second == subsection
    }
}

impl Spatial for Joint {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("cable joint", GeometryKind::Point, None);

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
    fn test_negative_length_rejected() {
        let sub = Subsection::new(SubsectionId::new(1), -0.5);
        assert!(matches!(
            sub.validate_attributes(),
            Err(GridError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_zero_length_allowed() {
        assert!(Subsection::new(SubsectionId::new(1), 0.0)
            .validate_attributes()
            .is_ok());
    }

    #[test]
    fn test_in_service_on() {
        let since = NaiveDate::from_ymd_opt(2010, 5, 1).unwrap();
        let sub = Subsection::new(SubsectionId::new(1), 1.0).in_service_since(since);
        assert!(sub.in_service_on(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
        assert!(!sub.in_service_on(NaiveDate::from_ymd_opt(2009, 1, 1).unwrap()));
        assert!(Subsection::new(SubsectionId::new(2), 1.0)
            .in_service_on(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()));
    }

    #[test]
    fn test_joint_touches_both_ends() {
        let joint = Joint::new(JointId::new(1), SubsectionId::new(1), SubsectionId::new(2));
        assert!(joint.touches(SubsectionId::new(1)));
        assert!(joint.touches(SubsectionId::new(2)));
        assert!(!joint.touches(SubsectionId::new(3)));
    }

    #[test]
    fn test_cable_system_membership_not_serialized() {
        let mut cs = CableSystem::new(
            CableSystemId::new(1),
            OperatorId::new(1),
            "K1",
            SubstationId::new(1),
            SubstationId::new(2),
        );
        cs.subsections.push(SubsectionId::new(5));
        let value = serde_json::to_value(&cs).unwrap();
        assert!(value.get("subsections").is_none());
        assert_eq!(cs.subsections(), &[SubsectionId::new(5)]);
    }
}
