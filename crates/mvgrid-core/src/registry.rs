//! The invariant-enforcing store for the whole grid model.
//!
//! [`GridRegistry`] owns every table. Each mutation is split into a `check_*`
//! step that only reads (and conforms the owned input value) and a write step
//! that cannot fail, so a rejected mutation never leaves partial state.
//!
//! Subsection membership is held by the registry, not by the subsection: an
//! owner index maps each subsection to its cable system, and the cable system
//! keeps the attachment order. There is no operation that moves a subsection
//! to another system.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::assets::{Operator, Substation, SubstationVariant, VoltageLevel};
use crate::diagnostics::Diagnostics;
use crate::error::{Dependent, GridError, GridResult};
use crate::events::{
    DiggingImpact, EventKind, EventLink, EventRef, ExternalEvent, Failure, FailureAttribution,
    Repair,
};
use crate::graph_utils::continuity;
use crate::layers::{GeoLayer, LayerRef, PlacementCondition};
use crate::metrics::{CableSystemMetrics, SubsectionFacts};
use crate::network::{CableSystem, Joint, Subsection};
use crate::spatial::Spatial;
use crate::{
    CableSystemId, EventId, EventLinkId, FailureId, JointId, OperatorId, PlacementConditionId,
    SubsectionId, SubstationId, VoltageLevelId,
};

/// Thresholds for [`GridRegistry::validate_into`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationOptions {
    /// Allowed relative gap between a subsection's recorded length and the
    /// haversine length of its WGS84 geometry.
    pub length_deviation: f64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            length_deviation: 0.1,
        }
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub operators: usize,
    pub voltage_levels: usize,
    pub substations: usize,
    pub cable_systems: usize,
    pub subsections: usize,
    pub joints: usize,
    pub failures: usize,
    pub repairs: usize,
    pub events: usize,
    pub event_links: usize,
    pub layers: usize,
    pub placement_conditions: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} operators, {} substations, {} cable systems, {} subsections, {} joints, {} failures, {} events",
            self.operators,
            self.substations,
            self.cable_systems,
            self.subsections,
            self.joints,
            self.failures,
            self.events
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridRegistry {
    operators: BTreeMap<OperatorId, Operator>,
    voltage_levels: BTreeMap<VoltageLevelId, VoltageLevel>,
    substations: BTreeMap<SubstationId, Substation>,
    cable_systems: BTreeMap<CableSystemId, CableSystem>,
    subsections: BTreeMap<SubsectionId, Subsection>,
    owner: HashMap<SubsectionId, CableSystemId>,
    joints: BTreeMap<JointId, Joint>,
    failures: BTreeMap<FailureId, Failure>,
    repairs: BTreeSet<Repair>,
    events: BTreeMap<EventRef, ExternalEvent>,
    event_links: BTreeMap<EventLinkId, EventLink>,
    digging_impacts: BTreeSet<DiggingImpact>,
    failure_attributions: BTreeSet<FailureAttribution>,
    layers: BTreeMap<LayerRef, GeoLayer>,
    placement_conditions: BTreeMap<PlacementConditionId, PlacementCondition>,
}

impl GridRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Asset hierarchy
    // =========================================================================

    pub fn register_operator(&mut self, mut operator: Operator) -> GridResult<()> {
        self.check_operator(&mut operator)
            .inspect_err(|e| warn!("rejected operator {}: {}", operator.id, e))?;
        debug!("registered operator {} ({})", operator.id, operator.name);
        self.operators.insert(operator.id, operator);
        Ok(())
    }

    fn check_operator(&self, operator: &mut Operator) -> GridResult<()> {
        if self.operators.contains_key(&operator.id) {
            return Err(GridError::duplicate("operator", operator.id));
        }
        if self.operators.values().any(|o| o.name == operator.name) {
            return Err(GridError::duplicate("operator.name", &operator.name));
        }
        operator.conform_geometry()
    }

    pub fn register_voltage_level(&mut self, level: VoltageLevel) -> GridResult<()> {
        self.check_voltage_level(&level)
            .inspect_err(|e| warn!("rejected voltage level {}: {}", level.id, e))?;
        debug!("registered voltage level {} ({})", level.id, level.voltage);
        self.voltage_levels.insert(level.id, level);
        Ok(())
    }

    fn check_voltage_level(&self, level: &VoltageLevel) -> GridResult<()> {
        if self.voltage_levels.contains_key(&level.id) {
            return Err(GridError::duplicate("voltage_level", level.id));
        }
        if !level.voltage.is_finite() || level.voltage.value() <= 0.0 {
            return Err(GridError::InvalidAttribute(format!(
                "voltage level {} has voltage {}",
                level.id, level.voltage
            )));
        }
        Ok(())
    }

    /// Register a main or secondary substation.
    ///
    /// A secondary's parent must already be registered as a main substation.
    pub fn register_substation(&mut self, mut substation: Substation) -> GridResult<()> {
        self.check_substation(&mut substation)
            .inspect_err(|e| warn!("rejected substation {}: {}", substation.id, e))?;
        debug!(
            "registered {} substation {} ({})",
            substation.variant.kind(),
            substation.id,
            substation.name
        );
        self.substations.insert(substation.id, substation);
        Ok(())
    }

    fn check_substation(&self, substation: &mut Substation) -> GridResult<()> {
        if self.substations.contains_key(&substation.id) {
            return Err(GridError::duplicate("substation", substation.id));
        }
        self.require_operator(substation.operator)?;
        self.check_voltage_refs(substation.voltage_high, substation.voltage_low)?;
        if let SubstationVariant::Secondary { parent } = substation.variant {
            self.check_parent(substation.id, parent)?;
        }
        substation.conform_geometry()
    }

    fn check_parent(&self, child: SubstationId, parent: SubstationId) -> GridResult<()> {
        if child == parent {
            return Err(GridError::InvalidHierarchy(format!(
                "substation {} cannot be its own parent",
                child
            )));
        }
        match self.substations.get(&parent) {
            None => Err(GridError::InvalidHierarchy(format!(
                "parent substation {} of {} does not exist",
                parent, child
            ))),
            Some(p) if !p.is_main() => Err(GridError::InvalidHierarchy(format!(
                "parent substation {} of {} is not a main substation",
                parent, child
            ))),
            Some(_) => Ok(()),
        }
    }

    fn check_voltage_refs(
        &self,
        high: Option<VoltageLevelId>,
        low: Option<VoltageLevelId>,
    ) -> GridResult<()> {
        for level in [high, low].into_iter().flatten() {
            if !self.voltage_levels.contains_key(&level) {
                return Err(GridError::UnknownVoltageLevel(level));
            }
        }
        Ok(())
    }

    /// Move a secondary substation under another main substation.
    pub fn reassign_parent(
        &mut self,
        secondary: SubstationId,
        new_parent: SubstationId,
    ) -> GridResult<()> {
        self.check_reassign(secondary, new_parent).inspect_err(|e| {
            warn!(
                "rejected reassignment of substation {} to {}: {}",
                secondary, new_parent, e
            )
        })?;
        if let Some(station) = self.substations.get_mut(&secondary) {
            station.variant = SubstationVariant::Secondary { parent: new_parent };
        }
        debug!("substation {} now parented to {}", secondary, new_parent);
        Ok(())
    }

    fn check_reassign(&self, secondary: SubstationId, new_parent: SubstationId) -> GridResult<()> {
        let station = self
            .substations
            .get(&secondary)
            .ok_or(GridError::UnknownSubstation(secondary))?;
        if station.is_main() {
            return Err(GridError::InvalidHierarchy(format!(
                "substation {} is a main substation and cannot be reparented",
                secondary
            )));
        }
        self.check_parent(secondary, new_parent)
    }

    pub fn assign_voltage_levels(
        &mut self,
        substation: SubstationId,
        high: Option<VoltageLevelId>,
        low: Option<VoltageLevelId>,
    ) -> GridResult<()> {
        if !self.substations.contains_key(&substation) {
            return Err(GridError::UnknownSubstation(substation));
        }
        self.check_voltage_refs(high, low)
            .inspect_err(|e| warn!("rejected voltage levels for substation {}: {}", substation, e))?;
        if let Some(station) = self.substations.get_mut(&substation) {
            station.voltage_high = high;
            station.voltage_low = low;
        }
        debug!("updated voltage levels of substation {}", substation);
        Ok(())
    }

    /// Secondary substations parented to `main`, by id.
    pub fn children_of(&self, main: SubstationId) -> GridResult<Vec<&Substation>> {
        match self.substations.get(&main) {
            None => Err(GridError::UnknownSubstation(main)),
            Some(station) if !station.is_main() => Err(GridError::InvalidHierarchy(format!(
                "substation {} is not a main substation",
                main
            ))),
            Some(_) => Ok(self
                .substations
                .values()
                .filter(|s| s.parent() == Some(main))
                .collect()),
        }
    }

    // =========================================================================
    // Cable network
    // =========================================================================

    pub fn register_cable_system(&mut self, mut cable_system: CableSystem) -> GridResult<()> {
        self.check_cable_system(&cable_system)
            .inspect_err(|e| warn!("rejected cable system {}: {}", cable_system.id, e))?;
        // Membership is only ever built through add_subsection.
        cable_system.subsections.clear();
        debug!(
            "registered cable system {} ({}) from {} to {}",
            cable_system.id, cable_system.name, cable_system.station_from, cable_system.station_to
        );
        self.cable_systems.insert(cable_system.id, cable_system);
        Ok(())
    }

    fn check_cable_system(&self, cable_system: &CableSystem) -> GridResult<()> {
        if self.cable_systems.contains_key(&cable_system.id) {
            return Err(GridError::duplicate("cable_system", cable_system.id));
        }
        self.require_operator(cable_system.operator)?;
        for station in [cable_system.station_from, cable_system.station_to] {
            if !self.substations.contains_key(&station) {
                return Err(GridError::UnknownSubstation(station));
            }
        }
        self.check_voltage_refs(cable_system.operating_voltage, None)
    }

    /// Append a subsection to the end of a cable system's run.
    pub fn add_subsection(
        &mut self,
        cable_system: CableSystemId,
        mut subsection: Subsection,
    ) -> GridResult<()> {
        self.check_subsection(cable_system, &mut subsection)
            .inspect_err(|e| warn!("rejected subsection {}: {}", subsection.id, e))?;
        let id = subsection.id;
        if let Some(cs) = self.cable_systems.get_mut(&cable_system) {
            cs.subsections.push(id);
        }
        self.owner.insert(id, cable_system);
        self.subsections.insert(id, subsection);
        debug!("attached subsection {} to cable system {}", id, cable_system);
        Ok(())
    }

    fn check_subsection(
        &self,
        cable_system: CableSystemId,
        subsection: &mut Subsection,
    ) -> GridResult<()> {
        if !self.cable_systems.contains_key(&cable_system) {
            return Err(GridError::UnknownCableSystem(cable_system));
        }
        if let Some(&attached_to) = self.owner.get(&subsection.id) {
            return Err(GridError::DuplicateSubsection {
                subsection: subsection.id,
                attached_to,
            });
        }
        subsection.validate_attributes()?;
        subsection.conform_geometry()
    }

    /// Detach and delete an unreferenced subsection.
    ///
    /// Fails with [`GridError::SubsectionInUse`] listing every joint, failure,
    /// repair, event link, digging impact and placement condition that still
    /// names it.
    pub fn remove_subsection(
        &mut self,
        cable_system: CableSystemId,
        subsection: SubsectionId,
    ) -> GridResult<Subsection> {
        self.check_removal(cable_system, subsection)
            .inspect_err(|e| warn!("rejected removal of subsection {}: {}", subsection, e))?;
        if let Some(cs) = self.cable_systems.get_mut(&cable_system) {
            cs.subsections.retain(|s| *s != subsection);
        }
        self.owner.remove(&subsection);
        let removed = self
            .subsections
            .remove(&subsection)
            .ok_or(GridError::UnknownSubsection(subsection))?;
        debug!(
            "removed subsection {} from cable system {}",
            subsection, cable_system
        );
        Ok(removed)
    }

    fn check_removal(&self, cable_system: CableSystemId, subsection: SubsectionId) -> GridResult<()> {
        if !self.cable_systems.contains_key(&cable_system) {
            return Err(GridError::UnknownCableSystem(cable_system));
        }
        if self.owner.get(&subsection) != Some(&cable_system) {
            return Err(GridError::UnknownSubsection(subsection));
        }
        let dependents = self.dependents_of(subsection);
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(GridError::SubsectionInUse {
                subsection,
                dependents,
            })
        }
    }

    /// Every record that references `subsection`.
    pub fn dependents_of(&self, subsection: SubsectionId) -> Vec<Dependent> {
        let joints = self
            .joints
            .values()
            .filter(|j| j.touches(subsection))
            .map(|j| Dependent::Joint(j.id));
        let failures = self
            .failures
            .values()
            .filter(|f| f.subsection == subsection)
            .map(|f| Dependent::Failure(f.id));
        let repairs = self
            .repairs
            .iter()
            .filter(|r| r.touches(subsection))
            .map(|r| Dependent::Repair(*r));
        let links = self
            .event_links
            .values()
            .filter(|l| l.subsection == subsection)
            .map(|l| Dependent::EventLink(l.id));
        let impacts = self
            .digging_impacts
            .iter()
            .filter(|i| i.subsection == subsection)
            .map(|i| Dependent::DiggingImpact(i.digging));
        let placements = self
            .placement_conditions
            .values()
            .filter(|p| p.subsection == subsection)
            .map(|p| Dependent::PlacementCondition(p.id));
        joints
            .chain(failures)
            .chain(repairs)
            .chain(links)
            .chain(impacts)
            .chain(placements)
            .collect()
    }

    /// Splice two subsections of the same cable system.
    pub fn add_joint(&mut self, mut joint: Joint) -> GridResult<()> {
        self.check_joint(&mut joint)
            .inspect_err(|e| warn!("rejected joint {}: {}", joint.id, e))?;
        debug!(
            "joint {} connects subsections {} and {}",
            joint.id, joint.first, joint.second
        );
        self.joints.insert(joint.id, joint);
        Ok(())
    }

    fn check_joint(&self, joint: &mut Joint) -> GridResult<()> {
        if self.joints.contains_key(&joint.id) {
            return Err(GridError::duplicate("cable_joint", joint.id));
        }
        if joint.first == joint.second {
            return Err(GridError::SelfJoint(joint.first));
        }
        let first_system = self.owner_of(joint.first)?;
        let second_system = self.owner_of(joint.second)?;
        if first_system != second_system {
            return Err(GridError::CrossSystemJoint {
                first: joint.first,
                first_system,
                second: joint.second,
                second_system,
            });
        }
        joint.conform_geometry()
    }

    pub fn remove_joint(&mut self, joint: JointId) -> GridResult<Joint> {
        let removed = self
            .joints
            .remove(&joint)
            .ok_or(GridError::UnknownJoint(joint))
            .inspect_err(|e| warn!("rejected joint removal: {}", e))?;
        debug!("removed joint {}", joint);
        Ok(removed)
    }

    pub fn set_subsection_status(
        &mut self,
        subsection: SubsectionId,
        out_of_service: bool,
        repairment_section: bool,
    ) -> GridResult<()> {
        let sub = self
            .subsections
            .get_mut(&subsection)
            .ok_or(GridError::UnknownSubsection(subsection))
            .inspect_err(|e| warn!("rejected status change of subsection {}: {}", subsection, e))?;
        sub.out_of_service = out_of_service;
        sub.repairment_section = repairment_section;
        debug!(
            "subsection {} status: out_of_service={}, repairment_section={}",
            subsection, out_of_service, repairment_section
        );
        Ok(())
    }

    // =========================================================================
    // Failures and repairs
    // =========================================================================

    pub fn record_failure(&mut self, mut failure: Failure) -> GridResult<()> {
        self.check_failure(&mut failure)
            .inspect_err(|e| warn!("rejected failure {}: {}", failure.id, e))?;
        debug!(
            "recorded failure {} on subsection {}",
            failure.id, failure.subsection
        );
        self.failures.insert(failure.id, failure);
        Ok(())
    }

    fn check_failure(&self, failure: &mut Failure) -> GridResult<()> {
        if self.failures.contains_key(&failure.id) {
            return Err(GridError::duplicate("failure", failure.id));
        }
        self.owner_of(failure.subsection)?;
        failure.conform_geometry()
    }

    /// Record a repair. Both sections must lie in the cable system of the
    /// failure being repaired.
    pub fn record_repair(&mut self, repair: Repair) -> GridResult<()> {
        self.check_repair(&repair)
            .inspect_err(|e| warn!("rejected repair {}: {}", repair, e))?;
        debug!("recorded repair {}", repair);
        self.repairs.insert(repair);
        Ok(())
    }

    fn check_repair(&self, repair: &Repair) -> GridResult<()> {
        let failure = self
            .failures
            .get(&repair.failure)
            .ok_or(GridError::UnknownFailure(repair.failure))?;
        let failure_system = self.owner_of(failure.subsection)?;
        let failed_system = self.owner_of(repair.failed_section)?;
        let repairing_system = self.owner_of(repair.repair_section)?;
        if repairing_system != failed_system {
            return Err(GridError::CrossSystemRepair {
                failed: repair.failed_section,
                failed_system,
                repairing: repair.repair_section,
                repairing_system,
            });
        }
        if failed_system != failure_system {
            return Err(GridError::CrossSystemRepair {
                failed: failure.subsection,
                failed_system: failure_system,
                repairing: repair.failed_section,
                repairing_system: failed_system,
            });
        }
        if self.repairs.contains(repair) {
            return Err(GridError::duplicate("cable_repair", repair));
        }
        Ok(())
    }

    // =========================================================================
    // External events
    // =========================================================================

    pub fn register_event(&mut self, mut event: ExternalEvent) -> GridResult<()> {
        let key = event.event_ref();
        self.check_event(&mut event)
            .inspect_err(|e| warn!("rejected {}: {}", key, e))?;
        debug!("registered {} ({} to {})", key, event.window().start(), event.window().end());
        self.events.insert(key, event);
        Ok(())
    }

    fn check_event(&self, event: &mut ExternalEvent) -> GridResult<()> {
        let key = event.event_ref();
        if self.events.contains_key(&key) {
            return Err(GridError::duplicate(key.kind.table(), key.id));
        }
        event.conform_geometry()
    }

    /// Record that an event affects a subsection.
    pub fn link_event(&mut self, link: EventLink) -> GridResult<()> {
        self.check_link(&link)
            .inspect_err(|e| warn!("rejected event link {}: {}", link.id, e))?;
        debug!("linked {} to subsection {}", link.event, link.subsection);
        self.event_links.insert(link.id, link);
        Ok(())
    }

    fn check_link(&self, link: &EventLink) -> GridResult<()> {
        if self.event_links.contains_key(&link.id) {
            return Err(GridError::duplicate("events_impacting_cables", link.id));
        }
        self.require_event(link.event)?;
        self.owner_of(link.subsection).map(|_| ())
    }

    pub fn record_digging_impact(&mut self, impact: DiggingImpact) -> GridResult<()> {
        self.check_digging_impact(&impact).inspect_err(|e| {
            warn!(
                "rejected digging impact {} on subsection {}: {}",
                impact.digging, impact.subsection, e
            )
        })?;
        debug!(
            "digging activity {} impacts subsection {}",
            impact.digging, impact.subsection
        );
        self.digging_impacts.insert(impact);
        Ok(())
    }

    fn check_digging_impact(&self, impact: &DiggingImpact) -> GridResult<()> {
        self.require_event(EventRef::new(EventKind::Digging, impact.digging))?;
        self.owner_of(impact.subsection)?;
        if self.digging_impacts.contains(impact) {
            return Err(GridError::duplicate(
                "digging_impact",
                format!("({}, {})", impact.digging, impact.subsection),
            ));
        }
        Ok(())
    }

    pub fn attribute_failure_to_digging(
        &mut self,
        attribution: FailureAttribution,
    ) -> GridResult<()> {
        self.check_attribution(&attribution).inspect_err(|e| {
            warn!(
                "rejected attribution of failure {} to digging {}: {}",
                attribution.failure, attribution.digging, e
            )
        })?;
        debug!(
            "failure {} attributed to digging activity {}",
            attribution.failure, attribution.digging
        );
        self.failure_attributions.insert(attribution);
        Ok(())
    }

    fn check_attribution(&self, attribution: &FailureAttribution) -> GridResult<()> {
        self.require_event(EventRef::new(EventKind::Digging, attribution.digging))?;
        if !self.failures.contains_key(&attribution.failure) {
            return Err(GridError::UnknownFailure(attribution.failure));
        }
        if self.failure_attributions.contains(attribution) {
            return Err(GridError::duplicate(
                "digging_failure",
                format!("({}, {})", attribution.digging, attribution.failure),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Static layers
    // =========================================================================

    pub fn register_layer(&mut self, mut layer: GeoLayer) -> GridResult<()> {
        let key = layer.layer_ref();
        self.check_layer(&mut layer)
            .inspect_err(|e| warn!("rejected layer {}: {}", key, e))?;
        debug!("registered layer {}", key);
        self.layers.insert(key, layer);
        Ok(())
    }

    fn check_layer(&self, layer: &mut GeoLayer) -> GridResult<()> {
        let key = layer.layer_ref();
        if self.layers.contains_key(&key) {
            return Err(GridError::duplicate(key.kind.table(), key.id));
        }
        layer.conform_geometry()
    }

    pub fn add_placement_condition(&mut self, condition: PlacementCondition) -> GridResult<()> {
        self.check_placement(&condition)
            .inspect_err(|e| warn!("rejected placement condition {}: {}", condition.id, e))?;
        debug!(
            "subsection {} placed along {}",
            condition.subsection, condition.layer
        );
        self.placement_conditions.insert(condition.id, condition);
        Ok(())
    }

    fn check_placement(&self, condition: &PlacementCondition) -> GridResult<()> {
        if self.placement_conditions.contains_key(&condition.id) {
            return Err(GridError::duplicate(
                "cable_placement_condition",
                condition.id,
            ));
        }
        if !self.layers.contains_key(&condition.layer) {
            return Err(GridError::UnknownLayer(condition.layer));
        }
        self.owner_of(condition.subsection).map(|_| ())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    fn require_operator(&self, operator: OperatorId) -> GridResult<()> {
        if self.operators.contains_key(&operator) {
            Ok(())
        } else {
            Err(GridError::UnknownOperator(operator))
        }
    }

    fn require_event(&self, event: EventRef) -> GridResult<&ExternalEvent> {
        self.events.get(&event).ok_or(GridError::UnknownEvent(event))
    }

    /// Cable system a subsection is attached to.
    pub fn owner_of(&self, subsection: SubsectionId) -> GridResult<CableSystemId> {
        self.owner
            .get(&subsection)
            .copied()
            .ok_or(GridError::UnknownSubsection(subsection))
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    pub fn voltage_level(&self, id: VoltageLevelId) -> Option<&VoltageLevel> {
        self.voltage_levels.get(&id)
    }

    pub fn substation(&self, id: SubstationId) -> Option<&Substation> {
        self.substations.get(&id)
    }

    pub fn cable_system(&self, id: CableSystemId) -> Option<&CableSystem> {
        self.cable_systems.get(&id)
    }

    pub fn subsection(&self, id: SubsectionId) -> Option<&Subsection> {
        self.subsections.get(&id)
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(&id)
    }

    pub fn failure(&self, id: FailureId) -> Option<&Failure> {
        self.failures.get(&id)
    }

    pub fn event(&self, event: EventRef) -> Option<&ExternalEvent> {
        self.events.get(&event)
    }

    pub fn layer(&self, layer: LayerRef) -> Option<&GeoLayer> {
        self.layers.get(&layer)
    }

    pub fn operators(&self) -> impl Iterator<Item = &Operator> {
        self.operators.values()
    }

    pub fn voltage_levels(&self) -> impl Iterator<Item = &VoltageLevel> {
        self.voltage_levels.values()
    }

    pub fn substations(&self) -> impl Iterator<Item = &Substation> {
        self.substations.values()
    }

    pub fn cable_systems(&self) -> impl Iterator<Item = &CableSystem> {
        self.cable_systems.values()
    }

    /// Subsections of one system in attachment order.
    pub fn subsections_of(&self, cable_system: CableSystemId) -> GridResult<Vec<&Subsection>> {
        let cs = self
            .cable_systems
            .get(&cable_system)
            .ok_or(GridError::UnknownCableSystem(cable_system))?;
        Ok(cs
            .subsections
            .iter()
            .filter_map(|id| self.subsections.get(id))
            .collect())
    }

    /// All subsections with their owning system, grouped by system in
    /// attachment order.
    pub fn subsections(&self) -> impl Iterator<Item = (CableSystemId, &Subsection)> {
        self.cable_systems.values().flat_map(move |cs| {
            cs.subsections
                .iter()
                .filter_map(move |id| self.subsections.get(id).map(|s| (cs.id, s)))
        })
    }

    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.failures.values()
    }

    pub fn repairs(&self) -> impl Iterator<Item = &Repair> {
        self.repairs.iter()
    }

    pub fn events(&self) -> impl Iterator<Item = &ExternalEvent> {
        self.events.values()
    }

    pub fn event_links(&self) -> impl Iterator<Item = &EventLink> {
        self.event_links.values()
    }

    pub fn digging_impacts(&self) -> impl Iterator<Item = &DiggingImpact> {
        self.digging_impacts.iter()
    }

    pub fn failure_attributions(&self) -> impl Iterator<Item = &FailureAttribution> {
        self.failure_attributions.iter()
    }

    pub fn layers(&self) -> impl Iterator<Item = &GeoLayer> {
        self.layers.values()
    }

    pub fn placement_conditions(&self) -> impl Iterator<Item = &PlacementCondition> {
        self.placement_conditions.values()
    }

    /// Events affecting a subsection, through event links or digging impacts.
    pub fn events_for_subsection(
        &self,
        subsection: SubsectionId,
    ) -> GridResult<Vec<&ExternalEvent>> {
        self.owner_of(subsection)?;
        let linked = self
            .event_links
            .values()
            .filter(|l| l.subsection == subsection)
            .map(|l| l.event);
        let dug = self
            .digging_impacts
            .iter()
            .filter(|i| i.subsection == subsection)
            .map(|i| EventRef::new(EventKind::Digging, i.digging));
        let refs: BTreeSet<EventRef> = linked.chain(dug).collect();
        Ok(refs.into_iter().filter_map(|r| self.events.get(&r)).collect())
    }

    /// Subsections an event affects, through event links or digging impacts.
    pub fn subsections_for_event(&self, event: EventRef) -> GridResult<Vec<SubsectionId>> {
        self.require_event(event)?;
        let linked = self
            .event_links
            .values()
            .filter(|l| l.event == event)
            .map(|l| l.subsection);
        let dug = self
            .digging_impacts
            .iter()
            .filter(|i| event.kind == EventKind::Digging && i.digging == event.id)
            .map(|i| i.subsection);
        let ids: BTreeSet<SubsectionId> = linked.chain(dug).collect();
        Ok(ids.into_iter().collect())
    }

    pub fn has_event_link(&self, subsection: SubsectionId, event: EventRef) -> bool {
        self.event_links
            .values()
            .any(|l| l.subsection == subsection && l.event == event)
    }

    pub fn has_placement(&self, subsection: SubsectionId, layer: LayerRef) -> bool {
        self.placement_conditions
            .values()
            .any(|p| p.subsection == subsection && p.layer == layer)
    }

    pub fn next_event_link_id(&self) -> EventLinkId {
        EventLinkId::new(self.event_links.keys().last().map_or(1, |id| id.value() + 1))
    }

    pub fn next_placement_condition_id(&self) -> PlacementConditionId {
        PlacementConditionId::new(
            self.placement_conditions
                .keys()
                .last()
                .map_or(1, |id| id.value() + 1),
        )
    }

    /// Ids of the digging activities a failure is attributed to.
    pub fn diggings_for_failure(&self, failure: FailureId) -> Vec<EventId> {
        self.failure_attributions
            .iter()
            .filter(|a| a.failure == failure)
            .map(|a| a.digging)
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            operators: self.operators.len(),
            voltage_levels: self.voltage_levels.len(),
            substations: self.substations.len(),
            cable_systems: self.cable_systems.len(),
            subsections: self.subsections.len(),
            joints: self.joints.len(),
            failures: self.failures.len(),
            repairs: self.repairs.len(),
            events: self.events.len(),
            event_links: self.event_links.len(),
            layers: self.layers.len(),
            placement_conditions: self.placement_conditions.len(),
        }
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    fn joint_endpoints(&self) -> HashMap<SubsectionId, usize> {
        let mut counts = HashMap::new();
        for joint in self.joints.values() {
            *counts.entry(joint.first).or_insert(0) += 1;
            *counts.entry(joint.second).or_insert(0) += 1;
        }
        counts
    }

    fn facts_with(
        &self,
        cable_system: CableSystemId,
        subsection: &Subsection,
        endpoints: &HashMap<SubsectionId, usize>,
    ) -> SubsectionFacts {
        SubsectionFacts {
            subsection: subsection.id,
            cable_system,
            length_km: subsection.length.value(),
            joint_endpoints: endpoints.get(&subsection.id).copied().unwrap_or(0),
            repairment_section: subsection.repairment_section,
        }
    }

    /// Per-subsection metric inputs for every attached subsection.
    pub fn subsection_facts(&self) -> Vec<SubsectionFacts> {
        let endpoints = self.joint_endpoints();
        self.subsections()
            .map(|(cs, sub)| self.facts_with(cs, sub, &endpoints))
            .collect()
    }

    /// Derived metrics of one cable system, recomputed from live subsections.
    pub fn metrics(&self, cable_system: CableSystemId) -> GridResult<CableSystemMetrics> {
        let endpoints = self.joint_endpoints();
        let facts: Vec<SubsectionFacts> = self
            .subsections_of(cable_system)?
            .into_iter()
            .map(|sub| self.facts_with(cable_system, sub, &endpoints))
            .collect();
        Ok(CableSystemMetrics::aggregate(cable_system, &facts))
    }

    pub fn cable_system_ids(&self) -> Vec<CableSystemId> {
        self.cable_systems.keys().copied().collect()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Collect soft findings that the mutation checks do not reject.
    pub fn validate_into(&self, options: &ValidationOptions, diag: &mut Diagnostics) {
        for cs in self.cable_systems.values() {
            let entity = format!("cable system {}", cs.id);
            if cs.subsections.is_empty() {
                diag.add_warning_with_entity("topology", "cable system has no subsections", &entity);
                continue;
            }
            if let Ok(report) = continuity(self, cs.id) {
                if !report.is_contiguous() {
                    diag.add_warning_with_entity(
                        "topology",
                        &format!(
                            "subsections form {} separate runs instead of one",
                            report.runs.len()
                        ),
                        &entity,
                    );
                }
            }
        }

        for sub in self.subsections.values() {
            let Some(drawn) = sub.geometry.as_ref().and_then(|g| g.length_km()) else {
                continue;
            };
            if drawn <= 0.0 {
                continue;
            }
            let deviation = (sub.length.value() - drawn).abs() / drawn;
            if deviation > options.length_deviation {
                diag.add_warning_with_entity(
                    "geometry",
                    &format!(
                        "recorded length {} deviates {:.1}% from geometry length {:.3} km",
                        sub.length,
                        deviation * 100.0,
                        drawn
                    ),
                    &format!("subsection {}", sub.id),
                );
            }
        }

        for failure in self.failures.values() {
            let commissioned = self
                .subsections
                .get(&failure.subsection)
                .and_then(|s| s.in_service_date);
            if let (Some(date), Some(since)) = (failure.date, commissioned) {
                if date < since {
                    diag.add_warning_with_entity(
                        "reliability",
                        &format!(
                            "failure dated {} precedes in-service date {} of subsection {}",
                            date, since, failure.subsection
                        ),
                        &format!("failure {}", failure.id),
                    );
                }
            }
        }
    }

    pub fn validate(&self, options: &ValidationOptions) -> Diagnostics {
        let mut diag = Diagnostics::new();
        self.validate_into(options, &mut diag);
        diag
    }

    /// Whether a subsection was commissioned by `date` (unknown counts as yes).
    pub fn in_service_on(&self, subsection: SubsectionId, date: NaiveDate) -> GridResult<bool> {
        self.subsections
            .get(&subsection)
            .map(|s| s.in_service_on(date))
            .ok_or(GridError::UnknownSubsection(subsection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DiggingActivity, TimeWindow};
    use crate::layers::{LayerAttributes, LayerKind};
    use crate::spatial::{Coord, Geometry, Srid};
    use crate::LayerId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One operator, main station 1, secondary stations 2 and 3, and cable
    /// systems 1 (1 -> 2) and 2 (1 -> 3) with no subsections.
    fn grid() -> GridRegistry {
        let mut g = GridRegistry::new();
        let op = OperatorId::new(1);
        g.register_operator(Operator::new(op, "Netz Süd")).unwrap();
        g.register_voltage_level(VoltageLevel::new(VoltageLevelId::new(1), 20.0))
            .unwrap();
        g.register_substation(Substation::main(SubstationId::new(1), op, "UW 1"))
            .unwrap();
        for id in [2, 3] {
            g.register_substation(Substation::secondary(
                SubstationId::new(id),
                op,
                format!("ONS {id}"),
                SubstationId::new(1),
            ))
            .unwrap();
        }
        for (cs, to) in [(1, 2), (2, 3)] {
            g.register_cable_system(CableSystem::new(
                CableSystemId::new(cs),
                op,
                format!("K{cs}"),
                SubstationId::new(1),
                SubstationId::new(to),
            ))
            .unwrap();
        }
        g
    }

    fn attach(g: &mut GridRegistry, cs: usize, sub: usize, km: f64) {
        g.add_subsection(CableSystemId::new(cs), Subsection::new(SubsectionId::new(sub), km))
            .unwrap();
    }

    #[test]
    fn test_duplicate_operator_name_rejected() {
        let mut g = grid();
        let err = g
            .register_operator(Operator::new(OperatorId::new(2), "Netz Süd"))
            .unwrap_err();
        assert!(matches!(err, GridError::UniquenessViolation { table: "operator.name", .. }));
    }

    #[test]
    fn test_operator_supply_area_must_be_multipolygon() {
        let mut g = GridRegistry::new();
        let area = Geometry::polygon(vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ]);
        let err = g
            .register_operator(Operator::new(OperatorId::new(1), "X").with_supply_area(area))
            .unwrap_err();
        assert!(matches!(err, GridError::GeometryShapeMismatch { .. }));
        assert_eq!(g.stats().operators, 0);
    }

    #[test]
    fn test_secondary_parent_must_be_main() {
        let mut g = grid();
        let err = g
            .register_substation(Substation::secondary(
                SubstationId::new(4),
                OperatorId::new(1),
                "ONS 4",
                SubstationId::new(2),
            ))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_secondary_with_missing_parent_rejected() {
        let mut g = grid();
        let err = g
            .register_substation(Substation::secondary(
                SubstationId::new(4),
                OperatorId::new(1),
                "ONS 4",
                SubstationId::new(99),
            ))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_unknown_voltage_level_rejected() {
        let mut g = grid();
        let station = Substation::main(SubstationId::new(5), OperatorId::new(1), "UW 5")
            .with_voltage_levels(Some(VoltageLevelId::new(1)), Some(VoltageLevelId::new(7)));
        assert!(matches!(
            g.register_substation(station),
            Err(GridError::UnknownVoltageLevel(id)) if id == VoltageLevelId::new(7)
        ));
    }

    #[test]
    fn test_reassign_parent() {
        let mut g = grid();
        g.register_substation(Substation::main(SubstationId::new(10), OperatorId::new(1), "UW 10"))
            .unwrap();
        g.reassign_parent(SubstationId::new(2), SubstationId::new(10))
            .unwrap();
        assert_eq!(
            g.substation(SubstationId::new(2)).unwrap().parent(),
            Some(SubstationId::new(10))
        );
        assert_eq!(g.children_of(SubstationId::new(1)).unwrap().len(), 1);

        // Self, non-main target, main subject.
        assert!(g
            .reassign_parent(SubstationId::new(2), SubstationId::new(2))
            .is_err());
        assert!(matches!(
            g.reassign_parent(SubstationId::new(2), SubstationId::new(3)),
            Err(GridError::InvalidHierarchy(_))
        ));
        assert!(matches!(
            g.reassign_parent(SubstationId::new(1), SubstationId::new(10)),
            Err(GridError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn test_set_subsection_status() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        g.set_subsection_status(SubsectionId::new(1), true, true).unwrap();
        let sub = g.subsection(SubsectionId::new(1)).unwrap();
        assert!(sub.out_of_service);
        assert!(sub.repairment_section);
        assert_eq!(g.metrics(CableSystemId::new(1)).unwrap().number_of_repairment_sections, 1);

        let err = g
            .set_subsection_status(SubsectionId::new(7), false, true)
            .unwrap_err();
        assert!(matches!(err, GridError::UnknownSubsection(id) if id == SubsectionId::new(7)));
    }

    #[test]
    fn test_duplicate_subsection_across_systems() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        let err = g
            .add_subsection(CableSystemId::new(2), Subsection::new(SubsectionId::new(1), 2.0))
            .unwrap_err();
        assert!(matches!(
            err,
            GridError::DuplicateSubsection { attached_to, .. } if attached_to == CableSystemId::new(1)
        ));
        assert_eq!(g.metrics(CableSystemId::new(2)).unwrap().number_of_subsections, 0);
    }

    #[test]
    fn test_subsection_on_unknown_system() {
        let mut g = grid();
        assert!(matches!(
            g.add_subsection(CableSystemId::new(9), Subsection::new(SubsectionId::new(1), 1.0)),
            Err(GridError::UnknownCableSystem(_))
        ));
    }

    #[test]
    fn test_joint_rules() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        attach(&mut g, 1, 2, 1.0);
        attach(&mut g, 2, 3, 1.0);
        let s = SubsectionId::new;
        assert!(matches!(
            g.add_joint(Joint::new(JointId::new(1), s(1), s(1))),
            Err(GridError::SelfJoint(_))
        ));
        assert!(matches!(
            g.add_joint(Joint::new(JointId::new(1), s(1), s(8))),
            Err(GridError::UnknownSubsection(_))
        ));
        assert!(matches!(
            g.add_joint(Joint::new(JointId::new(1), s(2), s(3))),
            Err(GridError::CrossSystemJoint { .. })
        ));
        g.add_joint(Joint::new(JointId::new(1), s(1), s(2))).unwrap();
        assert!(matches!(
            g.add_joint(Joint::new(JointId::new(1), s(1), s(2))),
            Err(GridError::UniquenessViolation { .. })
        ));
        g.remove_joint(JointId::new(1)).unwrap();
        assert!(matches!(
            g.remove_joint(JointId::new(1)),
            Err(GridError::UnknownJoint(_))
        ));
    }

    #[test]
    fn test_remove_subsection_lists_all_dependents() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        attach(&mut g, 1, 2, 1.0);
        let s = SubsectionId::new;
        g.add_joint(Joint::new(JointId::new(1), s(1), s(2))).unwrap();
        g.record_failure(Failure::new(FailureId::new(1), s(1))).unwrap();
        g.record_repair(Repair::new(FailureId::new(1), s(1), s(2)))
            .unwrap();

        let window = TimeWindow::new(date(2023, 3, 1), date(2023, 3, 5)).unwrap();
        g.register_event(ExternalEvent::Digging(DiggingActivity::new(EventId::new(1), window)))
            .unwrap();
        g.record_digging_impact(DiggingImpact {
            digging: EventId::new(1),
            subsection: s(2),
        })
        .unwrap();

        let err = g.remove_subsection(CableSystemId::new(1), s(2)).unwrap_err();
        match err {
            GridError::SubsectionInUse { dependents, .. } => {
                assert_eq!(dependents.len(), 3);
                assert!(dependents.contains(&Dependent::Joint(JointId::new(1))));
                assert!(dependents.contains(&Dependent::DiggingImpact(EventId::new(1))));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(g.metrics(CableSystemId::new(1)).unwrap().number_of_subsections, 2);
    }

    #[test]
    fn test_remove_from_wrong_system() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        assert!(matches!(
            g.remove_subsection(CableSystemId::new(2), SubsectionId::new(1)),
            Err(GridError::UnknownSubsection(_))
        ));
    }

    #[test]
    fn test_repair_within_system_of_failure() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        attach(&mut g, 1, 2, 1.0);
        attach(&mut g, 2, 3, 1.0);
        attach(&mut g, 2, 4, 1.0);
        let s = SubsectionId::new;
        g.record_failure(Failure::new(FailureId::new(1), s(1))).unwrap();

        // Failed and repairing sections agree, but not with the failure.
        assert!(matches!(
            g.record_repair(Repair::new(FailureId::new(1), s(3), s(4))),
            Err(GridError::CrossSystemRepair { .. })
        ));
        assert!(matches!(
            g.record_repair(Repair::new(FailureId::new(2), s(1), s(2))),
            Err(GridError::UnknownFailure(_))
        ));
        g.record_repair(Repair::new(FailureId::new(1), s(1), s(2)))
            .unwrap();
        assert!(matches!(
            g.record_repair(Repair::new(FailureId::new(1), s(1), s(2))),
            Err(GridError::UniquenessViolation { table: "cable_repair", .. })
        ));
    }

    #[test]
    fn test_failure_location_gets_wgs84() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        g.record_failure(
            Failure::new(FailureId::new(1), SubsectionId::new(1)).at(Geometry::point(9.9, 53.5)),
        )
        .unwrap();
        let stored = g.failure(FailureId::new(1)).unwrap();
        assert_eq!(stored.location.as_ref().unwrap().srid, Some(Srid::WGS84));
    }

    #[test]
    fn test_event_ids_are_unique_per_kind() {
        let mut g = grid();
        let window = TimeWindow::new(date(2022, 7, 1), date(2022, 7, 9)).unwrap();
        g.register_event(ExternalEvent::Digging(DiggingActivity::new(EventId::new(1), window)))
            .unwrap();
        g.register_event(ExternalEvent::Flood(crate::events::Flood {
            id: EventId::new(1),
            window,
            area: None,
        }))
        .unwrap();
        assert!(matches!(
            g.register_event(ExternalEvent::Digging(DiggingActivity::new(EventId::new(1), window))),
            Err(GridError::UniquenessViolation { table: "digging_activity", .. })
        ));
    }

    #[test]
    fn test_link_event_resolves_reference() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        let flood = EventRef::new(EventKind::Flood, EventId::new(5));
        let err = g
            .link_event(EventLink::new(EventLinkId::new(1), SubsectionId::new(1), flood))
            .unwrap_err();
        assert!(matches!(err, GridError::UnknownEvent(r) if r == flood));

        let window = TimeWindow::new(date(2021, 7, 14), date(2021, 7, 18)).unwrap();
        g.register_event(ExternalEvent::Flood(crate::events::Flood {
            id: EventId::new(5),
            window,
            area: None,
        }))
        .unwrap();
        assert!(matches!(
            g.link_event(EventLink::new(EventLinkId::new(1), SubsectionId::new(2), flood)),
            Err(GridError::UnknownSubsection(_))
        ));
        g.link_event(EventLink::new(EventLinkId::new(1), SubsectionId::new(1), flood))
            .unwrap();
        assert_eq!(
            g.subsections_for_event(flood).unwrap(),
            vec![SubsectionId::new(1)]
        );
        assert_eq!(g.events_for_subsection(SubsectionId::new(1)).unwrap().len(), 1);
        assert_eq!(g.next_event_link_id(), EventLinkId::new(2));
    }

    #[test]
    fn test_placement_condition_needs_layer() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        let road = LayerRef::new(LayerKind::Road, LayerId::new(1));
        let pc = PlacementCondition::new(PlacementConditionId::new(1), SubsectionId::new(1), road);
        assert!(matches!(
            g.add_placement_condition(pc),
            Err(GridError::UnknownLayer(_))
        ));
        g.register_layer(GeoLayer::new(
            LayerId::new(1),
            LayerAttributes::Road { road_type: None },
        ))
        .unwrap();
        g.add_placement_condition(pc).unwrap();
        assert!(g.has_placement(SubsectionId::new(1), road));
    }

    #[test]
    fn test_validation_flags_empty_and_split_systems() {
        let mut g = grid();
        attach(&mut g, 1, 1, 1.0);
        attach(&mut g, 1, 2, 1.0);
        let diag = g.validate(&ValidationOptions::default());
        // System 1 has no joint between its two subsections, system 2 is empty.
        assert_eq!(diag.issues_by_category("topology").count(), 2);
    }

    #[test]
    fn test_validation_flags_length_drift() {
        let mut g = grid();
        let line = Geometry::line_string(vec![Coord::new(10.0, 50.0), Coord::new(10.0, 50.01)])
            .with_srid(Srid::WGS84);
        g.add_subsection(
            CableSystemId::new(1),
            Subsection::new(SubsectionId::new(1), 5.0).with_geometry(line),
        )
        .unwrap();
        let diag = g.validate(&ValidationOptions::default());
        assert_eq!(diag.issues_by_category("geometry").count(), 1);
    }
}
