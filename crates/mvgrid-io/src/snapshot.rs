//! JSON snapshots of a whole registry.
//!
//! A snapshot holds one array per table. Loading never writes tables
//! directly: every row is replayed through [`GridRegistry`] in dependency
//! order, so a snapshot that breaks an invariant is rejected with the same
//! error a live mutation would get. Derived metrics are never written.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mvgrid_core::{
    CableSystem, CableSystemId, DiggingImpact, EventLink, ExternalEvent, Failure,
    FailureAttribution, GeoLayer, GridRegistry, Joint, Operator, PlacementCondition, Repair,
    Subsection, Substation, VoltageLevel,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::schema::SCHEMA_VERSION;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot format {found} is not compatible with {supported}")]
    UnsupportedVersion { found: String, supported: &'static str },
}

/// A subsection row: the subsection plus the cable system it is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionRow {
    pub cable_system_id: CableSystemId,
    #[serde(flatten)]
    pub subsection: Subsection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub format_version: String,
    pub operators: Vec<Operator>,
    pub voltage_levels: Vec<VoltageLevel>,
    pub substations: Vec<Substation>,
    pub cable_systems: Vec<CableSystem>,
    pub subsections: Vec<SubsectionRow>,
    pub joints: Vec<Joint>,
    pub failures: Vec<Failure>,
    pub repairs: Vec<Repair>,
    pub events: Vec<ExternalEvent>,
    pub event_links: Vec<EventLink>,
    pub digging_impacts: Vec<DiggingImpact>,
    pub failure_attributions: Vec<FailureAttribution>,
    pub layers: Vec<GeoLayer>,
    pub placement_conditions: Vec<PlacementCondition>,
}

impl Snapshot {
    /// Dump every table of `registry`. Subsections keep their attachment order.
    pub fn from_registry(registry: &GridRegistry) -> Self {
        Self {
            format_version: SCHEMA_VERSION.to_string(),
            operators: registry.operators().cloned().collect(),
            voltage_levels: registry.voltage_levels().copied().collect(),
            substations: registry.substations().cloned().collect(),
            cable_systems: registry.cable_systems().cloned().collect(),
            subsections: registry
                .subsections()
                .map(|(cs, sub)| SubsectionRow {
                    cable_system_id: cs,
                    subsection: sub.clone(),
                })
                .collect(),
            joints: registry.joints().cloned().collect(),
            failures: registry.failures().cloned().collect(),
            repairs: registry.repairs().copied().collect(),
            events: registry.events().cloned().collect(),
            event_links: registry.event_links().copied().collect(),
            digging_impacts: registry.digging_impacts().copied().collect(),
            failure_attributions: registry.failure_attributions().copied().collect(),
            layers: registry.layers().cloned().collect(),
            placement_conditions: registry.placement_conditions().copied().collect(),
        }
    }

    /// Replay all rows into a fresh registry. The first rejected row aborts
    /// the import; the underlying `GridError` stays reachable by downcast.
    pub fn into_registry(self) -> Result<GridRegistry> {
        self.check_version()?;
        let mut grid = GridRegistry::new();

        for row in self.operators {
            let id = row.id;
            grid.register_operator(row)
                .with_context(|| format!("importing operator {}", id))?;
        }
        for row in self.voltage_levels {
            let id = row.id;
            grid.register_voltage_level(row)
                .with_context(|| format!("importing voltage level {}", id))?;
        }
        // Parents before children.
        let (mains, secondaries): (Vec<_>, Vec<_>) =
            self.substations.into_iter().partition(|s| s.is_main());
        for row in mains.into_iter().chain(secondaries) {
            let id = row.id;
            grid.register_substation(row)
                .with_context(|| format!("importing substation {}", id))?;
        }
        for row in self.cable_systems {
            let id = row.id;
            grid.register_cable_system(row)
                .with_context(|| format!("importing cable system {}", id))?;
        }
        for row in self.subsections {
            let id = row.subsection.id;
            grid.add_subsection(row.cable_system_id, row.subsection)
                .with_context(|| format!("importing subsection {}", id))?;
        }
        for row in self.joints {
            let id = row.id;
            grid.add_joint(row)
                .with_context(|| format!("importing joint {}", id))?;
        }
        for row in self.failures {
            let id = row.id;
            grid.record_failure(row)
                .with_context(|| format!("importing failure {}", id))?;
        }
        for row in self.repairs {
            grid.record_repair(row)
                .with_context(|| format!("importing repair {}", row))?;
        }
        for row in self.events {
            let key = row.event_ref();
            grid.register_event(row)
                .with_context(|| format!("importing {}", key))?;
        }
        for row in self.event_links {
            grid.link_event(row)
                .with_context(|| format!("importing event link {}", row.id))?;
        }
        for row in self.digging_impacts {
            grid.record_digging_impact(row).with_context(|| {
                format!(
                    "importing digging impact ({}, {})",
                    row.digging, row.subsection
                )
            })?;
        }
        for row in self.failure_attributions {
            grid.attribute_failure_to_digging(row).with_context(|| {
                format!(
                    "importing digging failure ({}, {})",
                    row.digging, row.failure
                )
            })?;
        }
        for row in self.layers {
            let key = row.layer_ref();
            grid.register_layer(row)
                .with_context(|| format!("importing layer {}", key))?;
        }
        for row in self.placement_conditions {
            grid.add_placement_condition(row)
                .with_context(|| format!("importing placement condition {}", row.id))?;
        }

        info!("imported snapshot: {}", grid.stats());
        Ok(grid)
    }

    /// Snapshots without a version are taken as current; otherwise the major
    /// version must match.
    fn check_version(&self) -> Result<()> {
        if self.format_version.is_empty() {
            return Ok(());
        }
        let major = |v: &str| v.split('.').next().map(str::to_string);
        if major(&self.format_version) == major(SCHEMA_VERSION) {
            Ok(())
        } else {
            Err(SnapshotError::UnsupportedVersion {
                found: self.format_version.clone(),
                supported: SCHEMA_VERSION,
            }
            .into())
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing snapshot JSON")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing snapshot")
    }
}

/// Read a snapshot file and replay it into a registry.
pub fn load_registry(path: &Path) -> Result<GridRegistry> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot '{}'", path.display()))?;
    Snapshot::from_json(&json)
        .and_then(Snapshot::into_registry)
        .with_context(|| format!("loading snapshot '{}'", path.display()))
}

/// Write `registry` as a snapshot file, creating parent directories.
pub fn save_registry(registry: &GridRegistry, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }
    }
    let json = Snapshot::from_registry(registry).to_json()?;
    fs::write(path, json).with_context(|| format!("writing snapshot '{}'", path.display()))?;
    info!("wrote snapshot '{}'", path.display());
    Ok(())
}
