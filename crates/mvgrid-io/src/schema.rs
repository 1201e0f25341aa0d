//! Arrow schema catalog of the persisted grid tables.
//!
//! This is the contract handed to the external schema provisioner: one
//! [`Schema`] per table plus the foreign keys between them. Geometry columns
//! are stored as WKT text; their declared shape and SRID travel as field
//! metadata (`geometry_shape`, `srid`) taken from the model's own geometry
//! declarations, so the catalog and the registry cannot drift apart.
//!
//! Polymorphic references (`events_impacting_cables.event_kind/event_id`,
//! `cable_placement_condition.layer_kind/layer_id`) have no foreign key; the
//! registry resolves them instead.

use std::collections::HashMap;

use arrow_schema::{DataType, Field, Schema};
use mvgrid_core::events::{DiggingActivity, Failure, Flood, Lightning, TemperatureWave};
use mvgrid_core::layers::LayerKind;
use mvgrid_core::{Joint, Operator, Spatial, SpatialAttribute, Subsection, Substation};
use serde::Serialize;

/// Catalog version (semver); bumped on any column change.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Metadata key naming the declared geometry shape of a WKT column.
pub const GEOMETRY_SHAPE_KEY: &str = "geometry_shape";
/// Metadata key naming the declared SRID of a WKT column, absent for legacy columns.
pub const SRID_KEY: &str = "srid";

/// A single-column foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
}

const fn fk(
    table: &'static str,
    column: &'static str,
    references: &'static str,
    referenced_column: &'static str,
) -> ForeignKey {
    ForeignKey {
        table,
        column,
        references,
        referenced_column,
    }
}

fn id(name: &str) -> Field {
    Field::new(name, DataType::Int64, false)
}

fn id_ref(name: &str) -> Field {
    Field::new(name, DataType::Int64, true)
}

fn text(name: &str) -> Field {
    Field::new(name, DataType::Utf8, true)
}

fn float(name: &str) -> Field {
    Field::new(name, DataType::Float64, true)
}

fn date(name: &str) -> Field {
    Field::new(name, DataType::Date32, true)
}

fn flag(name: &str) -> Field {
    Field::new(name, DataType::Boolean, true)
}

/// WKT column carrying its geometry declaration as metadata.
pub fn geometry_field(name: &str, declared: SpatialAttribute) -> Field {
    let mut metadata = HashMap::new();
    metadata.insert(
        GEOMETRY_SHAPE_KEY.to_string(),
        declared.kind.as_str().to_string(),
    );
    if let Some(srid) = declared.srid {
        metadata.insert(SRID_KEY.to_string(), srid.to_string());
    }
    Field::new(name, DataType::Utf8, true).with_metadata(metadata)
}

// =============================================================================
// Asset hierarchy
// =============================================================================

pub fn operator_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        Field::new("name", DataType::Utf8, false),
        geometry_field("supply_area", Operator::GEOMETRY),
    ])
}

pub fn voltage_level_schema() -> Schema {
    Schema::new(vec![id("id"), Field::new("voltage_kv", DataType::Float64, false)])
}

pub fn substation_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("dso_id"),
        text("name"),
        date("installation_date"),
        geometry_field("location", Substation::GEOMETRY),
        id_ref("voltage_high"),
        id_ref("voltage_low"),
    ])
}

pub fn main_substation_schema() -> Schema {
    Schema::new(vec![id("id")])
}

pub fn secondary_substation_schema() -> Schema {
    Schema::new(vec![id("id"), id("parent_id")])
}

// =============================================================================
// Cable network
// =============================================================================

/// Deliberately has no length or subsection-count column: those are derived.
pub fn cable_system_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("dso_id"),
        text("name"),
        id("station_from"),
        id("station_to"),
        id_ref("operating_voltage"),
    ])
}

pub fn cable_subsection_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("cable_system_id"),
        Field::new("number_of_conductors", DataType::Int32, true),
        float("conductor_size_mm2"),
        text("conductor_material"),
        text("insulation"),
        text("conductor_type"),
        text("manufacturer"),
        date("in_service_date"),
        Field::new("length_km", DataType::Float64, false),
        geometry_field("geometry", Subsection::GEOMETRY),
        flag("repairment_section"),
        flag("out_of_service"),
    ])
}

pub fn cable_joint_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("first_subsection_id"),
        id("second_subsection_id"),
        text("joint_type"),
        geometry_field("location", Joint::GEOMETRY),
    ])
}

// =============================================================================
// Failures and repairs
// =============================================================================

pub fn failure_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("cable_subsection_id"),
        date("date"),
        text("failure_type"),
        text("failure_cause"),
        geometry_field("location", Failure::GEOMETRY),
    ])
}

/// Composite key `(failure_id, failed_section_id, repair_section_id)`.
pub fn cable_repair_schema() -> Schema {
    Schema::new(vec![
        id("failure_id"),
        id("failed_section_id"),
        id("repair_section_id"),
    ])
}

// =============================================================================
// External events
// =============================================================================

pub fn digging_activity_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        Field::new("period_from", DataType::Date32, false),
        Field::new("period_to", DataType::Date32, false),
        text("utility_type"),
        text("utility_type_other"),
        text("digging_type"),
        text("digging_type_other"),
        geometry_field("area", DiggingActivity::GEOMETRY),
        flag("cable_details_requested"),
    ])
}

pub fn digging_impact_schema() -> Schema {
    Schema::new(vec![id("digging_id"), id("subsection_id")])
}

pub fn digging_failure_schema() -> Schema {
    Schema::new(vec![id("digging_id"), id("failure_id")])
}

pub fn lightning_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        Field::new("impact_date", DataType::Date32, false),
        geometry_field("location", Lightning::GEOMETRY),
    ])
}

/// Heatwave and coldwave share one layout. There is no duration column.
pub fn temperature_wave_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        float("max_temperature"),
        float("min_temperature"),
        float("average_temperature"),
        Field::new("start_date", DataType::Date32, false),
        Field::new("end_date", DataType::Date32, false),
        geometry_field("area", TemperatureWave::GEOMETRY),
    ])
}

pub fn flood_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        Field::new("start_date", DataType::Date32, false),
        Field::new("end_date", DataType::Date32, false),
        geometry_field("area", Flood::GEOMETRY),
    ])
}

pub fn events_impacting_cables_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("subsection_id"),
        Field::new("event_kind", DataType::Utf8, false),
        id("event_id"),
    ])
}

// =============================================================================
// Static layers
// =============================================================================

pub fn layer_schema(kind: LayerKind) -> Schema {
    let geometry = geometry_field("geometry", kind.geometry());
    let attributes = match kind {
        LayerKind::Road => vec![text("road_type")],
        LayerKind::Rail => vec![text("rail_type")],
        LayerKind::WaterBody => vec![text("water_body_type")],
        LayerKind::SoilType => vec![text("soil_type")],
        LayerKind::LocationWeather => vec![
            float("average_temperature"),
            float("max_temperature"),
            float("min_temperature"),
            float("average_wind_speed"),
            float("max_wind_speed"),
            float("average_humidity"),
            float("max_humidity"),
            float("average_precipitation"),
            float("max_precipitation"),
            date("calculated_from"),
            date("calculated_to"),
        ],
    };
    let mut fields = vec![id("id")];
    fields.extend(attributes);
    fields.push(geometry);
    Schema::new(fields)
}

pub fn cable_placement_condition_schema() -> Schema {
    Schema::new(vec![
        id("id"),
        id("subsection_id"),
        Field::new("layer_kind", DataType::Utf8, false),
        id("layer_id"),
    ])
}

// =============================================================================
// Catalog accessors
// =============================================================================

/// All tables, in an order where every table follows the tables it references.
pub fn table_names() -> &'static [&'static str] {
    &[
        "operator",
        "voltage_level",
        "substation",
        "main_substation",
        "secondary_substation",
        "cable_system",
        "cable_subsection",
        "cable_joint",
        "failure",
        "cable_repair",
        "digging_activity",
        "digging_impact",
        "digging_failure",
        "lightning",
        "heatwave",
        "coldwave",
        "flood",
        "events_impacting_cables",
        "roads",
        "rails",
        "water_bodies",
        "soil_type",
        "location_weather",
        "cable_placement_condition",
    ]
}

pub fn schema_for_table(name: &str) -> Option<Schema> {
    match name {
        "operator" => Some(operator_schema()),
        "voltage_level" => Some(voltage_level_schema()),
        "substation" => Some(substation_schema()),
        "main_substation" => Some(main_substation_schema()),
        "secondary_substation" => Some(secondary_substation_schema()),
        "cable_system" => Some(cable_system_schema()),
        "cable_subsection" => Some(cable_subsection_schema()),
        "cable_joint" => Some(cable_joint_schema()),
        "failure" => Some(failure_schema()),
        "cable_repair" => Some(cable_repair_schema()),
        "digging_activity" => Some(digging_activity_schema()),
        "digging_impact" => Some(digging_impact_schema()),
        "digging_failure" => Some(digging_failure_schema()),
        "lightning" => Some(lightning_schema()),
        "heatwave" | "coldwave" => Some(temperature_wave_schema()),
        "flood" => Some(flood_schema()),
        "events_impacting_cables" => Some(events_impacting_cables_schema()),
        "cable_placement_condition" => Some(cable_placement_condition_schema()),
        other => LayerKind::ALL
            .into_iter()
            .find(|k| k.table() == other)
            .map(layer_schema),
    }
}

/// Primary key columns of a table.
pub fn primary_key(table: &str) -> &'static [&'static str] {
    match table {
        "cable_repair" => &["failure_id", "failed_section_id", "repair_section_id"],
        "digging_impact" => &["digging_id", "subsection_id"],
        "digging_failure" => &["digging_id", "failure_id"],
        _ => &["id"],
    }
}

pub fn foreign_keys() -> &'static [ForeignKey] {
    const KEYS: &[ForeignKey] = &[
        fk("substation", "dso_id", "operator", "id"),
        fk("substation", "voltage_high", "voltage_level", "id"),
        fk("substation", "voltage_low", "voltage_level", "id"),
        fk("main_substation", "id", "substation", "id"),
        fk("secondary_substation", "id", "substation", "id"),
        fk("secondary_substation", "parent_id", "main_substation", "id"),
        fk("cable_system", "dso_id", "operator", "id"),
        fk("cable_system", "station_from", "substation", "id"),
        fk("cable_system", "station_to", "substation", "id"),
        fk("cable_system", "operating_voltage", "voltage_level", "id"),
        fk("cable_subsection", "cable_system_id", "cable_system", "id"),
        fk("cable_joint", "first_subsection_id", "cable_subsection", "id"),
        fk("cable_joint", "second_subsection_id", "cable_subsection", "id"),
        fk("failure", "cable_subsection_id", "cable_subsection", "id"),
        fk("cable_repair", "failure_id", "failure", "id"),
        fk("cable_repair", "failed_section_id", "cable_subsection", "id"),
        fk("cable_repair", "repair_section_id", "cable_subsection", "id"),
        fk("digging_impact", "digging_id", "digging_activity", "id"),
        fk("digging_impact", "subsection_id", "cable_subsection", "id"),
        fk("digging_failure", "digging_id", "digging_activity", "id"),
        fk("digging_failure", "failure_id", "failure", "id"),
        fk("events_impacting_cables", "subsection_id", "cable_subsection", "id"),
        fk("cable_placement_condition", "subsection_id", "cable_subsection", "id"),
    ];
    KEYS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_schema() {
        for name in table_names() {
            assert!(schema_for_table(name).is_some(), "missing schema for {name}");
        }
        assert!(schema_for_table("buses").is_none());
    }

    #[test]
    fn test_foreign_keys_resolve() {
        for key in foreign_keys() {
            let table = schema_for_table(key.table).unwrap();
            let target = schema_for_table(key.references).unwrap();
            assert!(table.field_with_name(key.column).is_ok(), "{key:?}");
            assert!(target.field_with_name(key.referenced_column).is_ok(), "{key:?}");
        }
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let order = table_names();
        let pos = |t: &str| order.iter().position(|n| *n == t).unwrap();
        for key in foreign_keys() {
            if key.table != key.references {
                assert!(pos(key.references) < pos(key.table), "{key:?}");
            }
        }
    }

    #[test]
    fn test_geometry_metadata() {
        let schema = failure_schema();
        let field = schema.field_with_name("location").unwrap();
        assert_eq!(field.metadata().get(GEOMETRY_SHAPE_KEY).unwrap(), "POINT");
        assert_eq!(field.metadata().get(SRID_KEY).unwrap(), "4326");

        let legacy = cable_subsection_schema();
        let field = legacy.field_with_name("geometry").unwrap();
        assert_eq!(field.metadata().get(GEOMETRY_SHAPE_KEY).unwrap(), "LINESTRING");
        assert!(field.metadata().get(SRID_KEY).is_none());
    }

    #[test]
    fn test_cable_system_has_no_derived_columns() {
        let schema = cable_system_schema();
        assert!(schema.field_with_name("length_km").is_err());
        assert!(schema.field_with_name("number_of_subsections").is_err());
    }

    #[test]
    fn test_composite_keys() {
        assert_eq!(primary_key("cable_repair").len(), 3);
        assert_eq!(primary_key("operator"), &["id"]);
    }
}
