//! Columnar views of registry tables.
//!
//! Frames use the column names of the table catalog in [`crate::schema`]
//! so bulk queries written against them read like queries against the
//! persisted tables. Dates are rendered as ISO-8601 text and geometries as
//! EWKT.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use mvgrid_core::GridRegistry;
use polars::prelude::*;

use crate::wkt::to_wkt;

fn idx(id: usize) -> i64 {
    id as i64
}

pub fn cable_system_frame(registry: &GridRegistry) -> PolarsResult<DataFrame> {
    let systems: Vec<_> = registry.cable_systems().collect();
    DataFrame::new(vec![
        Series::new("id", systems.iter().map(|c| idx(c.id.value())).collect::<Vec<_>>()),
        Series::new(
            "dso_id",
            systems.iter().map(|c| idx(c.operator.value())).collect::<Vec<_>>(),
        ),
        Series::new("name", systems.iter().map(|c| c.name.clone()).collect::<Vec<_>>()),
        Series::new(
            "station_from",
            systems.iter().map(|c| idx(c.station_from.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "station_to",
            systems.iter().map(|c| idx(c.station_to.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "operating_voltage",
            systems
                .iter()
                .map(|c| c.operating_voltage.map(|v| idx(v.value())))
                .collect::<Vec<_>>(),
        ),
    ])
}

pub fn cable_subsection_frame(registry: &GridRegistry) -> PolarsResult<DataFrame> {
    let rows: Vec<_> = registry.subsections().collect();
    DataFrame::new(vec![
        Series::new("id", rows.iter().map(|(_, s)| idx(s.id.value())).collect::<Vec<_>>()),
        Series::new(
            "cable_system_id",
            rows.iter().map(|(cs, _)| idx(cs.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "conductor_material",
            rows.iter()
                .map(|(_, s)| s.conductor_material.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "conductor_size_mm2",
            rows.iter()
                .map(|(_, s)| s.conductor_size.map(|v| v.value()))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "manufacturer",
            rows.iter().map(|(_, s)| s.manufacturer.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "in_service_date",
            rows.iter()
                .map(|(_, s)| s.in_service_date.map(|d| d.to_string()))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "length_km",
            rows.iter().map(|(_, s)| s.length.value()).collect::<Vec<_>>(),
        ),
        Series::new(
            "repairment_section",
            rows.iter().map(|(_, s)| s.repairment_section).collect::<Vec<_>>(),
        ),
        Series::new(
            "out_of_service",
            rows.iter().map(|(_, s)| s.out_of_service).collect::<Vec<_>>(),
        ),
        Series::new(
            "geometry",
            rows.iter()
                .map(|(_, s)| s.geometry.as_ref().map(to_wkt))
                .collect::<Vec<_>>(),
        ),
    ])
}

pub fn cable_joint_frame(registry: &GridRegistry) -> PolarsResult<DataFrame> {
    let joints: Vec<_> = registry.joints().collect();
    DataFrame::new(vec![
        Series::new("id", joints.iter().map(|j| idx(j.id.value())).collect::<Vec<_>>()),
        Series::new(
            "first_subsection_id",
            joints.iter().map(|j| idx(j.first.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "second_subsection_id",
            joints.iter().map(|j| idx(j.second.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "joint_type",
            joints.iter().map(|j| j.joint_type.clone()).collect::<Vec<_>>(),
        ),
    ])
}

pub fn failure_frame(registry: &GridRegistry) -> PolarsResult<DataFrame> {
    let failures: Vec<_> = registry.failures().collect();
    DataFrame::new(vec![
        Series::new("id", failures.iter().map(|f| idx(f.id.value())).collect::<Vec<_>>()),
        Series::new(
            "cable_subsection_id",
            failures.iter().map(|f| idx(f.subsection.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "date",
            failures
                .iter()
                .map(|f| f.date.map(|d| d.to_string()))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "failure_type",
            failures.iter().map(|f| f.failure_type.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "failure_cause",
            failures.iter().map(|f| f.failure_cause.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "location",
            failures
                .iter()
                .map(|f| f.location.as_ref().map(to_wkt))
                .collect::<Vec<_>>(),
        ),
    ])
}

pub fn event_link_frame(registry: &GridRegistry) -> PolarsResult<DataFrame> {
    let links: Vec<_> = registry.event_links().collect();
    DataFrame::new(vec![
        Series::new("id", links.iter().map(|l| idx(l.id.value())).collect::<Vec<_>>()),
        Series::new(
            "subsection_id",
            links.iter().map(|l| idx(l.subsection.value())).collect::<Vec<_>>(),
        ),
        Series::new(
            "event_kind",
            links.iter().map(|l| l.event.kind.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "event_id",
            links.iter().map(|l| idx(l.event.id.value())).collect::<Vec<_>>(),
        ),
    ])
}

/// Every exportable frame with its table name.
pub fn table_frames(registry: &GridRegistry) -> PolarsResult<Vec<(&'static str, DataFrame)>> {
    Ok(vec![
        ("cable_system", cable_system_frame(registry)?),
        ("cable_subsection", cable_subsection_frame(registry)?),
        ("cable_joint", cable_joint_frame(registry)?),
        ("failure", failure_frame(registry)?),
        ("events_impacting_cables", event_link_frame(registry)?),
    ])
}

/// Output encoding for exported frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Csv,
    #[cfg(feature = "parquet")]
    Parquet,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Csv => "csv",
            #[cfg(feature = "parquet")]
            FrameFormat::Parquet => "parquet",
        }
    }
}

pub fn write_frame(df: &mut DataFrame, path: &Path, format: FrameFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    match format {
        FrameFormat::Csv => CsvWriter::new(&mut file)
            .finish(df)
            .with_context(|| format!("writing CSV '{}'", path.display()))?,
        #[cfg(feature = "parquet")]
        FrameFormat::Parquet => {
            ParquetWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("writing Parquet '{}'", path.display()))?;
        }
    }
    Ok(())
}

/// Write every table frame into `dir` as `<table>.<ext>`; returns the paths.
pub fn export_tables(
    registry: &GridRegistry,
    dir: &Path,
    format: FrameFormat,
) -> Result<Vec<std::path::PathBuf>> {
    let mut written = Vec::new();
    for (table, mut df) in table_frames(registry).context("building table frames")? {
        let path = dir.join(format!("{}.{}", table, format.extension()));
        write_frame(&mut df, &path, format)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgrid_core::*;
    use mvgrid_core::Operator;

    fn registry() -> GridRegistry {
        let mut g = GridRegistry::new();
        g.register_operator(Operator::new(OperatorId::new(1), "Op")).unwrap();
        g.register_substation(Substation::main(SubstationId::new(1), OperatorId::new(1), "A"))
            .unwrap();
        g.register_cable_system(CableSystem::new(
            CableSystemId::new(1),
            OperatorId::new(1),
            "K1",
            SubstationId::new(1),
            SubstationId::new(1),
        ))
        .unwrap();
        for (id, km) in [(1, 1.2), (2, 3.4)] {
            g.add_subsection(CableSystemId::new(1), Subsection::new(SubsectionId::new(id), km))
                .unwrap();
        }
        g.add_joint(Joint::new(JointId::new(1), SubsectionId::new(1), SubsectionId::new(2)))
            .unwrap();
        g
    }

    #[test]
    fn test_subsection_frame_columns() {
        let df = cable_subsection_frame(&registry()).unwrap();
        assert_eq!(df.height(), 2);
        let lengths = df.column("length_km").unwrap().f64().unwrap();
        assert_eq!(lengths.get(1), Some(3.4));
        let owners = df.column("cable_system_id").unwrap().i64().unwrap();
        assert_eq!(owners.get(0), Some(1));
    }

    #[test]
    fn test_empty_frames_have_columns() {
        let df = cable_joint_frame(&GridRegistry::new()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 4);
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let paths = export_tables(&registry(), dir.path(), FrameFormat::Csv).unwrap();
        assert_eq!(paths.len(), 5);
        let csv = std::fs::read_to_string(dir.path().join("cable_joint.csv")).unwrap();
        assert!(csv.starts_with("id,first_subsection_id,second_subsection_id,joint_type"));
    }
}
