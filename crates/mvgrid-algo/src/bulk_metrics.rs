//! Cable system metrics for many systems at once.
//!
//! The bulk path evaluates the term table of [`MetricTerm`] as polars lazy
//! expressions over the `cable_subsection` / `cable_joint` frames, the
//! per-entity path evaluates the same table through
//! [`GridRegistry::metrics`] in parallel. [`check_parity`] compares the two.
//!
//! **Algorithm:**
//! 1. Stack `first_subsection_id` and `second_subsection_id` of every joint
//!    and count rows per subsection (`joint_endpoints`).
//! 2. Left-join the counts onto subsections, missing counts become 0.
//! 3. Project one column per term, sum per `cable_system_id`.
//! 4. Left-join the sums onto the `cable_system` frame so systems without
//!    subsections come out as all zeros.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use mvgrid_core::{
    CableSystemId, CableSystemMetrics, FactColumn, GridRegistry, GridResult, MetricTerm,
    SharedRegistry, TermSource,
};
use mvgrid_io::frames::{cable_joint_frame, cable_subsection_frame, cable_system_frame};
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

pub type MetricsByCableSystem = BTreeMap<CableSystemId, CableSystemMetrics>;

/// Polars expression producing the per-subsection value of `term`.
fn term_expr(term: MetricTerm) -> Expr {
    let value = match term.source() {
        TermSource::Constant(value) => lit(value),
        TermSource::Fact(column) => col(column.name()).cast(DataType::Float64),
    };
    value.alias(term.column())
}

/// Subsection facts: `subsection_id`, `cable_system_id` and one column per
/// [`FactColumn`].
pub fn subsection_facts_frame(
    subsections: &DataFrame,
    joints: &DataFrame,
) -> PolarsResult<LazyFrame> {
    let endpoint_column = FactColumn::JointEndpoints.name();
    let stacked = concat(
        [
            joints.clone().lazy().select([
                col("first_subsection_id").alias("subsection_id"),
                lit(1.0).alias(endpoint_column),
            ]),
            joints.clone().lazy().select([
                col("second_subsection_id").alias("subsection_id"),
                lit(1.0).alias(endpoint_column),
            ]),
        ],
        UnionArgs::default(),
    )?;
    let endpoints = stacked
        .group_by([col("subsection_id")])
        .agg([col(endpoint_column).sum()]);

    Ok(subsections
        .clone()
        .lazy()
        .select([
            col("id").alias("subsection_id"),
            col("cable_system_id"),
            col(FactColumn::LengthKm.name()),
            col(FactColumn::RepairmentSection.name()),
        ])
        .left_join(endpoints, col("subsection_id"), col("subsection_id"))
        .with_columns([col(endpoint_column).fill_null(lit(0.0))]))
}

/// Run the aggregate over table frames. Output has `cable_system_id` plus one
/// column per [`MetricTerm::column`], one row per cable system.
pub fn bulk_metrics_frame(
    cable_systems: &DataFrame,
    subsections: &DataFrame,
    joints: &DataFrame,
) -> PolarsResult<DataFrame> {
    let mut projection = vec![col("cable_system_id")];
    projection.extend(MetricTerm::ALL.iter().map(|t| term_expr(*t)));

    let sums: Vec<Expr> = MetricTerm::ALL.iter().map(|t| col(t.column()).sum()).collect();
    let zero_filled: Vec<Expr> = MetricTerm::ALL
        .iter()
        .map(|t| col(t.column()).fill_null(lit(0.0)))
        .collect();

    let per_system = subsection_facts_frame(subsections, joints)?
        .select(projection)
        .group_by([col("cable_system_id")])
        .agg(sums);

    cable_systems
        .clone()
        .lazy()
        .select([col("id").alias("cable_system_id")])
        .left_join(per_system, col("cable_system_id"), col("cable_system_id"))
        .with_columns(zero_filled)
        .collect()
}

/// Convert aggregate rows back into [`CableSystemMetrics`].
pub fn metrics_from_frame(df: &DataFrame) -> Result<MetricsByCableSystem> {
    let ids = df
        .column("cable_system_id")
        .and_then(|s| s.i64())
        .context("reading cable_system_id")?;
    let columns = MetricTerm::ALL
        .iter()
        .map(|t| {
            df.column(t.column())
                .and_then(|s| s.f64())
                .with_context(|| format!("reading {}", t.column()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = BTreeMap::new();
    for row in 0..df.height() {
        let raw = ids
            .get(row)
            .ok_or_else(|| anyhow!("null cable_system_id in row {}", row))?;
        let id = CableSystemId::new(
            usize::try_from(raw).with_context(|| format!("cable system id {}", raw))?,
        );
        let metrics = CableSystemMetrics::from_totals(id, |term| {
            columns[term as usize].get(row).unwrap_or(0.0)
        });
        out.insert(id, metrics);
    }
    Ok(out)
}

/// Bulk metrics of every cable system in `registry`.
pub fn bulk_metrics(registry: &GridRegistry) -> Result<MetricsByCableSystem> {
    let systems = cable_system_frame(registry).context("building cable_system frame")?;
    let subsections =
        cable_subsection_frame(registry).context("building cable_subsection frame")?;
    let joints = cable_joint_frame(registry).context("building cable_joint frame")?;

    let df = bulk_metrics_frame(&systems, &subsections, &joints)
        .context("running bulk metric aggregate")?;
    debug!("bulk metrics over {} cable systems", df.height());
    metrics_from_frame(&df)
}

/// Per-entity metrics of every cable system, evaluated in parallel.
pub fn per_entity_metrics(registry: &GridRegistry) -> GridResult<MetricsByCableSystem> {
    registry
        .cable_system_ids()
        .par_iter()
        .map(|id| registry.metrics(*id).map(|m| (*id, m)))
        .collect()
}

/// Same as [`per_entity_metrics`], under a single read lock.
pub fn shared_per_entity_metrics(shared: &SharedRegistry) -> GridResult<MetricsByCableSystem> {
    shared.read(per_entity_metrics)
}

/// One disagreement between the per-entity and the bulk metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParityMismatch {
    /// The system is present on one side only.
    Missing {
        cable_system: CableSystemId,
        missing_from: &'static str,
    },
    Value {
        cable_system: CableSystemId,
        term: MetricTerm,
        per_entity: f64,
        bulk: f64,
    },
}

impl std::fmt::Display for ParityMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParityMismatch::Missing {
                cable_system,
                missing_from,
            } => write!(f, "cable system {} missing from {} metrics", cable_system, missing_from),
            ParityMismatch::Value {
                cable_system,
                term,
                per_entity,
                bulk,
            } => write!(
                f,
                "cable system {}: {} is {} per entity but {} in bulk",
                cable_system, term, per_entity, bulk
            ),
        }
    }
}

/// Compare both evaluations. Counts must match exactly; length may differ by
/// `tolerance` (summation order differs between the two paths).
pub fn check_parity(
    per_entity: &MetricsByCableSystem,
    bulk: &MetricsByCableSystem,
    tolerance: f64,
) -> Vec<ParityMismatch> {
    let mut mismatches = Vec::new();
    for (id, left) in per_entity {
        let Some(right) = bulk.get(id) else {
            mismatches.push(ParityMismatch::Missing {
                cable_system: *id,
                missing_from: "bulk",
            });
            continue;
        };
        for term in MetricTerm::ALL {
            let (a, b) = (left.value(term), right.value(term));
            let allowed = if term == MetricTerm::Length { tolerance } else { 0.0 };
            if (a - b).abs() > allowed {
                mismatches.push(ParityMismatch::Value {
                    cable_system: *id,
                    term,
                    per_entity: a,
                    bulk: b,
                });
            }
        }
    }
    for id in bulk.keys().filter(|id| !per_entity.contains_key(id)) {
        mismatches.push(ParityMismatch::Missing {
            cable_system: *id,
            missing_from: "per-entity",
        });
    }
    mismatches
}

/// SQL rendering of the same aggregate for a relational store holding the
/// persisted tables.
pub fn bulk_metrics_sql() -> String {
    let facts: Vec<String> = FactColumn::ALL
        .iter()
        .map(|column| {
            let name = column.name();
            let expr = match column {
                FactColumn::JointEndpoints => format!("COALESCE(j.{name}, 0)"),
                c if c.is_flag() => format!("CASE WHEN s.{name} THEN 1 ELSE 0 END"),
                _ => format!("s.{name}"),
            };
            format!("        {expr} AS {name}")
        })
        .collect();
    let terms: Vec<String> = MetricTerm::ALL
        .iter()
        .map(|t| format!("    COALESCE(SUM({}), 0) AS {}", t.sql_expr("f"), t.column()))
        .collect();

    format!(
        "WITH joint_endpoints AS (
    SELECT subsection_id, COUNT(*) AS joint_endpoints
    FROM (
        SELECT first_subsection_id AS subsection_id FROM cable_joint
        UNION ALL
        SELECT second_subsection_id AS subsection_id FROM cable_joint
    ) AS endpoints
    GROUP BY subsection_id
),
subsection_facts AS (
    SELECT
        s.id AS subsection_id,
        s.cable_system_id,
{facts}
    FROM cable_subsection AS s
    LEFT JOIN joint_endpoints AS j ON j.subsection_id = s.id
)
SELECT
    c.id AS cable_system_id,
{terms}
FROM cable_system AS c
LEFT JOIN subsection_facts AS f ON f.cable_system_id = c.id
GROUP BY c.id
ORDER BY c.id",
        facts = facts.join(",\n"),
        terms = terms.join(",\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgrid_core::*;
    use mvgrid_core::Operator;

    fn grid() -> GridRegistry {
        let mut g = GridRegistry::new();
        g.register_operator(Operator::new(OperatorId::new(1), "Op")).unwrap();
        g.register_substation(Substation::main(SubstationId::new(1), OperatorId::new(1), "A"))
            .unwrap();
        for cs in [1, 2, 3] {
            g.register_cable_system(CableSystem::new(
                CableSystemId::new(cs),
                OperatorId::new(1),
                format!("K{cs}"),
                SubstationId::new(1),
                SubstationId::new(1),
            ))
            .unwrap();
        }
        let cs1 = CableSystemId::new(1);
        g.add_subsection(cs1, Subsection::new(SubsectionId::new(1), 1.2)).unwrap();
        g.add_subsection(cs1, Subsection::new(SubsectionId::new(2), 3.4)).unwrap();
        g.add_subsection(
            cs1,
            Subsection::new(SubsectionId::new(3), 0.9).as_repairment_section(),
        )
        .unwrap();
        g.add_subsection(CableSystemId::new(2), Subsection::new(SubsectionId::new(4), 2.0))
            .unwrap();
        g.add_joint(Joint::new(JointId::new(1), SubsectionId::new(1), SubsectionId::new(2)))
            .unwrap();
        g.add_joint(Joint::new(JointId::new(2), SubsectionId::new(2), SubsectionId::new(3)))
            .unwrap();
        g
    }

    #[test]
    fn test_bulk_matches_per_entity() {
        let g = grid();
        let bulk = bulk_metrics(&g).unwrap();
        let single = per_entity_metrics(&g).unwrap();
        assert_eq!(bulk.len(), 3);
        assert!(check_parity(&single, &bulk, 1e-9).is_empty());

        let m = &bulk[&CableSystemId::new(1)];
        assert_eq!(m.number_of_subsections, 3);
        assert!((m.length.value() - 5.5).abs() < 1e-9);
        assert_eq!(m.number_of_joints, 4);
        assert_eq!(m.number_of_repairment_sections, 1);
    }

    #[test]
    fn test_empty_system_is_zero_in_bulk() {
        let bulk = bulk_metrics(&grid()).unwrap();
        assert_eq!(
            bulk[&CableSystemId::new(3)],
            CableSystemMetrics::empty(CableSystemId::new(3))
        );
    }

    #[test]
    fn test_registry_without_joints() {
        let mut g = grid();
        g.remove_joint(JointId::new(1)).unwrap();
        g.remove_joint(JointId::new(2)).unwrap();
        let bulk = bulk_metrics(&g).unwrap();
        assert_eq!(bulk[&CableSystemId::new(1)].number_of_joints, 0);
        assert!(check_parity(&per_entity_metrics(&g).unwrap(), &bulk, 1e-9).is_empty());
    }

    #[test]
    fn test_parity_reports_differences() {
        let id = CableSystemId::new(1);
        let mut left = BTreeMap::new();
        left.insert(id, CableSystemMetrics::empty(id));
        let mut right = left.clone();
        if let Some(m) = right.get_mut(&id) {
            m.number_of_joints = 2;
        }
        right.insert(CableSystemId::new(2), CableSystemMetrics::empty(CableSystemId::new(2)));

        let mismatches = check_parity(&left, &right, 1e-9);
        assert_eq!(mismatches.len(), 2);
        assert!(matches!(
            mismatches[0],
            ParityMismatch::Value { term: MetricTerm::Joints, .. }
        ));
        assert!(mismatches[1].to_string().contains("missing from per-entity"));
    }

    #[test]
    fn test_length_tolerance() {
        let id = CableSystemId::new(1);
        let mut left = BTreeMap::new();
        left.insert(id, CableSystemMetrics::empty(id));
        let mut right = left.clone();
        if let Some(m) = right.get_mut(&id) {
            m.length = Kilometers(1e-12);
        }
        assert!(check_parity(&left, &right, 1e-9).is_empty());
        assert_eq!(check_parity(&left, &right, 0.0).len(), 1);
    }

    #[test]
    fn test_sql_uses_term_table() {
        let sql = bulk_metrics_sql();
        assert!(sql.contains(
            "COALESCE(SUM(CASE WHEN f.subsection_id IS NULL THEN 0 ELSE 1 END), 0) AS number_of_subsections"
        ));
        assert!(sql.contains("COALESCE(SUM(f.joint_endpoints), 0) AS number_of_joints"));
        assert!(sql.contains("CASE WHEN s.repairment_section THEN 1 ELSE 0 END AS repairment_section"));
        assert!(sql.contains("LEFT JOIN subsection_facts AS f"));
    }
}
