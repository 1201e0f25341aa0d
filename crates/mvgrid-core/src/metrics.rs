//! Aggregate metrics of a cable system.
//!
//! Every metric is the sum, over the subsections of a system, of a
//! per-subsection *term*. The term table ([`MetricTerm::source`]) is the single
//! definition; it is evaluated three ways:
//!
//! 1. in memory over [`SubsectionFacts`] ([`CableSystemMetrics::aggregate`]),
//! 2. as polars expressions by the bulk query in `mvgrid-algo`,
//! 3. as SQL text ([`MetricTerm::sql_expr`]) for a relational store.
//!
//! | metric | term per subsection |
//! |---|---|
//! | `number_of_subsections` | 1 |
//! | `length_km` | `length_km` |
//! | `number_of_joints` | joints naming it as first + joints naming it as second |
//! | `number_of_repairment_sections` | `repairment_section` as 0/1 |
//!
//! A joint between two subsections of the same system therefore contributes 2
//! to `number_of_joints`.

use serde::{Deserialize, Serialize};

use crate::units::Kilometers;
use crate::{CableSystemId, SubsectionId};

/// A per-subsection input column of the term table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactColumn {
    LengthKm,
    /// Endpoint credits from joints (first + second)
    JointEndpoints,
    /// Boolean flag, counted as 0/1
    RepairmentSection,
}

impl FactColumn {
    pub const ALL: [FactColumn; 3] = [
        FactColumn::LengthKm,
        FactColumn::JointEndpoints,
        FactColumn::RepairmentSection,
    ];

    /// Column name in subsection frames and queries.
    pub fn name(&self) -> &'static str {
        match self {
            FactColumn::LengthKm => "length_km",
            FactColumn::JointEndpoints => "joint_endpoints",
            FactColumn::RepairmentSection => "repairment_section",
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, FactColumn::RepairmentSection)
    }
}

/// Where a term's per-subsection value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermSource {
    /// Same value for every subsection
    Constant(f64),
    Fact(FactColumn),
}

/// One aggregate metric of a cable system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTerm {
    Count,
    Length,
    Joints,
    RepairSections,
}

impl MetricTerm {
    pub const ALL: [MetricTerm; 4] = [
        MetricTerm::Count,
        MetricTerm::Length,
        MetricTerm::Joints,
        MetricTerm::RepairSections,
    ];

    /// The term table.
    pub fn source(&self) -> TermSource {
        match self {
            MetricTerm::Count => TermSource::Constant(1.0),
            MetricTerm::Length => TermSource::Fact(FactColumn::LengthKm),
            MetricTerm::Joints => TermSource::Fact(FactColumn::JointEndpoints),
            MetricTerm::RepairSections => TermSource::Fact(FactColumn::RepairmentSection),
        }
    }

    /// Output column name of the aggregate.
    pub fn column(&self) -> &'static str {
        match self {
            MetricTerm::Count => "number_of_subsections",
            MetricTerm::Length => "length_km",
            MetricTerm::Joints => "number_of_joints",
            MetricTerm::RepairSections => "number_of_repairment_sections",
        }
    }

    /// Value this term contributes for one subsection.
    pub fn term(&self, facts: &SubsectionFacts) -> f64 {
        match self.source() {
            TermSource::Constant(value) => value,
            TermSource::Fact(column) => facts.value(column),
        }
    }

    /// Per-row SQL expression of the term over a facts relation aliased
    /// `alias`. The relation is expected to be outer-joined, so a missing
    /// subsection row (`id IS NULL`) contributes 0 to constant terms.
    pub fn sql_expr(&self, alias: &str) -> String {
        match self.source() {
            TermSource::Constant(value) => format!(
                "CASE WHEN {alias}.subsection_id IS NULL THEN 0 ELSE {value} END"
            ),
            TermSource::Fact(column) => format!("{alias}.{}", column.name()),
        }
    }
}

impl std::fmt::Display for MetricTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Everything the term table needs to know about one subsection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubsectionFacts {
    pub subsection: SubsectionId,
    pub cable_system: CableSystemId,
    pub length_km: f64,
    pub joint_endpoints: usize,
    pub repairment_section: bool,
}

impl SubsectionFacts {
    pub fn value(&self, column: FactColumn) -> f64 {
        match column {
            FactColumn::LengthKm => self.length_km,
            FactColumn::JointEndpoints => self.joint_endpoints as f64,
            FactColumn::RepairmentSection => f64::from(u8::from(self.repairment_section)),
        }
    }
}

/// Derived numbers of one cable system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CableSystemMetrics {
    pub cable_system: CableSystemId,
    pub number_of_subsections: usize,
    #[serde(rename = "length_km")]
    pub length: Kilometers,
    pub number_of_joints: usize,
    pub number_of_repairment_sections: usize,
}

impl CableSystemMetrics {
    pub fn empty(cable_system: CableSystemId) -> Self {
        Self {
            cable_system,
            number_of_subsections: 0,
            length: Kilometers(0.0),
            number_of_joints: 0,
            number_of_repairment_sections: 0,
        }
    }

    /// Sum every term over the given subsections.
    pub fn aggregate<'a>(
        cable_system: CableSystemId,
        facts: impl IntoIterator<Item = &'a SubsectionFacts>,
    ) -> Self {
        let mut totals = [0.0; 4];
        for fact in facts {
            for (slot, term) in totals.iter_mut().zip(MetricTerm::ALL) {
                *slot += term.term(fact);
            }
        }
        Self::from_totals(cable_system, |term| totals[term as usize])
    }

    /// Build from already-summed term values (e.g. bulk query output).
    pub fn from_totals(cable_system: CableSystemId, total: impl Fn(MetricTerm) -> f64) -> Self {
        let count = |term| total(term).round().max(0.0) as usize;
        Self {
            cable_system,
            number_of_subsections: count(MetricTerm::Count),
            length: Kilometers(total(MetricTerm::Length)),
            number_of_joints: count(MetricTerm::Joints),
            number_of_repairment_sections: count(MetricTerm::RepairSections),
        }
    }

    pub fn value(&self, term: MetricTerm) -> f64 {
        match term {
            MetricTerm::Count => self.number_of_subsections as f64,
            MetricTerm::Length => self.length.value(),
            MetricTerm::Joints => self.number_of_joints as f64,
            MetricTerm::RepairSections => self.number_of_repairment_sections as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(id: usize, km: f64, joints: usize, repair: bool) -> SubsectionFacts {
        SubsectionFacts {
            subsection: SubsectionId::new(id),
            cable_system: CableSystemId::new(1),
            length_km: km,
            joint_endpoints: joints,
            repairment_section: repair,
        }
    }

    #[test]
    fn test_aggregate_sums_terms() {
        let rows = [
            facts(1, 1.2, 1, false),
            facts(2, 3.4, 1, true),
            facts(3, 0.9, 0, false),
        ];
        let m = CableSystemMetrics::aggregate(CableSystemId::new(1), &rows);
        assert_eq!(m.number_of_subsections, 3);
        assert!((m.length.value() - 5.5).abs() < 1e-9);
        assert_eq!(m.number_of_joints, 2);
        assert_eq!(m.number_of_repairment_sections, 1);
    }

    #[test]
    fn test_empty_system_is_zero() {
        let m = CableSystemMetrics::aggregate(CableSystemId::new(9), &[]);
        assert_eq!(m, CableSystemMetrics::empty(CableSystemId::new(9)));
    }

    #[test]
    fn test_term_order_matches_discriminants() {
        for (i, term) in MetricTerm::ALL.iter().enumerate() {
            assert_eq!(*term as usize, i);
        }
    }

    #[test]
    fn test_sql_expressions() {
        assert_eq!(MetricTerm::Length.sql_expr("f"), "f.length_km");
        assert!(MetricTerm::Count.sql_expr("f").contains("f.subsection_id IS NULL"));
    }

    #[test]
    fn test_value_round_trips_through_totals() {
        let rows = [facts(1, 2.5, 2, true)];
        let m = CableSystemMetrics::aggregate(CableSystemId::new(1), &rows);
        let rebuilt = CableSystemMetrics::from_totals(m.cable_system, |t| m.value(t));
        assert_eq!(m, rebuilt);
    }
}
