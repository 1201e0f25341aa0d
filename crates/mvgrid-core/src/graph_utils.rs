use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;

use crate::error::GridResult;
use crate::registry::GridRegistry;
use crate::{CableSystemId, JointId, SubsectionId};

/// Connected runs of a cable system's subsection/joint graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinuityReport {
    pub cable_system: CableSystemId,
    /// Each run lists its subsections in attachment order.
    pub runs: Vec<Vec<SubsectionId>>,
    pub joint_count: usize,
}

impl ContinuityReport {
    /// A system is contiguous when its subsections form at most one run.
    pub fn is_contiguous(&self) -> bool {
        self.runs.len() <= 1
    }
}

/// Build the undirected subsection graph (joints as edges) of one system and
/// label its connected components breadth-first.
pub fn continuity(registry: &GridRegistry, cable_system: CableSystemId) -> GridResult<ContinuityReport> {
    let members = registry.subsections_of(cable_system)?;

    let mut graph: UnGraph<SubsectionId, JointId> = UnGraph::new_undirected();
    let mut index: HashMap<SubsectionId, NodeIndex> = HashMap::with_capacity(members.len());
    for sub in &members {
        index.insert(sub.id, graph.add_node(sub.id));
    }
    let mut joint_count = 0;
    for joint in registry.joints() {
        if let (Some(&a), Some(&b)) = (index.get(&joint.first), index.get(&joint.second)) {
            graph.add_edge(a, b, joint.id);
            joint_count += 1;
        }
    }

    let mut visited = HashSet::new();
    let mut runs = Vec::new();
    // Node indices follow attachment order, so runs come out ordered by their
    // first attached subsection.
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        let mut run = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            run.push(node);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        run.sort();
        runs.push(run.into_iter().map(|n| graph[n]).collect());
    }

    Ok(ContinuityReport {
        cable_system,
        runs,
        joint_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CableSystem, Joint, Operator, OperatorId, Subsection, Substation, SubstationId};

    fn registry_with_run(subsections: &[usize], joints: &[(usize, usize)]) -> GridRegistry {
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
        for &id in subsections {
            g.add_subsection(CableSystemId::new(1), Subsection::new(SubsectionId::new(id), 1.0))
                .unwrap();
        }
        for (i, &(a, b)) in joints.iter().enumerate() {
            g.add_joint(Joint::new(
                JointId::new(i + 1),
                SubsectionId::new(a),
                SubsectionId::new(b),
            ))
            .unwrap();
        }
        g
    }

    #[test]
    fn test_single_run() {
        let g = registry_with_run(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let report = continuity(&g, CableSystemId::new(1)).unwrap();
        assert!(report.is_contiguous());
        assert_eq!(report.joint_count, 2);
        assert_eq!(
            report.runs,
            vec![vec![SubsectionId::new(1), SubsectionId::new(2), SubsectionId::new(3)]]
        );
    }

    #[test]
    fn test_gap_splits_runs() {
        let g = registry_with_run(&[1, 2, 3], &[(1, 2)]);
        let report = continuity(&g, CableSystemId::new(1)).unwrap();
        assert!(!report.is_contiguous());
        assert_eq!(report.runs.len(), 2);
        assert_eq!(report.runs[1], vec![SubsectionId::new(3)]);
    }

    #[test]
    fn test_empty_system_is_contiguous() {
        let g = registry_with_run(&[], &[]);
        let report = continuity(&g, CableSystemId::new(1)).unwrap();
        assert!(report.runs.is_empty());
        assert!(report.is_contiguous());
    }
}
