use mvgrid_algo::{bulk_metrics, check_parity, per_entity_metrics, shared_per_entity_metrics};
use mvgrid_core::*;

/// `systems` cable systems; system `k` gets `k % 4` subsections chained by
/// joints, every third subsection is a repair section.
fn generated_grid(systems: usize) -> GridRegistry {
    let mut grid = GridRegistry::new();
    let op = OperatorId::new(1);
    grid.register_operator(Operator::new(op, "Op")).unwrap();
    grid.register_substation(Substation::main(SubstationId::new(1), op, "UW"))
        .unwrap();

    let mut next_sub = 1;
    let mut next_joint = 1;
    for k in 1..=systems {
        let cs = CableSystemId::new(k);
        grid.register_cable_system(CableSystem::new(
            cs,
            op,
            format!("K{k}"),
            SubstationId::new(1),
            SubstationId::new(1),
        ))
        .unwrap();
        let mut previous = None;
        for i in 0..(k % 4) {
            let id = SubsectionId::new(next_sub);
            let mut sub = Subsection::new(id, 0.1 * (next_sub as f64) + 0.05 * i as f64);
            if next_sub % 3 == 0 {
                sub = sub.as_repairment_section();
            }
            grid.add_subsection(cs, sub).unwrap();
            if let Some(prev) = previous {
                grid.add_joint(Joint::new(JointId::new(next_joint), prev, id))
                    .unwrap();
                next_joint += 1;
            }
            previous = Some(id);
            next_sub += 1;
        }
    }
    grid
}

#[test]
fn per_entity_and_bulk_agree_on_generated_grid() {
    let grid = generated_grid(40);
    let bulk = bulk_metrics(&grid).unwrap();
    let single = per_entity_metrics(&grid).unwrap();
    assert_eq!(bulk.len(), 40);
    let mismatches = check_parity(&single, &bulk, 1e-9);
    assert!(mismatches.is_empty(), "{mismatches:?}");

    // k % 4 == 3: three subsections, two joints, four endpoint credits.
    assert_eq!(bulk[&CableSystemId::new(3)].number_of_joints, 4);
    assert_eq!(bulk[&CableSystemId::new(4)], CableSystemMetrics::empty(CableSystemId::new(4)));
}

#[test]
fn parity_holds_after_removals() {
    let mut grid = generated_grid(8);
    let cs = CableSystemId::new(3);
    let subs: Vec<SubsectionId> = grid
        .subsections_of(cs)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    let joints: Vec<JointId> = grid
        .joints()
        .filter(|j| subs.iter().any(|s| j.touches(*s)))
        .map(|j| j.id)
        .collect();
    for joint in joints {
        grid.remove_joint(joint).unwrap();
    }
    grid.remove_subsection(cs, subs[2]).unwrap();

    let bulk = bulk_metrics(&grid).unwrap();
    assert!(check_parity(&per_entity_metrics(&grid).unwrap(), &bulk, 1e-9).is_empty());
    assert_eq!(bulk[&cs].number_of_subsections, 2);
    assert_eq!(bulk[&cs].number_of_joints, 0);
}

#[test]
fn shared_registry_metrics_under_read_lock() {
    let shared = SharedRegistry::new(generated_grid(12));
    let single = shared_per_entity_metrics(&shared).unwrap();
    let bulk = shared.read(bulk_metrics).unwrap();
    assert!(check_parity(&single, &bulk, 1e-9).is_empty());
}
