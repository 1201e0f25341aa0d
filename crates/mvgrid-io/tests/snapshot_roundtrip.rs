use chrono::NaiveDate;
use mvgrid_core::*;
use mvgrid_io::{load_registry, save_registry, Snapshot};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_grid() -> GridRegistry {
    let mut grid = GridRegistry::new();
    let op = OperatorId::new(1);
    grid.register_operator(Operator::new(op, "Netze Nord")).unwrap();
    grid.register_voltage_level(VoltageLevel::new(VoltageLevelId::new(1), 20.0))
        .unwrap();
    grid.register_substation(Substation::main(SubstationId::new(1), op, "UW Nord"))
        .unwrap();
    grid.register_substation(Substation::secondary(
        SubstationId::new(2),
        op,
        "ONS Hafen",
        SubstationId::new(1),
    ))
    .unwrap();
    for cs in [1, 2] {
        grid.register_cable_system(
            CableSystem::new(
                CableSystemId::new(cs),
                op,
                format!("K{cs}"),
                SubstationId::new(1),
                SubstationId::new(2),
            )
            .with_operating_voltage(VoltageLevelId::new(1)),
        )
        .unwrap();
    }

    let cs = CableSystemId::new(1);
    grid.add_subsection(
        cs,
        Subsection::new(SubsectionId::new(1), 1.2)
            .with_geometry(Geometry::line_string(vec![
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
            ]))
            .in_service_since(date(2001, 5, 1)),
    )
    .unwrap();
    grid.add_subsection(cs, Subsection::new(SubsectionId::new(2), 3.4))
        .unwrap();
    grid.add_subsection(
        cs,
        Subsection::new(SubsectionId::new(3), 0.1).as_repairment_section(),
    )
    .unwrap();
    grid.add_joint(Joint::new(JointId::new(1), SubsectionId::new(1), SubsectionId::new(2)))
        .unwrap();
    grid.add_joint(Joint::new(JointId::new(2), SubsectionId::new(2), SubsectionId::new(3)))
        .unwrap();

    grid.record_failure(
        Failure::new(FailureId::new(1), SubsectionId::new(2)).on(date(2021, 2, 11)),
    )
    .unwrap();
    grid.record_repair(Repair::new(
        FailureId::new(1),
        SubsectionId::new(2),
        SubsectionId::new(3),
    ))
    .unwrap();

    let flood = ExternalEvent::Flood(Flood {
        id: EventId::new(1),
        window: TimeWindow::new(date(2021, 7, 14), date(2021, 7, 18)).unwrap(),
        area: None,
    });
    grid.register_event(flood).unwrap();
    grid.link_event(EventLink::new(
        EventLinkId::new(1),
        SubsectionId::new(1),
        EventRef::new(EventKind::Flood, EventId::new(1)),
    ))
    .unwrap();

    grid.register_layer(GeoLayer::new(
        LayerId::new(1),
        LayerAttributes::SoilType {
            soil_type: Some("clay".to_string()),
        },
    ))
    .unwrap();
    grid.add_placement_condition(PlacementCondition::new(
        PlacementConditionId::new(1),
        SubsectionId::new(1),
        LayerRef::new(LayerKind::SoilType, LayerId::new(1)),
    ))
    .unwrap();
    grid
}

#[test]
fn file_roundtrip_reproduces_metrics() {
    let grid = sample_grid();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("grid.json");

    save_registry(&grid, &path).unwrap();
    let loaded = load_registry(&path).unwrap();

    assert_eq!(loaded.stats(), grid.stats());
    for cs in grid.cable_system_ids() {
        assert_eq!(loaded.metrics(cs).unwrap(), grid.metrics(cs).unwrap());
    }
    let m = loaded.metrics(CableSystemId::new(1)).unwrap();
    assert_eq!(m.number_of_joints, 4);
    assert_eq!(m.number_of_repairment_sections, 1);
}

#[test]
fn subsection_order_survives_roundtrip() {
    let grid = sample_grid();
    let json = Snapshot::from_registry(&grid).to_json().unwrap();
    let loaded = Snapshot::from_json(&json).unwrap().into_registry().unwrap();
    let ids: Vec<_> = loaded
        .subsections_of(CableSystemId::new(1))
        .unwrap()
        .iter()
        .map(|s| s.id.value())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn metrics_are_not_written() {
    let json = Snapshot::from_registry(&sample_grid()).to_json().unwrap();
    assert!(!json.contains("number_of_subsections"));
    assert!(!json.contains("number_of_joints"));
}

#[test]
fn dangling_event_link_aborts_import() {
    let mut snapshot = Snapshot::from_registry(&sample_grid());
    snapshot.events.clear();
    let err = snapshot.into_registry().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GridError>(),
        Some(GridError::UnknownEvent(_))
    ));
}
