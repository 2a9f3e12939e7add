use rail_sim::simulation::{
    RailError, Scenario, SimConfig, SimWorld, StationId, TrainStatus, TrainUpdateResult,
};

fn codes(path: &[StationId]) -> Vec<&str> {
    path.iter().map(StationId::as_str).collect()
}

/// A - B - C in a line with a branch B - D
fn small_world() -> SimWorld {
    let mut world = SimWorld::new();
    world.add_station("A", 0.0, 0.0).expect("new station");
    world.add_station("B", 0.0, 0.02).expect("new station");
    world.add_station("C", 0.0, 0.04).expect("new station");
    world.add_station("D", 0.02, 0.02).expect("new station");
    world.add_edge("A", "B").expect("stations exist");
    world.add_edge("B", "C").expect("stations exist");
    world.add_edge("B", "D").expect("stations exist");
    world
}

#[test]
fn test_duplicate_station_is_rejected() {
    let mut world = small_world();
    assert_eq!(
        world.add_station("A", 1.0, 1.0),
        Err(RailError::DuplicateStation(StationId::from("A")))
    );
    assert_eq!(world.network.station_count(), 4);
}

#[test]
fn test_edge_to_unknown_station_is_rejected() {
    let mut world = small_world();
    assert_eq!(
        world.add_edge("A", "Z"),
        Err(RailError::MissingStation(StationId::from("Z")))
    );
}

#[test]
fn test_assign_route_and_run_to_arrival() {
    let mut world = small_world();
    let id = world
        .assign_route("Local", "A", "C", 120.0, 1)
        .expect("A-C is connected");
    assert_eq!(
        codes(&world.train(id).expect("train exists").path),
        vec!["A", "B", "C"]
    );

    let mut arrivals = Vec::new();
    for _ in 0..10_000 {
        let report = world.tick(1.0);
        arrivals.extend(report.arrivals);
        if world.active_train_count() == 0 {
            break;
        }
    }
    assert_eq!(arrivals, vec![(id, StationId::from("C"))]);
    assert_eq!(world.stats.trains_arrived, 1);

    let train = world.train(id).expect("train exists");
    assert_eq!(train.status, TrainStatus::Arrived);
    assert_eq!(
        Some(train.position),
        world.network.station_position(&StationId::from("C"))
    );
}

#[test]
fn test_switches_steer_new_routes() {
    let mut world = small_world();
    world.set_switch_towards("B", "C").expect("B-C exists");
    assert!(matches!(
        world.assign_route("Branch", "A", "D", 80.0, 1),
        Err(RailError::NotFound { .. })
    ));

    world.set_switch_towards("B", "D").expect("B-D exists");
    // The switch at B now also blocks A-B
    assert!(world.route("A", "D").is_err());

    world.clear_switch("B");
    let path = world.route("A", "D").expect("switch cleared");
    assert_eq!(codes(&path), vec!["A", "B", "D"]);

    let mut config = world.config().clone();
    config.respect_switches = false;
    world.set_switch_towards("B", "C").expect("B-C exists");
    world.set_config(config);
    assert!(world.route("A", "D").is_ok());
}

#[test]
fn test_assign_path_needs_connected_stations() {
    let mut world = small_world();
    let path = vec![StationId::from("A"), StationId::from("C")];
    assert_eq!(
        world.assign_path("Jump", path, 100.0, 1),
        Err(RailError::NoTrack {
            from: StationId::from("A"),
            to: StationId::from("C"),
        })
    );
    assert_eq!(
        world.assign_path("Nothing", vec![], 100.0, 1),
        Err(RailError::EmptyPath)
    );
    assert_eq!(world.train_count(), 0);

    let path = vec![
        StationId::from("D"),
        StationId::from("B"),
        StationId::from("A"),
    ];
    assert!(world.assign_path("Down", path, 100.0, 1).is_ok());
}

#[test]
fn test_arrived_train_ignores_status_change() {
    let mut world = small_world();
    let id = world
        .assign_path("Parked", vec![StationId::from("A")], 0.0, 1)
        .expect("single station path");
    assert_eq!(
        world.train(id).expect("train exists").status,
        TrainStatus::Arrived
    );

    world
        .set_train_status(id, TrainStatus::Running)
        .expect("train exists");
    assert_eq!(
        world.train(id).expect("train exists").status,
        TrainStatus::Arrived
    );
}

#[test]
fn test_marking_arrived_freezes_train_at_destination() {
    let mut world = small_world();
    let id = world
        .assign_route("Early", "A", "C", 100.0, 1)
        .expect("A-C is connected");
    world.tick(1.0);

    world
        .set_train_status(id, TrainStatus::Arrived)
        .expect("train exists");
    let train = world.train(id).expect("train exists").clone();
    assert_eq!(train.status, TrainStatus::Arrived);
    assert_eq!(train.overall_progress(), 1.0);
    assert_eq!(
        Some(train.position),
        world.network.station_position(&StationId::from("C"))
    );
    assert_eq!(world.active_train_count(), 0);

    for _ in 0..10 {
        world.tick(1.0);
    }
    assert_eq!(world.train(id), Some(&train));
}

#[test]
fn test_remove_train() {
    let mut world = small_world();
    let id = world
        .assign_route("Gone", "A", "C", 100.0, 1)
        .expect("connected");
    let removed = world.remove_train(id).expect("train exists");
    assert_eq!(removed.name, "Gone");
    assert_eq!(world.remove_train(id), Err(RailError::UnknownTrain(id)));
    assert_eq!(
        world.set_train_status(id, TrainStatus::Stopped),
        Err(RailError::UnknownTrain(id))
    );
}

#[test]
fn test_station_added_between_ticks_is_routable() {
    let mut world = small_world();
    world.tick(1.0);
    world.add_station("E", 0.0, 0.06).expect("new station");
    world.add_edge("C", "E").expect("stations exist");
    let path = world.route("A", "E").expect("E is connected");
    assert_eq!(codes(&path), vec!["A", "B", "C", "E"]);
}

#[test]
fn test_time_advances_by_scaled_delta() {
    let mut world = small_world();
    world.set_config(SimConfig {
        time_scale: 4.0,
        ..SimConfig::default()
    });

    let report = world.tick(0.5);
    assert_eq!(report.time, 2.0);
    assert_eq!(report.tick, 1);
    assert_eq!(world.time, 2.0);
}

#[test]
fn test_tick_reports_are_consistent_with_train_updates() {
    let mut world = small_world();
    let id = world
        .assign_route("Quick", "A", "B", 200.0, 1)
        .expect("connected");
    let mut train = world.train(id).expect("train exists").clone();
    let params = world.config().motion_params();

    let report = world.tick(5.0);
    let result = train
        .advance(&world.network, 5.0, &params)
        .expect("stations exist");
    assert_eq!(world.train(id), Some(&train));
    if let TrainUpdateResult::ArrivedAtDestination(station) = result {
        assert_eq!(report.arrivals, vec![(id, station)]);
    } else {
        assert!(report.arrivals.is_empty());
    }
}

#[test]
fn test_seeded_random_trains_are_reproducible() {
    let mut first = SimWorld::create_demo_world_with_seed(42);
    let mut second = SimWorld::create_demo_world_with_seed(42);
    let a = first.spawn_random_trains(5);
    let b = second.spawn_random_trains(5);
    assert_eq!(a, b);

    let paths = |world: &SimWorld| -> Vec<(Vec<StationId>, u8)> {
        world
            .trains()
            .map(|t| (t.path.clone(), t.priority))
            .collect()
    };
    assert_eq!(paths(&first), paths(&second));
}

#[test]
fn test_reseeded_scenario_worlds_spawn_the_same_trains() {
    let build = |seed: u64| {
        let scenario = Scenario::from_json(SCENARIO).expect("valid scenario");
        let mut world = SimWorld::from_scenario(scenario).expect("scenario is consistent");
        world.reseed(seed);
        world.spawn_random_trains(8);
        world
            .trains()
            .map(|t| (t.path.clone(), t.priority, t.speed))
            .collect::<Vec<_>>()
    };
    assert_eq!(build(11), build(11));
}

#[test]
fn test_demo_world_layout() {
    let world = SimWorld::create_demo_world();
    assert_eq!(world.network.station_count(), 7);
    assert_eq!(world.network.edge_count(), 7);
    assert_eq!(world.train_count(), 3);
    assert_eq!(world.config().time_scale, 60.0);
    assert!(world.trains().all(|t| t.path.len() >= 2));
}

const SCENARIO: &str = r#"{
    "config": { "min_separation_m": 500.0, "time_scale": 30.0 },
    "stations": [
        { "id": "A", "lat": 0.0, "lon": 0.0 },
        { "id": "B", "lat": 0.0, "lon": 0.05 },
        { "id": "C", "lat": 0.0, "lon": 0.1 },
        { "id": "D", "lat": 0.05, "lon": 0.05 }
    ],
    "edges": [
        { "source": "A", "target": "B" },
        { "source": "B", "target": "C" },
        { "source": "B", "target": "D", "directed": true }
    ],
    "switches": [ { "station": "C", "towards": "B" } ],
    "segment_health": [ { "a": "B", "b": "C", "factor": 0.5 } ],
    "trains": [
        { "name": "Express", "source": "A", "destination": "C", "speed": 120.0, "priority": 3 },
        { "name": "Freight", "path": ["C", "B"], "speed": 60.0, "status": "MOVING" },
        { "name": "Held", "path": ["B", "D"], "speed": 60.0, "status": "HALTED" },
        { "name": "Done", "path": ["A", "B"], "speed": 60.0, "status": "ARRIVED" }
    ]
}"#;

#[test]
fn test_scenario_builds_world() {
    let scenario = Scenario::from_json(SCENARIO).expect("valid scenario");
    let world = SimWorld::from_scenario(scenario).expect("scenario is consistent");

    assert_eq!(world.config().min_separation_m, 500.0);
    assert_eq!(world.network.station_count(), 4);
    assert_eq!(world.network.edge_count(), 3);
    assert_eq!(
        world
            .network
            .segment_health(&StationId::from("C"), &StationId::from("B")),
        0.5
    );

    assert!(world
        .network
        .switch_selection(&StationId::from("C"))
        .is_some());

    let trains: Vec<_> = world.trains().collect();
    assert_eq!(trains.len(), 4);
    assert_eq!(trains[0].priority, 3);
    assert_eq!(trains[1].status, TrainStatus::Running);
    // Unknown legacy statuses load as stopped
    assert_eq!(trains[2].status, TrainStatus::Stopped);
    assert_eq!(trains[3].status, TrainStatus::Arrived);
    assert_eq!(
        Some(trains[3].position),
        world.network.station_position(&StationId::from("B"))
    );
}

#[test]
fn test_scenario_train_without_route_is_an_error() {
    let json = r#"{
        "stations": [ { "id": "A", "lat": 0.0, "lon": 0.0 } ],
        "trains": [ { "name": "Lost", "speed": 50.0 } ]
    }"#;
    let scenario = Scenario::from_json(json).expect("valid JSON");
    let error = SimWorld::from_scenario(scenario)
        .err()
        .expect("train has nowhere to go");
    assert!(error.to_string().contains("Lost"));
}

#[test]
fn test_scenario_with_bad_edge_names_the_edge() {
    let json = r#"{
        "stations": [ { "id": "A", "lat": 0.0, "lon": 0.0 } ],
        "edges": [ { "source": "A", "target": "Q" } ]
    }"#;
    let scenario = Scenario::from_json(json).expect("valid JSON");
    let error = SimWorld::from_scenario(scenario)
        .err()
        .expect("Q does not exist");
    assert!(error.to_string().contains("A-Q"));
    assert!(format!("{error:#}").contains("station Q not found"));
}
