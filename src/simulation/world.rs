//! Main simulation world that ties everything together
//!
//! `SimWorld` owns the network, the trains and the arbitration state. The
//! tick loop is the only thing that mutates trains: oracle replies queued
//! since the last tick are applied first, then every train is advanced,
//! then proximity is checked on the new positions and conflicting pairs are
//! stopped and sent for arbitration.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use super::arbitration::{ArbitrationEvent, ConflictResolver, DecisionOracle};
use super::collision::{collision_risks, CollisionRisk};
use super::config::{Scenario, SimConfig};
use super::error::{RailError, RailResult};
use super::features::{aggregate, FeatureVector};
use super::oracle::PriorityOracle;
use super::proximity::{detect_conflicts, Conflict};
use super::rail_network::RailNetwork;
use super::router::{route, route_respecting_switches};
use super::train::{SimTrain, TrainUpdateResult};
use super::types::{EdgeId, GeoPoint, SimId, StationId, TrainId, TrainStatus};

/// Running totals over the life of the world
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub trains_created: usize,
    pub trains_arrived: usize,
    pub conflicts_detected: usize,
    pub requests_issued: usize,
    pub resolutions_applied: usize,
    pub oracle_failures: usize,
    pub train_faults: usize,
}

/// Everything that happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Simulation time at the end of the tick, in seconds
    pub time: f64,
    pub arrivals: Vec<(TrainId, StationId)>,
    /// Trains that could not be advanced this tick
    pub faults: Vec<(TrainId, RailError)>,
    pub conflicts: Vec<Conflict>,
    pub arbitration: Vec<ArbitrationEvent>,
}

impl TickReport {
    pub fn requests_issued(&self) -> usize {
        self.arbitration
            .iter()
            .filter(|event| matches!(event, ArbitrationEvent::Requested { .. }))
            .count()
    }

    pub fn resolutions(&self) -> usize {
        self.arbitration
            .iter()
            .filter(|event| matches!(event, ArbitrationEvent::Resolved { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.arbitration
            .iter()
            .filter(|event| matches!(event, ArbitrationEvent::Failed { .. }))
            .count()
    }
}

/// The main simulation world
pub struct SimWorld {
    /// Stations, tracks, switches and segment health
    pub network: RailNetwork,

    /// All trains, keyed by id; ids are handed out in creation order
    trains: BTreeMap<TrainId, SimTrain>,

    resolver: ConflictResolver,
    oracle: Box<dyn DecisionOracle>,
    config: SimConfig,

    /// Next ID to assign
    next_id: usize,

    /// Simulation time in seconds
    pub time: f64,
    pub tick_count: u64,
    pub stats: SimStats,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    fn new_internal(rng: Option<StdRng>, config: SimConfig) -> Self {
        Self {
            network: RailNetwork::new(),
            trains: BTreeMap::new(),
            resolver: ConflictResolver::new(config.oracle_timeout()),
            oracle: Box::new(PriorityOracle),
            config,
            next_id: 0,
            time: 0.0,
            tick_count: 0,
            stats: SimStats::default(),
            rng,
        }
    }

    pub fn new() -> Self {
        Self::new_internal(None, SimConfig::default())
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(seed: u64) -> Self {
        Self::new_internal(Some(StdRng::seed_from_u64(seed)), SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self::new_internal(None, config)
    }

    /// Replace the decision oracle consulted on conflicts
    pub fn set_oracle(&mut self, oracle: Box<dyn DecisionOracle>) {
        self.oracle = oracle;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SimConfig) {
        self.resolver.set_timeout(config.oracle_timeout());
        self.config = config;
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f64>) -> f64 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    /// Choose a random element from a slice, using seeded RNG if available
    fn choose_random<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            return None;
        }
        match &mut self.rng {
            Some(rng) => slice.choose(rng),
            None => slice.choose(&mut rand::rng()),
        }
    }

    fn next_train_id(&mut self) -> TrainId {
        let id = TrainId(SimId(self.next_id));
        self.next_id += 1;
        id
    }

    /// Add a station; may be called between any two ticks
    pub fn add_station(&mut self, id: &str, lat: f64, lon: f64) -> RailResult<StationId> {
        let station = StationId::from(id);
        self.network
            .add_station(station.clone(), GeoPoint::new(lat, lon))?;
        Ok(station)
    }

    /// Add a track usable in both directions
    pub fn add_edge(&mut self, a: &str, b: &str) -> RailResult<EdgeId> {
        self.network
            .add_track(&StationId::from(a), &StationId::from(b), false)
    }

    /// Add a track usable only from `source` to `target`
    pub fn add_directed_edge(&mut self, source: &str, target: &str) -> RailResult<EdgeId> {
        self.network
            .add_track(&StationId::from(source), &StationId::from(target), true)
    }

    pub fn set_switch(&mut self, station: &str, edge: EdgeId) -> RailResult<()> {
        self.network.set_switch(&StationId::from(station), edge)
    }

    /// Point the switch at `station` towards the neighbouring `towards`
    pub fn set_switch_towards(&mut self, station: &str, towards: &str) -> RailResult<EdgeId> {
        let station = StationId::from(station);
        let towards = StationId::from(towards);
        let edge = self
            .network
            .incident_edges(&station)
            .into_iter()
            .find(|edge| edge.other_end(&station) == &towards)
            .map(|edge| edge.id)
            .ok_or_else(|| RailError::NoTrack {
                from: station.clone(),
                to: towards.clone(),
            })?;
        self.network.set_switch(&station, edge)?;
        Ok(edge)
    }

    pub fn clear_switch(&mut self, station: &str) -> Option<EdgeId> {
        self.network.clear_switch(&StationId::from(station))
    }

    pub fn set_segment_health(&mut self, a: &str, b: &str, factor: f64) {
        self.network
            .set_segment_health(&StationId::from(a), &StationId::from(b), factor);
    }

    /// Route between two stations, honouring switches if configured to
    pub fn route(&self, source: &str, destination: &str) -> RailResult<Vec<StationId>> {
        let source = StationId::from(source);
        let destination = StationId::from(destination);
        if self.config.respect_switches {
            route_respecting_switches(&self.network, &source, &destination)
        } else {
            route(&self.network, &source, &destination)
        }
    }

    /// Create a train routed from `source` to `destination`
    pub fn assign_route(
        &mut self,
        name: &str,
        source: &str,
        destination: &str,
        speed: f64,
        priority: u8,
    ) -> RailResult<TrainId> {
        let path = self.route(source, destination)?;
        self.insert_train(name, path, speed, priority)
    }

    /// Create a train on an explicit path. Consecutive stations must be
    /// joined by a track usable in that direction.
    pub fn assign_path(
        &mut self,
        name: &str,
        path: Vec<StationId>,
        speed: f64,
        priority: u8,
    ) -> RailResult<TrainId> {
        if path.is_empty() {
            return Err(RailError::EmptyPath);
        }
        for station in &path {
            if !self.network.contains_station(station) {
                return Err(RailError::MissingStation(station.clone()));
            }
        }
        for pair in path.windows(2) {
            if self.network.find_edge_between(&pair[0], &pair[1]).is_none() {
                return Err(RailError::NoTrack {
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                });
            }
        }
        self.insert_train(name, path, speed, priority)
    }

    fn insert_train(
        &mut self,
        name: &str,
        path: Vec<StationId>,
        speed: f64,
        priority: u8,
    ) -> RailResult<TrainId> {
        let id = self.next_train_id();
        let train = SimTrain::new(id, name, path, speed, priority, &self.network)?;
        info!(
            "Train {} ({}) assigned {} station path at {:.0} km/h",
            id,
            name,
            train.path.len(),
            speed
        );
        self.trains.insert(id, train);
        self.stats.trains_created += 1;
        Ok(id)
    }

    /// Manually change a train's status, e.g. to release a held train.
    ///
    /// Arrived trains stay arrived. Marking a train arrived moves it to its
    /// final station and freezes it there.
    pub fn set_train_status(&mut self, id: TrainId, status: TrainStatus) -> RailResult<()> {
        let train = self
            .trains
            .get_mut(&id)
            .ok_or(RailError::UnknownTrain(id))?;
        if train.is_arrived() {
            warn!("Ignoring status change to {} for arrived train {}", status, id);
            return Ok(());
        }
        if status == TrainStatus::Arrived {
            train.arrive_at_destination(&self.network)?;
            info!("Train {} ({}) marked arrived", train.id, train.name);
            return Ok(());
        }
        train.status = status;
        Ok(())
    }

    /// Reseed the random generator used for spawning trains
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Remove a train from the simulation
    pub fn remove_train(&mut self, id: TrainId) -> RailResult<SimTrain> {
        self.trains.remove(&id).ok_or(RailError::UnknownTrain(id))
    }

    pub fn train(&self, id: TrainId) -> Option<&SimTrain> {
        self.trains.get(&id)
    }

    /// All trains in creation order
    pub fn trains(&self) -> impl Iterator<Item = &SimTrain> {
        self.trains.values()
    }

    pub fn train_count(&self) -> usize {
        self.trains.len()
    }

    pub fn active_train_count(&self) -> usize {
        self.trains.values().filter(|t| !t.is_arrived()).count()
    }

    /// Number of conflict pairs still waiting for an oracle answer
    pub fn pending_arbitrations(&self) -> usize {
        self.resolver.in_flight_count()
    }

    /// Read-only view of the trains for observers
    pub fn snapshot(&self) -> Vec<&SimTrain> {
        self.trains.values().collect()
    }

    /// Current feature vector
    pub fn features(&self) -> FeatureVector {
        aggregate(&self.network, &self.snapshot(), &self.config.features)
    }

    /// Current collision risk per train, in creation order
    pub fn collision_risks(&self) -> Vec<CollisionRisk> {
        collision_risks(&self.snapshot())
    }

    /// Advance every train and run conflict detection
    fn update_trains(&mut self, delta_secs: f64, report: &mut TickReport) {
        let params = self.config.motion_params();

        for train in self.trains.values_mut() {
            match train.advance(&self.network, delta_secs, &params) {
                Ok(TrainUpdateResult::ArrivedAtDestination(station)) => {
                    info!("Train {} ({}) arrived at {}", train.id, train.name, station);
                    report.arrivals.push((train.id, station));
                }
                Ok(_) => {}
                Err(error) => {
                    warn!("Skipping train {} this tick: {}", train.id, error);
                    report.faults.push((train.id, error));
                }
            }
        }
    }

    /// Main simulation tick
    pub fn tick(&mut self, delta_secs: f64) -> TickReport {
        self.tick_count += 1;
        self.time += delta_secs.max(0.0) * self.config.time_scale;

        let mut report = TickReport {
            tick: self.tick_count,
            time: self.time,
            ..TickReport::default()
        };

        // Replies queued since last tick, then anything that has waited too long
        report
            .arbitration
            .extend(self.resolver.apply_responses(&mut self.trains));
        report
            .arbitration
            .extend(self.resolver.expire_requests(self.time));

        self.update_trains(delta_secs, &mut report);

        report.conflicts = detect_conflicts(self.trains.values(), self.config.min_separation_m);
        let requested = self.resolver.handle_conflicts(
            &report.conflicts,
            &mut self.trains,
            self.oracle.as_mut(),
            self.time,
        );
        report.arbitration.extend(requested);

        self.stats.trains_arrived += report.arrivals.len();
        self.stats.train_faults += report.faults.len();
        self.stats.conflicts_detected += report.conflicts.len();
        self.stats.requests_issued += report.requests_issued();
        self.stats.resolutions_applied += report.resolutions();
        self.stats.oracle_failures += report.failures();

        debug!(
            "Tick {}: {} conflicts, {} arrivals, {} faults",
            report.tick,
            report.conflicts.len(),
            report.arrivals.len(),
            report.faults.len()
        );
        report
    }

    /// Spawn `count` trains between random station pairs.
    /// Pairs with no route are skipped.
    pub fn spawn_random_trains(&mut self, count: usize) -> Vec<TrainId> {
        let stations: Vec<StationId> = self.network.stations().map(|s| s.id.clone()).collect();
        let mut spawned = Vec::new();
        if stations.len() < 2 {
            return spawned;
        }

        for n in 0..count {
            let (Some(source), Some(destination)) = (
                self.choose_random(&stations).cloned(),
                self.choose_random(&stations).cloned(),
            ) else {
                break;
            };
            if source == destination {
                continue;
            }

            let speed = self.random_range(60.0..140.0);
            let priority = match &mut self.rng {
                Some(rng) => rng.random_range(1..=3),
                None => rand::rng().random_range(1..=3),
            };
            let name = format!("Random {}", n + 1);
            match self.assign_route(&name, source.as_str(), destination.as_str(), speed, priority) {
                Ok(id) => spawned.push(id),
                Err(error) => debug!("Could not spawn {}: {}", name, error),
            }
        }

        spawned
    }

    /// Build a world from a scenario file
    pub fn from_scenario(scenario: Scenario) -> Result<Self> {
        let mut world = Self::with_config(scenario.config);

        for station in &scenario.stations {
            world
                .add_station(&station.id, station.lat, station.lon)
                .with_context(|| format!("Failed to add station {}", station.id))?;
        }

        for edge in &scenario.edges {
            let added = if edge.directed {
                world.add_directed_edge(&edge.source, &edge.target)
            } else {
                world.add_edge(&edge.source, &edge.target)
            };
            added.with_context(|| {
                format!("Failed to add edge {}-{}", edge.source, edge.target)
            })?;
        }

        for switch in &scenario.switches {
            world
                .set_switch_towards(&switch.station, &switch.towards)
                .with_context(|| format!("Failed to set switch at {}", switch.station))?;
        }

        for health in &scenario.segment_health {
            world.set_segment_health(&health.a, &health.b, health.factor);
        }

        for entry in &scenario.trains {
            let id = match (&entry.path, &entry.source, &entry.destination) {
                (Some(path), _, _) => world.assign_path(
                    &entry.name,
                    path.iter().map(|s| StationId::from(s.as_str())).collect(),
                    entry.speed,
                    entry.priority,
                ),
                (None, Some(source), Some(destination)) => world.assign_route(
                    &entry.name,
                    source,
                    destination,
                    entry.speed,
                    entry.priority,
                ),
                _ => bail!(
                    "Train {} needs either a path or a source and destination",
                    entry.name
                ),
            }
            .with_context(|| format!("Failed to create train {}", entry.name))?;

            if let Some(status) = &entry.status {
                world.set_train_status(id, TrainStatus::from_legacy(status))?;
            }
        }

        Ok(world)
    }

    /// Create the built-in demo network
    pub fn create_demo_world() -> Self {
        Self::build_demo_world(Self::new())
    }

    pub fn create_demo_world_with_seed(seed: u64) -> Self {
        Self::build_demo_world(Self::new_with_seed(seed))
    }

    /// Populate `world` with a small North Indian network: a main line
    /// NDLS - GZB - ALJN - CNB, a loop via PWL - MTJ - AGC back to ALJN,
    /// and three trains, two of them heading at each other.
    pub fn build_demo_world(mut world: SimWorld) -> Self {
        // A minute of travel per tick second keeps the demo short
        world.config.time_scale = 60.0;

        let stations = [
            ("NDLS", 28.6430, 77.2194),
            ("GZB", 28.6476, 77.4440),
            ("ALJN", 27.8893, 78.0626),
            ("CNB", 26.4499, 80.3319),
            ("PWL", 28.1440, 77.3320),
            ("MTJ", 27.4800, 77.6730),
            ("AGC", 27.1580, 77.9900),
        ];
        for (id, lat, lon) in stations {
            if let Err(error) = world.add_station(id, lat, lon) {
                warn!("Demo station {}: {}", id, error);
            }
        }

        let edges = [
            ("NDLS", "GZB"),
            ("GZB", "ALJN"),
            ("ALJN", "CNB"),
            ("NDLS", "PWL"),
            ("PWL", "MTJ"),
            ("MTJ", "AGC"),
            ("AGC", "ALJN"),
        ];
        for (a, b) in edges {
            if let Err(error) = world.add_edge(a, b) {
                warn!("Demo edge {}-{}: {}", a, b, error);
            }
        }

        world.set_segment_health("MTJ", "AGC", 0.7);

        let trains = [
            ("Rajdhani", "NDLS", "CNB", 130.0, 3),
            ("Shatabdi", "CNB", "NDLS", 110.0, 2),
            ("Goods", "AGC", "NDLS", 70.0, 1),
        ];
        for (name, source, destination, speed, priority) in trains {
            if let Err(error) = world.assign_route(name, source, destination, speed, priority) {
                warn!("Demo train {}: {}", name, error);
            }
        }

        world
    }

    /// Print a summary of the current state
    pub fn print_summary(&self) {
        println!("=== Rail Simulation Summary ===");
        println!("Time: {:.1}s (tick {})", self.time, self.tick_count);
        println!(
            "Stations: {} | Tracks: {} | Trains: {} ({} active)",
            self.network.station_count(),
            self.network.edge_count(),
            self.train_count(),
            self.active_train_count()
        );
        println!(
            "Conflicts detected: {} | Requests: {} | Resolutions: {} | Oracle failures: {} | Pending: {}",
            self.stats.conflicts_detected,
            self.stats.requests_issued,
            self.stats.resolutions_applied,
            self.stats.oracle_failures,
            self.pending_arbitrations()
        );

        for train in self.trains.values() {
            let segment = train
                .current_segment_stations()
                .map(|(from, to)| format!("{from}->{to}"))
                .unwrap_or_else(|| "-".to_string());
            let near = self
                .network
                .find_closest_station(&train.position)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {:<12} {:<8} {:>5.1}% seg {:<12} near {:<6} ({:.4}, {:.4})",
                train.id,
                train.name,
                train.status,
                train.overall_progress() * 100.0,
                segment,
                near,
                train.position.lat,
                train.position.lon
            );
        }
    }
}
