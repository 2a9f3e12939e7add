//! Network load indicators
//!
//! Counts how many trains start at each station and how many paths use
//! each track, then scores every train by the load along its own path.
//! Loads are relative to the busiest station or track, so all scores are
//! in [0, 1].

use std::collections::HashMap;

use super::rail_network::RailNetwork;
use super::train::SimTrain;
use super::types::{StationId, TrainId};

/// A track counts as overloaded above this share of the busiest track's load
const OVERLOAD_SHARE: f64 = 0.7;
/// Trains per track at which congestion saturates
const CONGESTION_SATURATION: f64 = 10.0;
/// Growth applied to path load when projecting short-term demand
const SURGE_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadIndicators {
    pub train_id: TrainId,
    /// Trains starting at this train's source, relative to the busiest source
    pub station_pressure: f64,
    /// Mean relative load over the tracks on the path
    pub path_load: f64,
    /// Load of the busiest track on the path
    pub bottleneck: f64,
    /// Share of path tracks above the overload line
    pub overload_ratio: f64,
    pub composite: f64,
}

/// Load for one snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkLoad {
    /// Trains per track, saturating at 1
    pub congestion: f64,
    /// One entry per input train, in input order
    pub trains: Vec<LoadIndicators>,
}

fn track_key<'a>(a: &'a StationId, b: &'a StationId) -> (&'a StationId, &'a StationId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Score every train in `trains`. Arrived trains still count towards load.
pub fn network_load(network: &RailNetwork, trains: &[&SimTrain]) -> NetworkLoad {
    let mut source_load: HashMap<&StationId, usize> = HashMap::new();
    let mut track_load: HashMap<(&StationId, &StationId), usize> = HashMap::new();
    for train in trains {
        if let Some(source) = train.source() {
            *source_load.entry(source).or_default() += 1;
        }
        for hop in train.path.windows(2) {
            *track_load.entry(track_key(&hop[0], &hop[1])).or_default() += 1;
        }
    }
    let max_source = source_load.values().copied().max().unwrap_or(1).max(1) as f64;
    let max_track = track_load.values().copied().max().unwrap_or(1).max(1) as f64;

    let congestion =
        (trains.len() as f64 / network.edge_count().max(1) as f64 / CONGESTION_SATURATION).min(1.0);

    let indicators = trains
        .iter()
        .map(|train| {
            let station_pressure = train
                .source()
                .and_then(|source| source_load.get(source))
                .map_or(0.0, |count| *count as f64 / max_source);

            let loads: Vec<f64> = train
                .path
                .windows(2)
                .map(|hop| {
                    track_load
                        .get(&track_key(&hop[0], &hop[1]))
                        .map_or(0.0, |count| *count as f64 / max_track)
                })
                .collect();
            let (path_load, bottleneck, overload_ratio) = if loads.is_empty() {
                (0.0, 0.0, 0.0)
            } else {
                let hops = loads.len() as f64;
                let overloaded = loads.iter().filter(|l| **l > OVERLOAD_SHARE).count();
                (
                    loads.iter().sum::<f64>() / hops,
                    loads.iter().copied().fold(0.0, f64::max),
                    overloaded as f64 / hops,
                )
            };

            let surge = (path_load * SURGE_FACTOR).min(1.0);
            let composite = (station_pressure
                + path_load
                + congestion
                + bottleneck
                + surge
                + overload_ratio)
                / 6.0;

            LoadIndicators {
                train_id: train.id,
                station_pressure,
                path_load,
                bottleneck,
                overload_ratio,
                composite,
            }
        })
        .collect();

    NetworkLoad {
        congestion,
        trains: indicators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{GeoPoint, SimId};

    fn line() -> RailNetwork {
        let mut network = RailNetwork::new();
        for (n, code) in ["A", "B", "C"].into_iter().enumerate() {
            network
                .add_station(StationId::from(code), GeoPoint::new(0.0, n as f64 * 0.01))
                .expect("new station");
        }
        network
            .add_track(&StationId::from("A"), &StationId::from("B"), false)
            .expect("stations exist");
        network
            .add_track(&StationId::from("B"), &StationId::from("C"), false)
            .expect("stations exist");
        network
    }

    fn train(network: &RailNetwork, n: usize, path: &[&str]) -> SimTrain {
        let path = path.iter().map(|code| StationId::from(*code)).collect();
        SimTrain::new(TrainId(SimId(n)), format!("T{n}"), path, 80.0, 1, network)
            .expect("valid path")
    }

    #[test]
    fn test_empty_snapshot_has_no_load() {
        let load = network_load(&line(), &[]);
        assert_eq!(load.congestion, 0.0);
        assert!(load.trains.is_empty());
    }

    #[test]
    fn test_busiest_track_is_relative_one() {
        let network = line();
        let trains = [
            train(&network, 0, &["A", "B", "C"]),
            train(&network, 1, &["C", "B"]),
        ];
        let snapshot: Vec<&SimTrain> = trains.iter().collect();
        let load = network_load(&network, &snapshot);

        // B-C carries both trains, A-B only the first
        let first = &load.trains[0];
        assert_eq!(first.path_load, 0.75);
        assert_eq!(first.bottleneck, 1.0);
        assert_eq!(first.overload_ratio, 0.5);
        assert_eq!(first.station_pressure, 1.0);

        let second = &load.trains[1];
        assert_eq!(second.path_load, 1.0);
        assert_eq!(second.overload_ratio, 1.0);
        assert_eq!(load.congestion, 0.1);
    }
}
