//! Station-to-station routing over the rail network
//!
//! Breadth-first search with every edge costing one hop. Neighbours are
//! expanded in edge insertion order, so the same graph always yields the
//! same path.

use log::debug;
use std::collections::{HashMap, VecDeque};

use super::error::{RailError, RailResult};
use super::rail_network::{RailNetwork, TrackEdge};
use super::types::StationId;

/// Shortest path by hop count, ignoring switch state.
///
/// Returns the full station sequence including both ends. A path of one
/// station is returned when `source == destination`.
pub fn route(
    network: &RailNetwork,
    source: &StationId,
    destination: &StationId,
) -> RailResult<Vec<StationId>> {
    bfs(network, source, destination, |_| true)
}

/// Shortest path by hop count that only uses edges the switches allow.
///
/// An edge touching a switch station is dropped when that switch selects a
/// different edge. Switches with no selection let everything through.
pub fn route_respecting_switches(
    network: &RailNetwork,
    source: &StationId,
    destination: &StationId,
) -> RailResult<Vec<StationId>> {
    bfs(network, source, destination, |edge| {
        network.edge_allowed_by_switches(edge)
    })
}

fn bfs<F>(
    network: &RailNetwork,
    source: &StationId,
    destination: &StationId,
    edge_allowed: F,
) -> RailResult<Vec<StationId>>
where
    F: Fn(&TrackEdge) -> bool,
{
    for station in [source, destination] {
        if !network.contains_station(station) {
            return Err(RailError::MissingStation(station.clone()));
        }
    }

    if source == destination {
        return Ok(vec![source.clone()]);
    }

    let mut came_from: HashMap<StationId, StationId> = HashMap::new();
    let mut queue = VecDeque::from([source.clone()]);
    came_from.insert(source.clone(), source.clone());

    while let Some(current) = queue.pop_front() {
        if current == *destination {
            return Ok(reconstruct(&came_from, source, destination));
        }

        for edge in network.incident_edges(&current) {
            if !edge.traversable_from(&current) || !edge_allowed(edge) {
                continue;
            }
            let next = edge.other_end(&current);
            if came_from.contains_key(next) {
                continue;
            }
            came_from.insert(next.clone(), current.clone());
            queue.push_back(next.clone());
        }
    }

    debug!("No route from {} to {}", source, destination);
    Err(RailError::NotFound {
        from: source.clone(),
        to: destination.clone(),
    })
}

fn reconstruct(
    came_from: &HashMap<StationId, StationId>,
    source: &StationId,
    destination: &StationId,
) -> Vec<StationId> {
    let mut path = vec![destination.clone()];
    let mut current = destination;
    while current != source {
        match came_from.get(current) {
            Some(previous) => {
                path.push(previous.clone());
                current = previous;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
