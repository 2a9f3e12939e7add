//! Rail network graph: stations, track edges, switches and segment health
//!
//! Stations are nodes with geographic coordinates, track edges connect two
//! stations and are traversable both ways unless marked directed. Node and
//! edge indices are never removed, so iteration order is insertion order.

use log::warn;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use super::error::{RailError, RailResult};
use super::types::{EdgeId, GeoPoint, SimId, StationId, MIN_SEGMENT_HEALTH};

/// A named node in the rail network
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub position: GeoPoint,
}

/// A track edge connecting two stations
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEdge {
    pub id: EdgeId,
    pub source: StationId,
    pub target: StationId,
    /// Great-circle length in metres
    pub length_m: f64,
    /// Directed edges may only be traversed source -> target
    pub directed: bool,
}

impl TrackEdge {
    pub fn new(
        id: EdgeId,
        source: StationId,
        target: StationId,
        source_pos: &GeoPoint,
        target_pos: &GeoPoint,
        directed: bool,
    ) -> Self {
        Self {
            id,
            source,
            target,
            length_m: source_pos.distance_m(target_pos),
            directed,
        }
    }

    pub fn touches(&self, station: &StationId) -> bool {
        self.source == *station || self.target == *station
    }

    /// Whether a train standing at `from` may use this edge
    pub fn traversable_from(&self, from: &StationId) -> bool {
        if self.directed {
            self.source == *from
        } else {
            self.touches(from)
        }
    }

    /// The station at the other end of the edge
    pub fn other_end(&self, station: &StationId) -> &StationId {
        if self.source == *station {
            &self.target
        } else {
            &self.source
        }
    }
}

fn segment_key(a: &StationId, b: &StationId) -> (StationId, StationId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Default)]
pub struct RailNetwork {
    /// Undirected petgraph graph; direction lives on the edge weight
    graph: UnGraph<Station, TrackEdge>,

    /// Maps station IDs to their node indices in the graph
    station_to_node: HashMap<StationId, NodeIndex>,

    /// Maps edge IDs to their edge indices in the graph
    edge_to_index: HashMap<EdgeId, EdgeIndex>,

    /// Active edge per switch station; stations without an entry let every
    /// incident edge through
    switches: HashMap<StationId, EdgeId>,

    /// Health/quality factor per unordered station pair, in (0, 1]
    segment_health: HashMap<(StationId, StationId), f64>,
}

impl RailNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a station to the network graph
    pub fn add_station(&mut self, id: StationId, position: GeoPoint) -> RailResult<()> {
        if self.station_to_node.contains_key(&id) {
            return Err(RailError::DuplicateStation(id));
        }

        let node = self.graph.add_node(Station {
            id: id.clone(),
            position,
        });
        self.station_to_node.insert(id, node);
        Ok(())
    }

    pub fn contains_station(&self, id: &StationId) -> bool {
        self.station_to_node.contains_key(id)
    }

    pub fn station(&self, id: &StationId) -> Option<&Station> {
        let node = self.station_to_node.get(id)?;
        self.graph.node_weight(*node)
    }

    /// Gets the position of a station
    pub fn station_position(&self, id: &StationId) -> Option<GeoPoint> {
        self.station(id).map(|station| station.position)
    }

    /// Position of a station, or `MissingStation`
    pub fn require_position(&self, id: &StationId) -> RailResult<GeoPoint> {
        self.station_position(id)
            .ok_or_else(|| RailError::MissingStation(id.clone()))
    }

    /// Adds a track edge between two existing stations
    pub fn add_track(
        &mut self,
        source: &StationId,
        target: &StationId,
        directed: bool,
    ) -> RailResult<EdgeId> {
        let source_node = *self
            .station_to_node
            .get(source)
            .ok_or_else(|| RailError::MissingStation(source.clone()))?;
        let target_node = *self
            .station_to_node
            .get(target)
            .ok_or_else(|| RailError::MissingStation(target.clone()))?;

        let source_pos = self.graph[source_node].position;
        let target_pos = self.graph[target_node].position;

        let id = EdgeId(SimId(self.graph.edge_count()));
        let edge = TrackEdge::new(
            id,
            source.clone(),
            target.clone(),
            &source_pos,
            &target_pos,
            directed,
        );
        let index = self.graph.add_edge(source_node, target_node, edge);
        self.edge_to_index.insert(id, index);
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&TrackEdge> {
        let index = self.edge_to_index.get(&id)?;
        self.graph.edge_weight(*index)
    }

    /// All stations in insertion order
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.graph.node_weights()
    }

    /// All track edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &TrackEdge> {
        self.graph.edge_weights()
    }

    pub fn station_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges touching a station, in insertion order
    pub fn incident_edges(&self, station: &StationId) -> Vec<&TrackEdge> {
        let Some(node) = self.station_to_node.get(station) else {
            return Vec::new();
        };

        // petgraph walks a node's edge list newest-first
        let mut edges: Vec<_> = self.graph.edges(*node).collect();
        edges.sort_by_key(|edge| edge.id().index());
        edges.into_iter().map(|edge| edge.weight()).collect()
    }

    /// Number of edges touching a station
    pub fn degree(&self, station: &StationId) -> usize {
        self.station_to_node
            .get(station)
            .map(|node| self.graph.edges(*node).count())
            .unwrap_or(0)
    }

    /// Finds an edge a train at `from` can use to reach `to`
    pub fn find_edge_between(&self, from: &StationId, to: &StationId) -> Option<EdgeId> {
        self.incident_edges(from)
            .into_iter()
            .find(|edge| edge.traversable_from(from) && edge.other_end(from) == to)
            .map(|edge| edge.id)
    }

    /// Great-circle length of the segment between two stations
    pub fn segment_length_m(&self, a: &StationId, b: &StationId) -> RailResult<f64> {
        let a_pos = self.require_position(a)?;
        let b_pos = self.require_position(b)?;
        Ok(a_pos.distance_m(&b_pos))
    }

    /// Sum of all edge lengths in metres
    pub fn total_track_length_m(&self) -> f64 {
        self.edges().map(|edge| edge.length_m).sum()
    }

    /// Select the single active edge at a switch station
    pub fn set_switch(&mut self, station: &StationId, edge: EdgeId) -> RailResult<()> {
        if !self.contains_station(station) {
            return Err(RailError::MissingStation(station.clone()));
        }

        let incident = self
            .edge(edge)
            .is_some_and(|track| track.touches(station));
        if !incident {
            return Err(RailError::InvalidSwitchSelection {
                station: station.clone(),
                edge,
            });
        }

        self.switches.insert(station.clone(), edge);
        Ok(())
    }

    /// Forget a switch selection; the station goes back to letting every
    /// incident edge through
    pub fn clear_switch(&mut self, station: &StationId) -> Option<EdgeId> {
        self.switches.remove(station)
    }

    pub fn switch_selection(&self, station: &StationId) -> Option<EdgeId> {
        self.switches.get(station).copied()
    }

    /// An edge is blocked if either endpoint is a switch pointing elsewhere.
    /// Unset switches are fail-open.
    pub fn edge_allowed_by_switches(&self, edge: &TrackEdge) -> bool {
        [&edge.source, &edge.target].into_iter().all(|station| {
            self.switches
                .get(station)
                .map_or(true, |selected| *selected == edge.id)
        })
    }

    /// Record a health/quality factor for the segment between two stations.
    /// Factors are clamped to (0, 1].
    pub fn set_segment_health(&mut self, a: &StationId, b: &StationId, factor: f64) {
        let clamped = if factor.is_nan() || factor <= 0.0 {
            warn!(
                "Rejected segment health {} for {}-{}; using {}",
                factor, a, b, MIN_SEGMENT_HEALTH
            );
            MIN_SEGMENT_HEALTH
        } else {
            factor.clamp(MIN_SEGMENT_HEALTH, 1.0)
        };
        self.segment_health.insert(segment_key(a, b), clamped);
    }

    /// Health factor of a segment, 1.0 when none was recorded
    pub fn segment_health(&self, a: &StationId, b: &StationId) -> f64 {
        self.segment_health
            .get(&segment_key(a, b))
            .copied()
            .unwrap_or(1.0)
    }

    /// Find the closest station to a given position
    pub fn find_closest_station(&self, position: &GeoPoint) -> Option<&StationId> {
        self.stations()
            .min_by(|a, b| {
                let dist_a = position.distance_m(&a.position);
                let dist_b = position.distance_m(&b.position);
                dist_a.total_cmp(&dist_b)
            })
            .map(|station| &station.id)
    }
}
