//! Feature aggregation over a network snapshot
//!
//! Turns stations, edges and trains into a fixed-length, fixed-order vector
//! of named scalars. Per-train groups use a fixed number of train slots
//! filled in insertion order; empty slots read 0. The vector is padded
//! with zero `reserved.*` entries up to the configured minimum length, so
//! its shape depends only on the configuration.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::collision::collision_risks;
use super::load::network_load;
use super::rail_network::RailNetwork;
use super::train::SimTrain;

/// Spacing scores use these distance scales, in metres
const SPACING_SCALES_M: [(f64, &str); 3] = [(5000.0, "5km"), (2000.0, "2km"), (1000.0, "1km")];
/// Degree ratios cover "degree >= i" for i below this
const DEGREE_BANDS: usize = 8;
/// Speed ratios cover "speed > 40 + 20i" km/h for i below this
const SPEED_BANDS: usize = 10;
/// Nearest-neighbour risk uses scales of 1..=10 km
const RISK_SCALES: usize = 10;
/// Normaliser for speeds, km/h
const SPEED_NORM_KMH: f64 = 200.0;
/// Normaliser for path lengths, stations
const PATH_NORM: f64 = 20.0;
/// Normaliser for whole-network counts
const COUNT_NORM: f64 = 50.0;

const TOPOLOGY_LEN: usize = 2 + DEGREE_BANDS;
const SPEED_LEN: usize = 2 + SPEED_BANDS;
const PATH_PER_SLOT: usize = 2;
const COLLISION_PER_SLOT: usize = 5;
const LOAD_PER_SLOT: usize = 5;
const LOAD_GLOBAL_LEN: usize = 1;
const GLOBAL_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Number of trains given their own per-train features
    pub train_slots: usize,
    /// Pad the vector with zeros up to this length
    pub min_len: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            train_slots: 4,
            min_len: 140,
        }
    }
}

impl FeatureConfig {
    /// Number of computed (non-padding) features
    pub fn layout_len(&self) -> usize {
        let slots = self.train_slots;
        let pairs = slots * slots.saturating_sub(1) / 2;
        TOPOLOGY_LEN
            + pairs * SPACING_SCALES_M.len()
            + SPEED_LEN
            + slots * RISK_SCALES
            + slots * PATH_PER_SLOT
            + slots * COLLISION_PER_SLOT
            + slots * LOAD_PER_SLOT
            + LOAD_GLOBAL_LEN
            + GLOBAL_LEN
    }

    /// Length of every vector produced with this configuration
    pub fn vector_len(&self) -> usize {
        self.layout_len().max(self.min_len)
    }
}

/// One named scalar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

impl Feature {
    pub fn contribution(&self) -> f64 {
        self.value * self.weight
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureVector {
    entries: Vec<Feature>,
}

impl FeatureVector {
    fn push(&mut self, name: impl Into<String>, value: f64, weight: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        self.entries.push(Feature {
            name: name.into(),
            value,
            weight,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Feature] {
        &self.entries
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|f| f.value).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|f| f.name == name).map(|f| f.value)
    }

    /// Sum of value * weight over every entry
    pub fn total_contribution(&self) -> f64 {
        self.entries.iter().map(Feature::contribution).sum()
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    count as f64 / total.max(1) as f64
}

/// Build the feature vector for one snapshot. Pure: no state is kept
/// between calls.
pub fn aggregate(
    network: &RailNetwork,
    trains: &[&SimTrain],
    config: &FeatureConfig,
) -> FeatureVector {
    let mut vector = FeatureVector::default();
    let slots: Vec<Option<&SimTrain>> = (0..config.train_slots)
        .map(|slot| trains.get(slot).copied())
        .collect();

    // Network topology
    let degrees: Vec<usize> = network
        .stations()
        .map(|station| network.degree(&station.id))
        .collect();
    let avg_degree = degrees.iter().sum::<usize>() as f64 / degrees.len().max(1) as f64;
    vector.push("topology.avg_degree", avg_degree, 0.6);
    let track_km = network.total_track_length_m() / 1000.0;
    vector.push(
        "topology.station_density",
        network.station_count() as f64 / (track_km + 1.0),
        0.5,
    );
    for band in 0..DEGREE_BANDS {
        let count = degrees.iter().filter(|d| **d >= band).count();
        vector.push(
            format!("topology.degree_ge_{band}"),
            ratio(count, degrees.len()),
            0.4,
        );
    }

    // Pairwise spacing
    for i in 0..slots.len() {
        for j in (i + 1)..slots.len() {
            let distance = match (slots[i], slots[j]) {
                (Some(a), Some(b)) => Some(a.position.distance_m(&b.position)),
                _ => None,
            };
            for ((scale, label), weight) in SPACING_SCALES_M.iter().zip([0.8, 0.7, 0.6]) {
                let value = distance.map_or(0.0, |d| (-d / scale).exp());
                vector.push(format!("spacing.{i}_{j}.exp_{label}"), value, weight);
            }
        }
    }

    // Speed distribution
    let speeds: Vec<f64> = trains.iter().map(|train| train.speed).collect();
    let mean_speed = speeds.iter().sum::<f64>() / speeds.len().max(1) as f64;
    let max_speed = speeds
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .map_or(0.0, |s| s.0);
    vector.push("speed.mean", mean_speed / SPEED_NORM_KMH, 0.7);
    vector.push("speed.max", max_speed / SPEED_NORM_KMH, 0.8);
    for band in 0..SPEED_BANDS {
        let threshold = 40.0 + 20.0 * band as f64;
        let count = speeds.iter().filter(|s| **s > threshold).count();
        vector.push(
            format!("speed.above_{threshold:.0}"),
            ratio(count, speeds.len()),
            0.6,
        );
    }

    // Nearest-neighbour risk
    for (slot, train) in slots.iter().enumerate() {
        let nearest = train.and_then(|train| {
            trains
                .iter()
                .filter(|other| other.id != train.id)
                .map(|other| OrderedFloat(train.position.distance_m(&other.position)))
                .min()
                .map(|d| d.0)
        });
        for k in 1..=RISK_SCALES {
            let value = nearest.map_or(0.0, |d| (-d / (k as f64 * 1000.0)).exp());
            vector.push(format!("risk.{slot}.exp_{k}km"), value, 0.9);
        }
    }

    // Path progress
    for (slot, train) in slots.iter().enumerate() {
        vector.push(
            format!("path.{slot}.length"),
            train.map_or(0.0, |t| t.path.len() as f64 / PATH_NORM),
            0.5,
        );
        vector.push(
            format!("path.{slot}.progress"),
            train.map_or(0.0, |t| t.overall_progress()),
            0.5,
        );
    }

    // Collision indicators
    let risks = collision_risks(trains);
    for slot in 0..slots.len() {
        let risk = risks.get(slot);
        let fields = [
            ("proximity", risk.map(|r| r.proximity)),
            ("closing_speed", risk.map(|r| r.closing_speed)),
            ("time_to_collision", risk.map(|r| r.time_to_collision)),
            ("braking_margin", risk.map(|r| r.braking_margin)),
            ("composite", risk.map(|r| r.composite)),
        ];
        for (label, value) in fields {
            vector.push(
                format!("collision.{slot}.{label}"),
                value.unwrap_or(0.0),
                0.9,
            );
        }
    }

    // Network load
    let load = network_load(network, trains);
    for slot in 0..slots.len() {
        let indicators = load.trains.get(slot);
        let fields = [
            ("station_pressure", indicators.map(|l| l.station_pressure)),
            ("path_load", indicators.map(|l| l.path_load)),
            ("bottleneck", indicators.map(|l| l.bottleneck)),
            ("overload_ratio", indicators.map(|l| l.overload_ratio)),
            ("composite", indicators.map(|l| l.composite)),
        ];
        for (label, value) in fields {
            vector.push(format!("load.{slot}.{label}"), value.unwrap_or(0.0), 0.7);
        }
    }
    vector.push("load.congestion", load.congestion, 0.8);

    // Whole-network counts
    vector.push("global.trains", trains.len() as f64 / COUNT_NORM, 1.0);
    vector.push("global.edges", network.edge_count() as f64 / COUNT_NORM, 0.8);
    vector.push(
        "global.stations",
        network.station_count() as f64 / COUNT_NORM,
        0.7,
    );

    while vector.len() < config.min_len {
        let index = vector.len();
        vector.push(format!("reserved.{index}"), 0.0, 0.0);
    }

    vector
}
