//! Per-train collision risk indicators
//!
//! Each train is scored against its nearest active neighbour. All scores
//! are in [0, 1], higher meaning riskier.

use ordered_float::OrderedFloat;

use super::train::SimTrain;
use super::types::{kmh_to_mps, StationId, TrainId, TrainStatus};

/// Proximity score is 1 at or below this distance
const PROXIMITY_NEAR_M: f64 = 100.0;
/// Proximity score reaches 0 at this distance
const PROXIMITY_FAR_M: f64 = 2000.0;
/// Closing speed that maps to a score of 1
const CLOSING_SPEED_LIMIT_KMH: f64 = 50.0;
/// Time-to-collision horizon
const TTC_HORIZON_S: f64 = 120.0;
const REACTION_TIME_S: f64 = 1.5;
const BRAKING_DECEL_MPS2: f64 = 0.8;

const SHARED_TRACK_OPPOSITE: f64 = 1.0;
const SHARED_TRACK_SAME_WAY: f64 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionRisk {
    pub train_id: TrainId,
    pub nearest: Option<TrainId>,
    pub nearest_distance_m: Option<f64>,
    pub proximity: f64,
    pub closing_speed: f64,
    pub time_to_collision: f64,
    pub braking_margin: f64,
    /// 1.0 if the nearest train uses a shared edge the other way, 0.4 the same way
    pub shared_track: f64,
    pub composite: f64,
}

impl CollisionRisk {
    fn clear(train_id: TrainId) -> Self {
        Self {
            train_id,
            nearest: None,
            nearest_distance_m: None,
            proximity: 0.0,
            closing_speed: 0.0,
            time_to_collision: 0.0,
            braking_margin: 0.0,
            shared_track: 0.0,
            composite: 0.0,
        }
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Current ground speed in m/s: zero unless the train is moving
fn ground_speed_mps(train: &SimTrain) -> f64 {
    match train.status {
        TrainStatus::Running | TrainStatus::Braking => kmh_to_mps(train.speed).max(0.0),
        TrainStatus::Stopped | TrainStatus::Arrived => 0.0,
    }
}

fn stopping_distance_m(speed_mps: f64) -> f64 {
    speed_mps * REACTION_TIME_S + speed_mps * speed_mps / (2.0 * BRAKING_DECEL_MPS2)
}

fn path_edges(train: &SimTrain) -> impl Iterator<Item = (&StationId, &StationId)> {
    train.path.windows(2).map(|pair| (&pair[0], &pair[1]))
}

/// 1.0 if the paths share an edge in opposite directions, 0.4 if they share
/// one in the same direction, 0.0 otherwise
fn shared_track_score(a: &SimTrain, b: &SimTrain) -> f64 {
    let mut score: f64 = 0.0;
    for (a_from, a_to) in path_edges(a) {
        for (b_from, b_to) in path_edges(b) {
            if a_from == b_to && a_to == b_from {
                return SHARED_TRACK_OPPOSITE;
            }
            if a_from == b_from && a_to == b_to {
                score = score.max(SHARED_TRACK_SAME_WAY);
            }
        }
    }
    score
}

/// Score every train against its nearest active neighbour.
///
/// Arrived trains are neither scored nor used as neighbours; they get an
/// all-zero entry so the output lines up with the input.
pub fn collision_risks(trains: &[&SimTrain]) -> Vec<CollisionRisk> {
    trains
        .iter()
        .map(|train| {
            if train.is_arrived() {
                return CollisionRisk::clear(train.id);
            }

            let nearest = trains
                .iter()
                .filter(|other| other.id != train.id && !other.is_arrived())
                .map(|other| (OrderedFloat(train.position.distance_m(&other.position)), *other))
                .min_by_key(|(distance, _)| *distance);

            let Some((OrderedFloat(distance_m), other)) = nearest else {
                return CollisionRisk::clear(train.id);
            };

            let speed = ground_speed_mps(train);
            let other_speed = ground_speed_mps(other);
            let gap_m = distance_m.max(1.0);

            let proximity = clamp01(
                1.0 - (distance_m - PROXIMITY_NEAR_M) / (PROXIMITY_FAR_M - PROXIMITY_NEAR_M),
            );
            let closing_speed =
                clamp01((speed - other_speed).abs() / kmh_to_mps(CLOSING_SPEED_LIMIT_KMH));

            let relative = speed - other_speed;
            let time_to_collision = if relative > 0.1 {
                clamp01(1.0 - (gap_m / relative) / TTC_HORIZON_S)
            } else {
                0.0
            };

            let margin = (gap_m - stopping_distance_m(speed)) / gap_m;
            let braking_margin = clamp01(1.0 - margin);

            let shared_track = shared_track_score(train, other);

            let composite = clamp01(
                0.30 * proximity
                    + 0.15 * closing_speed
                    + 0.20 * time_to_collision
                    + 0.20 * braking_margin
                    + 0.15 * shared_track,
            );

            CollisionRisk {
                train_id: train.id,
                nearest: Some(other.id),
                nearest_distance_m: Some(distance_m),
                proximity,
                closing_speed,
                time_to_collision,
                braking_margin,
                shared_track,
                composite,
            }
        })
        .collect()
}
