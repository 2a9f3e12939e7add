//! Pairwise proximity checks between active trains
//!
//! Separation is measured in metres between the trains' cached positions.
//! Every unordered pair is checked each tick; there is no cap on the
//! number of trains.

use log::debug;
use std::fmt;

use super::train::SimTrain;
use super::types::TrainId;

/// An unordered pair of trains, stored with the smaller id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConflictPair {
    pub first: TrainId,
    pub second: TrainId,
}

impl ConflictPair {
    pub fn new(a: TrainId, b: TrainId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, id: TrainId) -> bool {
        self.first == id || self.second == id
    }

    /// The other member of the pair
    pub fn other(&self, id: TrainId) -> Option<TrainId> {
        if self.first == id {
            Some(self.second)
        } else if self.second == id {
            Some(self.first)
        } else {
            None
        }
    }

    pub fn members(&self) -> [TrainId; 2] {
        [self.first, self.second]
    }
}

impl fmt::Display for ConflictPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

/// Two trains closer than the minimum separation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conflict {
    pub pair: ConflictPair,
    pub distance_m: f64,
}

/// Flag every pair of non-arrived trains within `min_separation_m`.
///
/// The result is ordered by pair so repeated runs over the same snapshot
/// agree.
pub fn detect_conflicts<'a, I>(trains: I, min_separation_m: f64) -> Vec<Conflict>
where
    I: IntoIterator<Item = &'a SimTrain>,
{
    let active: Vec<&SimTrain> = trains
        .into_iter()
        .filter(|train| !train.is_arrived())
        .collect();

    let mut conflicts = Vec::new();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            if a.id == b.id {
                continue;
            }
            let distance_m = a.position.distance_m(&b.position);
            if distance_m <= min_separation_m {
                debug!(
                    "Trains {} and {} are {:.0}m apart (limit {:.0}m)",
                    a.id, b.id, distance_m, min_separation_m
                );
                conflicts.push(Conflict {
                    pair: ConflictPair::new(a.id, b.id),
                    distance_m,
                });
            }
        }
    }

    conflicts.sort_by_key(|conflict| conflict.pair);
    conflicts
}
