//! Core types for the rail simulation
//!
//! Plain data types shared by the network, the motion model and the
//! arbitration protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimId(pub usize);

/// A wrapper type for train IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub SimId);

/// A wrapper type for track edge IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub SimId);

/// Station identifier: the station's unique name or code (e.g. "NDLS")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub String);

impl StationId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StationId {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0 .0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0 .0)
    }
}

/// Mean Earth radius used for great-circle distances, in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance in metres
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// Linear interpolation in degree space.
    ///
    /// Not geodesic, but motion and proximity both go through it so relative
    /// distances stay consistent.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

/// Operating status of a train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainStatus {
    /// Moving at its effective speed (legacy "RUNNING" and "MOVING")
    #[default]
    Running,
    /// Moving at a reduced speed
    Braking,
    /// Held in place until something clears it
    Stopped,
    /// Reached the end of its path; position is frozen
    Arrived,
}

impl TrainStatus {
    /// Map a legacy status string onto the enumeration.
    /// Anything unrecognised is treated as `Stopped`.
    pub fn from_legacy(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "RUNNING" | "MOVING" => TrainStatus::Running,
            "BRAKING" => TrainStatus::Braking,
            "STOPPED" => TrainStatus::Stopped,
            "ARRIVED" => TrainStatus::Arrived,
            _ => TrainStatus::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrainStatus::Running => "RUNNING",
            TrainStatus::Braking => "BRAKING",
            TrainStatus::Stopped => "STOPPED",
            TrainStatus::Arrived => "ARRIVED",
        }
    }

    /// True for statuses in which the motion model moves the train
    pub fn is_moving(&self) -> bool {
        matches!(self, TrainStatus::Running | TrainStatus::Braking)
    }
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default minimum separation between two trains, in metres
pub const DEFAULT_MIN_SEPARATION_M: f64 = 1000.0;

/// Speed multiplier applied while a train is braking
pub const DEFAULT_BRAKING_MULTIPLIER: f64 = 0.3;

/// Progress this close to 1.0 counts as reaching the next station
pub const PROGRESS_EPSILON: f64 = 1e-9;

/// Smallest segment health factor accepted by the network
pub const MIN_SEGMENT_HEALTH: f64 = 0.05;

/// Convert km/h to m/s
pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    speed_kmh / 3.6
}
