//! Train movement logic for the rail simulation
//!
//! A train walks its path segment by segment. Progress within a segment is
//! a fraction of the great-circle length between the segment's two
//! stations; the cached position is a linear interpolation between them.

use super::error::{RailError, RailResult};
use super::rail_network::RailNetwork;
use super::types::{
    kmh_to_mps, GeoPoint, StationId, TrainId, TrainStatus, DEFAULT_BRAKING_MULTIPLIER,
    PROGRESS_EPSILON,
};

/// Result of a train update indicating what happened this tick
#[derive(Debug, Clone, PartialEq)]
pub enum TrainUpdateResult {
    Unchanged,                // Stopped, arrived, or no time elapsed
    Moved,                    // Train advanced along its path
    ArrivedAtDestination(StationId), // Train reached the last station
}

/// Knobs the motion model reads on every advance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    /// Speed multiplier while braking
    pub braking_multiplier: f64,
    /// Simulated seconds per elapsed second
    pub time_scale: f64,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            braking_multiplier: DEFAULT_BRAKING_MULTIPLIER,
            time_scale: 1.0,
        }
    }
}

/// A train in the rail simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimTrain {
    pub id: TrainId,
    pub name: String,
    /// Stations to visit, in order. Never empty.
    pub path: Vec<StationId>,
    pub current_segment: usize,
    /// Fraction of the current segment covered, in [0, 1]
    pub segment_progress: f64,
    /// Base speed in km/h
    pub speed: f64,
    /// Higher values win arbitration
    pub priority: u8,
    pub status: TrainStatus,
    /// Last computed position, cached for proximity checks and rendering
    pub position: GeoPoint,
}

impl SimTrain {
    /// Create a train at the first station of `path`.
    ///
    /// Every station on the path must exist in the network. A single-station
    /// path yields a train that has already arrived.
    pub fn new(
        id: TrainId,
        name: impl Into<String>,
        path: Vec<StationId>,
        speed: f64,
        priority: u8,
        network: &RailNetwork,
    ) -> RailResult<Self> {
        let first = path.first().ok_or(RailError::EmptyPath)?;
        let position = network.require_position(first)?;
        for station in &path {
            network.require_position(station)?;
        }

        let arrived = path.len() == 1;
        Ok(Self {
            id,
            name: name.into(),
            path,
            current_segment: 0,
            segment_progress: if arrived { 1.0 } else { 0.0 },
            speed,
            priority,
            status: if arrived {
                TrainStatus::Arrived
            } else {
                TrainStatus::Running
            },
            position,
        })
    }

    pub fn source(&self) -> Option<&StationId> {
        self.path.first()
    }

    pub fn destination(&self) -> Option<&StationId> {
        self.path.last()
    }

    pub fn segment_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// The two stations bounding the current segment
    pub fn current_segment_stations(&self) -> Option<(&StationId, &StationId)> {
        let from = self.path.get(self.current_segment)?;
        let to = self.path.get(self.current_segment + 1)?;
        Some((from, to))
    }

    /// Segments completed plus progress in the current one
    pub fn distance_along_path(&self) -> f64 {
        self.current_segment as f64 + self.segment_progress
    }

    /// Progress over the whole path, in [0, 1]
    pub fn overall_progress(&self) -> f64 {
        match self.segment_count() {
            0 => 1.0,
            segments => (self.distance_along_path() / segments as f64).clamp(0.0, 1.0),
        }
    }

    pub fn is_arrived(&self) -> bool {
        self.status == TrainStatus::Arrived
    }

    /// Recompute the cached position from segment and progress
    pub fn refresh_position(&mut self, network: &RailNetwork) -> RailResult<()> {
        self.position = match self.current_segment_stations() {
            Some((from, to)) if !self.is_arrived() => {
                let from_pos = network.require_position(from)?;
                let to_pos = network.require_position(to)?;
                from_pos.lerp(&to_pos, self.segment_progress)
            }
            _ => {
                let last = self.destination().ok_or(RailError::EmptyPath)?;
                network.require_position(last)?
            }
        };
        Ok(())
    }

    /// Advance the train by `elapsed_secs` of simulation time.
    ///
    /// On error the train is left exactly as it was.
    pub fn advance(
        &mut self,
        network: &RailNetwork,
        elapsed_secs: f64,
        params: &MotionParams,
    ) -> RailResult<TrainUpdateResult> {
        if self.is_arrived() || elapsed_secs <= 0.0 || self.status == TrainStatus::Stopped {
            return Ok(TrainUpdateResult::Unchanged);
        }

        let last = self.destination().ok_or(RailError::EmptyPath)?.clone();
        if self.segment_count() == 0 {
            let final_pos = network.require_position(&last)?;
            self.arrive(final_pos);
            return Ok(TrainUpdateResult::ArrivedAtDestination(last));
        }

        let last_segment = self.segment_count() - 1;
        let segment = self.current_segment.min(last_segment);
        let from = &self.path[segment];
        let to = &self.path[segment + 1];

        let from_pos = network.require_position(from)?;
        let to_pos = network.require_position(to)?;

        let mut effective_speed = self.speed * network.segment_health(from, to);
        if self.status == TrainStatus::Braking {
            effective_speed *= params.braking_multiplier;
        }

        let distance_m = kmh_to_mps(effective_speed).max(0.0) * elapsed_secs * params.time_scale;
        let length_m = from_pos.distance_m(&to_pos);
        let progress_delta = if length_m > f64::EPSILON {
            distance_m / length_m
        } else {
            // Coincident stations: nothing to cover
            1.0
        };

        let progress = self.segment_progress + progress_delta;
        if progress < 1.0 - PROGRESS_EPSILON {
            self.current_segment = segment;
            self.segment_progress = progress;
            self.position = from_pos.lerp(&to_pos, progress);
            return Ok(TrainUpdateResult::Moved);
        }

        // Overflow past the station is dropped
        let next_segment = segment + 1;
        if next_segment > last_segment {
            let final_pos = network.require_position(&last)?;
            self.arrive(final_pos);
            return Ok(TrainUpdateResult::ArrivedAtDestination(last));
        }

        let next_from = &self.path[next_segment];
        let next_to = &self.path[next_segment + 1];
        let next_from_pos = network.require_position(next_from)?;
        network.require_position(next_to)?;

        self.current_segment = next_segment;
        self.segment_progress = 0.0;
        self.position = next_from_pos;
        Ok(TrainUpdateResult::Moved)
    }

    /// Put the train at its final station as if it had run the whole path
    pub fn arrive_at_destination(&mut self, network: &RailNetwork) -> RailResult<()> {
        let last = self.destination().ok_or(RailError::EmptyPath)?;
        let final_pos = network.require_position(last)?;
        self.arrive(final_pos);
        Ok(())
    }

    fn arrive(&mut self, final_pos: GeoPoint) {
        self.current_segment = self.segment_count().saturating_sub(1);
        self.segment_progress = 1.0;
        self.status = TrainStatus::Arrived;
        self.position = final_pos;
    }
}
