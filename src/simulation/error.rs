//! Error taxonomy for the rail simulation core
//!
//! None of these are fatal to the tick loop. Routing and graph faults are
//! returned to the caller; per-train and oracle faults are collected in the
//! tick report and logged.

use thiserror::Error;

use super::types::{EdgeId, StationId, TrainId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RailError {
    /// No path connects the two stations
    #[error("no path from {from} to {to}")]
    NotFound { from: StationId, to: StationId },

    /// A path or edge references a station the network doesn't have
    #[error("station {0} not found in network")]
    MissingStation(StationId),

    /// The decision oracle failed or timed out
    #[error("decision oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The decision oracle answered with something we can't act on
    #[error("invalid oracle response: {0}")]
    InvalidOracleResponse(String),

    #[error("station {0} already exists")]
    DuplicateStation(StationId),

    /// Two consecutive path stations are not connected by a track edge
    #[error("no track between {from} and {to}")]
    NoTrack { from: StationId, to: StationId },

    #[error("edge {edge} is not incident to switch station {station}")]
    InvalidSwitchSelection { station: StationId, edge: EdgeId },

    #[error("train {0} not found")]
    UnknownTrain(TrainId),

    #[error("path must contain at least one station")]
    EmptyPath,
}

pub type RailResult<T> = Result<T, RailError>;
