//! Standalone rail simulation module
//!
//! Core network, routing, motion, conflict arbitration and feature logic.
//! Everything here runs headless and can be driven from tests or the CLI.

mod arbitration;
mod collision;
mod config;
mod error;
mod features;
mod load;
mod oracle;
mod proximity;
mod rail_network;
mod router;
mod train;
mod types;
mod world;

// Re-export public types for external use
pub use arbitration::{
    ArbitrationEvent, ArbitrationRequest, ConflictResolver, DecisionOracle, OracleAction,
    OracleReply, OracleResponse, OracleTrain, RequestId,
};
pub use collision::{collision_risks, CollisionRisk};
pub use config::{
    EdgeSpec, HealthSpec, Scenario, SimConfig, StationSpec, SwitchSpec, TrainSpec,
    DEFAULT_ORACLE_TIMEOUT_S,
};
pub use error::{RailError, RailResult};
pub use features::{aggregate, Feature, FeatureConfig, FeatureVector};
pub use load::{network_load, LoadIndicators, NetworkLoad};
pub use oracle::{OfflineOracle, PriorityOracle, ThreadedOracle};
pub use proximity::{detect_conflicts, Conflict, ConflictPair};
pub use rail_network::{RailNetwork, Station, TrackEdge};
pub use router::{route, route_respecting_switches};
pub use train::{MotionParams, SimTrain, TrainUpdateResult};
pub use types::{
    kmh_to_mps, EdgeId, GeoPoint, SimId, StationId, TrainId, TrainStatus,
    DEFAULT_BRAKING_MULTIPLIER, DEFAULT_MIN_SEPARATION_M, EARTH_RADIUS_M, MIN_SEGMENT_HEALTH,
    PROGRESS_EPSILON,
};
pub use world::{SimStats, SimWorld, TickReport};
