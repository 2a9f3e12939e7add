//! Simulation settings and scenario files
//!
//! Everything is optional in JSON; missing fields fall back to the defaults
//! below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::features::FeatureConfig;
use super::train::MotionParams;
use super::types::{DEFAULT_BRAKING_MULTIPLIER, DEFAULT_MIN_SEPARATION_M};

/// Default simulated seconds an oracle request may stay unanswered
pub const DEFAULT_ORACLE_TIMEOUT_S: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Trains closer than this, in metres, are in conflict
    pub min_separation_m: f64,
    /// Speed multiplier while braking
    pub braking_multiplier: f64,
    /// Simulated seconds per tick second
    pub time_scale: f64,
    /// Simulated seconds before an unanswered request fails; 0 disables
    pub oracle_timeout_s: f64,
    /// Route new trains around switches set against them
    pub respect_switches: bool,
    pub features: FeatureConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            min_separation_m: DEFAULT_MIN_SEPARATION_M,
            braking_multiplier: DEFAULT_BRAKING_MULTIPLIER,
            time_scale: 1.0,
            oracle_timeout_s: DEFAULT_ORACLE_TIMEOUT_S,
            respect_switches: true,
            features: FeatureConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn motion_params(&self) -> MotionParams {
        MotionParams {
            braking_multiplier: self.braking_multiplier,
            time_scale: self.time_scale,
        }
    }

    pub fn oracle_timeout(&self) -> Option<f64> {
        (self.oracle_timeout_s > 0.0).then_some(self.oracle_timeout_s)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationSpec {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub directed: bool,
}

/// Select, at `station`, the edge leading to `towards`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwitchSpec {
    pub station: String,
    pub towards: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthSpec {
    pub a: String,
    pub b: String,
    pub factor: f64,
}

fn default_priority() -> u8 {
    1
}

/// A train given either by endpoints (routed) or by an explicit path
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainSpec {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub path: Option<Vec<String>>,
    pub speed: f64,
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Legacy status string; unknown values load as STOPPED
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SimConfig,
    pub stations: Vec<StationSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub switches: Vec<SwitchSpec>,
    #[serde(default)]
    pub segment_health: Vec<HealthSpec>,
    #[serde(default)]
    pub trains: Vec<TrainSpec>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse scenario JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&json)
    }
}
