//! Rail Simulation Library
//!
//! A railway network simulation with routing, train motion, proximity
//! conflict arbitration and feature extraction.

pub mod simulation;
