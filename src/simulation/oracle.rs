//! Local decision oracles
//!
//! Stand-ins for a remote arbitration service. Their answers still go
//! through the reply queue, so they take effect on the next tick exactly
//! like a network reply would.

use log::debug;
use std::sync::Arc;
use std::thread;

use super::arbitration::{ArbitrationRequest, DecisionOracle, OracleReply, OracleResponse};
use super::error::{RailError, RailResult};

/// The lower-priority train stops and the other passes.
/// On a tie the first train in the request stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityOracle;

impl PriorityOracle {
    pub fn decide(request: &ArbitrationRequest) -> RailResult<OracleResponse> {
        let [a, b] = request.trains.as_slice() else {
            return Err(RailError::InvalidOracleResponse(format!(
                "expected two trains, got {}",
                request.trains.len()
            )));
        };

        let low = if a.priority <= b.priority { a } else { b };
        Ok(OracleResponse::stop_one(low.train_id))
    }
}

impl DecisionOracle for PriorityOracle {
    fn submit(&mut self, request: ArbitrationRequest, reply: OracleReply) {
        let outcome = Self::decide(&request);
        debug!("Priority oracle answered request {}", request.request_id);
        reply.send(outcome);
    }
}

/// An oracle that can never be reached; every request fails
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineOracle;

impl DecisionOracle for OfflineOracle {
    fn submit(&mut self, request: ArbitrationRequest, reply: OracleReply) {
        reply.send(Err(RailError::OracleUnavailable(format!(
            "oracle offline, request {} not delivered",
            request.request_id
        ))));
    }
}

type DecideFn = dyn Fn(&ArbitrationRequest) -> RailResult<OracleResponse> + Send + Sync;

/// Runs a decision function on a worker thread per request, the way a
/// blocking HTTP client would be driven
#[derive(Clone)]
pub struct ThreadedOracle {
    decide: Arc<DecideFn>,
}

impl ThreadedOracle {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&ArbitrationRequest) -> RailResult<OracleResponse> + Send + Sync + 'static,
    {
        Self {
            decide: Arc::new(decide),
        }
    }
}

impl DecisionOracle for ThreadedOracle {
    fn submit(&mut self, request: ArbitrationRequest, reply: OracleReply) {
        let decide = Arc::clone(&self.decide);
        thread::spawn(move || {
            let outcome = decide(&request);
            reply.send(outcome);
        });
    }
}
