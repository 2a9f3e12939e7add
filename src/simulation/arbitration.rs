//! Conflict resolution between converging trains
//!
//! When two trains come within the minimum separation both are stopped on
//! the spot, then an external decision oracle is asked which one may move.
//! Oracle replies never touch train state directly: they are queued on a
//! channel and applied at the start of the next tick, so the tick loop is
//! the only writer.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};

use super::error::{RailError, RailResult};
use super::proximity::{Conflict, ConflictPair};
use super::train::SimTrain;
use super::types::{GeoPoint, TrainId, TrainStatus};

/// Identifier tying an oracle reply to the request it answers
pub type RequestId = u64;

/// One train's entry in an arbitration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleTrain {
    pub train_id: TrainId,
    pub position: GeoPoint,
    pub speed: f64,
    pub priority: u8,
}

impl OracleTrain {
    fn from_train(train: &SimTrain) -> Self {
        Self {
            train_id: train.id,
            position: train.position,
            speed: train.speed,
            priority: train.priority,
        }
    }
}

/// What the oracle is asked about a conflicting pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationRequest {
    pub request_id: RequestId,
    pub trains: Vec<OracleTrain>,
}

/// Actions the protocol understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleAction {
    /// Stop the named train, let the other pass
    StopOne,
    /// Keep both trains stopped
    StopBoth,
    /// Let the named train pass, keep the other stopped
    LetPass,
}

impl OracleAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "STOP_ONE" => Some(OracleAction::StopOne),
            "STOP_BOTH" => Some(OracleAction::StopBoth),
            "LET_PASS" => Some(OracleAction::LetPass),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleAction::StopOne => "STOP_ONE",
            OracleAction::StopBoth => "STOP_BOTH",
            OracleAction::LetPass => "LET_PASS",
        }
    }
}

/// Raw oracle answer, as it comes off the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleResponse {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_train_id: Option<TrainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub let_pass_id: Option<TrainId>,
}

impl OracleResponse {
    pub fn stop_one(stop: TrainId) -> Self {
        Self {
            action: OracleAction::StopOne.as_str().to_string(),
            stop_train_id: Some(stop),
            let_pass_id: None,
        }
    }

    pub fn let_pass(pass: TrainId) -> Self {
        Self {
            action: OracleAction::LetPass.as_str().to_string(),
            stop_train_id: None,
            let_pass_id: Some(pass),
        }
    }

    pub fn stop_both() -> Self {
        Self {
            action: OracleAction::StopBoth.as_str().to_string(),
            stop_train_id: None,
            let_pass_id: None,
        }
    }

    /// Parse a transport payload
    pub fn from_json(payload: &str) -> RailResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| RailError::InvalidOracleResponse(format!("malformed payload: {e}")))
    }

    /// Work out which train, if any, may resume.
    ///
    /// Unknown actions, missing ids and ids outside the pair are errors;
    /// callers treat them like STOP_BOTH.
    pub fn interpret(&self, pair: &ConflictPair) -> RailResult<Option<TrainId>> {
        let action = OracleAction::parse(&self.action).ok_or_else(|| {
            RailError::InvalidOracleResponse(format!("unknown action {:?}", self.action))
        })?;

        match action {
            OracleAction::StopBoth => Ok(None),
            OracleAction::StopOne => {
                let stop = self.stop_train_id.ok_or_else(|| {
                    RailError::InvalidOracleResponse("STOP_ONE without stopTrainId".to_string())
                })?;
                pair.other(stop).map(Some).ok_or_else(|| {
                    RailError::InvalidOracleResponse(format!("{stop} is not part of {pair}"))
                })
            }
            OracleAction::LetPass => {
                let pass = self.let_pass_id.ok_or_else(|| {
                    RailError::InvalidOracleResponse("LET_PASS without letPassId".to_string())
                })?;
                if pair.contains(pass) {
                    Ok(Some(pass))
                } else {
                    Err(RailError::InvalidOracleResponse(format!(
                        "{pass} is not part of {pair}"
                    )))
                }
            }
        }
    }
}

struct OracleMessage {
    request_id: RequestId,
    outcome: RailResult<OracleResponse>,
}

/// Handle an oracle uses to answer one request.
///
/// Sending only queues the answer; it takes effect on the next tick.
/// Handles may be cloned, moved to other threads, sent late or sent twice.
#[derive(Clone)]
pub struct OracleReply {
    request_id: RequestId,
    sender: Sender<OracleMessage>,
}

impl OracleReply {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn send(&self, outcome: RailResult<OracleResponse>) {
        let message = OracleMessage {
            request_id: self.request_id,
            outcome,
        };
        if self.sender.send(message).is_err() {
            debug!(
                "Dropped oracle reply for request {}: simulation is gone",
                self.request_id
            );
        }
    }
}

/// The external decision maker consulted for each conflict.
///
/// `submit` must not block the tick: answer through `reply`, now or later.
pub trait DecisionOracle {
    fn submit(&mut self, request: ArbitrationRequest, reply: OracleReply);
}

/// Something the protocol did, reported back to the tick loop
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationEvent {
    /// Both trains were stopped and the oracle was asked
    Requested {
        request_id: RequestId,
        pair: ConflictPair,
    },
    /// A reply was applied; `resumed` is the train set running, if any
    Resolved {
        request_id: RequestId,
        pair: ConflictPair,
        resumed: Option<TrainId>,
    },
    /// The oracle failed, timed out or answered nonsense; both stay stopped
    Failed {
        request_id: RequestId,
        pair: ConflictPair,
        error: RailError,
    },
    /// A reply that no longer applies (duplicate, superseded or unknown)
    Ignored { request_id: RequestId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RequestState {
    Pending { issued_at: f64 },
    /// Failed for lack of an answer; a late reply is still honoured
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
struct RequestRecord {
    pair: ConflictPair,
    state: RequestState,
}

/// Drives the stop / ask / apply cycle for every conflicting pair
pub struct ConflictResolver {
    sender: Sender<OracleMessage>,
    receiver: Receiver<OracleMessage>,
    /// Requests that may still be answered. Resolved and superseded
    /// requests are dropped.
    requests: HashMap<RequestId, RequestRecord>,
    /// Pair -> request still awaiting an answer
    in_flight: HashMap<ConflictPair, RequestId>,
    /// Pairs answered, failed or timed out while still in conflict. They
    /// are not asked again while both trains stay stopped.
    settled: HashSet<ConflictPair>,
    next_request_id: RequestId,
    /// Simulation seconds before a pending request counts as failed;
    /// `None` waits forever
    timeout_s: Option<f64>,
}

impl ConflictResolver {
    pub fn new(timeout_s: Option<f64>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            requests: HashMap::new(),
            in_flight: HashMap::new(),
            settled: HashSet::new(),
            next_request_id: 0,
            timeout_s: timeout_s.filter(|t| *t > 0.0),
        }
    }

    pub fn set_timeout(&mut self, timeout_s: Option<f64>) {
        self.timeout_s = timeout_s.filter(|t| *t > 0.0);
    }

    pub fn is_in_flight(&self, pair: &ConflictPair) -> bool {
        self.in_flight.contains_key(pair)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Requests still able to accept a reply, pending or timed out
    pub fn open_request_count(&self) -> usize {
        self.requests.len()
    }

    /// Whether `train` belongs to a pair still awaiting an answer
    pub fn awaits_answer(&self, train: TrainId) -> bool {
        self.in_flight.keys().any(|pair| pair.contains(train))
    }

    /// Stop both trains of every newly conflicting pair and ask the oracle.
    ///
    /// No new request is made while one for the pair is in flight (its
    /// trains are only held), or when the pair was already answered and
    /// both trains are still stopped. A pair whose trains were stopped by
    /// other pairs but that was never asked itself is asked.
    pub fn handle_conflicts(
        &mut self,
        conflicts: &[Conflict],
        trains: &mut BTreeMap<TrainId, SimTrain>,
        oracle: &mut dyn DecisionOracle,
        now: f64,
    ) -> Vec<ArbitrationEvent> {
        // Pairs that drifted apart start over
        self.settled
            .retain(|pair| conflicts.iter().any(|conflict| conflict.pair == *pair));

        let mut events = Vec::new();
        for conflict in conflicts {
            let pair = conflict.pair;
            if self.is_in_flight(&pair) {
                hold(trains, &pair);
                continue;
            }

            let (Some(a), Some(b)) = (trains.get(&pair.first), trains.get(&pair.second)) else {
                continue;
            };
            let both_stopped =
                a.status == TrainStatus::Stopped && b.status == TrainStatus::Stopped;
            if both_stopped && self.settled.contains(&pair) {
                continue;
            }

            warn!(
                "Conflict between {} and {} at {:.0}m, stopping both",
                pair.first, pair.second, conflict.distance_m
            );
            hold(trains, &pair);

            let request = ArbitrationRequest {
                request_id: self.issue_request(pair, now),
                trains: pair
                    .members()
                    .iter()
                    .filter_map(|id| trains.get(id))
                    .map(OracleTrain::from_train)
                    .collect(),
            };
            let reply = OracleReply {
                request_id: request.request_id,
                sender: self.sender.clone(),
            };
            events.push(ArbitrationEvent::Requested {
                request_id: request.request_id,
                pair,
            });
            oracle.submit(request, reply);
        }

        events
    }

    fn issue_request(&mut self, pair: ConflictPair, now: f64) -> RequestId {
        // A fresh request supersedes any timed-out one for the same pair
        self.requests.retain(|_, record| record.pair != pair);
        self.settled.remove(&pair);

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.requests.insert(
            request_id,
            RequestRecord {
                pair,
                state: RequestState::Pending { issued_at: now },
            },
        );
        self.in_flight.insert(pair, request_id);
        request_id
    }

    /// Apply every queued oracle reply
    pub fn apply_responses(
        &mut self,
        trains: &mut BTreeMap<TrainId, SimTrain>,
    ) -> Vec<ArbitrationEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            events.push(self.apply_message(message, trains));
        }
        events
    }

    fn apply_message(
        &mut self,
        message: OracleMessage,
        trains: &mut BTreeMap<TrainId, SimTrain>,
    ) -> ArbitrationEvent {
        let request_id = message.request_id;
        let Some(record) = self.requests.remove(&request_id) else {
            if request_id < self.next_request_id {
                debug!("Ignoring stale reply for request {}", request_id);
            } else {
                debug!("Reply for unknown request {}", request_id);
            }
            return ArbitrationEvent::Ignored { request_id };
        };

        let pair = record.pair;
        if self.in_flight.get(&pair) == Some(&request_id) {
            self.in_flight.remove(&pair);
        }

        if !pair.members().iter().all(|id| trains.contains_key(id)) {
            debug!("Request {} answered after {} left the simulation", request_id, pair);
            return ArbitrationEvent::Ignored { request_id };
        }
        self.settled.insert(pair);

        let resumed = match message
            .outcome
            .and_then(|response| response.interpret(&pair))
        {
            Ok(resumed) => resumed,
            Err(error) => {
                warn!(
                    "Arbitration for {} failed, keeping both stopped: {}",
                    pair, error
                );
                hold(trains, &pair);
                return ArbitrationEvent::Failed {
                    request_id,
                    pair,
                    error,
                };
            }
        };

        hold(trains, &pair);
        let resumed = match resumed {
            Some(id) if self.awaits_answer(id) => {
                info!(
                    "Arbitration for {}: {} may proceed but still awaits another answer",
                    pair, id
                );
                None
            }
            other => other,
        };
        if let Some(id) = resumed {
            if let Some(train) = trains.get_mut(&id) {
                if !train.is_arrived() {
                    train.status = TrainStatus::Running;
                }
            }
        }

        match resumed {
            Some(id) => info!("Arbitration for {}: {} proceeds", pair, id),
            None => info!("Arbitration for {}: both hold", pair),
        }
        ArbitrationEvent::Resolved {
            request_id,
            pair,
            resumed,
        }
    }

    /// Fail every request that has waited longer than the timeout.
    /// Its trains stay stopped; a late reply is still honoured.
    pub fn expire_requests(&mut self, now: f64) -> Vec<ArbitrationEvent> {
        let Some(timeout_s) = self.timeout_s else {
            return Vec::new();
        };

        let mut expired: Vec<(RequestId, ConflictPair)> = self
            .requests
            .iter()
            .filter_map(|(id, record)| match record.state {
                RequestState::Pending { issued_at } if now - issued_at >= timeout_s => {
                    Some((*id, record.pair))
                }
                _ => None,
            })
            .collect();
        expired.sort_by_key(|(id, _)| *id);

        expired
            .into_iter()
            .map(|(request_id, pair)| {
                if let Some(record) = self.requests.get_mut(&request_id) {
                    record.state = RequestState::TimedOut;
                }
                self.in_flight.remove(&pair);
                self.settled.insert(pair);
                warn!(
                    "Oracle request {} for {} timed out after {:.1}s",
                    request_id, pair, timeout_s
                );
                ArbitrationEvent::Failed {
                    request_id,
                    pair,
                    error: RailError::OracleUnavailable(format!(
                        "no reply within {timeout_s:.1}s"
                    )),
                }
            })
            .collect()
    }
}

/// Keep both trains of a pair stopped, unless they already arrived
fn hold(trains: &mut BTreeMap<TrainId, SimTrain>, pair: &ConflictPair) {
    for id in pair.members() {
        if let Some(train) = trains.get_mut(&id) {
            if !train.is_arrived() {
                train.status = TrainStatus::Stopped;
            }
        }
    }
}
