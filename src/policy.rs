//! The rules deciding whether the vehicle at the head of the queue may cross.

use crate::occupancy::Occupancy;
use crate::protocol::Grant;
use crate::request::VehicleRequest;
use crate::topology::Topology;
use crate::util::Millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects an [AccessPolicy].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// One vehicle at a time.
    Sequential,
    /// Non-overlapping time slots.
    Reservation,
    /// Vehicles on non-conflicting lanes may cross together.
    Parallel,
}

/// The outcome of evaluating a request against the current occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Grant access now.
    Admit,
    /// Leave the request queued with revised estimates.
    Delay { eta: Millis, etc: Millis },
    /// Leave the request queued unchanged until an occupant exits.
    Hold,
}

/// An admission policy, along with any state it keeps between decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Mutual exclusion: a vehicle is admitted only when the intersection is empty,
    /// and holds it until it reports that it has exited.
    Sequential,
    /// Time slots: a vehicle is admitted if it arrives no earlier than the previous
    /// vehicle clears, and is told the time at which it may enter.
    Reservation {
        /// When the most recently admitted vehicle clears the intersection.
        next_available_etc: Millis,
    },
    /// A vehicle is admitted unless a vehicle on a conflicting lane holds a claim.
    /// A claim that has outlived its estimate is taken to end at the current time,
    /// so a request it blocks is delayed to the current time whenever the clock has
    /// moved past the request's estimate, and held otherwise, until the claim is released.
    Parallel,
}

impl AccessPolicy {
    /// Creates a policy in its initial state.
    pub fn new(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Sequential => AccessPolicy::Sequential,
            PolicyKind::Reservation => AccessPolicy::Reservation {
                next_available_etc: -1,
            },
            PolicyKind::Parallel => AccessPolicy::Parallel,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            AccessPolicy::Sequential => PolicyKind::Sequential,
            AccessPolicy::Reservation { .. } => PolicyKind::Reservation,
            AccessPolicy::Parallel => PolicyKind::Parallel,
        }
    }

    /// The time at which the intersection next becomes free, for the reservation policy.
    pub fn next_available_etc(&self) -> Option<Millis> {
        match self {
            AccessPolicy::Reservation { next_available_etc } => Some(*next_available_etc),
            _ => None,
        }
    }

    /// Decides what to do with a request.
    ///
    /// # Parameters
    /// * `request` - The request at the head of the queue.
    /// * `occupancy` - The vehicles currently holding claims.
    /// * `topology` - The intersection, used to check for conflicting lanes.
    /// * `now` - The current time.
    pub fn decide(
        &self,
        request: &VehicleRequest,
        occupancy: &Occupancy,
        topology: &Topology,
        now: Millis,
    ) -> Decision {
        match self {
            AccessPolicy::Sequential => {
                if occupancy.is_empty() {
                    Decision::Admit
                } else {
                    Decision::Hold
                }
            }
            AccessPolicy::Reservation { next_available_etc } => {
                let next = *next_available_etc;
                if request.eta() >= next {
                    Decision::Admit
                } else {
                    let window = request.window().starting_at(next);
                    Decision::Delay {
                        eta: window.min,
                        etc: window.max,
                    }
                }
            }
            AccessPolicy::Parallel => {
                // A claim lasts until its holder exits, so a conflicting claim blocks
                // the request however their estimates compare.
                let blocked_until = occupancy
                    .iter()
                    .filter(|record| topology.conflicts(&record.lane, &request.lane))
                    .map(|record| record.window.extended_to(now).max)
                    .max();
                match blocked_until {
                    None => Decision::Admit,
                    Some(end) if end > request.eta() => {
                        let window = request.window().starting_at(end);
                        Decision::Delay {
                            eta: window.min,
                            etc: window.max,
                        }
                    }
                    Some(_) => Decision::Hold,
                }
            }
        }
    }

    /// Returns true if the request may be granted now.
    pub fn can_admit(
        &self,
        request: &VehicleRequest,
        occupancy: &Occupancy,
        topology: &Topology,
        now: Millis,
    ) -> bool {
        self.decide(request, occupancy, topology, now) == Decision::Admit
    }

    /// The grant given to an admitted request.
    pub fn grant_for(&self, request: &VehicleRequest) -> Grant {
        match self {
            AccessPolicy::Reservation { .. } => Grant::At {
                confirmed_eta: request.eta(),
            },
            _ => Grant::Immediate,
        }
    }

    /// Updates the policy's state after the request has been admitted.
    pub(crate) fn admitted(&mut self, request: &VehicleRequest) {
        if let AccessPolicy::Reservation { next_available_etc } = self {
            debug_assert!(request.etc() >= *next_available_etc);
            *next_available_etc = request.etc().max(*next_available_etc);
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Sequential => write!(f, "sequential"),
            PolicyKind::Reservation => write!(f, "reservation"),
            PolicyKind::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(PolicyKind::Sequential),
            "reservation" => Ok(PolicyKind::Reservation),
            "parallel" => Ok(PolicyKind::Parallel),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}
