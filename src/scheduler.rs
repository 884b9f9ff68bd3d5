use crate::error::ProtocolError;
use crate::occupancy::{Occupancy, OccupancyRecord};
use crate::policy::{AccessPolicy, Decision, PolicyKind};
use crate::protocol::Message;
use crate::queue::ReservationQueue;
use crate::request::{VehicleAddr, VehicleRequest};
use crate::topology::Topology;
use crate::util::Millis;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Queued requests not sent again within this period are dropped.
pub const DEFAULT_REQUEST_TTL: Millis = 10_000; // ms

/// Requests whose times are further than this from the current time are discarded.
pub const MAX_HORIZON: Millis = 600_000; // ms

/// A message to be sent to a vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub to: VehicleAddr,
    pub msg: Message,
}

/// The result of one scheduling cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The queue was empty.
    Idle,
    /// The head of the queue was granted access.
    Granted(Outgoing),
    /// The head of the queue was given revised estimates.
    Delayed {
        vehicle: VehicleAddr,
        eta: Millis,
        etc: Millis,
    },
    /// The head of the queue must wait for an occupant to exit.
    Held(VehicleAddr),
}

/// Counts of what the scheduler has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Requests accepted into the queue.
    pub requests: usize,
    /// Requests granted access.
    pub granted: usize,
    /// Times a request's estimates were revised.
    pub delayed: usize,
    /// Grants sent again in reply to a duplicate request.
    pub regranted: usize,
    /// Exit notifications that released a claim.
    pub exits: usize,
    /// Messages that were discarded as unexpected or invalid.
    pub anomalies: usize,
    /// Requests and claims dropped for inactivity.
    pub expired: usize,
}

/// The admission controller for one intersection.
///
/// The scheduler owns the reservation queue and the occupancy records.
/// It performs no I/O and never reads the clock: callers pass the current time in,
/// and send the messages it returns.
pub struct Scheduler {
    /// The intersection being managed.
    topology: Arc<Topology>,
    /// The admission rule.
    policy: AccessPolicy,
    /// Requests waiting to be admitted.
    queue: ReservationQueue,
    /// Vehicles holding claims on the intersection.
    occupancy: Occupancy,
    /// Inactivity timeout for queued requests, in ms.
    request_ttl: Millis,
    /// The address placed in the `sender` field of outgoing messages.
    local_addr: SocketAddr,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Creates a scheduler with an empty queue.
    pub fn new(topology: Arc<Topology>, policy: PolicyKind, local_addr: SocketAddr) -> Self {
        Self {
            topology,
            policy: AccessPolicy::new(policy),
            queue: ReservationQueue::new(),
            occupancy: Occupancy::new(),
            request_ttl: DEFAULT_REQUEST_TTL,
            local_addr,
            stats: SchedulerStats::default(),
        }
    }

    /// Sets the inactivity timeout in ms.
    pub fn with_request_ttl(mut self, request_ttl: Millis) -> Self {
        self.request_ttl = request_ttl;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &ReservationQueue {
        &self.queue
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn request_ttl(&self) -> Millis {
        self.request_ttl
    }

    /// Processes a message received from a vehicle, returning the reply to send, if any.
    pub fn handle_message(&mut self, msg: Message, now: Millis) -> Option<Outgoing> {
        match msg {
            Message::RequestAccess {
                sender,
                lane,
                eta,
                etc,
                velocity,
            } => {
                if let Some(record) = self.occupancy.get(&sender) {
                    if eta < record.window.max {
                        // The vehicle did not hear its grant; repeat it.
                        debug!("{} asked again, repeating its grant", sender);
                        self.stats.regranted += 1;
                        return Some(Outgoing {
                            to: sender,
                            msg: Message::grant(self.local_addr, record.grant),
                        });
                    }
                    // A new approach: the exit notification for the last one was lost.
                    warn!(
                        "{} is approaching again without having exited {:?}, releasing its claim",
                        sender, record.window
                    );
                    self.occupancy.remove(&sender);
                    self.stats.anomalies += 1;
                }
                if self.queue.contains(&sender) {
                    debug!("{} is already queued", sender);
                    self.queue.touch(&sender, now);
                    return None;
                }
                if let Err(err) = self.topology.validate(&lane).map_err(ProtocolError::from) {
                    warn!("Discarding request from {}: {}", sender, err);
                    self.stats.anomalies += 1;
                    return None;
                }
                if eta.abs_diff(now) > MAX_HORIZON as u64
                    || etc.abs_diff(now) > MAX_HORIZON as u64
                {
                    let err = ProtocolError::OutOfHorizon { eta, etc, now };
                    warn!("Discarding request from {}: {}", sender, err);
                    self.stats.anomalies += 1;
                    return None;
                }
                match VehicleRequest::new(sender, lane, eta, etc, now) {
                    Ok(mut request) => {
                        request.velocity = velocity;
                        info!("{} requests {} for [{}, {})", sender, lane, eta, etc);
                        if self.queue.enqueue(request) {
                            self.stats.requests += 1;
                        }
                    }
                    Err(err) => {
                        warn!("Discarding request from {}: {}", sender, err);
                        self.stats.anomalies += 1;
                    }
                }
                None
            }
            Message::Exiting { sender } => {
                match self.occupancy.remove(&sender) {
                    Some(record) => {
                        info!(
                            "{} exited, {} ms after it was granted access",
                            sender,
                            now - record.granted_at
                        );
                        self.stats.exits += 1;
                    }
                    None => {
                        if self.queue.remove(&sender).is_some() {
                            info!("{} exited without a grant, its request was cancelled", sender);
                        } else {
                            warn!("Unexpected exit from {}, ignoring", sender);
                            self.stats.anomalies += 1;
                        }
                    }
                }
                None
            }
            other => {
                warn!("Unexpected {} from {}, ignoring", other.kind(), other.sender());
                self.stats.anomalies += 1;
                None
            }
        }
    }

    /// Runs one scheduling cycle: evaluates the request at the head of the queue,
    /// then either admits it or revises its estimates.
    pub fn step(&mut self, now: Millis) -> StepOutcome {
        let (vehicle, decision) = match self.queue.peek_head() {
            Ok(head) => (
                head.vehicle,
                self.policy
                    .decide(head, &self.occupancy, &self.topology, now),
            ),
            Err(_) => return StepOutcome::Idle,
        };
        self.queue.log_contents();

        match decision {
            Decision::Admit => {
                let mut request = match self.queue.dequeue_head() {
                    Ok(request) => request,
                    Err(_) => return StepOutcome::Idle,
                };
                let grant = self.policy.grant_for(&request);
                self.policy.admitted(&request);
                request.allowed = true;
                info!(
                    "Granting {} access on {} for [{}, {})",
                    vehicle,
                    request.lane,
                    request.eta(),
                    request.etc()
                );
                self.occupancy
                    .insert(OccupancyRecord::new(&request, grant, now));
                self.stats.granted += 1;
                StepOutcome::Granted(Outgoing {
                    to: vehicle,
                    msg: Message::grant(self.local_addr, grant),
                })
            }
            Decision::Delay { eta, etc } => {
                debug!("Delaying {} to [{}, {})", vehicle, eta, etc);
                self.queue.reschedule(&vehicle, eta, etc);
                self.stats.delayed += 1;
                StepOutcome::Delayed { vehicle, eta, etc }
            }
            Decision::Hold => {
                debug!("{} must wait for the intersection to empty", vehicle);
                StepOutcome::Held(vehicle)
            }
        }
    }

    /// Drops queued requests which have not been sent again recently and,
    /// for the reservation policy, claims which ended long ago.
    /// Returns the affected vehicles.
    pub fn expire(&mut self, now: Millis) -> Vec<VehicleAddr> {
        let cutoff = now - self.request_ttl;
        let mut expired = self
            .queue
            .remove_stale(cutoff)
            .into_iter()
            .map(|request| {
                warn!("Request from {} timed out, dropping it", request.vehicle);
                request.vehicle
            })
            .collect::<Vec<_>>();
        if self.policy.kind() == PolicyKind::Reservation {
            for record in self.occupancy.remove_ended(cutoff) {
                info!(
                    "Releasing {} whose reservation ended at {}",
                    record.vehicle, record.window.max
                );
                expired.push(record.vehicle);
            }
        }
        self.stats.expired += expired.len();
        expired
    }

    /// Describes the scheduler's state, for debugging.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "policy": self.policy.kind(),
            "next_available_etc": self.policy.next_available_etc(),
            "queue": self.queue.iter().collect::<Vec<_>>(),
            "occupancy": self.occupancy.iter().collect::<Vec<_>>(),
            "stats": self.stats,
        })
    }
}
