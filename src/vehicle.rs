//! The vehicle side of the protocol.
//!
//! [VehicleClient] is a state machine driven by three inputs: events from the motion
//! layer, messages from the server, and a periodic tick. Each input returns the
//! [Action]s the caller must carry out, so the machine itself performs no I/O.

use self::estimate::Estimator;
use self::fallback::{LocalFallback, RangeReadings};
use crate::error::ClientError;
use crate::protocol::{Grant, Message};
use crate::request::VehicleAddr;
use crate::topology::LaneSpec;
use crate::util::Millis;
use log::{debug, info, warn};
use smallvec::{smallvec, SmallVec};

pub mod driver;
pub mod estimate;
pub mod fallback;
pub mod motion;

/// How often an unanswered request is sent again.
pub const DEFAULT_RETRANSMIT_MS: Millis = 1000;

/// How long to wait for a grant before falling back to local control.
pub const DEFAULT_GRANT_TIMEOUT_MS: Millis = 5000;

/// How often the client ticks.
pub const DEFAULT_CYCLE_MS: Millis = 100;

/// The state of a vehicle with respect to the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Not driving.
    Idle,
    /// Driving normally, possibly through the intersection with a grant.
    FollowingLane,
    /// Approaching the intersection and waiting for the server's answer.
    AwaitingRemoteGrant,
    /// Crossing by relying on the vehicle's own sensors.
    LocalFallback,
}

/// An event raised by the motion layer.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionEvent {
    /// The vehicle is nearing the intersection.
    Approaching,
    /// The vehicle has reached the entry line.
    Entering,
    /// The vehicle has left the intersection.
    Exiting,
    /// The motion layer failed.
    Error(String),
}

/// A command to the motion layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Stop,
    Go,
}

/// Something the caller must do on behalf of the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Send a message to the server.
    Send(Message),
    /// Command the motion layer.
    Motion(Command),
    /// Local fallback ended; `success` is true if the vehicle crossed under its own control.
    FallbackFinished { success: bool },
}

pub type Actions = SmallVec<[Action; 2]>;

/// Timing parameters of the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientParams {
    /// The interval between retransmissions of an unanswered request, in ms.
    pub retransmit_ms: Millis,
    /// How long to wait for a grant before falling back, in ms.
    pub grant_timeout_ms: Millis,
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            retransmit_ms: DEFAULT_RETRANSMIT_MS,
            grant_timeout_ms: DEFAULT_GRANT_TIMEOUT_MS,
        }
    }
}

/// A request which has not been answered yet.
#[derive(Clone, Copy, Debug)]
struct PendingRequest {
    eta: Millis,
    etc: Millis,
    /// When the request was first sent.
    first_sent: Millis,
    /// When the request was last sent.
    last_sent: Millis,
}

/// The client state machine of one vehicle.
#[derive(Clone, Debug)]
pub struct VehicleClient {
    /// The address replies are sent to, which also identifies the vehicle.
    addr: VehicleAddr,
    /// The lanes the vehicle uses to cross.
    lane: LaneSpec,
    estimator: Estimator,
    params: ClientParams,
    fallback: LocalFallback,
    state: ClientState,
    /// The outstanding request, while awaiting a grant.
    pending: Option<PendingRequest>,
    /// Permission to cross the intersection on this approach.
    grant: Option<Grant>,
    /// Whether the client has stopped the vehicle.
    halted: bool,
    /// The time at which a halted vehicle may go again.
    resume_at: Option<Millis>,
}

impl VehicleClient {
    /// Creates an idle client.
    pub fn new(
        addr: VehicleAddr,
        lane: LaneSpec,
        estimator: Estimator,
        params: ClientParams,
        fallback: LocalFallback,
    ) -> Self {
        Self {
            addr,
            lane,
            estimator,
            params,
            fallback,
            state: ClientState::Idle,
            pending: None,
            grant: None,
            halted: false,
            resume_at: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn addr(&self) -> VehicleAddr {
        self.addr
    }

    pub fn lane(&self) -> LaneSpec {
        self.lane
    }

    /// The grant held for the current approach.
    pub fn grant(&self) -> Option<Grant> {
        self.grant
    }

    /// Returns true if the client has stopped the vehicle.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Starts driving.
    pub fn start(&mut self) -> Actions {
        if self.state != ClientState::Idle {
            return smallvec![];
        }
        info!("{} starting on {}", self.addr, self.lane);
        self.state = ClientState::FollowingLane;
        self.go()
    }

    /// Stops driving and abandons any approach in progress.
    pub fn stop(&mut self) -> Actions {
        let mut actions = Actions::new();
        if self.state == ClientState::LocalFallback {
            actions.push(Action::FallbackFinished { success: false });
        }
        info!("{} stopping", self.addr);
        self.reset();
        self.state = ClientState::Idle;
        self.halted = true;
        actions.push(Action::Motion(Command::Stop));
        actions
    }

    /// Handles an event from the motion layer.
    /// A motion layer error is fatal: the client becomes idle and the error is returned.
    pub fn on_motion_event(
        &mut self,
        event: MotionEvent,
        now: Millis,
    ) -> Result<Actions, ClientError> {
        debug!("{} in state {:?} got {:?}", self.addr, self.state, event);
        if let MotionEvent::Error(err) = event {
            self.reset();
            self.state = ClientState::Idle;
            return Err(ClientError::Motion(err));
        }
        if self.state == ClientState::Idle {
            debug!("{} is idle, ignoring {:?}", self.addr, event);
            return Ok(smallvec![]);
        }

        let actions = match event {
            MotionEvent::Approaching => match self.state {
                ClientState::FollowingLane if self.grant.is_none() => self.request(now),
                _ => smallvec![],
            },
            MotionEvent::Entering => self.entering(now),
            MotionEvent::Exiting => self.exiting(),
            MotionEvent::Error(_) => smallvec![],
        };
        Ok(actions)
    }

    /// Handles a message from the server.
    pub fn on_message(&mut self, msg: &Message, now: Millis) -> Actions {
        let grant = match msg.as_grant() {
            Some(grant) => grant,
            None => {
                warn!("{} got an unexpected {}, ignoring", self.addr, msg.kind());
                return smallvec![];
            }
        };
        if self.state != ClientState::AwaitingRemoteGrant {
            debug!("{} is not waiting for a grant, ignoring {:?}", self.addr, grant);
            return smallvec![];
        }

        info!("{} was granted access: {:?}", self.addr, grant);
        self.pending = None;
        self.grant = Some(grant);
        self.state = ClientState::FollowingLane;
        if !self.halted {
            return smallvec![];
        }
        match grant {
            Grant::At { confirmed_eta } if now < confirmed_eta => {
                self.resume_at = Some(confirmed_eta);
                smallvec![]
            }
            _ => self.go(),
        }
    }

    /// Reports that the server cannot be reached.
    pub fn on_server_unreachable(&mut self, now: Millis) -> Actions {
        match self.state {
            ClientState::AwaitingRemoteGrant => {
                warn!("{} cannot reach the server at {}", self.addr, now);
                self.enter_fallback()
            }
            _ => smallvec![],
        }
    }

    /// Performs periodic work: retransmission, grant timeouts, resuming at a reserved
    /// time, and local fallback decisions.
    pub fn tick(&mut self, now: Millis, readings: Option<&RangeReadings>) -> Actions {
        match self.state {
            ClientState::Idle => smallvec![],
            ClientState::FollowingLane => match self.resume_at {
                Some(at) if now >= at => {
                    self.resume_at = None;
                    self.go()
                }
                _ => smallvec![],
            },
            ClientState::AwaitingRemoteGrant => {
                let pending = match self.pending.as_mut() {
                    Some(pending) => pending,
                    None => return self.request(now),
                };
                if now - pending.first_sent >= self.params.grant_timeout_ms {
                    warn!("{} got no grant in time", self.addr);
                    self.enter_fallback()
                } else if now - pending.last_sent >= self.params.retransmit_ms {
                    pending.last_sent = now;
                    let (eta, etc) = (pending.eta, pending.etc);
                    debug!("{} sending its request again", self.addr);
                    smallvec![Action::Send(self.request_msg(eta, etc))]
                } else {
                    smallvec![]
                }
            }
            ClientState::LocalFallback => {
                if self.fallback.is_clear(readings, now) {
                    info!("{} sees the intersection is clear", self.addr);
                    // The vehicle has given itself permission to cross.
                    self.grant = Some(Grant::Immediate);
                    self.state = ClientState::FollowingLane;
                    let mut actions = self.go();
                    actions.push(Action::FallbackFinished { success: true });
                    actions
                } else {
                    self.halt()
                }
            }
        }
    }

    fn request_msg(&self, eta: Millis, etc: Millis) -> Message {
        Message::RequestAccess {
            sender: self.addr,
            lane: self.lane,
            eta,
            etc,
            velocity: Some(self.estimator.speed_cm_s),
        }
    }

    /// Sends a new request and starts waiting for the answer.
    fn request(&mut self, now: Millis) -> Actions {
        let (eta, etc) = self.estimator.estimate(now);
        info!("{} requesting access for [{}, {})", self.addr, eta, etc);
        self.pending = Some(PendingRequest {
            eta,
            etc,
            first_sent: now,
            last_sent: now,
        });
        self.state = ClientState::AwaitingRemoteGrant;
        smallvec![Action::Send(self.request_msg(eta, etc))]
    }

    fn entering(&mut self, now: Millis) -> Actions {
        match (self.state, self.grant) {
            (ClientState::FollowingLane, Some(Grant::At { confirmed_eta })) if now < confirmed_eta => {
                info!("{} is early, waiting until {}", self.addr, confirmed_eta);
                self.resume_at = Some(confirmed_eta);
                self.halt()
            }
            (ClientState::FollowingLane, Some(_)) => smallvec![],
            (ClientState::FollowingLane, None) => {
                let mut actions = self.halt();
                actions.extend(self.request(now));
                actions
            }
            (ClientState::AwaitingRemoteGrant, _) => {
                debug!("{} reached the intersection without a grant", self.addr);
                self.halt()
            }
            _ => smallvec![],
        }
    }

    fn exiting(&mut self) -> Actions {
        let mut actions: Actions = smallvec![Action::Send(Message::Exiting { sender: self.addr })];
        if self.state == ClientState::LocalFallback {
            actions.push(Action::FallbackFinished { success: true });
        }
        info!("{} left the intersection", self.addr);
        let halted = self.halted;
        self.reset();
        self.state = ClientState::FollowingLane;
        if halted {
            actions.extend(self.go());
        }
        actions
    }

    fn enter_fallback(&mut self) -> Actions {
        info!("{} falling back to local control", self.addr);
        self.pending = None;
        self.state = ClientState::LocalFallback;
        self.halt()
    }

    fn halt(&mut self) -> Actions {
        if self.halted {
            return smallvec![];
        }
        self.halted = true;
        smallvec![Action::Motion(Command::Stop)]
    }

    fn go(&mut self) -> Actions {
        self.halted = false;
        smallvec![Action::Motion(Command::Go)]
    }

    fn reset(&mut self) {
        self.pending = None;
        self.grant = None;
        self.resume_at = None;
    }
}
