use crate::error::ProtocolError;
use crate::topology::LaneSpec;
use crate::util::{Interval, Millis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// The identity of a vehicle: the address and port replies are sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleAddr(pub SocketAddr);

/// A vehicle's request to cross the intersection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRequest {
    /// The requesting vehicle.
    pub vehicle: VehicleAddr,
    /// The lanes the vehicle will use.
    pub lane: LaneSpec,
    /// The estimated time of arrival and clearance.
    window: Interval<Millis>,
    /// The vehicle's velocity in cm/s, if reported. Advisory only.
    pub velocity: Option<f64>,
    /// Whether the request is waiting in the reservation queue.
    pub enqueued: bool,
    /// Whether the vehicle has been granted access.
    pub allowed: bool,
    /// When the vehicle last sent this request.
    pub last_seen: Millis,
}

impl VehicleRequest {
    /// Creates a new request. The estimated time of clearance must be after the time of arrival.
    pub fn new(
        vehicle: VehicleAddr,
        lane: LaneSpec,
        eta: Millis,
        etc: Millis,
        received_at: Millis,
    ) -> Result<Self, ProtocolError> {
        if etc <= eta {
            return Err(ProtocolError::InvalidWindow { eta, etc });
        }
        Ok(Self {
            vehicle,
            lane,
            window: Interval::new(eta, etc),
            velocity: None,
            enqueued: false,
            allowed: false,
            last_seen: received_at,
        })
    }

    /// The estimated time of arrival.
    pub fn eta(&self) -> Millis {
        self.window.min
    }

    /// The estimated time of clearance.
    pub fn etc(&self) -> Millis {
        self.window.max
    }

    /// The interval during which the vehicle expects to occupy the intersection.
    pub fn window(&self) -> Interval<Millis> {
        self.window
    }

    /// How long the vehicle expects to take to cross, in ms.
    pub fn crossing_time(&self) -> Millis {
        self.window.length()
    }

    /// Revises the estimated times of arrival and clearance.
    /// Ignored unless `etc` is after `eta`.
    pub(crate) fn set_window(&mut self, eta: Millis, etc: Millis) {
        if etc > eta {
            self.window = Interval::new(eta, etc);
        }
    }
}

impl fmt::Display for VehicleAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for VehicleAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}
