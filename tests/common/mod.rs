//! Helpers shared by the integration tests.

#![allow(dead_code)]

use auto_intersection::{
    EntryId, ExitId, LaneSpec, Message, Millis, PolicyKind, Scheduler, Topology, VehicleAddr,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// The address the scheduler puts in its replies.
pub fn server_addr() -> SocketAddr {
    ([10, 11, 12, 1], 6665).into()
}

/// The address of the `n`th test vehicle.
pub fn vehicle(n: u8) -> VehicleAddr {
    VehicleAddr(([10, 11, 12, n], 6665).into())
}

/// A scheduler for the four-way, two-lane intersection.
pub fn scheduler(policy: PolicyKind) -> Scheduler {
    Scheduler::new(Arc::new(Topology::four_way(150)), policy, server_addr())
}

/// The lanes from `entry` to `exit` on the four-way intersection.
pub fn lane(entry: u8, exit: u8) -> LaneSpec {
    Topology::four_way(150)
        .lane_spec(EntryId(entry), ExitId(exit))
        .unwrap()
}

/// A request to go straight through from the north.
pub fn request(sender: VehicleAddr, eta: Millis, etc: Millis) -> Message {
    request_on(sender, lane(0, 2), eta, etc)
}

pub fn request_on(sender: VehicleAddr, lane: LaneSpec, eta: Millis, etc: Millis) -> Message {
    Message::RequestAccess {
        sender,
        lane,
        eta,
        etc,
        velocity: None,
    }
}

pub fn exiting(sender: VehicleAddr) -> Message {
    Message::Exiting { sender }
}
