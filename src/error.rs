//! Error types.

use crate::topology::{EntryId, ExitId, Turn};
use crate::util::Millis;
use std::net::SocketAddr;
use thiserror::Error;

/// Returned when the head of an empty [ReservationQueue](crate::ReservationQueue) is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the reservation queue is empty")]
pub struct EmptyQueueError;

/// An invalid intersection description or lane specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("an intersection must have between 2 and 4 ways, got {0}")]
    InvalidWays(u8),
    #[error("the number of lanes per way must be even and at least 2, got {0}")]
    InvalidLanes(u8),
    #[error("unknown entry point {0}")]
    UnknownEntry(EntryId),
    #[error("unknown exit point {0}")]
    UnknownExit(ExitId),
    #[error("exit {exit} cannot be reached from entry {entry}")]
    UnreachableExit { entry: EntryId, exit: ExitId },
    #[error("no exit is reachable from entry {entry} by turning {turn}")]
    NoExitForTurn { entry: EntryId, turn: Turn },
    #[error("lane heading does not match entry {0}")]
    HeadingMismatch(EntryId),
}

/// A message could not be decoded or is not well formed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("estimated clearance time {etc} is not after arrival time {eta}")]
    InvalidWindow { eta: Millis, etc: Millis },
    #[error("times [{eta}, {etc}) are too far from the current time {now}")]
    OutOfHorizon { eta: Millis, etc: Millis, now: Millis },
    #[error("line longer than {0} bytes")]
    TooLong(usize),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid lane specification: {0}")]
    InvalidLane(#[from] TopologyError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failure of the vehicle client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The motion layer reported a hard error; the vehicle must halt.
    #[error("motion layer failure: {0}")]
    Motion(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A failure of the intersection server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
