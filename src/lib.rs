//! Schedules autonomous vehicles through an intersection.
//!
//! Vehicles ask an [IntersectionServer] for permission to cross. Its [Scheduler] keeps the
//! requests in a [ReservationQueue] ordered by arrival time, and an [AccessPolicy] decides
//! whether the vehicle at the head of the queue may cross now or must be delayed.
//! Each vehicle runs a [VehicleClient], which falls back to its own sensors
//! when the server does not answer.

pub use conflict::{ConflictMode, ConflictTable, Movement};
pub use error::{ClientError, EmptyQueueError, ProtocolError, ServerError, TopologyError};
pub use occupancy::{Occupancy, OccupancyRecord};
pub use policy::{AccessPolicy, Decision, PolicyKind};
pub use protocol::{Grant, Message};
pub use queue::ReservationQueue;
pub use request::{VehicleAddr, VehicleRequest};
pub use scheduler::{Outgoing, Scheduler, SchedulerStats, StepOutcome, MAX_HORIZON};
pub use server::{IntersectionServer, ServerOptions};
use slotmap::new_key_type;
pub use topology::{EntryId, ExitId, Heading, LaneSpec, Topology, Turn};
pub use util::{now_millis, Interval, Millis};
pub use vehicle::{Action, ClientParams, ClientState, Command, MotionEvent, VehicleClient};

pub mod config;
mod conflict;
mod error;
pub mod logging;
mod occupancy;
mod policy;
pub mod protocol;
mod queue;
mod request;
mod scheduler;
pub mod server;
mod topology;
mod util;
pub mod vehicle;

new_key_type! {
    /// Unique ID of a [VehicleRequest] in the [ReservationQueue].
    pub struct RequestKey;
}
