//! Command-line flags for the server and the vehicle client.

use crate::conflict::ConflictMode;
use crate::error::TopologyError;
use crate::policy::PolicyKind;
use crate::server::ServerOptions;
use crate::topology::{EntryId, ExitId, LaneSpec, Topology, Turn};
use crate::util::Millis;
use crate::vehicle::estimate::Estimator;
use crate::vehicle::ClientParams;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

/// The shape of the intersection.
#[derive(StructOpt, Debug, Clone)]
pub struct TopologyFlags {
    /// The number of roads meeting at the intersection.
    #[structopt(long, default_value = "4")]
    pub ways: u8,

    /// The number of lanes on each road, counting both directions.
    #[structopt(long, default_value = "2")]
    pub lanes: u8,

    /// The width of the intersection in cm.
    #[structopt(long, default_value = "150")]
    pub width: u32,
}

/// Where log lines go.
#[derive(StructOpt, Debug, Clone)]
pub struct LogFlags {
    /// Also append log lines to this file.
    #[structopt(long, parse(from_os_str))]
    pub log: Option<PathBuf>,

    /// Log debugging messages.
    #[structopt(long)]
    pub debug: bool,
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "intersection-server",
    about = "Schedules vehicles through an autonomous intersection"
)]
pub struct ServerFlags {
    /// The port to listen on.
    #[structopt(long, default_value = "6665")]
    pub port: u16,

    #[structopt(flatten)]
    pub topology: TopologyFlags,

    /// The admission policy: sequential, reservation or parallel.
    #[structopt(long, default_value = "reservation")]
    pub policy: PolicyKind,

    /// How lane conflicts are derived: geometric or conservative.
    #[structopt(long = "lane-conflicts", default_value = "geometric")]
    pub lane_conflicts: ConflictMode,

    /// The interval between scheduling cycles, in ms.
    #[structopt(long = "poll-ms", default_value = "50")]
    pub poll_ms: u64,

    /// Queued requests not sent again within this many ms are dropped.
    #[structopt(long = "request-ttl-ms", default_value = "10000")]
    pub request_ttl_ms: Millis,

    #[structopt(flatten)]
    pub logging: LogFlags,
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "vehicle-client",
    about = "Drives a vehicle through an autonomous intersection"
)]
pub struct ClientFlags {
    /// The address of the intersection server.
    #[structopt(long)]
    pub server: IpAddr,

    /// The port of the intersection server.
    #[structopt(long)]
    pub port: u16,

    /// The port this vehicle is identified by. Defaults to a port reserved for this process.
    #[structopt(long = "vehicle-port")]
    pub vehicle_port: Option<u16>,

    /// The address of the motion layer's endpoint.
    #[structopt(long = "player-server", alias = "playerServer", default_value = "127.0.0.1")]
    pub player_server: IpAddr,

    /// The port of the motion layer's endpoint.
    #[structopt(long = "player-port", alias = "playerPort", default_value = "6665")]
    pub player_port: u16,

    /// The lane the vehicle enters by.
    #[structopt(long, default_value = "0")]
    pub entry: u8,

    /// The lane the vehicle leaves by. Takes precedence over `--turn`.
    #[structopt(long)]
    pub exit: Option<u8>,

    /// The direction to turn: straight, left or right.
    #[structopt(long, default_value = "straight")]
    pub turn: Turn,

    /// The vehicle's cruising speed in cm/s.
    #[structopt(long, default_value = "75")]
    pub speed: f64,

    #[structopt(flatten)]
    pub topology: TopologyFlags,

    /// The interval between retransmissions of an unanswered request, in ms.
    #[structopt(long = "retransmit-ms", default_value = "1000")]
    pub retransmit_ms: Millis,

    /// How long to wait for a grant before falling back to local control, in ms.
    #[structopt(long = "grant-timeout-ms", default_value = "5000")]
    pub grant_timeout_ms: Millis,

    /// The interval between client ticks, in ms.
    #[structopt(long = "cycle-ms", default_value = "100")]
    pub cycle_ms: u64,

    /// Stop after crossing the intersection this many times.
    #[structopt(long)]
    pub laps: Option<usize>,

    #[structopt(flatten)]
    pub logging: LogFlags,
}

impl TopologyFlags {
    /// Builds the intersection the flags describe.
    pub fn build(&self, mode: ConflictMode) -> Result<Topology, TopologyError> {
        Topology::new(self.ways, self.lanes, self.width, mode)
    }
}

impl ServerFlags {
    /// The address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        (Ipv4Addr::UNSPECIFIED, self.port).into()
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            poll_interval: Duration::from_millis(self.poll_ms),
            request_ttl: self.request_ttl_ms,
        }
    }
}

impl ClientFlags {
    /// The address of the intersection server.
    pub fn server_addr(&self) -> SocketAddr {
        (self.server, self.port).into()
    }

    /// The address of the motion layer's endpoint.
    pub fn player_addr(&self) -> SocketAddr {
        (self.player_server, self.player_port).into()
    }

    /// The lanes the vehicle uses to cross the intersection.
    pub fn lane_spec(&self, topology: &Topology) -> Result<LaneSpec, TopologyError> {
        let entry = EntryId(self.entry);
        match self.exit {
            Some(exit) => topology.lane_spec(entry, ExitId(exit)),
            None => topology.lane_spec_for_turn(entry, self.turn),
        }
    }

    pub fn estimator(&self) -> Estimator {
        Estimator::new(self.topology.width, self.speed)
    }

    pub fn params(&self) -> ClientParams {
        ClientParams {
            retransmit_ms: self.retransmit_ms,
            grant_timeout_ms: self.grant_timeout_ms,
        }
    }

    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }
}
