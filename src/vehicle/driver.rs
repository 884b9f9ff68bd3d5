//! Runs a [VehicleClient] against a real server connection and motion layer.

use super::motion::{MotionControl, ProximitySensor};
use super::{Action, Actions, Command, MotionEvent, VehicleClient};
use crate::error::{ClientError, ProtocolError};
use crate::protocol::{write_message, Message, MessageReader};
use crate::util::now_millis;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::time::MissedTickBehavior;

/// How long to wait for the server to accept a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// What the connection's reader task reports.
#[derive(Debug)]
enum FromServer {
    Message(Message),
    /// The connection with the given generation closed.
    Closed(usize),
}

/// What happened during a drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveSummary {
    /// Times the vehicle left the intersection.
    pub crossings: usize,
    /// Times the vehicle crossed under local control.
    pub fallbacks: usize,
}

/// Connects a [VehicleClient] to the server and to the vehicle's motion layer.
pub struct Driver<M> {
    client: VehicleClient,
    motion: M,
    server: SocketAddr,
    /// The interval between ticks.
    cycle: Duration,
    /// Stop after this many crossings.
    laps: Option<usize>,
    writer: Option<OwnedWriteHalf>,
    /// Increases with every new connection.
    generation: usize,
    summary: DriveSummary,
}

/// Binds a UDP socket on an ephemeral port and points it at `server`, without sending
/// anything. The socket's local address is the one used to reach the server, and its
/// port stays reserved for this process for as long as the socket is held.
pub async fn bind_towards(server: SocketAddr) -> io::Result<UdpSocket> {
    let bind: SocketAddr = match server {
        SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;
    Ok(socket)
}

impl<M: MotionControl + ProximitySensor> Driver<M> {
    pub fn new(client: VehicleClient, motion: M, server: SocketAddr, cycle: Duration) -> Self {
        Self {
            client,
            motion,
            server,
            cycle,
            laps: None,
            writer: None,
            generation: 0,
            summary: DriveSummary::default(),
        }
    }

    /// Stops driving after the given number of crossings.
    pub fn with_laps(mut self, laps: Option<usize>) -> Self {
        self.laps = laps;
        self
    }

    pub fn client(&self) -> &VehicleClient {
        &self.client
    }

    /// Drives until the lap count is reached or the motion layer fails.
    pub async fn run(mut self) -> Result<DriveSummary, ClientError> {
        let (tx, mut rx) = unbounded_channel::<FromServer>();
        let mut ticker = tokio::time::interval(self.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let actions = self.client.start();
        self.perform(actions, &tx).await?;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.cycle_once(&tx).await? {
                        break;
                    }
                }
                Some(from) = rx.recv() => self.on_server(from, &tx).await?,
            }
        }

        let actions = self.client.stop();
        self.perform(actions, &tx).await?;
        while let Ok(from) = rx.try_recv() {
            debug!("Ignoring {:?} after the drive ended", from);
        }
        Ok(self.summary)
    }

    /// Runs one tick. Returns true once the drive is over.
    async fn cycle_once(
        &mut self,
        tx: &UnboundedSender<FromServer>,
    ) -> Result<bool, ClientError> {
        let now = now_millis();
        for event in self.motion.poll_events(now) {
            if event == MotionEvent::Exiting {
                self.summary.crossings += 1;
            }
            match self.client.on_motion_event(event, now) {
                Ok(actions) => self.perform(actions, tx).await?,
                Err(err) => {
                    // Make sure the vehicle is halted before giving up.
                    let _ = self.motion.command(Command::Stop);
                    return Err(err);
                }
            }
        }
        let readings = self.motion.readings(now);
        let actions = self.client.tick(now, readings.as_ref());
        self.perform(actions, tx).await?;
        Ok(self.laps.map_or(false, |laps| self.summary.crossings >= laps))
    }

    async fn on_server(
        &mut self,
        from: FromServer,
        tx: &UnboundedSender<FromServer>,
    ) -> Result<(), ClientError> {
        let now = now_millis();
        let actions = match from {
            FromServer::Message(msg) => {
                debug!("Received {} from {}", msg.kind(), msg.sender());
                self.client.on_message(&msg, now)
            }
            FromServer::Closed(generation) if generation == self.generation => {
                warn!("Lost the connection to {}", self.server);
                self.writer = None;
                self.client.on_server_unreachable(now)
            }
            FromServer::Closed(_) => Actions::new(),
        };
        self.perform(actions, tx).await
    }

    /// Carries out the client's actions, along with any that follow from them.
    async fn perform(
        &mut self,
        actions: Actions,
        tx: &UnboundedSender<FromServer>,
    ) -> Result<(), ClientError> {
        let mut todo = actions.into_iter().collect::<VecDeque<_>>();
        while let Some(action) = todo.pop_front() {
            match action {
                Action::Send(msg) => {
                    if let Err(err) = self.send(&msg, tx).await {
                        warn!("Cannot send {} to {}: {}", msg.kind(), self.server, err);
                        todo.extend(self.client.on_server_unreachable(now_millis()));
                    }
                }
                Action::Motion(command) => {
                    debug!("Motion command: {:?}", command);
                    self.motion.command(command)?;
                }
                Action::FallbackFinished { success } => {
                    info!("Local fallback finished, success: {}", success);
                    if success {
                        self.summary.fallbacks += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn send(
        &mut self,
        msg: &Message,
        tx: &UnboundedSender<FromServer>,
    ) -> Result<(), ProtocolError> {
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.connect(tx).await?,
        };
        write_message(&mut writer, msg).await?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Opens a connection to the server and starts reading from it.
    async fn connect(
        &mut self,
        tx: &UnboundedSender<FromServer>,
    ) -> Result<OwnedWriteHalf, ProtocolError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(self.server))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))??;
        info!("Connected to {}", self.server);
        self.generation += 1;
        let generation = self.generation;
        let (read, write) = stream.into_split();
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut reader = MessageReader::new(read);
            while let Some(result) = reader.next().await {
                match result {
                    Ok(msg) => {
                        if tx.send(FromServer::Message(msg)).is_err() {
                            return;
                        }
                    }
                    Err(ProtocolError::Io(err)) => {
                        warn!("Error reading from the server: {}", err);
                        break;
                    }
                    Err(err) => warn!("Discarding message from the server: {}", err),
                }
            }
            let _ = tx.send(FromServer::Closed(generation));
        });
        Ok(write)
    }
}
