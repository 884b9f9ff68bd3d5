//! The network front end of the intersection server.
//!
//! Every connection gets a reader task, which decodes messages and forwards them to
//! the control loop, and a writer task, which sends replies. Only the control loop
//! touches the [Scheduler].

use crate::error::{ProtocolError, ServerError};
use crate::policy::PolicyKind;
use crate::protocol::{write_message, Message, MessageReader};
use crate::request::VehicleAddr;
use crate::scheduler::{Outgoing, Scheduler, StepOutcome, DEFAULT_REQUEST_TTL};
use crate::topology::Topology;
use crate::util::{now_millis, Millis};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::time::MissedTickBehavior;

/// The port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 6665;

/// How often the control loop runs when no messages arrive.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tuning for the control loop.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    /// The interval between scheduling cycles.
    pub poll_interval: Duration,
    /// Inactivity timeout for queued requests, in ms.
    pub request_ttl: Millis,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_ttl: DEFAULT_REQUEST_TTL,
        }
    }
}

/// A message received from a vehicle, along with the way back to it.
struct Inbound {
    msg: Message,
    reply: UnboundedSender<Message>,
}

/// An intersection server bound to a port.
pub struct IntersectionServer {
    listener: TcpListener,
    scheduler: Scheduler,
    poll_interval: Duration,
}

impl IntersectionServer {
    /// Binds to the given address and prepares a scheduler for the intersection.
    pub async fn bind(
        addr: SocketAddr,
        topology: Arc<Topology>,
        policy: PolicyKind,
        options: ServerOptions,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let scheduler =
            Scheduler::new(topology, policy, local_addr).with_request_ttl(options.request_ttl);
        Ok(Self {
            listener,
            scheduler,
            poll_interval: options.poll_interval,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.scheduler.local_addr()
    }

    /// Serves vehicles forever.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_until(std::future::pending()).await
    }

    /// Serves vehicles until `shutdown` completes.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let IntersectionServer {
            listener,
            mut scheduler,
            poll_interval,
        } = self;
        info!(
            "Serving a {}-way intersection on {} with the {} policy",
            scheduler.topology().ways(),
            scheduler.local_addr(),
            scheduler.policy().kind()
        );

        let (inbound_tx, mut inbound_rx) = unbounded_channel::<Inbound>();
        let mut replies = HashMap::<VehicleAddr, UnboundedSender<Message>>::new();
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Connection from {}", peer);
                        tokio::spawn(handle_connection(stream, peer, inbound_tx.clone()));
                    }
                    Err(err) => warn!("Failed to accept a connection: {}", err),
                },
                Some(inbound) = inbound_rx.recv() => {
                    let now = now_millis();
                    let vehicle = VehicleAddr(inbound.msg.sender());
                    let exiting = matches!(inbound.msg, Message::Exiting { .. });
                    if let Some(previous) = replies.get(&vehicle) {
                        if !previous.same_channel(&inbound.reply) && !previous.is_closed() {
                            warn!("{} is in use on two connections", vehicle);
                        }
                    }
                    replies.insert(vehicle, inbound.reply);
                    if let Some(out) = scheduler.handle_message(inbound.msg, now) {
                        deliver(&replies, out);
                    }
                    if exiting {
                        replies.remove(&vehicle);
                    }
                    run_cycles(&mut scheduler, &replies, now);
                }
                _ = ticker.tick() => {
                    let now = now_millis();
                    for vehicle in scheduler.expire(now) {
                        replies.remove(&vehicle);
                    }
                    run_cycles(&mut scheduler, &replies, now);
                }
            }
        }
        debug!("Final state: {}", scheduler.snapshot());
        Ok(())
    }
}

/// Admits vehicles until the head of the queue must wait.
fn run_cycles(
    scheduler: &mut Scheduler,
    replies: &HashMap<VehicleAddr, UnboundedSender<Message>>,
    now: Millis,
) {
    while let StepOutcome::Granted(out) = scheduler.step(now) {
        deliver(replies, out);
    }
}

/// Hands a message to the writer task of the vehicle's connection.
/// A vehicle which does not receive its grant will ask again.
fn deliver(replies: &HashMap<VehicleAddr, UnboundedSender<Message>>, out: Outgoing) {
    match replies.get(&out.to) {
        Some(tx) => {
            if tx.send(out.msg).is_err() {
                warn!("Connection to {} is closed, dropping reply", out.to);
            }
        }
        None => warn!("No connection to {}, dropping reply", out.to),
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, inbound: UnboundedSender<Inbound>) {
    let (read, mut write) = stream.into_split();
    let (reply_tx, mut reply_rx) = unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = reply_rx.recv().await {
            debug!("Sending {} to {}", msg.kind(), peer);
            if let Err(err) = write_message(&mut write, &msg).await {
                warn!("Failed to send {} to {}: {}", msg.kind(), peer, err);
                break;
            }
        }
    });

    let mut reader = MessageReader::new(read);
    while let Some(result) = reader.next().await {
        match result {
            Ok(msg) => {
                debug!("Received {} from {}", msg.kind(), peer);
                let inbound_msg = Inbound {
                    msg,
                    reply: reply_tx.clone(),
                };
                if inbound.send(inbound_msg).is_err() {
                    break;
                }
            }
            Err(ProtocolError::Io(err)) => {
                warn!("Error reading from {}: {}", peer, err);
                break;
            }
            Err(err) => warn!("Discarding message from {}: {}", peer, err),
        }
    }

    info!("{} disconnected", peer);
    writer.abort();
}
