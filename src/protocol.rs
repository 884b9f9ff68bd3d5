//! The messages exchanged between vehicles and the intersection server.
//!
//! Messages are encoded as JSON objects, one per line, tagged by a `type` field.
//! Times are absolute milliseconds since the UNIX epoch.

use crate::error::ProtocolError;
use crate::request::VehicleAddr;
use crate::topology::LaneSpec;
use crate::util::Millis;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// A message. Every message carries the address its sender listens on for replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Vehicle to server: the vehicle would like to cross.
    RequestAccess {
        sender: VehicleAddr,
        lane: LaneSpec,
        eta: Millis,
        etc: Millis,
        /// Velocity in cm/s. Advisory only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        velocity: Option<f64>,
    },
    /// Server to vehicle: the vehicle may cross now.
    GrantAccess { sender: SocketAddr },
    /// Server to vehicle: the vehicle may cross, but must not enter before `confirmed_eta`.
    ReservationTime {
        sender: SocketAddr,
        confirmed_eta: Millis,
    },
    /// Vehicle to server: the vehicle has left the intersection.
    Exiting { sender: VehicleAddr },
}

/// The permission given to a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    /// The vehicle may enter immediately.
    Immediate,
    /// The vehicle may enter once the given time is reached.
    At { confirmed_eta: Millis },
}

impl Message {
    /// Creates the message informing a vehicle of its grant.
    pub fn grant(sender: SocketAddr, grant: Grant) -> Self {
        match grant {
            Grant::Immediate => Message::GrantAccess { sender },
            Grant::At { confirmed_eta } => Message::ReservationTime {
                sender,
                confirmed_eta,
            },
        }
    }

    /// The grant carried by this message, if it is one.
    pub fn as_grant(&self) -> Option<Grant> {
        match self {
            Message::GrantAccess { .. } => Some(Grant::Immediate),
            Message::ReservationTime { confirmed_eta, .. } => Some(Grant::At {
                confirmed_eta: *confirmed_eta,
            }),
            _ => None,
        }
    }

    /// The address of the sender.
    pub fn sender(&self) -> SocketAddr {
        match self {
            Message::RequestAccess { sender, .. } => sender.0,
            Message::GrantAccess { sender } => *sender,
            Message::ReservationTime { sender, .. } => *sender,
            Message::Exiting { sender } => sender.0,
        }
    }

    /// A short name for the kind of message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RequestAccess { .. } => "RequestAccessMsg",
            Message::GrantAccess { .. } => "GrantAccessMsg",
            Message::ReservationTime { .. } => "ReservationTimeMsg",
            Message::Exiting { .. } => "ExitingMsg",
        }
    }

    /// Encodes the message as a single line of JSON, including the trailing newline.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decodes a message from one line of JSON.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() || line == "null" {
            return Err(ProtocolError::Empty);
        }
        let msg: Message = serde_json::from_str(line)?;
        if let Message::RequestAccess { eta, etc, .. } = msg {
            if etc <= eta {
                return Err(ProtocolError::InvalidWindow { eta, etc });
            }
        }
        Ok(msg)
    }
}

/// The longest line accepted, in bytes, excluding the newline.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Reads messages from a stream, one per line.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
        }
    }

    /// Reads the next message. Returns `None` once the stream is closed.
    /// A line that cannot be decoded yields an error, and reading may continue.
    /// Only a failure of the stream itself yields [ProtocolError::Io].
    pub async fn next(&mut self) -> Option<Result<Message, ProtocolError>> {
        self.line.clear();
        let mut limited = (&mut self.reader).take(MAX_LINE_BYTES as u64 + 1);
        match limited.read_until(b'\n', &mut self.line).await {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => return Some(Err(err.into())),
        }
        if self.line.len() > MAX_LINE_BYTES && self.line.last() != Some(&b'\n') {
            if let Err(err) = self.skip_line().await {
                return Some(Err(err.into()));
            }
            return Some(Err(ProtocolError::TooLong(MAX_LINE_BYTES)));
        }
        match std::str::from_utf8(&self.line) {
            Ok(line) => Some(Message::decode(line)),
            Err(_) => Some(Err(ProtocolError::InvalidUtf8)),
        }
    }

    /// Discards input up to and including the next newline.
    async fn skip_line(&mut self) -> std::io::Result<()> {
        loop {
            let (used, done) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Ok(());
                }
                match buf.iter().position(|b| *b == b'\n') {
                    Some(idx) => (idx + 1, true),
                    None => (buf.len(), false),
                }
            };
            self.reader.consume(used);
            if done {
                return Ok(());
            }
        }
    }
}

/// Writes a message to a stream.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), ProtocolError> {
    writer.write_all(msg.encode()?.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
