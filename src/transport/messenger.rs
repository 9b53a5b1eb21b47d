use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};

use crate::election::Message;
use crate::error::{ElectionError, Result};
use crate::roster::{ProcessId, Roster};
use crate::transport::{line_codec, read_message};

/// Outcome of a single best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Unreachable,
}

/// Sends protocol messages to roster peers over fresh connections.
///
/// Transport errors never escape: they become [`DeliveryResult::Unreachable`]
/// and flip the peer's roster liveness, which is the only state the
/// messenger touches.
#[derive(Debug, Clone)]
pub struct Messenger {
    roster: Arc<Roster>,
    connect_timeout: Duration,
}

impl Messenger {
    pub fn new(roster: Arc<Roster>, connect_timeout: Duration) -> Self {
        Self {
            roster,
            connect_timeout,
        }
    }

    /// Connect, write one message, close. Bounded by the connect timeout.
    pub async fn send(&self, target: ProcessId, message: &Message) -> DeliveryResult {
        let result = match timeout(self.connect_timeout, self.transmit(target, message)).await {
            Ok(Ok(_)) => DeliveryResult::Delivered,
            Ok(Err(e)) => {
                tracing::debug!(peer_id = target, %message, error = %e, "Send failed");
                DeliveryResult::Unreachable
            }
            Err(_) => {
                tracing::debug!(peer_id = target, %message, "Send timed out");
                DeliveryResult::Unreachable
            }
        };
        self.record(target, result);
        result
    }

    /// Write one message and wait up to `window` for a single reply on the
    /// same connection. `None` covers both an unreachable peer and a peer
    /// that closed without answering.
    pub async fn request(
        &self,
        target: ProcessId,
        message: &Message,
        window: Duration,
    ) -> Option<Message> {
        let mut framed = match timeout(self.connect_timeout, self.transmit(target, message)).await
        {
            Ok(Ok(framed)) => framed,
            Ok(Err(e)) => {
                tracing::debug!(peer_id = target, %message, error = %e, "Request failed");
                self.record(target, DeliveryResult::Unreachable);
                return None;
            }
            Err(_) => {
                tracing::debug!(peer_id = target, %message, "Request timed out connecting");
                self.record(target, DeliveryResult::Unreachable);
                return None;
            }
        };
        self.record(target, DeliveryResult::Delivered);

        match timeout(window, read_message(&mut framed)).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(ElectionError::EmptyFrame)) => None,
            Ok(Err(e)) => {
                tracing::debug!(peer_id = target, error = %e, "Malformed reply");
                None
            }
            Err(_) => {
                tracing::debug!(peer_id = target, window_ms = window.as_millis(), "No reply in time");
                None
            }
        }
    }

    async fn transmit(
        &self,
        target: ProcessId,
        message: &Message,
    ) -> Result<Framed<TcpStream, LinesCodec>> {
        let addr = self
            .roster
            .addr(target)
            .ok_or(ElectionError::UnknownProcess(target))?;
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, line_codec());
        framed.send(message.encode()?).await?;
        Ok(framed)
    }

    fn record(&self, target: ProcessId, result: DeliveryResult) {
        let alive = result == DeliveryResult::Delivered;
        match self.roster.set_alive(target, alive) {
            Some(previous) if previous != alive => {
                if alive {
                    tracing::info!(peer_id = target, "Peer reachable again");
                } else {
                    tracing::warn!(peer_id = target, "Peer presumed down");
                }
            }
            _ => {}
        }
    }
}
