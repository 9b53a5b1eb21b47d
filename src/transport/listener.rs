use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::election::{EngineHandle, Message};
use crate::error::Result;
use crate::transport::{line_codec, read_message};

/// Accepts peer connections and forwards one decoded message per connection
/// to the election engine.
///
/// At most `max_inbound_connections` connections are handled concurrently;
/// further connections wait in the accept backlog. Hand-off to the engine
/// uses a non-blocking `try_send`, so a full engine queue drops the message
/// instead of stalling the listener.
pub struct Listener {
    listener: TcpListener,
    engine: EngineHandle,
    permits: Arc<Semaphore>,
    read_timeout: Duration,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, engine: EngineHandle, config: &NodeConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_tcp(listener, engine, config))
    }

    /// Wrap an already bound socket (lets tests pick ephemeral ports before
    /// the roster is built).
    pub fn from_tcp(listener: TcpListener, engine: EngineHandle, config: &NodeConfig) -> Self {
        Self {
            listener,
            engine,
            permits: Arc::new(Semaphore::new(config.max_inbound_connections.max(1))),
            read_timeout: config.connect_timeout(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let node_id = self.engine.snapshot().self_id;
        match self.listener.local_addr() {
            Ok(addr) => tracing::info!(node_id, addr = %addr, "Listening for peer messages"),
            Err(e) => tracing::warn!(node_id, error = %e, "Listening on unknown address"),
        }

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(node_id, error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            let engine = self.engine.clone();
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                handle_connection(stream, peer_addr, &engine, read_timeout).await;
                drop(permit);
            });
        }

        tracing::info!(node_id, "Listener stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    engine: &EngineHandle,
    read_timeout: Duration,
) {
    let mut framed = Framed::new(stream, line_codec());

    let message = match timeout(read_timeout, read_message(&mut framed)).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer_addr, error = %e, "Dropping malformed message");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer_addr, "Connection sent nothing in time");
            return;
        }
    };

    match message {
        Message::HeartbeatPing => {
            let snapshot = engine.snapshot();
            if !snapshot.is_leader() {
                tracing::debug!(peer = %peer_addr, "HEARTBEAT_PING received while not leader");
                return;
            }
            let pong = Message::HeartbeatPong {
                sender_id: snapshot.self_id,
            };
            let sent: Result<()> = match pong.encode() {
                Ok(line) => framed.send(line).await.map_err(Into::into),
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to answer heartbeat");
            }
        }
        Message::HeartbeatPong { sender_id } => {
            tracing::debug!(peer = %peer_addr, sender_id, "Ignoring unsolicited HEARTBEAT_PONG");
        }
        message => {
            tracing::debug!(peer = %peer_addr, %message, "Received message");
            if let Err(e) = engine.deliver(message) {
                tracing::warn!(peer = %peer_addr, %message, error = %e, "Dropping message");
            }
        }
    }
}
