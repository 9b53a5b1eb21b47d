use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ElectionError, Result};

/// Default first port of the generated loopback roster. Process `id` listens
/// on `DEFAULT_BASE_PORT + id`.
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// Default number of processes in the generated loopback roster.
pub const DEFAULT_PROCESS_COUNT: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub node_id: u64,
    pub addr: String, // host:port format, supports both IP and hostnames
}

impl PeerConfig {
    pub fn new(node_id: u64, addr: impl Into<String>) -> Self {
        Self {
            node_id,
            addr: addr.into(),
        }
    }

    /// Port component of `addr`, if it parses.
    pub fn port(&self) -> Option<u16> {
        self.addr.rsplit_once(':')?.1.parse().ok()
    }
}

/// Per-process configuration.
///
/// `peers` is the full static roster and includes this process's own entry.
/// All durations are in milliseconds so the struct can be filled straight
/// from command line flags.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u64,
    pub listen_addr: SocketAddr,
    pub peers: Vec<PeerConfig>,
    /// Bound on connect + write for a single outbound message.
    pub connect_timeout_ms: u64,
    /// How long an election waits for ACKs from higher peers.
    pub election_timeout_ms: u64,
    /// How long a deferring process waits for COORDINATOR before retrying.
    pub coordinator_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Response window for a single HEARTBEAT_PING.
    pub heartbeat_timeout_ms: u64,
    /// Consecutive missed heartbeats before an election is triggered.
    pub heartbeat_miss_threshold: u32,
    /// Delay before the first election after startup (0 disables it).
    pub startup_delay_ms: u64,
    /// Upper bound of random delay added to retried elections.
    pub timer_jitter_ms: u64,
    pub event_queue_capacity: usize,
    pub max_inbound_connections: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5001)),
            peers: Vec::new(),
            connect_timeout_ms: 1000,
            election_timeout_ms: 3000,
            coordinator_timeout_ms: 5000,
            heartbeat_interval_ms: 5000,
            heartbeat_timeout_ms: 1000,
            heartbeat_miss_threshold: 1,
            startup_delay_ms: 2000,
            timer_jitter_ms: 250,
            event_queue_capacity: 100,
            max_inbound_connections: 64,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: u64, listen_addr: SocketAddr) -> Self {
        Self {
            node_id,
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, node_id: u64, addr: String) -> Self {
        self.peers.push(PeerConfig { node_id, addr });
        self
    }

    /// Roster of `count` processes on loopback, ids `1..=count`, process `id`
    /// at `127.0.0.1:(base_port + id)`.
    pub fn loopback_roster(count: u64, base_port: u16) -> Result<Vec<PeerConfig>> {
        (1..=count)
            .map(|id| {
                let port = u16::try_from(id)
                    .ok()
                    .and_then(|id| base_port.checked_add(id))
                    .ok_or_else(|| {
                        ElectionError::InvalidConfig(format!(
                            "port for process {} overflows (base port {})",
                            id, base_port
                        ))
                    })?;
                Ok(PeerConfig::new(id, format!("127.0.0.1:{}", port)))
            })
            .collect()
    }

    /// Checks the roster and timing invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(ElectionError::InvalidConfig(
                "process id must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.node_id == 0 {
                return Err(ElectionError::InvalidConfig(format!(
                    "roster entry '{}' has id 0",
                    peer.addr
                )));
            }
            if !seen.insert(peer.node_id) {
                return Err(ElectionError::InvalidConfig(format!(
                    "duplicate process id {} in roster",
                    peer.node_id
                )));
            }
        }

        if !seen.contains(&self.node_id) {
            return Err(ElectionError::UnknownProcess(self.node_id));
        }

        if self.heartbeat_timeout_ms >= self.heartbeat_interval_ms {
            return Err(ElectionError::InvalidConfig(format!(
                "heartbeat timeout ({}ms) must be shorter than the interval ({}ms)",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        if self.heartbeat_miss_threshold == 0 {
            return Err(ElectionError::InvalidConfig(
                "heartbeat miss threshold must be at least 1".to_string(),
            ));
        }

        if self.event_queue_capacity == 0 || self.max_inbound_connections == 0 {
            return Err(ElectionError::InvalidConfig(
                "queue capacity and inbound connection limit must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn coordinator_timeout(&self) -> Duration {
        Duration::from_millis(self.coordinator_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}
