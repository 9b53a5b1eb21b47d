use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::roster::ProcessId;

/// Protocol messages exchanged between peers, one per connection.
///
/// Encoded as a single JSON object tagged by `type`, e.g.
/// `{"type":"ELECTION","sender_id":1,"epoch":4}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Sender challenges every higher peer for leadership.
    Election { sender_id: ProcessId, epoch: u64 },
    /// Responder outranks the challenger and is alive.
    Ack { sender_id: ProcessId, epoch: u64 },
    /// Unconditional leader announcement.
    Coordinator { leader_id: ProcessId },
    HeartbeatPing,
    /// Only written by a process that is currently leader.
    HeartbeatPong { sender_id: ProcessId },
}

impl Message {
    /// The roster id this message names, if any.
    pub fn process_id(&self) -> Option<ProcessId> {
        match self {
            Message::Election { sender_id, .. }
            | Message::Ack { sender_id, .. }
            | Message::HeartbeatPong { sender_id } => Some(*sender_id),
            Message::Coordinator { leader_id } => Some(*leader_id),
            Message::HeartbeatPing => None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Election { sender_id, epoch } => {
                write!(f, "ELECTION(sender={}, epoch={})", sender_id, epoch)
            }
            Message::Ack { sender_id, epoch } => {
                write!(f, "ACK(sender={}, epoch={})", sender_id, epoch)
            }
            Message::Coordinator { leader_id } => write!(f, "COORDINATOR(leader={})", leader_id),
            Message::HeartbeatPing => write!(f, "HEARTBEAT_PING"),
            Message::HeartbeatPong { sender_id } => write!(f, "HEARTBEAT_PONG(sender={})", sender_id),
        }
    }
}
