use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Unbounded};

use crate::election::message::Message;
use crate::roster::ProcessId;

/// Election phase of a single process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A higher peer has ACKed the current epoch; the election stays open
    /// until its resolution timer fires.
    ElectionInProgress,
    /// ELECTION has been sent upward and no higher peer has answered yet.
    AwaitingHigherResponse,
    Leader,
}

impl Phase {
    /// True while this process has an election of its own outstanding.
    pub fn is_electing(self) -> bool {
        matches!(self, Phase::ElectionInProgress | Phase::AwaitingHigherResponse)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::ElectionInProgress => write!(f, "election-in-progress"),
            Phase::AwaitingHigherResponse => write!(f, "awaiting-higher-response"),
            Phase::Leader => write!(f, "leader"),
        }
    }
}

/// Side effects requested by a state transition. The engine carries them
/// out after the transition has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send { to: ProcessId, message: Message },
    /// Send to every other peer currently presumed alive.
    Broadcast(Message),
    ScheduleResolution { epoch: u64 },
    ScheduleCoordinatorTimeout { epoch: u64 },
}

/// Read-only view of the election state published to other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionSnapshot {
    pub self_id: ProcessId,
    pub current_leader: Option<ProcessId>,
    pub phase: Phase,
    pub epoch: u64,
    pub awaiting_coordinator: bool,
}

impl ElectionSnapshot {
    pub fn is_leader(&self) -> bool {
        self.phase == Phase::Leader
    }

    /// True while this process is running an election or is waiting for the
    /// winner of one it deferred to.
    pub fn election_in_flight(&self) -> bool {
        self.phase.is_electing() || self.awaiting_coordinator
    }
}

/// Per-process bully election state.
///
/// # Invariants
///
/// - `pending_epoch` only grows, by exactly one per self-initiated election.
///   ACKs and timers tagged with any other epoch are ignored.
/// - `current_leader` changes only on an accepted COORDINATOR or on winning an
///   election. Heartbeats never touch it.
/// - While Leader or running its own election, a process refuses COORDINATOR
///   announcements from lower ids.
/// - Every id a message names must be a roster member, and never `self_id`
///   when it arrives from the network.
#[derive(Debug)]
pub struct ElectionState {
    pub self_id: ProcessId,
    pub current_leader: Option<ProcessId>,
    pub phase: Phase,
    pub pending_epoch: u64,
    pub received_higher_ack: bool,
    /// Epoch whose resolution deferred to a higher peer and is still waiting
    /// for that peer's COORDINATOR.
    pub awaiting_coordinator: Option<u64>,
    members: BTreeSet<ProcessId>,
}

impl ElectionState {
    pub fn new(self_id: ProcessId, members: impl IntoIterator<Item = ProcessId>) -> Self {
        let mut members: BTreeSet<ProcessId> = members.into_iter().collect();
        members.insert(self_id);
        Self {
            self_id,
            current_leader: None,
            phase: Phase::Idle,
            pending_epoch: 0,
            received_higher_ack: false,
            awaiting_coordinator: None,
            members,
        }
    }

    pub fn snapshot(&self) -> ElectionSnapshot {
        ElectionSnapshot {
            self_id: self.self_id,
            current_leader: self.current_leader,
            phase: self.phase,
            epoch: self.pending_epoch,
            awaiting_coordinator: self.awaiting_coordinator.is_some(),
        }
    }

    /// Roster members that outrank this process.
    pub fn higher_peers(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.members.range((Excluded(self.self_id), Unbounded)).copied()
    }

    /// Validates and dispatches a message received from a peer.
    pub fn handle_message(&mut self, message: Message) -> Vec<Effect> {
        if let Some(id) = message.process_id() {
            if !self.members.contains(&id) {
                tracing::warn!(
                    node_id = self.self_id,
                    process_id = id,
                    message = %message,
                    "Dropping message naming a process outside the roster"
                );
                return Vec::new();
            }
        }

        match message {
            Message::Election { sender_id, epoch } if sender_id != self.self_id => {
                self.on_election(sender_id, epoch)
            }
            Message::Ack { sender_id, epoch } if sender_id != self.self_id => {
                self.on_ack(sender_id, epoch);
                Vec::new()
            }
            Message::Coordinator { leader_id } => self.on_coordinator(leader_id),
            Message::HeartbeatPing | Message::HeartbeatPong { .. } => {
                tracing::debug!(
                    node_id = self.self_id,
                    message = %message,
                    "Heartbeat traffic does not affect election state"
                );
                Vec::new()
            }
            other => {
                tracing::warn!(
                    node_id = self.self_id,
                    message = %other,
                    "Dropping message that claims to come from this process"
                );
                Vec::new()
            }
        }
    }

    /// A peer challenges for leadership.
    pub fn on_election(&mut self, sender_id: ProcessId, epoch: u64) -> Vec<Effect> {
        if sender_id > self.self_id {
            tracing::debug!(
                node_id = self.self_id,
                sender_id,
                epoch,
                "Ignoring ELECTION from higher-priority process"
            );
            return Vec::new();
        }

        tracing::info!(
            node_id = self.self_id,
            sender_id,
            epoch,
            phase = %self.phase,
            "Answering ELECTION from lower-priority process"
        );

        let mut effects = vec![Effect::Send {
            to: sender_id,
            message: Message::Ack {
                sender_id: self.self_id,
                epoch,
            },
        }];

        match self.phase {
            Phase::Idle => effects.extend(self.initiate_election()),
            Phase::Leader => effects.push(Effect::Send {
                to: sender_id,
                message: Message::Coordinator {
                    leader_id: self.self_id,
                },
            }),
            Phase::ElectionInProgress | Phase::AwaitingHigherResponse => {}
        }

        effects
    }

    /// Returns whether the ACK counted toward the current election.
    pub fn on_ack(&mut self, sender_id: ProcessId, epoch: u64) -> bool {
        if sender_id < self.self_id {
            tracing::debug!(
                node_id = self.self_id,
                sender_id,
                epoch,
                "Dropping ACK from lower-priority process"
            );
            return false;
        }

        if epoch != self.pending_epoch {
            tracing::debug!(
                node_id = self.self_id,
                sender_id,
                epoch,
                current_epoch = self.pending_epoch,
                "Dropping stale ACK"
            );
            return false;
        }

        if self.phase != Phase::AwaitingHigherResponse {
            tracing::debug!(
                node_id = self.self_id,
                sender_id,
                epoch,
                phase = %self.phase,
                "Dropping ACK outside the response window"
            );
            return false;
        }

        self.received_higher_ack = true;
        self.phase = Phase::ElectionInProgress;
        tracing::info!(
            node_id = self.self_id,
            sender_id,
            epoch,
            "Higher-priority process is alive, deferring"
        );
        true
    }

    /// A peer announces the winner of an election.
    pub fn on_coordinator(&mut self, leader_id: ProcessId) -> Vec<Effect> {
        if leader_id < self.self_id {
            match self.phase {
                Phase::Leader => {
                    tracing::info!(
                        node_id = self.self_id,
                        announced = leader_id,
                        "Rejecting lower-priority leader, reasserting leadership"
                    );
                    return vec![Effect::Broadcast(Message::Coordinator {
                        leader_id: self.self_id,
                    })];
                }
                phase if phase.is_electing() => {
                    tracing::info!(
                        node_id = self.self_id,
                        announced = leader_id,
                        epoch = self.pending_epoch,
                        "Ignoring lower-priority leader during own election"
                    );
                    return Vec::new();
                }
                _ => {}
            }
        }

        let previous = self.current_leader;
        self.current_leader = Some(leader_id);
        self.phase = if leader_id == self.self_id {
            Phase::Leader
        } else {
            Phase::Idle
        };
        self.received_higher_ack = false;
        self.awaiting_coordinator = None;

        if previous != Some(leader_id) {
            tracing::info!(
                node_id = self.self_id,
                leader_id,
                previous_leader = ?previous,
                "New leader recognised"
            );
        }

        if leader_id < self.self_id {
            tracing::info!(
                node_id = self.self_id,
                leader_id,
                "Challenging lower-priority leader"
            );
            return self.initiate_election();
        }

        Vec::new()
    }

    /// Starts a new election epoch unless one is already running.
    pub fn initiate_election(&mut self) -> Vec<Effect> {
        if self.phase.is_electing() {
            tracing::debug!(
                node_id = self.self_id,
                epoch = self.pending_epoch,
                "Election already in progress"
            );
            return Vec::new();
        }

        self.pending_epoch += 1;
        self.phase = Phase::AwaitingHigherResponse;
        self.received_higher_ack = false;
        self.awaiting_coordinator = None;
        let epoch = self.pending_epoch;

        let mut effects: Vec<Effect> = self
            .higher_peers()
            .map(|to| Effect::Send {
                to,
                message: Message::Election {
                    sender_id: self.self_id,
                    epoch,
                },
            })
            .collect();

        tracing::info!(
            node_id = self.self_id,
            epoch,
            challenged = effects.len(),
            "Starting election"
        );

        effects.push(Effect::ScheduleResolution { epoch });
        effects
    }

    /// Runs when the election timer for `epoch` expires.
    pub fn resolve_election(&mut self, epoch: u64) -> Vec<Effect> {
        if epoch != self.pending_epoch || !self.phase.is_electing() {
            tracing::debug!(
                node_id = self.self_id,
                epoch,
                current_epoch = self.pending_epoch,
                phase = %self.phase,
                "Ignoring resolution of an abandoned election"
            );
            return Vec::new();
        }

        if self.received_higher_ack {
            self.phase = Phase::Idle;
            self.awaiting_coordinator = Some(epoch);
            tracing::info!(
                node_id = self.self_id,
                epoch,
                "Waiting for COORDINATOR from higher-priority process"
            );
            return vec![Effect::ScheduleCoordinatorTimeout { epoch }];
        }

        self.current_leader = Some(self.self_id);
        self.phase = Phase::Leader;
        self.awaiting_coordinator = None;
        tracing::info!(node_id = self.self_id, epoch, "Declared self leader");

        vec![Effect::Broadcast(Message::Coordinator {
            leader_id: self.self_id,
        })]
    }

    /// Runs when the COORDINATOR wait for `epoch` expires.
    pub fn on_coordinator_timeout(&mut self, epoch: u64) -> Vec<Effect> {
        if self.awaiting_coordinator != Some(epoch) || self.phase != Phase::Idle {
            return Vec::new();
        }

        tracing::warn!(
            node_id = self.self_id,
            epoch,
            "No COORDINATOR after deferring, restarting election"
        );
        self.awaiting_coordinator = None;
        self.initiate_election()
    }
}
