use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::election::message::Message;
use crate::election::state::{Effect, ElectionSnapshot, ElectionState};
use crate::election::timer::jittered;
use crate::error::{ElectionError, Result};
use crate::roster::{ProcessId, Roster};
use crate::transport::Messenger;

/// Events consumed by the election engine loop, in arrival order.
#[derive(Debug)]
pub enum ElectionEvent {
    /// Message decoded by the listener
    Inbound(Message),
    /// Local request to start an election (startup, failure detector)
    InitiateElection,
    /// Election timer for `epoch` expired
    ResolveElection { epoch: u64 },
    /// COORDINATOR wait for `epoch` expired
    CoordinatorTimeout { epoch: u64 },
}

/// Owns the election state of one process.
///
/// Every mutation happens inside [`ElectionEngine::run`], one event at a time.
/// Other components talk to it through an [`EngineHandle`]: they enqueue
/// events and read the latest published [`ElectionSnapshot`].
pub struct ElectionEngine {
    state: ElectionState,
    roster: Arc<Roster>,
    messenger: Messenger,
    event_tx: mpsc::Sender<ElectionEvent>,
    snapshot_tx: watch::Sender<ElectionSnapshot>,
    election_timeout: Duration,
    coordinator_timeout: Duration,
    timer_jitter_ms: u64,
}

impl ElectionEngine {
    pub fn new(
        config: &NodeConfig,
        roster: Arc<Roster>,
        messenger: Messenger,
    ) -> (Self, mpsc::Receiver<ElectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let state = ElectionState::new(config.node_id, roster.ids());
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        let engine = Self {
            state,
            roster,
            messenger,
            event_tx,
            snapshot_tx,
            election_timeout: config.election_timeout(),
            coordinator_timeout: config.coordinator_timeout(),
            timer_jitter_ms: config.timer_jitter_ms,
        };

        (engine, event_rx)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            event_tx: self.event_tx.clone(),
            snapshot_rx: self.snapshot_tx.subscribe(),
        }
    }

    /// Run the engine loop until `shutdown` is cancelled.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ElectionEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            node_id = self.state.self_id,
            roster_size = self.roster.len(),
            "Election engine started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = self.state.self_id, "Election engine stopping");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.process(event),
                    None => break,
                },
            }
        }
    }

    fn process(&mut self, event: ElectionEvent) {
        tracing::trace!(node_id = self.state.self_id, ?event, "Processing event");

        let effects = match event {
            ElectionEvent::Inbound(message) => self.state.handle_message(message),
            ElectionEvent::InitiateElection => self.state.initiate_election(),
            ElectionEvent::ResolveElection { epoch } => self.state.resolve_election(epoch),
            ElectionEvent::CoordinatorTimeout { epoch } => {
                self.state.on_coordinator_timeout(epoch)
            }
        };

        self.apply(effects);
        self.snapshot_tx.send_replace(self.state.snapshot());
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { to, message } => self.dispatch(to, message),
                Effect::Broadcast(message) => {
                    for peer in self.roster.live_peers_of(self.state.self_id) {
                        self.dispatch(peer, message);
                    }
                }
                Effect::ScheduleResolution { epoch } => self.schedule(
                    self.election_timeout,
                    ElectionEvent::ResolveElection { epoch },
                ),
                Effect::ScheduleCoordinatorTimeout { epoch } => self.schedule(
                    jittered(self.coordinator_timeout, self.timer_jitter_ms),
                    ElectionEvent::CoordinatorTimeout { epoch },
                ),
            }
        }
    }

    /// Outbound sends run off the engine task so a dead peer's connect
    /// timeout never delays the next event.
    fn dispatch(&self, to: ProcessId, message: Message) {
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            messenger.send(to, &message).await;
        });
    }

    fn schedule(&self, delay: Duration, event: ElectionEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Engine gone means the process is shutting down.
            let _ = tx.send(event).await;
        });
    }
}

/// Cloneable access point to a running [`ElectionEngine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    event_tx: mpsc::Sender<ElectionEvent>,
    snapshot_rx: watch::Receiver<ElectionSnapshot>,
}

impl EngineHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> ElectionSnapshot {
        *self.snapshot_rx.borrow()
    }

    pub fn current_leader(&self) -> Option<ProcessId> {
        self.snapshot().current_leader
    }

    pub fn is_leader(&self) -> bool {
        self.snapshot().is_leader()
    }

    /// Receiver notified after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<ElectionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Ask the engine to start an election. Idempotent while one is running.
    pub async fn initiate_election(&self) -> Result<()> {
        self.event_tx
            .send(ElectionEvent::InitiateElection)
            .await
            .map_err(|_| ElectionError::EngineStopped)
    }

    /// Non-blocking hand-off of an inbound message.
    pub fn deliver(&self, message: Message) -> Result<()> {
        self.event_tx
            .try_send(ElectionEvent::Inbound(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => ElectionError::QueueFull,
                TrySendError::Closed(_) => ElectionError::EngineStopped,
            })
    }
}
