use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::election::{ElectionSnapshot, EngineHandle, Message, Phase};
use crate::roster::ProcessId;
use crate::transport::Messenger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Watching(ProcessId),
    Suppressed,
}

impl MonitorMode {
    pub fn for_snapshot(snapshot: &ElectionSnapshot) -> Self {
        match snapshot.current_leader {
            Some(leader)
                if leader != snapshot.self_id
                    && snapshot.phase == Phase::Idle
                    && !snapshot.election_in_flight() =>
            {
                MonitorMode::Watching(leader)
            }
            _ => MonitorMode::Suppressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Missed,
}

/// Periodic leader prober.
pub struct HeartbeatMonitor {
    engine: EngineHandle,
    messenger: Messenger,
    interval: Duration,
    response_window: Duration,
    miss_threshold: u32,
    watched: Option<ProcessId>,
    misses: u32,
}

impl HeartbeatMonitor {
    pub fn new(config: &NodeConfig, engine: EngineHandle, messenger: Messenger) -> Self {
        Self {
            engine,
            messenger,
            interval: config.heartbeat_interval(),
            response_window: config.heartbeat_timeout(),
            miss_threshold: config.heartbeat_miss_threshold.max(1),
            watched: None,
            misses: 0,
        }
    }

    /// Probe on every interval tick until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; start probing one interval in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One monitoring round. Returns `None` when probing is suppressed.
    pub async fn tick(&mut self) -> Option<ProbeOutcome> {
        let snapshot = self.engine.snapshot();
        let leader = match MonitorMode::for_snapshot(&snapshot) {
            MonitorMode::Watching(leader) => leader,
            MonitorMode::Suppressed => {
                self.watched = None;
                self.misses = 0;
                return None;
            }
        };

        if self.watched != Some(leader) {
            self.watched = Some(leader);
            self.misses = 0;
        }

        let outcome = self.probe(leader).await;
        match outcome {
            ProbeOutcome::Alive => {
                if self.misses > 0 {
                    tracing::info!(node_id = snapshot.self_id, leader_id = leader, "Leader answered again");
                }
                self.misses = 0;
            }
            ProbeOutcome::Missed => {
                self.misses += 1;
                tracing::warn!(
                    node_id = snapshot.self_id,
                    leader_id = leader,
                    misses = self.misses,
                    threshold = self.miss_threshold,
                    "Leader missed heartbeat"
                );
                if self.misses >= self.miss_threshold {
                    self.misses = 0;
                    self.report_failure(leader).await;
                }
            }
        }

        Some(outcome)
    }

    async fn probe(&self, leader: ProcessId) -> ProbeOutcome {
        match self
            .messenger
            .request(leader, &Message::HeartbeatPing, self.response_window)
            .await
        {
            Some(Message::HeartbeatPong { sender_id }) if sender_id == leader => ProbeOutcome::Alive,
            _ => ProbeOutcome::Missed,
        }
    }

    async fn report_failure(&self, leader: ProcessId) {
        // A COORDINATOR may have landed while the probe was in flight.
        if MonitorMode::for_snapshot(&self.engine.snapshot()) != MonitorMode::Watching(leader) {
            tracing::debug!(leader_id = leader, "Leader changed during probe, not electing");
            return;
        }

        tracing::warn!(
            node_id = self.engine.snapshot().self_id,
            leader_id = leader,
            "Leader failure detected, starting election"
        );
        if let Err(e) = self.engine.initiate_election().await {
            tracing::warn!(error = %e, "Could not start election");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        self_id: ProcessId,
        leader: Option<ProcessId>,
        phase: Phase,
        awaiting: bool,
    ) -> ElectionSnapshot {
        ElectionSnapshot {
            self_id,
            current_leader: leader,
            phase,
            epoch: 1,
            awaiting_coordinator: awaiting,
        }
    }

    #[test]
    fn watches_remote_leader_when_idle() {
        let s = snapshot(1, Some(3), Phase::Idle, false);
        assert_eq!(MonitorMode::for_snapshot(&s), MonitorMode::Watching(3));
    }

    #[test]
    fn suppressed_without_leader() {
        let s = snapshot(1, None, Phase::Idle, false);
        assert_eq!(MonitorMode::for_snapshot(&s), MonitorMode::Suppressed);
    }

    #[test]
    fn suppressed_while_leading() {
        let s = snapshot(3, Some(3), Phase::Leader, false);
        assert_eq!(MonitorMode::for_snapshot(&s), MonitorMode::Suppressed);
    }

    #[test]
    fn suppressed_during_election() {
        for phase in [Phase::AwaitingHigherResponse, Phase::ElectionInProgress] {
            let s = snapshot(1, Some(3), phase, false);
            assert_eq!(MonitorMode::for_snapshot(&s), MonitorMode::Suppressed);
        }
    }

    #[test]
    fn suppressed_while_awaiting_coordinator() {
        let s = snapshot(1, Some(3), Phase::Idle, true);
        assert_eq!(MonitorMode::for_snapshot(&s), MonitorMode::Suppressed);
    }
}
