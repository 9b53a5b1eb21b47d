use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::election::timer::jittered;
use crate::election::{ElectionEngine, ElectionEvent, EngineHandle};
use crate::error::Result;
use crate::monitor::HeartbeatMonitor;
use crate::roster::Roster;
use crate::transport::{Listener, Messenger};

/// One election participant with all of its components wired together.
pub struct Node {
    pub config: NodeConfig,
    pub roster: Arc<Roster>,
    pub messenger: Messenger,
    engine: ElectionEngine,
    handle: EngineHandle,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<(Self, mpsc::Receiver<ElectionEvent>)> {
        config.validate()?;

        let roster = Arc::new(Roster::from_peers(&config.peers)?);
        let messenger = Messenger::new(roster.clone(), config.connect_timeout());
        let (engine, events) = ElectionEngine::new(&config, roster.clone(), messenger.clone());
        let handle = engine.handle();

        let node = Self {
            config,
            roster,
            messenger,
            engine,
            handle,
        };

        Ok((node, events))
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Run the node with all components.
    ///
    /// 1. Binds the listener on `listen_addr`
    /// 2. Spawns the election engine loop
    /// 3. Spawns the heartbeat monitor
    /// 4. Spawns the startup election (unless `startup_delay_ms` is 0)
    /// 5. Runs the listener until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// Returns an error only if the listen address cannot be bound. Once
    /// running, components log their own failures and keep going.
    pub async fn run(
        self,
        events: mpsc::Receiver<ElectionEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.run_with_listener(listener, events, shutdown).await;
        Ok(())
    }

    /// Same as [`Node::run`] on an already bound socket.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        events: mpsc::Receiver<ElectionEvent>,
        shutdown: CancellationToken,
    ) {
        let Node {
            config,
            roster,
            messenger,
            engine,
            handle,
        } = self;

        tracing::info!(
            node_id = config.node_id,
            roster = ?roster.ids(),
            "Starting election node"
        );

        let listener = Listener::from_tcp(listener, handle.clone(), &config);

        tokio::spawn(engine.run(events, shutdown.clone()));

        let monitor = HeartbeatMonitor::new(&config, handle.clone(), messenger);
        tokio::spawn(monitor.run(shutdown.clone()));

        if config.startup_delay_ms > 0 {
            let delay = jittered(
                std::time::Duration::from_millis(config.startup_delay_ms),
                config.timer_jitter_ms,
            );
            let handle = handle.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if let Err(e) = handle.initiate_election().await {
                            tracing::warn!(error = %e, "Startup election not started");
                        }
                    }
                }
            });
        }

        listener.run(shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::error::ElectionError;

    #[test]
    fn new_rejects_invalid_roster() {
        let cfg = NodeConfig::default().with_peer(2, "127.0.0.1:5002".to_string());
        let err = Node::new(cfg).err().expect("self is missing from roster");
        assert!(matches!(err, ElectionError::UnknownProcess(1)));
    }

    #[tokio::test]
    async fn single_node_elects_itself_on_startup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut cfg = NodeConfig::new(1, addr);
        cfg.peers = vec![PeerConfig::new(1, addr.to_string())];
        cfg.startup_delay_ms = 10;
        cfg.election_timeout_ms = 50;
        cfg.timer_jitter_ms = 0;

        let (node, events) = Node::new(cfg).unwrap();
        let handle = node.handle();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(node.run_with_listener(listener, events, shutdown.clone()));

        let mut rx = handle.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !rx.borrow_and_update().is_leader() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("single node should lead");

        assert_eq!(handle.current_leader(), Some(1));
        shutdown.cancel();
        task.await.unwrap();
    }
}
