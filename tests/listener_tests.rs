//! Wire handling at the listener: framing, malformed input, heartbeats.


use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use bully_election::election::Message;
use bully_election::transport::MAX_FRAME_LEN;
use test_harness::TestCluster;

const CONVERGE: Duration = Duration::from_secs(5);

async fn send_raw(addr: std::net::SocketAddr, payload: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    let _ = stream.shutdown().await;
}

/// Write one line and collect whatever comes back before the peer closes.
async fn exchange(addr: std::net::SocketAddr, payload: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut reply))
        .await
        .expect("listener should close the connection")
        .unwrap();
    reply
}

#[tokio::test]
async fn test_malformed_payloads_do_not_disturb_the_node() {
    let cluster = TestCluster::without_monitors(3).await;
    let addr = cluster.node(1).addr;

    send_raw(addr, b"not json at all\n").await;
    send_raw(addr, b"{\"type\":\"BOGUS\",\"sender_id\":2}\n").await;
    send_raw(addr, b"{\"type\":\"ELECTION\"}\n").await;
    send_raw(addr, b"").await;

    let mut oversized = vec![b'x'; MAX_FRAME_LEN + 16];
    oversized.push(b'\n');
    send_raw(addr, &oversized).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = cluster.node(1).snapshot();
    assert_eq!(snapshot.current_leader, None);
    assert_eq!(snapshot.epoch, 0);

    // Still accepting well-formed traffic afterwards.
    send_raw(addr, b"{\"type\":\"COORDINATOR\",\"leader_id\":3}\n").await;
    let handle = cluster.node(1).handle.clone();
    assert!(
        test_harness::wait_for(
            move || {
                let handle = handle.clone();
                async move { handle.current_leader() == Some(3) }
            },
            CONVERGE,
            Duration::from_millis(20),
        )
        .await
    );
}

#[tokio::test]
async fn test_election_from_lower_process_is_acknowledged_over_the_wire() {
    let cluster = TestCluster::without_monitors(3).await;

    send_raw(
        cluster.node(2).addr,
        b"{\"type\":\"ELECTION\",\"sender_id\":1,\"epoch\":7}\n",
    )
    .await;

    // 2 answers and runs its own election, which 3 wins.
    assert!(
        cluster.wait_for_agreement(3, CONVERGE).await,
        "views: {:?}",
        cluster.leader_views()
    );
}

#[tokio::test]
async fn test_heartbeat_ping_answered_only_by_leader() {
    let cluster = TestCluster::without_monitors(3).await;
    cluster.node(3).initiate_election().await;
    assert!(cluster.wait_for_agreement(3, CONVERGE).await);

    let reply = exchange(cluster.node(3).addr, b"{\"type\":\"HEARTBEAT_PING\"}\n").await;
    assert_eq!(
        Message::decode(&reply).unwrap(),
        Message::HeartbeatPong { sender_id: 3 }
    );

    let reply = exchange(cluster.node(1).addr, b"{\"type\":\"HEARTBEAT_PING\"}\n").await;
    assert!(reply.is_empty(), "follower must not answer, got {:?}", reply);
}

#[tokio::test]
async fn test_messenger_request_reaches_leader() {
    let cluster = TestCluster::without_monitors(2).await;
    cluster.node(2).initiate_election().await;
    assert!(cluster.wait_for_agreement(2, CONVERGE).await);

    let reply = cluster
        .node(1)
        .messenger
        .request(2, &Message::HeartbeatPing, Duration::from_millis(500))
        .await;
    assert_eq!(reply, Some(Message::HeartbeatPong { sender_id: 2 }));
}

#[tokio::test]
async fn test_unsolicited_pong_is_ignored() {
    let cluster = TestCluster::without_monitors(3).await;

    send_raw(
        cluster.node(1).addr,
        b"{\"type\":\"HEARTBEAT_PONG\",\"sender_id\":3}\n",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = cluster.node(1).snapshot();
    assert_eq!(snapshot.current_leader, None);
    assert_eq!(snapshot.epoch, 0);
}

#[tokio::test]
async fn test_bound_listener_serves_a_standalone_engine() {
    use std::sync::Arc;

    use bully_election::config::{NodeConfig, PeerConfig};
    use bully_election::election::ElectionEngine;
    use bully_election::roster::Roster;
    use bully_election::transport::{Listener, Messenger};
    use tokio_util::sync::CancellationToken;

    let mut config = NodeConfig::new(1, "127.0.0.1:0".parse().unwrap());
    config.peers = vec![PeerConfig::new(1, "127.0.0.1:0")];
    config.election_timeout_ms = 50;

    let roster = Arc::new(Roster::from_peers(&config.peers).unwrap());
    let messenger = Messenger::new(roster.clone(), config.connect_timeout());
    let (engine, events) = ElectionEngine::new(&config, roster, messenger);
    let handle = engine.handle();

    let listener = Listener::bind(config.listen_addr, handle.clone(), &config)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let shutdown = CancellationToken::new();
    tokio::spawn(engine.run(events, shutdown.clone()));
    tokio::spawn(listener.run(shutdown.clone()));

    // Alone in its roster, the process wins its own election.
    handle.initiate_election().await.unwrap();
    let elected = test_harness::wait_for(
        || {
            let handle = handle.clone();
            async move { handle.is_leader() }
        },
        CONVERGE,
        Duration::from_millis(20),
    )
    .await;
    assert!(elected);

    let reply = exchange(addr, b"{\"type\":\"HEARTBEAT_PING\"}\n").await;
    assert_eq!(
        Message::decode(&reply).unwrap(),
        Message::HeartbeatPong { sender_id: 1 }
    );

    shutdown.cancel();
}
