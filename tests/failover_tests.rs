//! Leader failure detection and recovery.


use std::time::Duration;

use test_harness::TestCluster;

const CONVERGE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_leader_crash_elects_next_highest() {
    let mut cluster = TestCluster::new(3).await;

    cluster.node(3).initiate_election().await;
    assert!(cluster.wait_for_agreement(3, CONVERGE).await);

    // Let a few heartbeat rounds pass against the healthy leader.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cluster.agrees_on(3), "healthy leader must not be replaced");

    assert!(cluster.shutdown_node(3));

    assert!(
        cluster.wait_for_agreement(2, CONVERGE).await,
        "survivors should agree on 2, views: {:?}",
        cluster.leader_views()
    );
    assert_eq!(cluster.count_leaders(), 1);
    assert!(!cluster.node(1).roster.is_alive(3));
}

#[tokio::test]
async fn test_new_leader_is_stable_under_heartbeats() {
    let mut cluster = TestCluster::new(3).await;

    cluster.node(3).initiate_election().await;
    assert!(cluster.wait_for_agreement(3, CONVERGE).await);
    cluster.shutdown_node(3);
    assert!(cluster.wait_for_agreement(2, CONVERGE).await);

    let epoch_1 = cluster.node(1).epoch();
    let epoch_2 = cluster.node(2).epoch();

    // Process 1 keeps probing 2, which answers, so nothing changes.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(cluster.agrees_on(2));
    assert_eq!(cluster.node(1).epoch(), epoch_1);
    assert_eq!(cluster.node(2).epoch(), epoch_2);
}

#[tokio::test]
async fn test_cascading_failures_leave_last_process_leading() {
    let mut cluster = TestCluster::new(3).await;

    cluster.node(3).initiate_election().await;
    assert!(cluster.wait_for_agreement(3, CONVERGE).await);

    cluster.shutdown_node(3);
    assert!(cluster.wait_for_agreement(2, CONVERGE).await);

    cluster.shutdown_node(2);
    assert!(
        cluster.wait_for_agreement(1, CONVERGE).await,
        "process 1 should lead alone, views: {:?}",
        cluster.leader_views()
    );
    assert!(cluster.node(1).is_leader());
}

#[tokio::test]
async fn test_recovered_highest_process_takes_over() {
    let mut cluster = TestCluster::new(3).await;

    cluster.node(3).initiate_election().await;
    assert!(cluster.wait_for_agreement(3, CONVERGE).await);
    cluster.shutdown_node(3);
    assert!(cluster.wait_for_agreement(2, CONVERGE).await);

    cluster.restart_node(3).await;
    assert_eq!(cluster.active_node_ids(), vec![1, 2, 3]);
    cluster.node(3).initiate_election().await;

    assert!(
        cluster.wait_for_agreement(3, CONVERGE).await,
        "restarted 3 should bully its way back, views: {:?}",
        cluster.leader_views()
    );
    assert_eq!(cluster.count_leaders(), 1);
}
