//! Flow instance lifecycle: suspension, kill, timeout and shutdown.

use std::time::Duration;

use parley_core::{FlowError, FlowInstanceId, FlowStatus, NodeConfig, NodeError, SessionRole};
use parley_test_utils::bundles::{initiators, pong_silent, with_responders};
use parley_test_utils::flows::{Ping, Sleeper};
use parley_test_utils::{init_tracing, wait_until, TestNetwork, TEST_TIMEOUT};

#[tokio::test]
async fn waiting_flow_is_listed_as_suspended() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let bob = network.spawn("bob", with_responders([pong_silent()])).unwrap();

    let handle = alice.start_flow("Ping", Ping::new("bob")).unwrap();
    let id = alice
        .wait_for_status(FlowStatus::Suspended, TEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(id, handle.id());

    let flows = alice.list_flows();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].identity.name().as_str(), "Ping");
    assert_eq!(flows[0].role, SessionRole::Initiator);
    assert_eq!(flows[0].session_count, 1);

    let responder = bob
        .wait_for_status(FlowStatus::Suspended, TEST_TIMEOUT)
        .await
        .unwrap();
    let responders = bob.list_flows();
    assert_eq!(responders[0].id, responder);
    assert_eq!(responders[0].identity.name().as_str(), "PongSilent");
    assert_eq!(responders[0].role, SessionRole::Responder);
}

#[tokio::test]
async fn killing_a_flow_notifies_the_counterparty() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let bob = network.spawn("bob", with_responders([pong_silent()])).unwrap();

    let handle = alice.start_flow("Ping", Ping::new("bob")).unwrap();
    bob.wait_for_status(FlowStatus::Suspended, TEST_TIMEOUT)
        .await
        .unwrap();

    alice.kill_flow(handle.id()).unwrap();
    assert_eq!(handle.result().await, Err(FlowError::Killed));
    assert!(alice.list_flows().is_empty());
    assert_eq!(alice.events().count("flow.killed"), 1);

    // The silent responder's receive fails once the kill reaches it
    bob.events()
        .wait_for("flow.failed", 1, TEST_TIMEOUT)
        .await
        .unwrap();
    assert!(bob.list_flows().is_empty());
}

#[tokio::test]
async fn killing_an_unknown_flow_fails() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();

    let id = FlowInstanceId::new();
    assert_eq!(
        alice.kill_flow(id),
        Err(NodeError::FlowInstanceNotFound(id))
    );
}

#[tokio::test]
async fn timeout_takes_the_kill_path() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("alice").with_flow_timeout_secs(1);
    let alice = network.spawn_with_config(config, initiators()).unwrap();

    let handle = alice
        .start_flow("Sleeper", Sleeper::new(Duration::from_secs(30)))
        .unwrap();
    assert_eq!(
        handle.result().await,
        Err(FlowError::TimedOut { after_secs: 1 })
    );
    assert_eq!(alice.events().count("flow.killed"), 1);
}

#[tokio::test]
async fn suspended_flows_do_not_hold_workers() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("alice").with_max_concurrent_flows(1);
    let alice = network.spawn_with_config(config, initiators()).unwrap();
    let _bob = network.spawn("bob", with_responders([pong_silent()])).unwrap();

    for _ in 0..3 {
        alice.start_flow("Ping", Ping::new("bob")).unwrap();
    }

    wait_until(TEST_TIMEOUT, || {
        let flows = alice.list_flows();
        flows.len() == 3 && flows.iter().all(|f| f.status == FlowStatus::Suspended)
    })
    .await
    .unwrap();
    assert_eq!(alice.pool_stats().active, 0);
    assert_eq!(alice.pool_stats().max_concurrent, 1);
}

#[tokio::test]
async fn running_flows_hold_workers() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("alice").with_max_concurrent_flows(1);
    let alice = network.spawn_with_config(config, initiators()).unwrap();

    let first = alice
        .start_flow("Sleeper", Sleeper::new(Duration::from_millis(200)))
        .unwrap();
    let second = alice
        .start_flow("Sleeper", Sleeper::new(Duration::from_millis(200)))
        .unwrap();

    wait_until(TEST_TIMEOUT, || alice.pool_stats().active == 1)
        .await
        .unwrap();
    assert_eq!(alice.list_flows().len(), 2);

    first.result().await.unwrap();
    second.result().await.unwrap();
    assert_eq!(alice.pool_stats().active, 0);
}

#[tokio::test]
async fn shutdown_kills_running_flows() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();

    let handle = alice
        .start_flow("Sleeper", Sleeper::new(Duration::from_secs(30)))
        .unwrap();
    wait_until(TEST_TIMEOUT, || !alice.list_flows().is_empty())
        .await
        .unwrap();

    alice.shutdown();
    assert_eq!(handle.result().await, Err(FlowError::Killed));
    assert!(alice.list_flows().is_empty());
}
