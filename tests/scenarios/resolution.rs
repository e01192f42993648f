//! End-to-end responder resolution between two nodes.

use pretty_assertions::assert_eq;

use parley_core::{FlowDeclaration, FlowError, FlowName, NodeConfig, ResolutionError};
use parley_test_utils::bundles::{initiators, pong, pong2, pongiest, with_responders};
use parley_test_utils::flows::Ping;
use parley_test_utils::{init_tracing, TestNetwork, TestNode, TEST_TIMEOUT};

async fn ping((alice, _bob): &(TestNode, TestNode)) -> Result<String, FlowError> {
    alice.start_flow("Ping", Ping::new("bob"))?.result_as().await
}

fn pair(
    network: &TestNetwork,
    bob: NodeConfig,
    responders: Vec<FlowDeclaration>,
) -> (TestNode, TestNode) {
    let alice = network.spawn("alice", initiators()).unwrap();
    let bob = network
        .spawn_with_config(bob, with_responders(responders))
        .unwrap();
    (alice, bob)
}

#[tokio::test]
async fn most_specific_responder_answers() {
    init_tracing();
    let network = TestNetwork::new();
    let nodes = pair(&network, NodeConfig::new("bob"), vec![pong(), pongiest()]);

    assert_eq!(ping(&nodes).await.unwrap(), "Gorgonzola");
    nodes.1.events().wait_for("flow.completed", 1, TEST_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn override_beats_specificity() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("bob").with_override("Ping", "Pong");
    let nodes = pair(&network, config, vec![pong(), pongiest()]);

    assert_eq!(ping(&nodes).await.unwrap(), "PONG");
}

#[tokio::test]
async fn tied_responders_reject_the_session() {
    init_tracing();
    let network = TestNetwork::new();
    let nodes = pair(&network, NodeConfig::new("bob"), vec![pong(), pong2()]);

    match ping(&nodes).await {
        Err(FlowError::SessionRejected { reason, .. }) => assert_eq!(
            reason,
            ResolutionError::AmbiguousResponder {
                initiator: FlowName::from("Ping"),
                candidates: vec![FlowName::from("Pong"), FlowName::from("Pong2")],
            }
        ),
        other => panic!("Expected SessionRejected, got {:?}", other),
    }

    nodes
        .1
        .events()
        .wait_for("session.rejected", 1, TEST_TIMEOUT)
        .await
        .unwrap();
    let rejected = nodes.1.events().events();
    let rejected = rejected
        .iter()
        .find(|e| e.event_type == "session.rejected")
        .unwrap();
    assert_eq!(rejected.label("reason"), Some("ambiguous"));
}

#[tokio::test]
async fn override_resolves_a_tie_at_runtime() {
    init_tracing();
    let network = TestNetwork::new();
    let nodes = pair(&network, NodeConfig::new("bob"), vec![pong(), pong2()]);
    assert!(ping(&nodes).await.is_err());

    nodes.1.set_override("Ping", "Pong2").unwrap();
    assert_eq!(ping(&nodes).await.unwrap(), "PONGPONG");
    assert_eq!(ping(&nodes).await.unwrap(), "PONGPONG");
}

#[tokio::test]
async fn missing_responder_is_a_remote_failure() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let _bob = network.spawn("bob", initiators()).unwrap();

    let err = alice
        .start_flow("Ping", Ping::new("bob"))
        .unwrap()
        .result()
        .await
        .unwrap_err();

    assert!(err.is_remote_failure());
    assert!(matches!(
        err,
        FlowError::SessionRejected {
            reason: ResolutionError::NoResponderRegistered { .. },
            ..
        }
    ));
    alice
        .events()
        .wait_for("flow.failed", 1, TEST_TIMEOUT)
        .await
        .unwrap();
    let failed = alice.events().events();
    let failed = failed.iter().find(|e| e.event_type == "flow.failed").unwrap();
    assert_eq!(failed.label("remote"), Some("true"));
}

#[tokio::test]
async fn concurrent_opens_resolve_independently() {
    init_tracing();
    let network = TestNetwork::new();
    let nodes = pair(&network, NodeConfig::new("bob"), vec![pong(), pongiest()]);

    let handles: Vec<_> = (0..20)
        .map(|_| nodes.0.start_flow("Ping", Ping::new("bob")).unwrap())
        .collect();
    for handle in handles {
        assert_eq!(handle.result_as::<String>().await.unwrap(), "Gorgonzola");
    }

    nodes
        .1
        .events()
        .wait_for("flow.completed", 20, TEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(nodes.1.events().count("session.accepted"), 20);
}
