//! Nodes assembled from configuration files and deployment manifests.

use pretty_assertions::assert_eq;

use parley_core::{
    responder_factory, ConfigurationError, FlowBundle, FlowName, NodeConfig, NodeError,
    ResponderFactory,
};
use parley_manifest::parse_and_validate_manifest;
use parley_test_utils::bundles::{pong, pong2, pongiest, with_responders};
use parley_test_utils::flows::{Ping, Reply};
use parley_test_utils::{init_tracing, wait_until, TestError, TestNetwork, TEST_TIMEOUT};

const MANIFEST: &str = r#"
manifest_version: "1.0"
flows:
  - name: Ping
  - name: Pong
    initiated_by: Ping
  - name: Pongiest
    extends: Pong
    initiated_by: Ping
"#;

fn factories(name: &FlowName) -> Option<ResponderFactory> {
    let reply = match name.as_str() {
        "Pong" => "PONG",
        "Pongiest" => "Gorgonzola",
        _ => return None,
    };
    Some(responder_factory(move |session| Reply::new(session, reply)))
}

fn manifest_bundle() -> FlowBundle {
    parse_and_validate_manifest(MANIFEST)
        .unwrap()
        .bundle_with(factories)
        .unwrap()
}

#[tokio::test]
async fn node_runs_flows_declared_in_a_manifest() -> anyhow::Result<()> {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", manifest_bundle())?;
    let bob = network.spawn("bob", manifest_bundle())?;

    assert_eq!(bob.registry().len(), 3);
    let reply: String = alice
        .start_flow("Ping", Ping::new("bob"))?
        .result_as()
        .await?;
    assert_eq!(reply, "Gorgonzola");
    Ok(())
}

#[tokio::test]
async fn configured_override_applies_to_manifest_flows() -> anyhow::Result<()> {
    init_tracing();
    let config = NodeConfig::from_yaml_str(
        r#"
        peer_name: bob
        max_concurrent_flows: 8
        flow_overrides:
          Ping: Pong
        "#,
    )?;
    assert_eq!(config.max_concurrent_flows, 8);

    let network = TestNetwork::new();
    let alice = network.spawn("alice", manifest_bundle())?;
    let bob = network.spawn_with_config(config, manifest_bundle())?;
    assert_eq!(
        bob.overrides()
            .get(&FlowName::from("Ping"))
            .map(|responder| responder.name().clone()),
        Some(FlowName::from("Pong"))
    );

    let reply: String = alice
        .start_flow("Ping", Ping::new("bob"))?
        .result_as()
        .await?;
    assert_eq!(reply, "PONG");
    Ok(())
}

#[tokio::test]
async fn override_to_unrelated_responder_aborts_startup() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("bob").with_override("Ping", "Echo");

    let err = network
        .spawn_with_config(config, with_responders([pong(), pongiest()]))
        .err()
        .unwrap();
    match err {
        TestError::Node(NodeError::Configuration(ConfigurationError::InvalidOverride {
            initiator,
            responder,
            ..
        })) => {
            assert_eq!(initiator, FlowName::from("Ping"));
            assert_eq!(responder, FlowName::from("Echo"));
        }
        other => panic!("Expected InvalidOverride, got {:?}", other),
    }

    // The failed node left the network, so the name can be reused
    assert!(network.spawn("bob", with_responders([pong()])).is_ok());
}

#[tokio::test]
async fn override_for_initiator_without_responders_aborts_startup() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("bob").with_override("Counter", "Pong");

    let err = network
        .spawn_with_config(config, with_responders([pong(), pong2()]))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        TestError::Node(NodeError::Configuration(
            ConfigurationError::InvalidOverride { .. }
        ))
    ));
}

#[tokio::test]
async fn runtime_override_must_be_a_candidate() {
    init_tracing();
    let network = TestNetwork::new();
    let bob = network
        .spawn("bob", with_responders([pong(), pong2()]))
        .unwrap();

    assert!(matches!(
        bob.set_override("Ping", "Pongiest"),
        Err(ConfigurationError::InvalidOverride { .. })
    ));
    assert!(bob.overrides().is_empty());
}

#[tokio::test]
async fn metrics_count_sessions_and_flows() -> anyhow::Result<()> {
    init_tracing();
    let network = TestNetwork::new();
    let (alice, alice_metrics) = network.spawn_with_metrics("alice", manifest_bundle())?;
    let (_bob, bob_metrics) =
        network.spawn_with_metrics("bob", with_responders([pong(), pong2()]))?;

    assert!(alice.start_flow("Ping", Ping::new("bob"))?.result().await.is_err());

    let alice_stats = alice_metrics.snapshot();
    assert_eq!(alice_stats.flows_started, 1);
    assert_eq!(alice_stats.sessions_opened, 1);
    assert_eq!(alice_stats.flows_failed, 1);
    wait_until(TEST_TIMEOUT, || bob_metrics.snapshot().sessions_rejected == 1).await?;

    alice.shutdown();
    Ok(())
}
