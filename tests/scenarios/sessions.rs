//! Session behaviour across nodes: ordering, failures and closing.

use std::sync::Arc;

use parley_core::{
    async_trait, FlowContext, FlowError, FlowLogic, Node, NodeConfig, Payload, PeerId,
    TransportError,
};
use parley_test_utils::bundles::{
    echo, initiators, pong, pong_failing, pong_wrong_type, with_responders,
};
use parley_test_utils::flows::{Counter, Ping};
use parley_test_utils::mocks::unreachable_transport;
use parley_test_utils::{init_tracing, wait_until, TestNetwork, TEST_TIMEOUT};

#[tokio::test]
async fn payloads_arrive_in_send_order() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let bob = network.spawn("bob", with_responders([echo()])).unwrap();

    let echoed: Vec<i64> = alice
        .start_flow("Counter", Counter::new("bob", 200))
        .unwrap()
        .result_as()
        .await
        .unwrap();
    assert_eq!(echoed, (0..200).collect::<Vec<_>>());

    // Echo returns once the initiator's completion closes its session
    bob.events()
        .wait_for("flow.completed", 1, TEST_TIMEOUT)
        .await
        .unwrap();
}

#[tokio::test]
async fn node_can_open_a_session_to_itself() {
    init_tracing();
    let network = TestNetwork::new();
    let solo = network.spawn("solo", with_responders([pong()])).unwrap();

    let reply: String = solo
        .start_flow("Ping", Ping::new("solo"))
        .unwrap()
        .result_as()
        .await
        .unwrap();
    assert_eq!(reply, "PONG");
}

#[tokio::test]
async fn single_worker_serves_initiator_and_responder() {
    init_tracing();
    let network = TestNetwork::new();
    let config = NodeConfig::new("solo").with_max_concurrent_flows(1);
    let solo = network
        .spawn_with_config(config, with_responders([pong()]))
        .unwrap();

    let reply: String = solo
        .start_flow("Ping", Ping::new("solo"))
        .unwrap()
        .result_as()
        .await
        .unwrap();
    assert_eq!(reply, "PONG");
}

#[tokio::test]
async fn responder_failure_reaches_the_initiator() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let _bob = network.spawn("bob", with_responders([pong_failing()])).unwrap();

    let err = alice
        .start_flow("Ping", Ping::new("bob"))
        .unwrap()
        .result()
        .await
        .unwrap_err();

    match err {
        FlowError::CounterpartyFailed { message, .. } => {
            assert_eq!(message, "responder exploded")
        }
        other => panic!("Expected CounterpartyFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_payload_type_fails_the_receiver() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let _bob = network
        .spawn("bob", with_responders([pong_wrong_type()]))
        .unwrap();

    let err = alice
        .start_flow("Ping", Ping::new("bob"))
        .unwrap()
        .result()
        .await
        .unwrap_err();

    assert!(!err.is_remote_failure());
    match err {
        FlowError::UnexpectedPayloadType { expected, .. } => {
            assert!(expected.contains("String"), "{}", expected)
        }
        other => panic!("Expected UnexpectedPayloadType, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_peer_fails_the_open() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();

    let err = alice
        .start_flow("Ping", Ping::new("nobody"))
        .unwrap()
        .result()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FlowError::Transport(TransportError::UnknownPeer(PeerId::from("nobody")))
    );
    assert_eq!(alice.session_count(), 0);
}

#[tokio::test]
async fn unreachable_transport_fails_the_open() {
    init_tracing();
    let node = Node::builder(NodeConfig::new("alice"))
        .bundle(initiators())
        .transport(Arc::new(unreachable_transport("alice")))
        .build()
        .unwrap();

    let err = node
        .start_flow("Ping", Ping::new("bob"))
        .unwrap()
        .result()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Transport(TransportError::Unreachable(_))
    ));
    node.shutdown();
}

/// Opens a session, closes it, then tries to use it
struct CloseThenSend;

#[async_trait]
impl FlowLogic for CloseThenSend {
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError> {
        let mut session = ctx.initiate_flow("bob")?;
        ctx.send(&session, "PING")?;
        ctx.close(&mut session);

        let send = ctx.send(&session, "again");
        let receive = ctx.receive::<String>(&mut session).await;
        assert!(matches!(send, Err(FlowError::SessionClosed { .. })));
        assert!(matches!(receive, Err(FlowError::SessionClosed { .. })));
        Ok(Payload::unit())
    }
}

#[tokio::test]
async fn closed_session_refuses_traffic() {
    init_tracing();
    let network = TestNetwork::new();
    let alice = network.spawn("alice", initiators()).unwrap();
    let bob = network.spawn("bob", with_responders([pong()])).unwrap();

    alice
        .start_flow("Ping", CloseThenSend)
        .unwrap()
        .result()
        .await
        .unwrap();

    // The responder gets the buffered PING, then the close
    bob.events()
        .wait_for("session.accepted", 1, TEST_TIMEOUT)
        .await
        .unwrap();
    wait_until(TEST_TIMEOUT, || bob.list_flows().is_empty())
        .await
        .unwrap();
    assert_eq!(bob.session_count(), 0);
}
