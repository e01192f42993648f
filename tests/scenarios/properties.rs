//! Resolution properties checked over every registration order.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use parley_core::{
    FlowIdentity, FlowName, InitiationBinding, OverrideTable, Registry, ResolutionError, Resolver,
};

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut all = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            all.push(tail);
        }
    }
    all
}

/// `Resp1 <- Resp2 <- ... <- RespN`, each extending the previous
fn chain(n: usize) -> Vec<FlowIdentity> {
    let mut chain = vec![FlowIdentity::root("Resp1")];
    for depth in 2..=n {
        let parent = chain[depth - 2].clone();
        chain.push(FlowIdentity::extending(format!("Resp{}", depth), &parent));
    }
    chain
}

fn resolver_with(responders: &[FlowIdentity]) -> Resolver {
    let registry = Arc::new(Registry::new());
    for responder in responders {
        registry
            .register(InitiationBinding::new("Init", responder.clone()))
            .unwrap();
    }
    Resolver::new(registry, Arc::new(OverrideTable::new()))
}

fn init() -> FlowName {
    FlowName::from("Init")
}

#[test]
fn deepest_candidate_wins_in_any_registration_order() {
    for n in 1..=5 {
        let chain = chain(n);
        let deepest = chain[n - 1].clone();
        for order in permutations(&chain) {
            let resolved = resolver_with(&order).resolve(&init()).unwrap();
            assert_eq!(resolved, deepest, "order {:?}", order);
        }
    }
}

#[test]
fn override_beats_every_more_specific_candidate() {
    let chain = chain(4);
    for target in &chain {
        let resolver = resolver_with(&chain);
        resolver
            .overrides()
            .set(resolver.registry(), init(), target.name())
            .unwrap();

        for _ in 0..3 {
            assert_eq!(resolver.resolve(&init()).unwrap(), *target);
        }
    }
}

#[test]
fn ties_fail_until_an_override_is_installed() {
    let base = FlowIdentity::root("Base");
    let left = FlowIdentity::extending("Left", &base);
    let right = FlowIdentity::extending("Right", &base);
    let candidates = vec![base.clone(), left.clone(), right.clone()];

    for order in permutations(&candidates) {
        let resolver = resolver_with(&order);
        assert_eq!(
            resolver.resolve(&init()),
            Err(ResolutionError::AmbiguousResponder {
                initiator: init(),
                candidates: vec![FlowName::from("Left"), FlowName::from("Right")],
            })
        );

        resolver
            .overrides()
            .set(resolver.registry(), init(), right.name())
            .unwrap();
        assert_eq!(resolver.resolve(&init()).unwrap(), right);
    }
}

#[test]
fn registering_a_binding_twice_changes_nothing() {
    let chain = chain(3);
    let registry = Registry::new();
    for responder in &chain {
        registry
            .register(InitiationBinding::new("Init", responder.clone()))
            .unwrap();
    }
    let before = registry.candidates_for(&init());

    for responder in chain.iter().rev() {
        registry
            .register(InitiationBinding::new("Init", responder.clone()))
            .unwrap();
    }

    assert_eq!(registry.candidates_for(&init()), before);
    assert_eq!(before.len(), 3);
    assert_eq!(registry.len(), 3);
}

#[test]
fn unknown_initiator_has_no_responder() {
    let resolver = resolver_with(&chain(2));
    assert_eq!(
        resolver.resolve(&FlowName::from("Other")),
        Err(ResolutionError::NoResponderRegistered {
            initiator: FlowName::from("Other"),
        })
    );
}
