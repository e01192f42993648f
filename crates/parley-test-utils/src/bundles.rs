//! Flow declarations and bundles used across tests.

use parley_core::{FlowBundle, FlowDeclaration, FlowIdentity};

use crate::flows::{Echo, Failing, Reply, Silent, WrongType};

/// `Ping`, an initiator
pub fn ping() -> FlowDeclaration {
    FlowDeclaration::initiating(FlowIdentity::root("Ping"))
}

/// `Counter`, an initiator
pub fn counter() -> FlowDeclaration {
    FlowDeclaration::initiating(FlowIdentity::root("Counter"))
}

/// `Sleeper`, an initiator
pub fn sleeper() -> FlowDeclaration {
    FlowDeclaration::initiating(FlowIdentity::root("Sleeper"))
}

/// Identity of `Pong`
pub fn pong_identity() -> FlowIdentity {
    FlowIdentity::root("Pong")
}

/// `Pong`: answers `Ping` with `"PONG"` (depth 1)
pub fn pong() -> FlowDeclaration {
    FlowDeclaration::responder(pong_identity(), "Ping", |session| {
        Reply::new(session, "PONG")
    })
}

/// `Pong2`: an unrelated sibling of `Pong`, answers `"PONGPONG"` (depth 1)
pub fn pong2() -> FlowDeclaration {
    FlowDeclaration::responder(FlowIdentity::root("Pong2"), "Ping", |session| {
        Reply::new(session, "PONGPONG")
    })
}

/// `Pongiest`: extends `Pong`, answers `"Gorgonzola"` (depth 2)
pub fn pongiest() -> FlowDeclaration {
    FlowDeclaration::responder(
        FlowIdentity::extending("Pongiest", &pong_identity()),
        "Ping",
        |session| Reply::new(session, "Gorgonzola"),
    )
}

/// `Echo`: answers `Counter` by echoing every value
pub fn echo() -> FlowDeclaration {
    FlowDeclaration::responder(FlowIdentity::root("Echo"), "Counter", Echo::new)
}

/// `PongFailing`: answers `Ping` by failing
pub fn pong_failing() -> FlowDeclaration {
    FlowDeclaration::responder(FlowIdentity::root("PongFailing"), "Ping", |session| {
        Failing::new(session, "responder exploded")
    })
}

/// `PongWrongType`: answers `Ping` with a number
pub fn pong_wrong_type() -> FlowDeclaration {
    FlowDeclaration::responder(FlowIdentity::root("PongWrongType"), "Ping", WrongType::new)
}

/// `PongSilent`: accepts `Ping` and never answers
pub fn pong_silent() -> FlowDeclaration {
    FlowDeclaration::responder(FlowIdentity::root("PongSilent"), "Ping", Silent::new)
}

/// Every initiator used in tests
pub fn initiators() -> FlowBundle {
    FlowBundle::new().with(ping()).with(counter()).with(sleeper())
}

/// Initiators plus the given responders
pub fn with_responders(responders: impl IntoIterator<Item = FlowDeclaration>) -> FlowBundle {
    let mut bundle = initiators();
    for responder in responders {
        bundle.push(responder);
    }
    bundle
}
