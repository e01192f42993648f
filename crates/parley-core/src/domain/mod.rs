/// Flow identities and lineage
pub mod identity;

/// Responder registry
pub mod registry;

/// Configured responder overrides
pub mod overrides;

/// Responder resolution
pub mod resolver;

/// Session state owned by flow instances
pub mod session;

/// Flow instance domain models
pub mod flow_instance;

/// Domain events
pub mod events;
