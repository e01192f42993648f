/// Session lifecycle and routing
pub mod session_manager;

/// Flow instance execution
pub mod flow_runtime;

/// Context handed to running flow logic
pub mod context;

/// Bounded pool of worker slots
pub mod worker_pool;

/// Deployment bundle
pub mod bundle;

/// Node assembly
pub mod node;
