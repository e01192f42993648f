// Parley Tests
//
// This is a meta-package that organizes the cross-crate scenarios under
// `scenarios/`. It doesn't contain test code itself.

pub use parley_core as core;
pub use parley_manifest as manifest;
pub use parley_monitoring as monitoring;
pub use parley_test_utils as test_utils;
pub use parley_transport_inmemory as transport;
